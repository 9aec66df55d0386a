use axum::{
    extract::{rejection::PathRejection, Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app::comments::CommentService;
use crate::app::error::ServiceError;
use crate::app::posts::{PostDetail, PostService};
use crate::app::store::{SnapshotCache, Store};
use crate::app::subreddits::SubredditService;
use crate::app::votes::VoteService;
use crate::domain::comment::{Comment, CommentNode};
use crate::domain::post::Post;
use crate::domain::subreddit::{Subreddit, SubredditView};
use crate::domain::vote::{VoteDirection, VoteTally};
use crate::http::{AppError, AuthUser};
use crate::AppState;

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
}

/// Maps a service failure onto the HTTP error body. Store failures are
/// logged with `context` and answered with a generic message.
fn service_error(err: ServiceError, context: &'static str) -> AppError {
    match err {
        ServiceError::Validation(message) => AppError::bad_request(message),
        ServiceError::Forbidden(message) => AppError::forbidden(message),
        ServiceError::NotFound(what) => AppError::not_found(format!("{} not found", what)),
        ServiceError::Conflict(message) => AppError::conflict(message),
        ServiceError::Store(err) => {
            tracing::error!(error = ?err, "{}", context);
            AppError::internal(context)
        }
    }
}

/// Identifiers are opaque keys, so one that does not parse names no row.
fn path_id(path: Result<Path<Uuid>, PathRejection>, what: &'static str) -> Result<Uuid, AppError> {
    path.map(|Path(id)| id)
        .map_err(|_| AppError::not_found(format!("{} not found", what)))
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let db = state.store.ping().await.is_ok();
    let redis = state.cache.ping().await.is_ok();
    let status = if db && redis { "ok" } else { "degraded" };

    Json(HealthResponse { status })
}

#[derive(Deserialize)]
pub struct CreateSubredditRequest {
    pub name: String,
}

pub async fn create_subreddit(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateSubredditRequest>,
) -> Result<Json<Subreddit>, AppError> {
    let service = SubredditService::new(state.store.clone());
    let subreddit = service
        .create(auth.user_id, payload.name.trim())
        .await
        .map_err(|err| service_error(err, "failed to create subreddit"))?;

    Ok(Json(subreddit))
}

pub async fn get_subreddit(
    Path(name): Path<String>,
    auth: Option<AuthUser>,
    State(state): State<AppState>,
) -> Result<Json<SubredditView>, AppError> {
    let viewer_id = auth.map(|user| user.user_id);
    let service = SubredditService::new(state.store.clone());
    let view = service
        .get(&name, viewer_id)
        .await
        .map_err(|err| service_error(err, "failed to fetch subreddit"))?;

    Ok(Json(view))
}

pub async fn subscribe(
    Path(name): Path<String>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Subreddit>, AppError> {
    let service = SubredditService::new(state.store.clone());
    let subreddit = service
        .subscribe(auth.user_id, &name)
        .await
        .map_err(|err| service_error(err, "failed to subscribe"))?;

    Ok(Json(subreddit))
}

pub async fn unsubscribe(
    Path(name): Path<String>,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Subreddit>, AppError> {
    let service = SubredditService::new(state.store.clone());
    let subreddit = service
        .unsubscribe(auth.user_id, &name)
        .await
        .map_err(|err| service_error(err, "failed to unsubscribe"))?;

    Ok(Json(subreddit))
}

#[derive(Deserialize)]
pub struct CreatePostRequest {
    pub subreddit_id: Uuid,
    pub title: String,
    pub content: serde_json::Value,
}

pub async fn create_post(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreatePostRequest>,
) -> Result<Json<Post>, AppError> {
    let service = post_service(&state);
    let post = service
        .create_post(
            auth.user_id,
            payload.subreddit_id,
            payload.title,
            payload.content,
        )
        .await
        .map_err(|err| service_error(err, "failed to create post"))?;

    Ok(Json(post))
}

pub async fn get_post(
    path: Result<Path<Uuid>, PathRejection>,
    auth: Option<AuthUser>,
    State(state): State<AppState>,
) -> Result<Json<PostDetail>, AppError> {
    let id = path_id(path, "post")?;
    let viewer_id = auth.map(|user| user.user_id);
    let service = post_service(&state);
    let detail = service
        .get_detail(id, viewer_id)
        .await
        .map_err(|err| service_error(err, "failed to fetch post"))?;

    Ok(Json(detail))
}

#[derive(Deserialize)]
pub struct VoteRequest {
    #[serde(alias = "vote_type")]
    pub direction: VoteDirection,
}

pub async fn vote_post(
    path: Result<Path<Uuid>, PathRejection>,
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<VoteRequest>,
) -> Result<Json<VoteTally>, AppError> {
    let id = path_id(path, "post")?;
    let service = vote_service(&state);
    let tally = service
        .cast_post_vote(id, auth.user_id, payload.direction)
        .await
        .map_err(|err| service_error(err, "failed to record vote"))?;

    Ok(Json(tally))
}

pub async fn list_post_comments(
    path: Result<Path<Uuid>, PathRejection>,
    auth: Option<AuthUser>,
    State(state): State<AppState>,
) -> Result<Json<Vec<CommentNode>>, AppError> {
    let id = path_id(path, "post")?;
    let viewer_id = auth.map(|user| user.user_id);
    let service = CommentService::new(state.store.clone());
    let thread = service
        .post_thread(id, viewer_id)
        .await
        .map_err(|err| service_error(err, "failed to list comments"))?;

    Ok(Json(thread))
}

#[derive(Deserialize)]
pub struct CreateCommentRequest {
    pub text: String,
    pub reply_to_id: Option<Uuid>,
}

pub async fn comment_post(
    path: Result<Path<Uuid>, PathRejection>,
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<Json<Comment>, AppError> {
    let id = path_id(path, "post")?;
    let service = CommentService::new(state.store.clone());
    let comment = service
        .create_comment(auth.user_id, id, payload.text, payload.reply_to_id)
        .await
        .map_err(|err| service_error(err, "failed to create comment"))?;

    Ok(Json(comment))
}

pub async fn vote_comment(
    path: Result<Path<Uuid>, PathRejection>,
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<VoteRequest>,
) -> Result<Json<VoteTally>, AppError> {
    let id = path_id(path, "comment")?;
    let service = vote_service(&state);
    let tally = service
        .cast_comment_vote(id, auth.user_id, payload.direction)
        .await
        .map_err(|err| service_error(err, "failed to record comment vote"))?;

    Ok(Json(tally))
}

fn post_service(state: &AppState) -> PostService {
    PostService::new(state.store.clone(), state.cache.clone(), state.cache_policy)
}

fn vote_service(state: &AppState) -> VoteService {
    VoteService::new(state.store.clone(), state.cache.clone(), state.cache_policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn service_errors_map_to_statuses() {
        let cases = [
            (ServiceError::validation("bad"), StatusCode::BAD_REQUEST, "bad"),
            (ServiceError::forbidden("no"), StatusCode::FORBIDDEN, "no"),
            (ServiceError::NotFound("post"), StatusCode::NOT_FOUND, "post not found"),
            (ServiceError::conflict("taken"), StatusCode::CONFLICT, "taken"),
        ];
        for (err, status, message) in cases {
            let mapped = service_error(err, "context");
            assert_eq!(mapped.status(), status);
            assert_eq!(mapped.message(), message);
        }
    }

    #[test]
    fn parsed_path_ids_pass_through() {
        let mapped = path_id(Ok(Path(Uuid::nil())), "post").map_err(|err| err.status());
        assert_eq!(mapped, Ok(Uuid::nil()));
    }

    #[test]
    fn store_failures_hide_details() {
        let err = ServiceError::Store(anyhow::anyhow!("connection reset by peer"));
        let mapped = service_error(err, "failed to fetch post");
        assert_eq!(mapped.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(mapped.message(), "failed to fetch post");
    }
}
