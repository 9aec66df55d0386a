use axum::{routing::get, routing::post, Router};

use crate::AppState;
use crate::http::handlers;

pub fn health() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health))
}

pub fn subreddits() -> Router<AppState> {
    Router::new()
        .route("/subreddits", post(handlers::create_subreddit))
        .route("/subreddits/:name", get(handlers::get_subreddit))
        .route("/subreddits/:name/subscribe", post(handlers::subscribe))
        .route("/subreddits/:name/unsubscribe", post(handlers::unsubscribe))
}

pub fn posts() -> Router<AppState> {
    Router::new()
        .route("/posts", post(handlers::create_post))
        .route("/posts/:id", get(handlers::get_post))
        .route(
            "/posts/:id/vote",
            post(handlers::vote_post).patch(handlers::vote_post),
        )
        .route(
            "/posts/:id/comments",
            get(handlers::list_post_comments)
                .post(handlers::comment_post)
                .patch(handlers::comment_post),
        )
}

pub fn comments() -> Router<AppState> {
    Router::new().route(
        "/comments/:id/vote",
        post(handlers::vote_comment).patch(handlers::vote_comment),
    )
}
