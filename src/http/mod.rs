use axum::Router;

use crate::AppState;

mod auth;
mod error;
mod handlers;
mod routes;

pub use auth::{verify_access_token, AuthUser, TOKEN_AUDIENCE, TOKEN_ISSUER};
pub use error::AppError;

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .merge(routes::health())
        .merge(routes::subreddits())
        .merge(routes::posts())
        .merge(routes::comments());

    Router::new().nest("/v1", api).with_state(state)
}
