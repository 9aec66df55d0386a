pub mod app;
pub mod config;
pub mod domain;
pub mod http;
pub mod infra;

use crate::app::store::{SharedCache, SharedStore};
use crate::config::CachePolicy;

#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub cache: SharedCache,
    pub cache_policy: CachePolicy,
    pub paseto_access_key: [u8; 32],
}
