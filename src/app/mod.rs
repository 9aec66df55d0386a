pub mod comments;
pub mod error;
pub mod posts;
pub mod store;
pub mod subreddits;
pub mod votes;
