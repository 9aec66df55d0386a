//! Persistence seams used by the services.
//!
//! `Db` (Postgres) and `RedisCache` are the production implementations;
//! `infra::memory` provides in-process ones.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::comment::{Comment, NewComment};
use crate::domain::post::{CachedPostSnapshot, NewPost, Post};
use crate::domain::subreddit::Subreddit;
use crate::domain::vote::{Vote, VoteChange, VoteDirection};

#[async_trait]
pub trait CommunityStore: Send + Sync {
    /// Creates the subreddit and subscribes its creator. `None` when the
    /// name is taken.
    async fn create_subreddit(&self, name: &str, creator_id: Uuid) -> Result<Option<Subreddit>>;

    async fn find_subreddit(&self, name: &str) -> Result<Option<Subreddit>>;

    async fn subreddit_exists(&self, subreddit_id: Uuid) -> Result<bool>;

    async fn count_subscribers(&self, subreddit_id: Uuid) -> Result<i64>;

    async fn is_subscribed(&self, user_id: Uuid, subreddit_id: Uuid) -> Result<bool>;

    /// Returns `false` when the subscription already existed.
    async fn subscribe(&self, user_id: Uuid, subreddit_id: Uuid) -> Result<bool>;

    /// Returns `false` when there was nothing to remove.
    async fn unsubscribe(&self, user_id: Uuid, subreddit_id: Uuid) -> Result<bool>;
}

#[async_trait]
pub trait PostStore: Send + Sync {
    async fn create_post(&self, post: NewPost) -> Result<Post>;

    /// Post joined with its author.
    async fn find_post(&self, post_id: Uuid) -> Result<Option<Post>>;

    async fn post_exists(&self, post_id: Uuid) -> Result<bool>;
}

#[async_trait]
pub trait VoteStore: Send + Sync {
    async fn list_post_votes(&self, post_id: Uuid) -> Result<Vec<Vote>>;

    async fn find_post_vote(&self, post_id: Uuid, user_id: Uuid) -> Result<Option<VoteDirection>>;

    /// Applies the toggle atomically. `None` when the post does not exist.
    async fn cast_post_vote(
        &self,
        post_id: Uuid,
        user_id: Uuid,
        direction: VoteDirection,
    ) -> Result<Option<VoteChange>>;

    async fn list_comment_votes(&self, comment_id: Uuid) -> Result<Vec<Vote>>;

    /// Votes on every comment of the post; `target_id` is the comment.
    async fn list_post_comment_votes(&self, post_id: Uuid) -> Result<Vec<Vote>>;

    /// Applies the toggle atomically. `None` when the comment does not exist.
    async fn cast_comment_vote(
        &self,
        comment_id: Uuid,
        user_id: Uuid,
        direction: VoteDirection,
    ) -> Result<Option<VoteChange>>;
}

#[async_trait]
pub trait CommentStore: Send + Sync {
    async fn create_comment(&self, comment: NewComment) -> Result<Comment>;

    async fn find_comment(&self, comment_id: Uuid) -> Result<Option<Comment>>;

    /// All comments of the post, oldest first.
    async fn list_comments(&self, post_id: Uuid) -> Result<Vec<Comment>>;
}

#[async_trait]
pub trait Store: CommunityStore + PostStore + VoteStore + CommentStore {
    async fn ping(&self) -> Result<()>;
}

/// Flat hash cache for post snapshots. Failures here are never fatal to
/// callers; services log and fall back.
#[async_trait]
pub trait SnapshotCache: Send + Sync {
    async fn get_snapshot(&self, post_id: Uuid) -> Result<Option<CachedPostSnapshot>>;

    /// Replaces any existing entry wholesale.
    async fn put_snapshot(&self, snapshot: &CachedPostSnapshot) -> Result<()>;

    async fn invalidate(&self, post_id: Uuid) -> Result<()>;

    async fn ping(&self) -> Result<()>;
}

pub type SharedStore = Arc<dyn Store>;
pub type SharedCache = Arc<dyn SnapshotCache>;
