//! In-process store and cache with the same semantics as the Postgres and
//! Redis backends. Used by the test suites.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::store::{CommentStore, CommunityStore, PostStore, SnapshotCache, Store, VoteStore};
use crate::domain::comment::{Comment, NewComment};
use crate::domain::post::{CachedPostSnapshot, NewPost, Post};
use crate::domain::subreddit::Subreddit;
use crate::domain::vote::{Vote, VoteChange, VoteDirection};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex.lock().map_err(|_| anyhow!("memory backend lock poisoned"))
}

#[derive(Default)]
pub struct MemoryStore {
    users: Mutex<HashMap<Uuid, String>>,
    subreddits: Mutex<Vec<Subreddit>>,
    subscriptions: Mutex<HashSet<(Uuid, Uuid)>>, // (user_id, subreddit_id)
    posts: Mutex<Vec<Post>>,
    votes: Mutex<HashMap<(Uuid, Uuid), VoteDirection>>, // (post_id, user_id)
    comments: Mutex<Vec<Comment>>,
    comment_votes: Mutex<HashMap<(Uuid, Uuid), VoteDirection>>, // (comment_id, user_id)
    post_reads: AtomicUsize,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a user the way the external session service would.
    pub fn add_user(&self, username: &str) -> Uuid {
        let id = Uuid::new_v4();
        if let Ok(mut users) = self.users.lock() {
            users.insert(id, username.to_string());
        }
        id
    }

    /// Inserts a comment row as-is, skipping reply validation.
    #[doc(hidden)]
    pub fn insert_comment_row(&self, comment: Comment) {
        if let Ok(mut comments) = self.comments.lock() {
            comments.push(comment);
        }
    }

    /// Number of `find_post` calls served so far.
    #[doc(hidden)]
    pub fn post_reads(&self) -> usize {
        self.post_reads.load(Ordering::SeqCst)
    }

    #[doc(hidden)]
    pub fn vote_rows(&self, post_id: Uuid) -> usize {
        self.votes
            .lock()
            .map(|votes| votes.keys().filter(|(post, _)| *post == post_id).count())
            .unwrap_or(0)
    }

    /// Makes every subsequent call fail, as an unreachable database would.
    #[doc(hidden)]
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(anyhow!("store unavailable"));
        }
        Ok(())
    }

    fn username(&self, user_id: Uuid) -> Result<String> {
        lock(&self.users)?
            .get(&user_id)
            .cloned()
            .ok_or_else(|| anyhow!("unknown user: {}", user_id))
    }
}

fn collect_votes(
    votes: &HashMap<(Uuid, Uuid), VoteDirection>,
    keep: impl Fn(Uuid) -> bool,
) -> Vec<Vote> {
    votes
        .iter()
        .filter(|((target_id, _), _)| keep(*target_id))
        .map(|((target_id, user_id), direction)| Vote {
            target_id: *target_id,
            user_id: *user_id,
            direction: *direction,
        })
        .collect()
}

fn apply_vote(
    votes: &mut HashMap<(Uuid, Uuid), VoteDirection>,
    key: (Uuid, Uuid),
    direction: VoteDirection,
) -> VoteChange {
    let change = VoteChange::resolve(votes.get(&key).copied(), direction);
    match change.current {
        Some(current) => {
            votes.insert(key, current);
        }
        None => {
            votes.remove(&key);
        }
    }
    change
}

#[async_trait]
impl CommunityStore for MemoryStore {
    async fn create_subreddit(&self, name: &str, creator_id: Uuid) -> Result<Option<Subreddit>> {
        self.check()?;
        let mut subreddits = lock(&self.subreddits)?;
        if subreddits.iter().any(|subreddit| subreddit.name == name) {
            return Ok(None);
        }

        let subreddit = Subreddit {
            id: Uuid::new_v4(),
            name: name.to_string(),
            creator_id: Some(creator_id),
            created_at: OffsetDateTime::now_utc(),
        };
        subreddits.push(subreddit.clone());
        lock(&self.subscriptions)?.insert((creator_id, subreddit.id));
        Ok(Some(subreddit))
    }

    async fn find_subreddit(&self, name: &str) -> Result<Option<Subreddit>> {
        self.check()?;
        Ok(lock(&self.subreddits)?
            .iter()
            .find(|subreddit| subreddit.name == name)
            .cloned())
    }

    async fn subreddit_exists(&self, subreddit_id: Uuid) -> Result<bool> {
        self.check()?;
        Ok(lock(&self.subreddits)?
            .iter()
            .any(|subreddit| subreddit.id == subreddit_id))
    }

    async fn count_subscribers(&self, subreddit_id: Uuid) -> Result<i64> {
        self.check()?;
        let count = lock(&self.subscriptions)?
            .iter()
            .filter(|(_, subreddit)| *subreddit == subreddit_id)
            .count();
        Ok(count as i64)
    }

    async fn is_subscribed(&self, user_id: Uuid, subreddit_id: Uuid) -> Result<bool> {
        self.check()?;
        Ok(lock(&self.subscriptions)?.contains(&(user_id, subreddit_id)))
    }

    async fn subscribe(&self, user_id: Uuid, subreddit_id: Uuid) -> Result<bool> {
        self.check()?;
        Ok(lock(&self.subscriptions)?.insert((user_id, subreddit_id)))
    }

    async fn unsubscribe(&self, user_id: Uuid, subreddit_id: Uuid) -> Result<bool> {
        self.check()?;
        Ok(lock(&self.subscriptions)?.remove(&(user_id, subreddit_id)))
    }
}

#[async_trait]
impl PostStore for MemoryStore {
    async fn create_post(&self, post: NewPost) -> Result<Post> {
        self.check()?;
        let author_username = self.username(post.author_id)?;
        let post = Post {
            id: Uuid::new_v4(),
            title: post.title,
            content: post.content,
            author_id: post.author_id,
            author_username,
            subreddit_id: post.subreddit_id,
            created_at: OffsetDateTime::now_utc(),
        };
        lock(&self.posts)?.push(post.clone());
        Ok(post)
    }

    async fn find_post(&self, post_id: Uuid) -> Result<Option<Post>> {
        self.check()?;
        self.post_reads.fetch_add(1, Ordering::SeqCst);
        Ok(lock(&self.posts)?
            .iter()
            .find(|post| post.id == post_id)
            .cloned())
    }

    async fn post_exists(&self, post_id: Uuid) -> Result<bool> {
        self.check()?;
        Ok(lock(&self.posts)?.iter().any(|post| post.id == post_id))
    }
}

#[async_trait]
impl VoteStore for MemoryStore {
    async fn list_post_votes(&self, post_id: Uuid) -> Result<Vec<Vote>> {
        self.check()?;
        let votes = lock(&self.votes)?;
        Ok(collect_votes(&votes, |target| target == post_id))
    }

    async fn find_post_vote(&self, post_id: Uuid, user_id: Uuid) -> Result<Option<VoteDirection>> {
        self.check()?;
        Ok(lock(&self.votes)?.get(&(post_id, user_id)).copied())
    }

    async fn cast_post_vote(
        &self,
        post_id: Uuid,
        user_id: Uuid,
        direction: VoteDirection,
    ) -> Result<Option<VoteChange>> {
        self.check()?;
        if !lock(&self.posts)?.iter().any(|post| post.id == post_id) {
            return Ok(None);
        }
        let mut votes = lock(&self.votes)?;
        Ok(Some(apply_vote(&mut votes, (post_id, user_id), direction)))
    }

    async fn list_comment_votes(&self, comment_id: Uuid) -> Result<Vec<Vote>> {
        self.check()?;
        let votes = lock(&self.comment_votes)?;
        Ok(collect_votes(&votes, |target| target == comment_id))
    }

    async fn list_post_comment_votes(&self, post_id: Uuid) -> Result<Vec<Vote>> {
        self.check()?;
        let comment_ids: HashSet<Uuid> = lock(&self.comments)?
            .iter()
            .filter(|comment| comment.post_id == post_id)
            .map(|comment| comment.id)
            .collect();
        let votes = lock(&self.comment_votes)?;
        Ok(collect_votes(&votes, |target| comment_ids.contains(&target)))
    }

    async fn cast_comment_vote(
        &self,
        comment_id: Uuid,
        user_id: Uuid,
        direction: VoteDirection,
    ) -> Result<Option<VoteChange>> {
        self.check()?;
        if !lock(&self.comments)?
            .iter()
            .any(|comment| comment.id == comment_id)
        {
            return Ok(None);
        }
        let mut votes = lock(&self.comment_votes)?;
        Ok(Some(apply_vote(&mut votes, (comment_id, user_id), direction)))
    }
}

#[async_trait]
impl CommentStore for MemoryStore {
    async fn create_comment(&self, comment: NewComment) -> Result<Comment> {
        self.check()?;
        let author_username = self.username(comment.author_id)?;
        let comment = Comment {
            id: Uuid::new_v4(),
            post_id: comment.post_id,
            author_id: comment.author_id,
            author_username,
            text: comment.text,
            reply_to_id: comment.reply_to_id,
            created_at: OffsetDateTime::now_utc(),
        };
        lock(&self.comments)?.push(comment.clone());
        Ok(comment)
    }

    async fn find_comment(&self, comment_id: Uuid) -> Result<Option<Comment>> {
        self.check()?;
        Ok(lock(&self.comments)?
            .iter()
            .find(|comment| comment.id == comment_id)
            .cloned())
    }

    async fn list_comments(&self, post_id: Uuid) -> Result<Vec<Comment>> {
        self.check()?;
        Ok(lock(&self.comments)?
            .iter()
            .filter(|comment| comment.post_id == post_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<()> {
        self.check()
    }
}

/// Hash-per-key cache mirroring the Redis layout, with switches to simulate
/// an unreachable or stalled server.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, HashMap<String, String>>>,
    unavailable: AtomicBool,
    stall_ms: AtomicUsize,
    write_stall_ms: AtomicUsize,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    #[doc(hidden)]
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delays every lookup by `duration`.
    #[doc(hidden)]
    pub fn set_stall(&self, duration: Duration) {
        self.stall_ms
            .store(duration.as_millis() as usize, Ordering::SeqCst);
    }

    /// Delays every snapshot write by `duration`. The delay is read when the
    /// write starts.
    #[doc(hidden)]
    pub fn set_write_stall(&self, duration: Duration) {
        self.write_stall_ms
            .store(duration.as_millis() as usize, Ordering::SeqCst);
    }

    /// Raw field map stored under `post:<id>`.
    #[doc(hidden)]
    pub fn raw_fields(&self, post_id: Uuid) -> Option<HashMap<String, String>> {
        self.entries
            .lock()
            .ok()?
            .get(&CachedPostSnapshot::cache_key(post_id))
            .cloned()
    }

    #[doc(hidden)]
    pub fn insert_raw_fields(&self, post_id: Uuid, fields: HashMap<String, String>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(CachedPostSnapshot::cache_key(post_id), fields);
        }
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(anyhow!("cache unavailable"));
        }
        Ok(())
    }
}

async fn pause(stall_ms: &AtomicUsize) {
    let stall = stall_ms.load(Ordering::SeqCst);
    if stall > 0 {
        tokio::time::sleep(Duration::from_millis(stall as u64)).await;
    }
}

#[async_trait]
impl SnapshotCache for MemoryCache {
    async fn get_snapshot(&self, post_id: Uuid) -> Result<Option<CachedPostSnapshot>> {
        pause(&self.stall_ms).await;
        self.check()?;

        let fields = lock(&self.entries)?
            .get(&CachedPostSnapshot::cache_key(post_id))
            .cloned();
        Ok(fields
            .and_then(|fields| CachedPostSnapshot::from_fields(&fields))
            .filter(|snapshot| snapshot.id == post_id))
    }

    async fn put_snapshot(&self, snapshot: &CachedPostSnapshot) -> Result<()> {
        pause(&self.write_stall_ms).await;
        self.check()?;
        let fields = snapshot
            .to_fields()?
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect();
        lock(&self.entries)?.insert(CachedPostSnapshot::cache_key(snapshot.id), fields);
        Ok(())
    }

    async fn invalidate(&self, post_id: Uuid) -> Result<()> {
        self.check()?;
        lock(&self.entries)?.remove(&CachedPostSnapshot::cache_key(post_id));
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.check()
    }
}
