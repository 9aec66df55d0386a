use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::app::comments::CommentService;
use crate::app::error::{ServiceError, ServiceResult};
use crate::app::store::{
    CommunityStore, PostStore, SharedCache, SharedStore, SnapshotCache,
};
use crate::app::votes::VoteService;
use crate::config::CachePolicy;
use crate::domain::comment::CommentNode;
use crate::domain::post::{NewPost, Post, PostSource, PostView};
use crate::domain::vote::VoteTally;

const TITLE_MIN_LEN: usize = 3;
const TITLE_MAX_LEN: usize = 128;

#[derive(Debug, Serialize)]
pub struct PostDetail {
    pub post: PostView,
    pub votes: VoteTally,
    pub comments: Vec<CommentNode>,
}

#[derive(Clone)]
pub struct PostService {
    store: SharedStore,
    cache: SharedCache,
    policy: CachePolicy,
    votes: VoteService,
    comments: CommentService,
}

impl PostService {
    pub fn new(store: SharedStore, cache: SharedCache, policy: CachePolicy) -> Self {
        Self {
            votes: VoteService::new(store.clone(), cache.clone(), policy),
            comments: CommentService::new(store.clone()),
            store,
            cache,
            policy,
        }
    }

    pub async fn create_post(
        &self,
        author_id: Uuid,
        subreddit_id: Uuid,
        title: String,
        content: serde_json::Value,
    ) -> ServiceResult<Post> {
        let title = title.trim().to_string();
        let title_len = title.chars().count();
        if !(TITLE_MIN_LEN..=TITLE_MAX_LEN).contains(&title_len) {
            return Err(ServiceError::validation(format!(
                "title must be between {} and {} characters",
                TITLE_MIN_LEN, TITLE_MAX_LEN
            )));
        }

        if !self.store.subreddit_exists(subreddit_id).await? {
            return Err(ServiceError::NotFound("subreddit"));
        }
        if !self.store.is_subscribed(author_id, subreddit_id).await? {
            return Err(ServiceError::forbidden(
                "subscribe to the subreddit before posting",
            ));
        }

        let post = self
            .store
            .create_post(NewPost {
                author_id,
                subreddit_id,
                title,
                content,
            })
            .await?;
        debug!(post_id = %post.id, subreddit_id = %subreddit_id, "post created");

        Ok(post)
    }

    /// Display data for a post, preferring the cached snapshot. A cache
    /// error, timeout or malformed entry counts as a miss. Never writes the
    /// cache.
    pub async fn load(&self, post_id: Uuid) -> ServiceResult<Option<PostSource>> {
        let lookup = tokio::time::timeout(
            self.policy.lookup_timeout,
            self.cache.get_snapshot(post_id),
        )
        .await;

        match lookup {
            Ok(Ok(Some(snapshot))) => {
                debug!(post_id = %post_id, "post snapshot cache hit");
                return Ok(Some(PostSource::FromCache(snapshot)));
            }
            Ok(Ok(None)) => {}
            Ok(Err(err)) => {
                warn!(error = ?err, post_id = %post_id, "post snapshot lookup failed");
            }
            Err(_) => {
                warn!(
                    post_id = %post_id,
                    timeout_ms = self.policy.lookup_timeout.as_millis() as u64,
                    "post snapshot lookup timed out"
                );
            }
        }

        Ok(self.store.find_post(post_id).await?.map(PostSource::FromStore))
    }

    pub async fn get_detail(
        &self,
        post_id: Uuid,
        viewer_id: Option<Uuid>,
    ) -> ServiceResult<PostDetail> {
        let source = self
            .load(post_id)
            .await?
            .ok_or(ServiceError::NotFound("post"))?;

        let votes = self
            .votes
            .post_tally(post_id, viewer_id, source.cached_score())
            .await?;
        let comments = self.comments.load_thread(post_id, viewer_id).await?;

        Ok(PostDetail {
            post: source.into_view(),
            votes,
            comments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::domain::post::CachedPostSnapshot;
    use crate::domain::vote::{UserVote, VoteDirection};
    use crate::infra::memory::{MemoryCache, MemoryStore};

    struct Fixture {
        store: Arc<MemoryStore>,
        cache: Arc<MemoryCache>,
        service: PostService,
        author: Uuid,
        subreddit_id: Uuid,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MemoryCache::new());
        let author = store.add_user("ada");
        let subreddit = store
            .create_subreddit("rustaceans", author)
            .await
            .unwrap()
            .unwrap();
        let policy = CachePolicy {
            promote_at_score: 1,
            lookup_timeout: Duration::from_millis(50),
        };
        let service = PostService::new(store.clone(), cache.clone(), policy);
        Fixture {
            store,
            cache,
            service,
            author,
            subreddit_id: subreddit.id,
        }
    }

    async fn seed_post(f: &Fixture) -> Post {
        f.service
            .create_post(
                f.author,
                f.subreddit_id,
                "Borrow checker tips".into(),
                json!({ "blocks": [{ "type": "paragraph", "text": "hi" }] }),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn cache_hit_skips_the_store() {
        let f = fixture().await;
        let post = seed_post(&f).await;
        let mut cached = CachedPostSnapshot::from_post(&post, 7, Some(VoteDirection::Up));
        cached.title = "Cached title".into();
        f.cache
            .insert_raw_fields(post.id, as_map(cached.to_fields().unwrap()));

        let detail = f.service.get_detail(post.id, None).await.unwrap();

        assert_eq!(f.store.post_reads(), 0);
        assert_eq!(detail.post.title, "Cached title");
        assert_eq!(detail.votes.score, 7);
        assert_eq!(detail.votes.user_vote, UserVote::None);
    }

    #[tokio::test]
    async fn cache_miss_reads_store_without_populating() {
        let f = fixture().await;
        let post = seed_post(&f).await;

        let detail = f.service.get_detail(post.id, Some(f.author)).await.unwrap();

        assert_eq!(f.store.post_reads(), 1);
        assert_eq!(detail.post.id, post.id);
        assert_eq!(detail.post.title, post.title);
        assert_eq!(detail.post.author_username, "ada");
        assert_eq!(detail.post.content, post.content);
        assert_eq!(detail.votes, VoteTally::empty());
        assert!(detail.comments.is_empty());
        assert!(f.cache.raw_fields(post.id).is_none());
    }

    #[tokio::test]
    async fn unknown_post_is_not_found() {
        let f = fixture().await;

        let err = f.service.get_detail(Uuid::new_v4(), None).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound("post")));
    }

    #[tokio::test]
    async fn cache_outage_falls_back_to_store() {
        let f = fixture().await;
        let post = seed_post(&f).await;
        f.cache.set_unavailable(true);

        let source = f.service.load(post.id).await.unwrap().unwrap();
        assert!(matches!(source, PostSource::FromStore(_)));
    }

    #[tokio::test]
    async fn slow_cache_counts_as_miss() {
        let f = fixture().await;
        let post = seed_post(&f).await;
        let cached = CachedPostSnapshot::from_post(&post, 3, None);
        f.cache
            .insert_raw_fields(post.id, as_map(cached.to_fields().unwrap()));
        f.cache.set_stall(Duration::from_millis(500));

        let source = f.service.load(post.id).await.unwrap().unwrap();
        assert!(matches!(source, PostSource::FromStore(_)));
        assert_eq!(f.store.post_reads(), 1);
    }

    #[tokio::test]
    async fn malformed_snapshot_counts_as_miss() {
        let f = fixture().await;
        let post = seed_post(&f).await;
        let mut garbage = HashMap::new();
        garbage.insert("id".to_string(), "not-a-uuid".to_string());
        f.cache.insert_raw_fields(post.id, garbage);

        let source = f.service.load(post.id).await.unwrap().unwrap();
        assert!(matches!(source, PostSource::FromStore(_)));
    }

    #[tokio::test]
    async fn viewer_vote_comes_from_store_on_cache_hit() {
        let f = fixture().await;
        let post = seed_post(&f).await;
        let voter = f.store.add_user("voter");
        let viewer = f.store.add_user("viewer");
        let votes = VoteService::new(f.store.clone(), f.cache.clone(), CachePolicy::default());

        votes
            .cast_post_vote(post.id, viewer, VoteDirection::Down)
            .await
            .unwrap();
        votes
            .cast_post_vote(post.id, voter, VoteDirection::Up)
            .await
            .unwrap();
        votes
            .cast_post_vote(post.id, f.author, VoteDirection::Up)
            .await
            .unwrap();
        assert!(f.cache.raw_fields(post.id).is_some());
        let reads_before = f.store.post_reads();

        let detail = f.service.get_detail(post.id, Some(viewer)).await.unwrap();
        assert_eq!(f.store.post_reads(), reads_before);
        assert_eq!(detail.votes.score, 1);
        assert_eq!(detail.votes.user_vote, UserVote::Down);
    }

    #[tokio::test]
    async fn creating_a_post_requires_subscription() {
        let f = fixture().await;
        let outsider = f.store.add_user("outsider");

        let err = f
            .service
            .create_post(outsider, f.subreddit_id, "Hello there".into(), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn creating_a_post_validates_title_and_subreddit() {
        let f = fixture().await;

        let short = f
            .service
            .create_post(f.author, f.subreddit_id, " ab ".into(), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(short, ServiceError::Validation(_)));

        let long = f
            .service
            .create_post(f.author, f.subreddit_id, "x".repeat(129), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(long, ServiceError::Validation(_)));

        let missing = f
            .service
            .create_post(f.author, Uuid::new_v4(), "Valid title".into(), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(missing, ServiceError::NotFound("subreddit")));
    }

    #[tokio::test]
    async fn creating_a_post_leaves_cache_untouched() {
        let f = fixture().await;
        let post = seed_post(&f).await;

        assert!(f.cache.raw_fields(post.id).is_none());
        assert_eq!(post.title, "Borrow checker tips");
    }

    fn as_map(fields: Vec<(&'static str, String)>) -> HashMap<String, String> {
        fields
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect()
    }
}
