use tracing::{debug, warn};
use uuid::Uuid;

use crate::app::error::{ServiceError, ServiceResult};
use crate::app::store::{PostStore, SharedCache, SharedStore, SnapshotCache, VoteStore};
use crate::config::CachePolicy;
use crate::domain::post::CachedPostSnapshot;
use crate::domain::vote::{tally, UserVote, VoteDirection, VoteTally};

#[derive(Clone)]
pub struct VoteService {
    store: SharedStore,
    cache: SharedCache,
    policy: CachePolicy,
}

impl VoteService {
    pub fn new(store: SharedStore, cache: SharedCache, policy: CachePolicy) -> Self {
        Self {
            store,
            cache,
            policy,
        }
    }

    /// Score and viewer vote for a post. A score carried by a cached
    /// snapshot is trusted as-is; the viewer's own direction always comes
    /// from the store.
    pub async fn post_tally(
        &self,
        post_id: Uuid,
        viewer_id: Option<Uuid>,
        cached_score: Option<i64>,
    ) -> ServiceResult<VoteTally> {
        if let Some(score) = cached_score {
            let user_vote = match viewer_id {
                Some(user_id) => self.store.find_post_vote(post_id, user_id).await?.into(),
                None => UserVote::None,
            };
            return Ok(VoteTally { score, user_vote });
        }

        let votes = self.store.list_post_votes(post_id).await?;
        Ok(tally(&votes, viewer_id))
    }

    pub async fn cast_post_vote(
        &self,
        post_id: Uuid,
        user_id: Uuid,
        direction: VoteDirection,
    ) -> ServiceResult<VoteTally> {
        let change = self
            .store
            .cast_post_vote(post_id, user_id, direction)
            .await?
            .ok_or(ServiceError::NotFound("post"))?;

        let votes = self.store.list_post_votes(post_id).await?;
        let result = tally(&votes, Some(user_id));
        debug!(
            post_id = %post_id,
            user_id = %user_id,
            retracted = change.is_retraction(),
            score = result.score,
            "post vote recorded"
        );

        self.refresh_snapshot(post_id, result.score, change.current)
            .await;

        Ok(result)
    }

    pub async fn cast_comment_vote(
        &self,
        comment_id: Uuid,
        user_id: Uuid,
        direction: VoteDirection,
    ) -> ServiceResult<VoteTally> {
        let change = self
            .store
            .cast_comment_vote(comment_id, user_id, direction)
            .await?
            .ok_or(ServiceError::NotFound("comment"))?;

        let votes = self.store.list_comment_votes(comment_id).await?;
        let result = tally(&votes, Some(user_id));
        debug!(
            comment_id = %comment_id,
            user_id = %user_id,
            retracted = change.is_retraction(),
            score = result.score,
            "comment vote recorded"
        );

        Ok(result)
    }

    /// Rewrites the post's snapshot once its score reaches the promotion
    /// threshold and drops it otherwise. Every cache call is bounded by the
    /// lookup timeout and failures only log.
    async fn refresh_snapshot(
        &self,
        post_id: Uuid,
        score: i64,
        current_vote: Option<VoteDirection>,
    ) {
        if score < self.policy.promote_at_score {
            self.invalidate_snapshot(post_id).await;
            return;
        }

        let post = match self.store.find_post(post_id).await {
            Ok(Some(post)) => post,
            Ok(None) => return,
            Err(err) => {
                warn!(error = ?err, post_id = %post_id, "failed to load post for snapshot");
                self.invalidate_snapshot(post_id).await;
                return;
            }
        };

        let snapshot = CachedPostSnapshot::from_post(&post, score, current_vote);
        let write = tokio::time::timeout(
            self.policy.lookup_timeout,
            self.cache.put_snapshot(&snapshot),
        )
        .await;
        match write {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(error = ?err, post_id = %post_id, "failed to write post snapshot");
                self.invalidate_snapshot(post_id).await;
                return;
            }
            Err(_) => {
                warn!(
                    post_id = %post_id,
                    timeout_ms = self.policy.lookup_timeout.as_millis() as u64,
                    "post snapshot write timed out"
                );
                self.invalidate_snapshot(post_id).await;
                return;
            }
        }

        // An overlapping vote may have committed and finished its own cache
        // step before this write landed.
        match self.store.list_post_votes(post_id).await {
            Ok(votes) if tally(&votes, None).score == score => {}
            Ok(_) => {
                debug!(post_id = %post_id, "score moved during snapshot write");
                self.invalidate_snapshot(post_id).await;
            }
            Err(err) => {
                warn!(error = ?err, post_id = %post_id, "failed to recheck post score");
                self.invalidate_snapshot(post_id).await;
            }
        }
    }

    async fn invalidate_snapshot(&self, post_id: Uuid) {
        let result =
            tokio::time::timeout(self.policy.lookup_timeout, self.cache.invalidate(post_id)).await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(error = ?err, post_id = %post_id, "failed to invalidate post snapshot");
            }
            Err(_) => {
                warn!(
                    post_id = %post_id,
                    timeout_ms = self.policy.lookup_timeout.as_millis() as u64,
                    "post snapshot invalidation timed out"
                );
            }
        }
    }
}
