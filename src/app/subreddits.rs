use tracing::info;
use uuid::Uuid;

use crate::app::error::{ServiceError, ServiceResult};
use crate::app::store::{CommunityStore, SharedStore};
use crate::domain::subreddit::{Subreddit, SubredditView};

const NAME_MIN_LEN: usize = 3;
const NAME_MAX_LEN: usize = 21;

#[derive(Clone)]
pub struct SubredditService {
    store: SharedStore,
}

impl SubredditService {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub async fn create(&self, creator_id: Uuid, name: &str) -> ServiceResult<Subreddit> {
        validate_name(name)?;

        let subreddit = self
            .store
            .create_subreddit(name, creator_id)
            .await?
            .ok_or_else(|| ServiceError::conflict("subreddit already exists"))?;
        info!(subreddit_id = %subreddit.id, name = %subreddit.name, "subreddit created");

        Ok(subreddit)
    }

    pub async fn get(&self, name: &str, viewer_id: Option<Uuid>) -> ServiceResult<SubredditView> {
        let subreddit = self.find(name).await?;
        let subscriber_count = self.store.count_subscribers(subreddit.id).await?;
        let is_subscribed = match viewer_id {
            Some(user_id) => self.store.is_subscribed(user_id, subreddit.id).await?,
            None => false,
        };

        Ok(SubredditView {
            subreddit,
            subscriber_count,
            is_subscribed,
        })
    }

    pub async fn subscribe(&self, user_id: Uuid, name: &str) -> ServiceResult<Subreddit> {
        let subreddit = self.find(name).await?;
        if !self.store.subscribe(user_id, subreddit.id).await? {
            return Err(ServiceError::conflict("already subscribed"));
        }
        Ok(subreddit)
    }

    pub async fn unsubscribe(&self, user_id: Uuid, name: &str) -> ServiceResult<Subreddit> {
        let subreddit = self.find(name).await?;
        if subreddit.creator_id == Some(user_id) {
            return Err(ServiceError::forbidden(
                "creators cannot unsubscribe from their own subreddit",
            ));
        }
        if !self.store.unsubscribe(user_id, subreddit.id).await? {
            return Err(ServiceError::validation("not subscribed"));
        }
        Ok(subreddit)
    }

    async fn find(&self, name: &str) -> ServiceResult<Subreddit> {
        self.store
            .find_subreddit(name)
            .await?
            .ok_or(ServiceError::NotFound("subreddit"))
    }
}

fn validate_name(name: &str) -> ServiceResult<()> {
    let len = name.chars().count();
    if !(NAME_MIN_LEN..=NAME_MAX_LEN).contains(&len) {
        return Err(ServiceError::validation(format!(
            "name must be between {} and {} characters",
            NAME_MIN_LEN, NAME_MAX_LEN
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(ServiceError::validation(
            "name may only contain letters, digits and underscores",
        ));
    }
    Ok(())
}
