use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subreddit {
    pub id: Uuid,
    pub name: String,
    pub creator_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubredditView {
    #[serde(flatten)]
    pub subreddit: Subreddit,
    pub subscriber_count: i64,
    pub is_subscribed: bool,
}
