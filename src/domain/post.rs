use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::vote::VoteDirection;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    pub content: serde_json::Value,
    pub author_id: Uuid,
    pub author_username: String,
    pub subreddit_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub author_id: Uuid,
    pub subreddit_id: Uuid,
    pub title: String,
    pub content: serde_json::Value,
}

/// Denormalized copy of a post kept in the cache as a flat hash.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedPostSnapshot {
    pub id: Uuid,
    pub title: String,
    pub author_username: String,
    pub content: serde_json::Value,
    pub created_at: OffsetDateTime,
    pub current_vote: Option<VoteDirection>,
    pub vote_count: Option<i64>,
}

impl CachedPostSnapshot {
    pub fn cache_key(post_id: Uuid) -> String {
        format!("post:{}", post_id)
    }

    pub fn from_post(post: &Post, vote_count: i64, current_vote: Option<VoteDirection>) -> Self {
        Self {
            id: post.id,
            title: post.title.clone(),
            author_username: post.author_username.clone(),
            content: post.content.clone(),
            created_at: post.created_at,
            current_vote,
            vote_count: Some(vote_count),
        }
    }

    pub fn to_fields(&self) -> Result<Vec<(&'static str, String)>, time::error::Format> {
        let mut fields = vec![
            ("id", self.id.to_string()),
            ("title", self.title.clone()),
            ("authorUsername", self.author_username.clone()),
            ("content", self.content.to_string()),
            ("createdAt", self.created_at.format(&Rfc3339)?),
        ];
        if let Some(vote) = self.current_vote {
            fields.push(("currentVote", vote.as_db().to_string()));
        }
        if let Some(count) = self.vote_count {
            fields.push(("voteCount", count.to_string()));
        }
        Ok(fields)
    }

    /// Rebuilds a snapshot from a hash read back from the cache. An empty,
    /// partial or unparseable hash yields `None`.
    pub fn from_fields(fields: &HashMap<String, String>) -> Option<Self> {
        if fields.is_empty() {
            return None;
        }

        let id = Uuid::parse_str(fields.get("id")?).ok()?;
        let title = fields.get("title")?.clone();
        let author_username = fields.get("authorUsername")?.clone();
        let content = serde_json::from_str(fields.get("content")?).ok()?;
        let created_at = OffsetDateTime::parse(fields.get("createdAt")?, &Rfc3339).ok()?;
        let current_vote = match fields.get("currentVote") {
            Some(value) => Some(VoteDirection::from_db(value)?),
            None => None,
        };
        let vote_count = match fields.get("voteCount") {
            Some(value) => Some(value.parse::<i64>().ok()?),
            None => None,
        };

        Some(Self {
            id,
            title,
            author_username,
            content,
            created_at,
            current_vote,
            vote_count,
        })
    }
}

/// Where the display data for a post came from.
#[derive(Debug, Clone)]
pub enum PostSource {
    FromCache(CachedPostSnapshot),
    FromStore(Post),
}

impl PostSource {
    /// Precomputed score carried by a cached snapshot, if any.
    pub fn cached_score(&self) -> Option<i64> {
        match self {
            Self::FromCache(snapshot) => snapshot.vote_count,
            Self::FromStore(_) => None,
        }
    }

    pub fn into_view(self) -> PostView {
        match self {
            Self::FromCache(snapshot) => PostView {
                id: snapshot.id,
                author_username: snapshot.author_username,
                title: snapshot.title,
                content: snapshot.content,
                created_at: snapshot.created_at,
            },
            Self::FromStore(post) => PostView {
                id: post.id,
                author_username: post.author_username,
                title: post.title,
                content: post.content,
                created_at: post.created_at,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostView {
    pub id: Uuid,
    pub author_username: String,
    pub title: String,
    pub content: serde_json::Value,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}
