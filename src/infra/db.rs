use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::time::Duration;
use uuid::Uuid;

use crate::app::store::{CommentStore, CommunityStore, PostStore, Store, VoteStore};
use crate::config::AppConfig;
use crate::domain::comment::{Comment, NewComment};
use crate::domain::post::{NewPost, Post};
use crate::domain::subreddit::Subreddit;
use crate::domain::vote::{Vote, VoteChange, VoteDirection};

#[derive(Clone)]
pub struct Db {
    pool: PgPool,
}

/// Vote tables share a shape; only the target column differs.
#[derive(Clone, Copy)]
enum VoteTable {
    Post,
    Comment,
}

impl VoteTable {
    fn table(&self) -> &'static str {
        match self {
            Self::Post => "votes",
            Self::Comment => "comment_votes",
        }
    }

    fn target_column(&self) -> &'static str {
        match self {
            Self::Post => "post_id",
            Self::Comment => "comment_id",
        }
    }

    fn target_table(&self) -> &'static str {
        match self {
            Self::Post => "posts",
            Self::Comment => "comments",
        }
    }
}

impl Db {
    pub async fn connect(config: &AppConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .acquire_timeout(Duration::from_secs(config.db_connect_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.db_idle_timeout_seconds))
            .max_lifetime(Duration::from_secs(config.db_max_lifetime_seconds))
            .connect(&config.database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn list_votes(&self, table: VoteTable, target_id: Uuid) -> Result<Vec<Vote>> {
        let sql = format!(
            "SELECT {target} AS target_id, user_id, direction::text AS direction \
             FROM {table} WHERE {target} = $1",
            target = table.target_column(),
            table = table.table(),
        );
        let rows = sqlx::query(&sql)
            .bind(target_id)
            .fetch_all(self.pool())
            .await?;

        rows.iter().map(vote_from_row).collect()
    }

    async fn cast_vote(
        &self,
        table: VoteTable,
        target_id: Uuid,
        user_id: Uuid,
        direction: VoteDirection,
    ) -> Result<Option<VoteChange>> {
        let mut tx = self.pool.begin().await?;

        let target: Option<Uuid> = sqlx::query_scalar(&format!(
            "SELECT id FROM {} WHERE id = $1 FOR SHARE",
            table.target_table()
        ))
        .bind(target_id)
        .fetch_optional(&mut *tx)
        .await?;

        if target.is_none() {
            tx.rollback().await?;
            return Ok(None);
        }

        let previous: Option<String> = sqlx::query_scalar(&format!(
            "SELECT direction::text FROM {} WHERE {} = $1 AND user_id = $2 FOR UPDATE",
            table.table(),
            table.target_column()
        ))
        .bind(target_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
        let previous = previous
            .map(|value| {
                VoteDirection::from_db(&value)
                    .ok_or_else(|| anyhow!("unknown vote direction: {}", value))
            })
            .transpose()?;

        let change = VoteChange::resolve(previous, direction);
        match change.current {
            Some(current) => {
                sqlx::query(&format!(
                    "INSERT INTO {table} ({target}, user_id, direction) \
                     VALUES ($1, $2, $3::vote_direction) \
                     ON CONFLICT ({target}, user_id) DO UPDATE SET direction = EXCLUDED.direction",
                    table = table.table(),
                    target = table.target_column(),
                ))
                .bind(target_id)
                .bind(user_id)
                .bind(current.as_db())
                .execute(&mut *tx)
                .await?;
            }
            None => {
                sqlx::query(&format!(
                    "DELETE FROM {} WHERE {} = $1 AND user_id = $2",
                    table.table(),
                    table.target_column()
                ))
                .bind(target_id)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(Some(change))
    }
}

#[async_trait]
impl CommunityStore for Db {
    async fn create_subreddit(&self, name: &str, creator_id: Uuid) -> Result<Option<Subreddit>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "INSERT INTO subreddits (name, creator_id) VALUES ($1, $2) \
             ON CONFLICT (name) DO NOTHING \
             RETURNING id, name, creator_id, created_at",
        )
        .bind(name)
        .bind(creator_id)
        .fetch_optional(&mut *tx)
        .await?;

        let subreddit = match row {
            Some(row) => subreddit_from_row(&row),
            None => {
                tx.rollback().await?;
                return Ok(None);
            }
        };

        sqlx::query("INSERT INTO subscriptions (user_id, subreddit_id) VALUES ($1, $2)")
            .bind(creator_id)
            .bind(subreddit.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(subreddit))
    }

    async fn find_subreddit(&self, name: &str) -> Result<Option<Subreddit>> {
        let row = sqlx::query(
            "SELECT id, name, creator_id, created_at FROM subreddits WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.as_ref().map(subreddit_from_row))
    }

    async fn subreddit_exists(&self, subreddit_id: Uuid) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM subreddits WHERE id = $1)")
                .bind(subreddit_id)
                .fetch_one(self.pool())
                .await?;
        Ok(exists)
    }

    async fn count_subscribers(&self, subreddit_id: Uuid) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM subscriptions WHERE subreddit_id = $1")
                .bind(subreddit_id)
                .fetch_one(self.pool())
                .await?;
        Ok(count)
    }

    async fn is_subscribed(&self, user_id: Uuid, subreddit_id: Uuid) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM subscriptions WHERE user_id = $1 AND subreddit_id = $2)",
        )
        .bind(user_id)
        .bind(subreddit_id)
        .fetch_one(self.pool())
        .await?;
        Ok(exists)
    }

    async fn subscribe(&self, user_id: Uuid, subreddit_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO subscriptions (user_id, subreddit_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(subreddit_id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn unsubscribe(&self, user_id: Uuid, subreddit_id: Uuid) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM subscriptions WHERE user_id = $1 AND subreddit_id = $2")
                .bind(user_id)
                .bind(subreddit_id)
                .execute(self.pool())
                .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl PostStore for Db {
    async fn create_post(&self, post: NewPost) -> Result<Post> {
        let row = sqlx::query(
            "WITH inserted_post AS ( \
                INSERT INTO posts (title, content, author_id, subreddit_id) \
                VALUES ($1, $2, $3, $4) \
                RETURNING id, title, content, author_id, subreddit_id, created_at \
             ) \
             SELECT p.*, u.username AS author_username \
             FROM inserted_post p \
             JOIN users u ON p.author_id = u.id",
        )
        .bind(post.title)
        .bind(post.content)
        .bind(post.author_id)
        .bind(post.subreddit_id)
        .fetch_one(self.pool())
        .await?;

        Ok(post_from_row(&row))
    }

    async fn find_post(&self, post_id: Uuid) -> Result<Option<Post>> {
        let row = sqlx::query(
            "SELECT p.id, p.title, p.content, p.author_id, p.subreddit_id, p.created_at, \
                    u.username AS author_username \
             FROM posts p \
             JOIN users u ON p.author_id = u.id \
             WHERE p.id = $1",
        )
        .bind(post_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.as_ref().map(post_from_row))
    }

    async fn post_exists(&self, post_id: Uuid) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM posts WHERE id = $1)")
            .bind(post_id)
            .fetch_one(self.pool())
            .await?;
        Ok(exists)
    }
}

#[async_trait]
impl VoteStore for Db {
    async fn list_post_votes(&self, post_id: Uuid) -> Result<Vec<Vote>> {
        self.list_votes(VoteTable::Post, post_id).await
    }

    async fn find_post_vote(&self, post_id: Uuid, user_id: Uuid) -> Result<Option<VoteDirection>> {
        let direction: Option<String> = sqlx::query_scalar(
            "SELECT direction::text FROM votes WHERE post_id = $1 AND user_id = $2",
        )
        .bind(post_id)
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;

        direction
            .map(|value| {
                VoteDirection::from_db(&value)
                    .ok_or_else(|| anyhow!("unknown vote direction: {}", value))
            })
            .transpose()
    }

    async fn cast_post_vote(
        &self,
        post_id: Uuid,
        user_id: Uuid,
        direction: VoteDirection,
    ) -> Result<Option<VoteChange>> {
        self.cast_vote(VoteTable::Post, post_id, user_id, direction)
            .await
    }

    async fn list_comment_votes(&self, comment_id: Uuid) -> Result<Vec<Vote>> {
        self.list_votes(VoteTable::Comment, comment_id).await
    }

    async fn list_post_comment_votes(&self, post_id: Uuid) -> Result<Vec<Vote>> {
        let rows = sqlx::query(
            "SELECT v.comment_id AS target_id, v.user_id, v.direction::text AS direction \
             FROM comment_votes v \
             JOIN comments c ON v.comment_id = c.id \
             WHERE c.post_id = $1",
        )
        .bind(post_id)
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(vote_from_row).collect()
    }

    async fn cast_comment_vote(
        &self,
        comment_id: Uuid,
        user_id: Uuid,
        direction: VoteDirection,
    ) -> Result<Option<VoteChange>> {
        self.cast_vote(VoteTable::Comment, comment_id, user_id, direction)
            .await
    }
}

#[async_trait]
impl CommentStore for Db {
    async fn create_comment(&self, comment: NewComment) -> Result<Comment> {
        let row = sqlx::query(
            "WITH inserted_comment AS ( \
                INSERT INTO comments (post_id, author_id, text, reply_to_id) \
                VALUES ($1, $2, $3, $4) \
                RETURNING id, post_id, author_id, text, reply_to_id, created_at \
             ) \
             SELECT c.*, u.username AS author_username \
             FROM inserted_comment c \
             JOIN users u ON c.author_id = u.id",
        )
        .bind(comment.post_id)
        .bind(comment.author_id)
        .bind(comment.text)
        .bind(comment.reply_to_id)
        .fetch_one(self.pool())
        .await?;

        Ok(comment_from_row(&row))
    }

    async fn find_comment(&self, comment_id: Uuid) -> Result<Option<Comment>> {
        let row = sqlx::query(
            "SELECT c.id, c.post_id, c.author_id, c.text, c.reply_to_id, c.created_at, \
                    u.username AS author_username \
             FROM comments c \
             JOIN users u ON c.author_id = u.id \
             WHERE c.id = $1",
        )
        .bind(comment_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.as_ref().map(comment_from_row))
    }

    async fn list_comments(&self, post_id: Uuid) -> Result<Vec<Comment>> {
        let rows = sqlx::query(
            "SELECT c.id, c.post_id, c.author_id, c.text, c.reply_to_id, c.created_at, \
                    u.username AS author_username \
             FROM comments c \
             JOIN users u ON c.author_id = u.id \
             WHERE c.post_id = $1 \
             ORDER BY c.created_at ASC, c.id ASC",
        )
        .bind(post_id)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.iter().map(comment_from_row).collect())
    }
}

#[async_trait]
impl Store for Db {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn vote_from_row(row: &PgRow) -> Result<Vote> {
    let direction: String = row.get("direction");
    let direction = VoteDirection::from_db(&direction)
        .ok_or_else(|| anyhow!("unknown vote direction: {}", direction))?;
    Ok(Vote {
        target_id: row.get("target_id"),
        user_id: row.get("user_id"),
        direction,
    })
}

fn subreddit_from_row(row: &PgRow) -> Subreddit {
    Subreddit {
        id: row.get("id"),
        name: row.get("name"),
        creator_id: row.get("creator_id"),
        created_at: row.get("created_at"),
    }
}

fn post_from_row(row: &PgRow) -> Post {
    Post {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        author_id: row.get("author_id"),
        author_username: row.get("author_username"),
        subreddit_id: row.get("subreddit_id"),
        created_at: row.get("created_at"),
    }
}

fn comment_from_row(row: &PgRow) -> Comment {
    Comment {
        id: row.get("id"),
        post_id: row.get("post_id"),
        author_id: row.get("author_id"),
        author_username: row.get("author_username"),
        text: row.get("text"),
        reply_to_id: row.get("reply_to_id"),
        created_at: row.get("created_at"),
    }
}
