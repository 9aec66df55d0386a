use anyhow::Result;
use async_trait::async_trait;
use redis::{AsyncCommands, Client};
use std::collections::HashMap;
use tracing::warn;
use uuid::Uuid;

use crate::app::store::SnapshotCache;
use crate::domain::post::CachedPostSnapshot;

#[derive(Clone)]
pub struct RedisCache {
    client: Client,
}

impl RedisCache {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(Self { client })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl SnapshotCache for RedisCache {
    async fn get_snapshot(&self, post_id: Uuid) -> Result<Option<CachedPostSnapshot>> {
        let key = CachedPostSnapshot::cache_key(post_id);
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let fields: HashMap<String, String> = conn.hgetall(&key).await?;
        if fields.is_empty() {
            return Ok(None);
        }

        match CachedPostSnapshot::from_fields(&fields) {
            Some(snapshot) if snapshot.id == post_id => Ok(Some(snapshot)),
            _ => {
                warn!(key = %key, "discarding malformed post snapshot");
                Ok(None)
            }
        }
    }

    async fn put_snapshot(&self, snapshot: &CachedPostSnapshot) -> Result<()> {
        let key = CachedPostSnapshot::cache_key(snapshot.id);
        let fields = snapshot.to_fields()?;
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::pipe()
            .atomic()
            .del(&key)
            .ignore()
            .hset_multiple(&key, fields.as_slice())
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn invalidate(&self, post_id: Uuid) -> Result<()> {
        let key = CachedPostSnapshot::cache_key(post_id);
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = conn.del(&key).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(())
    }
}
