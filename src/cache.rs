//! Redis-backed summary cache.
//!
//! Key layout and expiry are owned entirely by this adapter; the pipeline
//! only sees the exists/get/set contract.

use crate::config::get_config;
use crate::ports::{PortError, SummaryCache};
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use thiserror::Error;

/// Errors raised by the Redis cache adapter.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Redis command or connection failure.
    #[error("cache request failed: {0}")]
    Redis(#[from] redis::RedisError),
}

impl From<CacheError> for PortError {
    fn from(error: CacheError) -> Self {
        PortError::Transient(error.to_string())
    }
}

/// Summary cache backed by Redis with a fixed TTL per entry.
pub struct RedisSummaryCache {
    conn: ConnectionManager,
    ttl_seconds: u64,
}

impl RedisSummaryCache {
    /// Connect to Redis using configuration derived from the environment.
    pub async fn connect() -> Result<Self, CacheError> {
        let config = get_config();
        let client = redis::Client::open(config.redis_url.as_str())?;
        let conn = ConnectionManager::new(client).await?;
        tracing::debug!(ttl_seconds = config.summary_ttl_seconds, "Connected summary cache");
        Ok(Self {
            conn,
            ttl_seconds: config.summary_ttl_seconds,
        })
    }

    fn key(file_id: &str) -> String {
        format!("summary:{file_id}")
    }
}

#[async_trait]
impl SummaryCache for RedisSummaryCache {
    async fn exists(&self, key: &str) -> Result<bool, PortError> {
        let mut conn = self.conn.clone();
        let present: bool = conn.exists(Self::key(key)).await.map_err(CacheError::from)?;
        Ok(present)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, PortError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(Self::key(key)).await.map_err(CacheError::from)?;
        Ok(value)
    }

    async fn set(&self, key: &str, summary: &str) -> Result<(), PortError> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(Self::key(key), summary, self.ttl_seconds)
            .await
            .map_err(CacheError::from)?;
        tracing::debug!(file_id = key, ttl_seconds = self.ttl_seconds, "Summary stored");
        Ok(())
    }
}
