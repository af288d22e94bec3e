//! Redis store backend.
//!
//! Uses a [`ConnectionManager`], which multiplexes one connection across
//! tasks and reconnects on its own after the server comes back.

use std::time::Duration;

use async_trait::async_trait;
use cfshield_core::CacheBackendError;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{AsyncCommands, Client, RedisError};

use super::traits::{CacheResult, StoreBackend};

/// Redis connection settings.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Connection URL, e.g. `redis://localhost:6379`.
    pub url: String,
    /// Limit for establishing a connection.
    pub connect_timeout: Duration,
    /// Limit for a single command round trip.
    pub response_timeout: Duration,
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: Duration::from_millis(1000),
            response_timeout: Duration::from_millis(500),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }
}

pub struct RedisBackend {
    conn: ConnectionManager,
}

impl RedisBackend {
    /// Open a managed connection.
    ///
    /// Bounded by the connect timeout so a dead server cannot stall startup.
    pub async fn connect(config: &RedisConfig) -> CacheResult<Self> {
        let client = Client::open(config.url.as_str()).map_err(|e| map_error("CONNECT", e))?;

        let manager_config = ConnectionManagerConfig::new()
            .set_number_of_retries(1)
            .set_connection_timeout(config.connect_timeout)
            .set_response_timeout(config.response_timeout);

        let conn = tokio::time::timeout(
            config.connect_timeout * 2,
            client.get_connection_manager_with_config(manager_config),
        )
        .await
        .map_err(|_| CacheBackendError::unavailable("timed out connecting to redis"))?
        .map_err(|e| map_error("CONNECT", e))?;

        Ok(Self { conn })
    }
}

/// Sort Redis errors into connection-level and command-level failures.
fn map_error(command: &str, err: RedisError) -> CacheBackendError {
    if err.is_io_error()
        || err.is_connection_dropped()
        || err.is_connection_refusal()
        || err.is_timeout()
    {
        CacheBackendError::unavailable(format!("{}: {}", command, err))
    } else {
        CacheBackendError::command(command, err.to_string())
    }
}

#[async_trait]
impl StoreBackend for RedisBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn ping(&self) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| map_error("PING", e))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(|e| map_error("GET", e))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(key, value, ttl_seconds)
            .await
            .map_err(|e| map_error("SETEX", e))?;
        Ok(())
    }

    async fn del(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.del(key).await.map_err(|e| map_error("DEL", e))?;
        Ok(removed > 0)
    }

    async fn zrem_range_by_score(&self, key: &str, min: i64, max: i64) -> CacheResult<u64> {
        let mut conn = self.conn.clone();
        conn.zrembyscore(key, min, max)
            .await
            .map_err(|e| map_error("ZREMRANGEBYSCORE", e))
    }

    async fn zcard(&self, key: &str) -> CacheResult<u64> {
        let mut conn = self.conn.clone();
        conn.zcard(key).await.map_err(|e| map_error("ZCARD", e))
    }

    async fn zadd(&self, key: &str, score: i64, member: &str) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .zadd(key, member, score)
            .await
            .map_err(|e| map_error("ZADD", e))?;
        Ok(())
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .expire(key, ttl_seconds as i64)
            .await
            .map_err(|e| map_error("EXPIRE", e))?;
        Ok(())
    }

    async fn zoldest_score(&self, key: &str) -> CacheResult<Option<i64>> {
        let mut conn = self.conn.clone();
        let oldest: Vec<(String, f64)> = conn
            .zrange_withscores(key, 0, 0)
            .await
            .map_err(|e| map_error("ZRANGE", e))?;
        Ok(oldest.first().map(|(_, score)| *score as i64))
    }
}
