use anyhow::Result;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;

use crate::services::cache::{CacheLookup, CacheStore};

/// Redis-backed cache store; expiry is delegated to Redis itself
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisCache {
    /// Create a new Redis cache with connection pooling
    pub async fn new(redis_url: &str, prefix: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            prefix: prefix.to_string(),
        })
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    async fn try_get(&self, key: &str) -> Result<Option<(String, i64)>> {
        let mut conn = self.conn.clone();
        let full_key = self.key(key);
        let (value, ttl): (Option<String>, i64) = redis::pipe()
            .get(&full_key)
            .ttl(&full_key)
            .query_async(&mut conn)
            .await?;
        Ok(value.map(|v| (v, ttl)))
    }

    async fn try_set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let ttl_seconds = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(self.key(key), value, ttl_seconds).await?;
        Ok(())
    }

    /// Ping Redis to check connection
    pub async fn try_ping(&self) -> Result<bool> {
        let mut conn = self.conn.clone();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(pong == "PONG")
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get_with_status(&self, key: &str) -> CacheLookup {
        match self.try_get(key).await {
            // TTL is -1 for keys without expiry, -2 for missing keys
            Ok(Some((value, ttl))) => {
                let remaining = (ttl >= 0).then(|| Duration::from_secs(ttl as u64));
                CacheLookup::hit(value, remaining)
            }
            Ok(None) => CacheLookup::miss(),
            Err(e) => {
                tracing::warn!(key = key, error = %e, "Redis read failed, treating as miss");
                CacheLookup::miss()
            }
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) {
        if let Err(e) = self.try_set(key, value, ttl).await {
            tracing::warn!(key = key, error = %e, "Redis write failed");
        }
    }

    async fn ping(&self) -> bool {
        self.try_ping().await.unwrap_or(false)
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
