//! Gateway cache backends.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::Result;
#[cfg(feature = "redis")]
use super::GatewayError;

/// Deterministic cache key per read query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Users,
    User(i64),
    Products,
    Product(i64),
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Users => f.write_str("users"),
            CacheKey::User(id) => write!(f, "user:{}", id),
            CacheKey::Products => f.write_str("products"),
            CacheKey::Product(id) => write!(f, "product:{}", id),
        }
    }
}

/// Byte-valued cache with per-entry expiry.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Fetch a live entry. Expired entries read as absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;
}

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// Process-local cache.
///
/// Expiry uses the tokio clock, so paused-time tests control it. Every `set`
/// sweeps expired entries, so keys that are never read again do not pile up.
#[derive(Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheBackend for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }
        // Expired: evict unless a writer refreshed it meanwhile.
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|e| e.expires_at <= now) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// Redis-backed cache shared by gateway replicas.
#[cfg(feature = "redis")]
pub struct RedisCache {
    conn: redis::aio::ConnectionManager,
    key_prefix: String,
}

#[cfg(feature = "redis")]
impl RedisCache {
    pub async fn new(url: &str, key_prefix: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(|e| GatewayError::Cache(e.to_string()))?;
        let conn = redis::aio::ConnectionManager::new(client)
            .await
            .map_err(|e| GatewayError::Cache(e.to_string()))?;

        tracing::info!(url = %url, "Connected to Redis for gateway cache");

        Ok(Self {
            conn,
            key_prefix: key_prefix.to_string(),
        })
    }

    fn prefixed(&self, key: &str) -> String {
        format!("{}:{}", self.key_prefix, key)
    }
}

#[cfg(feature = "redis")]
#[async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        use redis::AsyncCommands;

        let mut conn = self.conn.clone();
        conn.get(self.prefixed(key))
            .await
            .map_err(|e| GatewayError::Cache(e.to_string()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        use redis::AsyncCommands;

        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(self.prefixed(key), value, ttl.as_secs().max(1))
            .await
            .map_err(|e| GatewayError::Cache(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        use redis::AsyncCommands;

        let mut conn = self.conn.clone();
        let _: () = conn
            .del(self.prefixed(key))
            .await
            .map_err(|e| GatewayError::Cache(e.to_string()))?;
        Ok(())
    }
}
