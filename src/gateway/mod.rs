//! Gateway read-through cache.
//!
//! Product and user reads are answered from the cache when a live entry
//! exists and from the owning service otherwise, populating the cache with a
//! fixed TTL. Writes go straight to the owning service. Under `ttl_only` a
//! write does not touch the cache, so a read within TTL of a write can
//! return the old value.
//!
//! Orders and registration are pass-throughs: never cached, always
//! forwarded with the caller's token.
//!
//! # Configuration
//!
//! ```yaml
//! gateway:
//!   cache:
//!     type: memory        # or redis
//!     redis_url: redis://localhost:6379
//!     ttl_secs: 300
//!   cache_policy: ttl_only  # or invalidate_on_write
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clients::{ClientError, OrderReceipt, Result as ClientResult, ServiceClient};
use crate::model::{Order, OrderInput, Product, ProductInput, RegisterInput, User};

pub mod cache;

pub use cache::{CacheBackend, CacheKey, InMemoryCache};
#[cfg(feature = "redis")]
pub use cache::RedisCache;

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Errors that can occur serving a gateway request.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Upstream error: {0}")]
    Upstream(#[from] ClientError),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Unauthorized: {operation} requires a bearer token")]
    Unauthorized { operation: &'static str },
}

/// Cache storage backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheType {
    #[default]
    Memory,
    Redis,
}

/// Cache backend settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    #[serde(rename = "type")]
    pub cache_type: CacheType,
    pub redis_url: String,
    /// Entry lifetime in seconds. Default: 300.
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_type: CacheType::Memory,
            redis_url: "redis://localhost:6379".to_string(),
            ttl_secs: 300,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// What a successful write does to cached reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Entries live until they expire.
    #[default]
    TtlOnly,
    /// Keys affected by a write are deleted after it succeeds.
    InvalidateOnWrite,
}

/// Gateway settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub cache: CacheConfig,
    pub cache_policy: CachePolicy,
}

/// Build the configured cache backend.
pub async fn init_cache(config: &CacheConfig) -> Result<Arc<dyn CacheBackend>> {
    match config.cache_type {
        CacheType::Memory => {
            info!(cache_type = "memory", ttl_secs = config.ttl_secs, "Gateway cache initialized");
            Ok(Arc::new(InMemoryCache::new()))
        }
        CacheType::Redis => {
            #[cfg(feature = "redis")]
            {
                let cache = RedisCache::new(&config.redis_url, "order-mesh").await?;
                info!(cache_type = "redis", ttl_secs = config.ttl_secs, "Gateway cache initialized");
                Ok(Arc::new(cache))
            }

            #[cfg(not(feature = "redis"))]
            {
                Err(GatewayError::Cache(
                    "Redis cache requires the 'redis' feature. Rebuild with --features redis"
                        .to_string(),
                ))
            }
        }
    }
}

/// The services that own the entities the gateway serves.
#[async_trait]
pub trait OwningServices: Send + Sync {
    async fn list_users(&self, token: Option<&str>) -> ClientResult<Vec<User>>;
    async fn get_user(&self, id: i64, token: Option<&str>) -> ClientResult<Option<User>>;
    async fn list_products(&self, token: Option<&str>) -> ClientResult<Vec<Product>>;
    async fn get_product(&self, id: i64, token: Option<&str>) -> ClientResult<Option<Product>>;
    async fn create_product(&self, input: &ProductInput, token: Option<&str>) -> ClientResult<String>;
    async fn update_product(
        &self,
        id: i64,
        input: &ProductInput,
        token: Option<&str>,
    ) -> ClientResult<String>;
    async fn delete_product(&self, id: i64, token: Option<&str>) -> ClientResult<String>;
    async fn register_user(&self, input: &RegisterInput) -> ClientResult<String>;
    async fn list_orders(&self, token: Option<&str>) -> ClientResult<Vec<Order>>;
    async fn get_order(&self, id: i64, token: Option<&str>) -> ClientResult<Option<Order>>;
    async fn place_order(&self, input: &OrderInput, token: Option<&str>) -> ClientResult<OrderReceipt>;
}

#[async_trait]
impl OwningServices for ServiceClient {
    async fn list_users(&self, token: Option<&str>) -> ClientResult<Vec<User>> {
        self.authorized(token).list_users().await
    }

    async fn get_user(&self, id: i64, token: Option<&str>) -> ClientResult<Option<User>> {
        self.authorized(token).get_user(id).await
    }

    async fn list_products(&self, token: Option<&str>) -> ClientResult<Vec<Product>> {
        self.authorized(token).list_products().await
    }

    async fn get_product(&self, id: i64, token: Option<&str>) -> ClientResult<Option<Product>> {
        self.authorized(token).get_product(id).await
    }

    async fn create_product(&self, input: &ProductInput, token: Option<&str>) -> ClientResult<String> {
        ServiceClient::create_product(&self.authorized(token), input).await
    }

    async fn update_product(
        &self,
        id: i64,
        input: &ProductInput,
        token: Option<&str>,
    ) -> ClientResult<String> {
        ServiceClient::update_product(&self.authorized(token), id, input).await
    }

    async fn delete_product(&self, id: i64, token: Option<&str>) -> ClientResult<String> {
        ServiceClient::delete_product(&self.authorized(token), id).await
    }

    async fn register_user(&self, input: &RegisterInput) -> ClientResult<String> {
        ServiceClient::register_user(self, input).await
    }

    async fn list_orders(&self, token: Option<&str>) -> ClientResult<Vec<Order>> {
        ServiceClient::list_orders(&self.authorized(token)).await
    }

    async fn get_order(&self, id: i64, token: Option<&str>) -> ClientResult<Option<Order>> {
        ServiceClient::get_order(&self.authorized(token), id).await
    }

    async fn place_order(&self, input: &OrderInput, token: Option<&str>) -> ClientResult<OrderReceipt> {
        ServiceClient::place_order(&self.authorized(token), input).await
    }
}

/// Resolves gateway reads through the cache and forwards writes.
pub struct GatewayResolver {
    upstream: Arc<dyn OwningServices>,
    cache: Arc<dyn CacheBackend>,
    ttl: Duration,
    policy: CachePolicy,
}

impl GatewayResolver {
    pub fn new(
        upstream: Arc<dyn OwningServices>,
        cache: Arc<dyn CacheBackend>,
        config: &GatewayConfig,
    ) -> Self {
        Self {
            upstream,
            cache,
            ttl: config.cache.ttl(),
            policy: config.cache_policy,
        }
    }

    pub async fn users(&self, token: Option<&str>) -> Result<Vec<User>> {
        let users = self
            .read_through(CacheKey::Users, || async {
                self.upstream.list_users(token).await.map(Some)
            })
            .await?;
        Ok(users.unwrap_or_default())
    }

    pub async fn user(&self, id: i64, token: Option<&str>) -> Result<Option<User>> {
        self.read_through(CacheKey::User(id), || self.upstream.get_user(id, token))
            .await
    }

    pub async fn products(&self, token: Option<&str>) -> Result<Vec<Product>> {
        let products = self
            .read_through(CacheKey::Products, || async {
                self.upstream.list_products(token).await.map(Some)
            })
            .await?;
        Ok(products.unwrap_or_default())
    }

    pub async fn product(&self, id: i64, token: Option<&str>) -> Result<Option<Product>> {
        self.read_through(CacheKey::Product(id), || self.upstream.get_product(id, token))
            .await
    }

    pub async fn create_product(&self, input: &ProductInput, token: Option<&str>) -> Result<String> {
        let token = require_token(token, "create_product")?;
        let message = self.upstream.create_product(input, Some(token)).await?;
        self.invalidate(&[CacheKey::Products]).await;
        Ok(message)
    }

    pub async fn update_product(
        &self,
        id: i64,
        input: &ProductInput,
        token: Option<&str>,
    ) -> Result<String> {
        let message = self
            .upstream
            .update_product(id, input, token)
            .await
            .map_err(|e| not_found_or(e, "product", id))?;
        self.invalidate(&[CacheKey::Products, CacheKey::Product(id)])
            .await;
        Ok(message)
    }

    pub async fn delete_product(&self, id: i64, token: Option<&str>) -> Result<String> {
        let message = self
            .upstream
            .delete_product(id, token)
            .await
            .map_err(|e| not_found_or(e, "product", id))?;
        self.invalidate(&[CacheKey::Products, CacheKey::Product(id)])
            .await;
        Ok(message)
    }

    /// Register a user. Uncached.
    pub async fn register_user(&self, input: &RegisterInput) -> Result<String> {
        Ok(self.upstream.register_user(input).await?)
    }

    /// The caller's orders. Uncached.
    pub async fn orders(&self, token: Option<&str>) -> Result<Vec<Order>> {
        Ok(self.upstream.list_orders(token).await?)
    }

    /// One order. Uncached; `None` when the order service has no such order.
    pub async fn order(&self, id: i64, token: Option<&str>) -> Result<Option<Order>> {
        Ok(self.upstream.get_order(id, token).await?)
    }

    /// Place an order for the token's user. Uncached.
    pub async fn place_order(&self, input: &OrderInput, token: Option<&str>) -> Result<OrderReceipt> {
        let token = require_token(token, "place_order")?;
        Ok(self.upstream.place_order(input, Some(token)).await?)
    }

    /// Serve `key` from cache or fetch, cache and return it.
    ///
    /// A `None` from upstream is returned uncached. Cache failures are
    /// logged and the request falls through to the owning service.
    async fn read_through<T, F, Fut>(&self, key: CacheKey, fetch: F) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = ClientResult<Option<T>>>,
    {
        let key_str = key.to_string();
        match self.cache.get(&key_str).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(value) => {
                    debug!(key = %key, "Cache hit");
                    return Ok(Some(value));
                }
                Err(e) => warn!(key = %key, error = %e, "Discarding undecodable cache entry"),
            },
            Ok(None) => debug!(key = %key, "Cache miss"),
            Err(e) => warn!(key = %key, error = %e, "Cache read failed, fetching upstream"),
        }

        let Some(value) = fetch().await? else {
            debug!(key = %key, "Upstream returned nothing, not caching");
            return Ok(None);
        };

        let bytes = serde_json::to_vec(&value)?;
        if let Err(e) = self.cache.set(&key_str, bytes, self.ttl).await {
            warn!(key = %key, error = %e, "Cache write failed");
        }
        Ok(Some(value))
    }

    async fn invalidate(&self, keys: &[CacheKey]) {
        if self.policy != CachePolicy::InvalidateOnWrite {
            return;
        }
        for key in keys {
            if let Err(e) = self.cache.delete(&key.to_string()).await {
                warn!(key = %key, error = %e, "Cache invalidation failed");
            } else {
                debug!(key = %key, "Cache entry invalidated");
            }
        }
    }
}

fn require_token<'a>(token: Option<&'a str>, operation: &'static str) -> Result<&'a str> {
    token
        .filter(|t| !t.is_empty())
        .ok_or(GatewayError::Unauthorized { operation })
}

fn not_found_or(err: ClientError, entity: &'static str, id: i64) -> GatewayError {
    match err {
        ClientError::Status { status: 404, .. } => GatewayError::NotFound { entity, id },
        other => GatewayError::Upstream(other),
    }
}

#[cfg(test)]
mod tests;
