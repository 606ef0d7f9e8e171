//! Storage implementations.
//!
//! The order store and the product store are separate databases in a
//! deployed mesh; each service owns one. Both are served by the same SQL
//! implementations, parameterized by backend.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::{StorageConfig, StorageType};
use crate::model::{NewOrder, Order, Product, ProductInput};

pub mod schema;
pub mod sql;

pub use sql::{SqlDatabase, SqlOrderStore, SqlOutboxStore, SqlProductStore};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Storage backend '{0}' is not enabled in this build")]
    Unsupported(String),
}

/// A pending outbox row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxRecord {
    pub id: i64,
    pub queue: String,
    pub payload: String,
    pub attempts: i32,
}

/// Persistence for orders and their line items.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert the order row and every item row in one transaction.
    ///
    /// With `stage_event` set, the matching `order_placed` payload is written
    /// to the outbox inside the same transaction. Any failure rolls back
    /// every row.
    async fn insert_order(&self, order: &NewOrder, stage_event: bool) -> Result<i64>;

    /// Fetch an order with its items.
    async fn get_order(&self, id: i64) -> Result<Option<Order>>;

    /// Every order owned by `user_id`, oldest first, with items.
    async fn list_orders_for_user(&self, user_id: i64) -> Result<Vec<Order>>;

    /// Overwrite the status column. Returns false when the order is absent.
    async fn set_status(&self, id: i64, status: &str) -> Result<bool>;
}

/// The authoritative product table.
#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn list_products(&self) -> Result<Vec<Product>>;

    async fn get_product(&self, id: i64) -> Result<Option<Product>>;

    async fn create_product(&self, input: &ProductInput) -> Result<Product>;

    /// Replace every mutable field. Returns None when the product is absent.
    async fn update_product(&self, id: i64, input: &ProductInput) -> Result<Option<Product>>;

    /// Returns false when the product is absent.
    async fn delete_product(&self, id: i64) -> Result<bool>;

    /// Atomically subtract `quantity` and return the new inventory, or None
    /// when the product is absent. No floor is applied.
    async fn decrement_inventory(&self, id: i64, quantity: i64) -> Result<Option<i64>>;
}

/// Pending notifications written alongside business rows.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Oldest pending rows with fewer than `max_attempts` failed attempts.
    async fn pending(&self, limit: u64, max_attempts: u32) -> Result<Vec<OutboxRecord>>;

    /// Remove a row after it was published.
    async fn delete(&self, id: i64) -> Result<()>;

    /// Count one more failed publish attempt.
    async fn record_failure(&self, id: i64) -> Result<()>;
}

/// Store handles sharing one connection pool.
#[derive(Clone)]
pub struct Stores {
    pub orders: Arc<dyn OrderStore>,
    pub products: Arc<dyn ProductStore>,
    pub outbox: Arc<dyn OutboxStore>,
}

/// Connect to the configured database, apply the schema and build stores.
pub async fn init_storage(config: &StorageConfig) -> Result<Stores> {
    match config.storage_type {
        StorageType::Sqlite => {
            #[cfg(feature = "sqlite")]
            {
                let pool = sql::sqlite::connect(&config.sqlite).await?;
                sql::sqlite::init_schema(&pool).await?;
                info!(storage_type = "sqlite", path = %config.sqlite.path, "Storage initialized");
                Ok(Stores {
                    orders: Arc::new(sql::sqlite::SqliteOrderStore::new(pool.clone())),
                    products: Arc::new(sql::sqlite::SqliteProductStore::new(pool.clone())),
                    outbox: Arc::new(sql::sqlite::SqliteOutboxStore::new(pool)),
                })
            }

            #[cfg(not(feature = "sqlite"))]
            {
                Err(StorageError::Unsupported("sqlite".to_string()))
            }
        }
        StorageType::Postgres => {
            #[cfg(feature = "postgres")]
            {
                let pool = sql::postgres::connect(&config.postgres).await?;
                sql::postgres::init_schema(&pool).await?;
                info!(storage_type = "postgres", "Storage initialized");
                Ok(Stores {
                    orders: Arc::new(sql::postgres::PostgresOrderStore::new(pool.clone())),
                    products: Arc::new(sql::postgres::PostgresProductStore::new(pool.clone())),
                    outbox: Arc::new(sql::postgres::PostgresOutboxStore::new(pool)),
                })
            }

            #[cfg(not(feature = "postgres"))]
            {
                Err(StorageError::Unsupported("postgres".to_string()))
            }
        }
    }
}
