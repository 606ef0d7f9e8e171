//! Bulk snapshot sources for projection warm-up.

use async_trait::async_trait;

use crate::clients::{ClientError, ServiceClient};
use crate::model::{Product, User};
use crate::products::ProductService;
use crate::storage::StorageError;

/// Result type for snapshot fetches.
pub type Result<T> = std::result::Result<T, SnapshotError>;

/// Why a snapshot could not be fetched.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Remote snapshot failed: {0}")]
    Remote(#[from] ClientError),

    #[error("Local snapshot failed: {0}")]
    Local(#[from] StorageError),
}

/// Fetches every entity a projection mirrors from the service that owns it.
#[async_trait]
pub trait SnapshotSource<T>: Send + Sync {
    async fn fetch_all(&self) -> Result<Vec<T>>;
}

#[async_trait]
impl SnapshotSource<Product> for ServiceClient {
    async fn fetch_all(&self) -> Result<Vec<Product>> {
        Ok(self.list_products().await?)
    }
}

#[async_trait]
impl SnapshotSource<User> for ServiceClient {
    async fn fetch_all(&self) -> Result<Vec<User>> {
        Ok(self.list_users().await?)
    }
}

/// In-process product service, used when both services share a process.
#[async_trait]
impl SnapshotSource<Product> for ProductService {
    async fn fetch_all(&self) -> Result<Vec<Product>> {
        Ok(self.list().await?)
    }
}
