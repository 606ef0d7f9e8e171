//! In-process read projections.
//!
//! Each projection is a map owned by one consumer process and rebuilt from
//! a bulk snapshot plus the incremental events that follow it. Entries are
//! last-write-wins per key; a delete that races a later upsert is not
//! reconciled. Every projection has its own lock.

use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;

use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::model::{Product, User};

pub mod consumer;
pub mod snapshot;

pub use consumer::{spawn_catalog_consumers, spawn_registry_consumers, CatalogProjector, RegistryProjector};
pub use snapshot::{SnapshotError, SnapshotSource};

/// An entity that knows its projection key.
pub trait Keyed {
    type Key;

    fn key(&self) -> Self::Key;
}

impl Keyed for Product {
    type Key = i64;

    fn key(&self) -> i64 {
        self.id
    }
}

impl Keyed for User {
    type Key = i64;

    fn key(&self) -> i64 {
        self.id
    }
}

/// A keyed map behind a single read-write lock.
///
/// Readers get cloned values, so a value is never observed half-written.
pub struct ProjectionStore<K, V> {
    name: &'static str,
    entries: RwLock<HashMap<K, V>>,
}

impl<K, V> ProjectionStore<K, V>
where
    K: Eq + Hash + Copy + Display + Send + Sync,
    V: Keyed<Key = K> + Clone + Send + Sync,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        self.entries.read().await.get(key).cloned()
    }

    pub async fn contains(&self, key: &K) -> bool {
        self.entries.read().await.contains_key(key)
    }

    /// Insert or replace the entry for the value's key.
    pub async fn apply_upsert(&self, value: V) {
        let key = value.key();
        self.entries.write().await.insert(key, value);
        debug!(projection = self.name, key = %key, "Projection upsert applied");
    }

    /// Remove an entry. Returns false when it was absent.
    pub async fn apply_delete(&self, key: &K) -> bool {
        let removed = self.entries.write().await.remove(key).is_some();
        debug!(projection = self.name, key = %key, removed, "Projection delete applied");
        removed
    }

    /// Mutate an existing entry in place. Returns false when it is absent.
    pub async fn update<F>(&self, key: &K, f: F) -> bool
    where
        F: FnOnce(&mut V),
    {
        match self.entries.write().await.get_mut(key) {
            Some(value) => {
                f(value);
                true
            }
            None => false,
        }
    }

    /// Merge a batch of entities into the map.
    pub async fn merge<I>(&self, values: I) -> usize
    where
        I: IntoIterator<Item = V>,
    {
        let mut entries = self.entries.write().await;
        let mut merged = 0;
        for value in values {
            entries.insert(value.key(), value);
            merged += 1;
        }
        merged
    }

    /// Warm the projection from the owning service.
    ///
    /// A transport or decode failure is logged and leaves the projection as
    /// it was, so the process starts degraded rather than not at all.
    pub async fn load_snapshot(&self, source: &dyn SnapshotSource<V>) -> usize {
        match source.fetch_all().await {
            Ok(values) => {
                let loaded = self.merge(values).await;
                info!(projection = self.name, loaded, "Snapshot loaded");
                loaded
            }
            Err(e) => {
                error!(
                    projection = self.name,
                    error = %e,
                    "Snapshot load failed, starting with partial projection"
                );
                0
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

/// The order service's copy of the product table.
pub struct ProductCatalog {
    store: ProjectionStore<i64, Product>,
}

impl Default for ProductCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl ProductCatalog {
    pub fn new() -> Self {
        Self {
            store: ProjectionStore::new("product_catalog"),
        }
    }

    pub async fn get(&self, product_id: i64) -> Option<Product> {
        self.store.get(&product_id).await
    }

    pub async fn upsert(&self, product: Product) {
        self.store.apply_upsert(product).await;
    }

    pub async fn remove(&self, product_id: i64) -> bool {
        self.store.apply_delete(&product_id).await
    }

    /// Overwrite only the inventory of a known product.
    ///
    /// An update for a product the catalog has never seen is dropped; the
    /// full record is not fetched.
    pub async fn apply_inventory(&self, product_id: i64, new_inventory: i64) -> bool {
        let applied = self
            .store
            .update(&product_id, |product| product.inventory = new_inventory)
            .await;
        if applied {
            debug!(product_id, new_inventory, "Catalog inventory updated");
        } else {
            warn!(product_id, new_inventory, "Product not found, inventory update dropped");
        }
        applied
    }

    pub async fn load_snapshot(&self, source: &dyn SnapshotSource<Product>) -> usize {
        self.store.load_snapshot(source).await
    }

    pub async fn len(&self) -> usize {
        self.store.len().await
    }

    pub async fn is_empty(&self) -> bool {
        self.store.is_empty().await
    }
}

/// The order service's copy of registered users. Existence only.
pub struct UserRegistry {
    store: ProjectionStore<i64, User>,
}

impl Default for UserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl UserRegistry {
    pub fn new() -> Self {
        Self {
            store: ProjectionStore::new("user_registry"),
        }
    }

    pub async fn get(&self, user_id: i64) -> Option<User> {
        self.store.get(&user_id).await
    }

    pub async fn contains(&self, user_id: i64) -> bool {
        self.store.contains(&user_id).await
    }

    pub async fn upsert(&self, user: User) {
        self.store.apply_upsert(user).await;
    }

    pub async fn load_snapshot(&self, source: &dyn SnapshotSource<User>) -> usize {
        self.store.load_snapshot(source).await
    }

    pub async fn len(&self) -> usize {
        self.store.len().await
    }
}
