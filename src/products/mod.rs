//! Product service operations over the authoritative product table.
//!
//! Every successful write is followed by a best-effort notification so the
//! order service's catalog projection can follow along.

use std::sync::Arc;

use tracing::info;

use crate::bus::{emit, EventBus};
use crate::events::{Event, ProductDeletedEvent};
use crate::model::{Product, ProductInput};
use crate::storage::{ProductStore, Result};

pub struct ProductService {
    store: Arc<dyn ProductStore>,
    bus: Arc<dyn EventBus>,
}

impl ProductService {
    pub fn new(store: Arc<dyn ProductStore>, bus: Arc<dyn EventBus>) -> Self {
        Self { store, bus }
    }

    pub async fn list(&self) -> Result<Vec<Product>> {
        self.store.list_products().await
    }

    pub async fn get(&self, id: i64) -> Result<Option<Product>> {
        self.store.get_product(id).await
    }

    pub async fn create(&self, input: &ProductInput) -> Result<Product> {
        let product = self.store.create_product(input).await?;
        info!(product_id = product.id, name = %product.name, "Product created");
        emit(self.bus.as_ref(), &Event::ProductCreated(product.clone())).await;
        Ok(product)
    }

    /// Replace a product. None when it does not exist.
    pub async fn update(&self, id: i64, input: &ProductInput) -> Result<Option<Product>> {
        let Some(product) = self.store.update_product(id, input).await? else {
            return Ok(None);
        };
        info!(product_id = id, "Product updated");
        emit(self.bus.as_ref(), &Event::ProductUpdated(product.clone())).await;
        Ok(Some(product))
    }

    /// Delete a product. False when it did not exist.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        if !self.store.delete_product(id).await? {
            return Ok(false);
        }
        info!(product_id = id, "Product deleted");
        emit(
            self.bus.as_ref(),
            &Event::ProductDeleted(ProductDeletedEvent { product_id: id }),
        )
        .await;
        Ok(true)
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::bus::MockEventBus;
    use crate::model::Money;
    use crate::storage::sql::sqlite::{init_schema, memory_pool, SqliteProductStore};

    async fn service() -> (ProductService, Arc<MockEventBus>) {
        let pool = memory_pool().await.unwrap();
        init_schema(&pool).await.unwrap();
        let bus = Arc::new(MockEventBus::new());
        (
            ProductService::new(Arc::new(SqliteProductStore::new(pool)), bus.clone()),
            bus,
        )
    }

    fn input(name: &str) -> ProductInput {
        ProductInput {
            name: name.to_string(),
            description: "desc".to_string(),
            price: Money::from_cents(1200),
            inventory: 4,
        }
    }

    #[tokio::test]
    async fn test_create_emits_full_product() {
        let (service, bus) = service().await;
        let product = service.create(&input("Lamp")).await.unwrap();

        let published = bus.published_to("product_created").await;
        assert_eq!(published.len(), 1);
        let event: Product = serde_json::from_slice(&published[0].payload).unwrap();
        assert_eq!(event, product);
    }

    #[tokio::test]
    async fn test_update_and_delete_emit_only_on_success() {
        let (service, bus) = service().await;
        assert!(service.update(42, &input("Ghost")).await.unwrap().is_none());
        assert!(!service.delete(42).await.unwrap());
        assert_eq!(bus.published_count().await, 0);

        let product = service.create(&input("Lamp")).await.unwrap();
        let updated = service.update(product.id, &input("Desk Lamp")).await.unwrap().unwrap();
        assert_eq!(updated.name, "Desk Lamp");
        assert!(service.delete(product.id).await.unwrap());

        assert_eq!(bus.published_to("product_updated").await.len(), 1);
        let deleted = bus.published_to("product_deleted").await;
        let event: ProductDeletedEvent = serde_json::from_slice(&deleted[0].payload).unwrap();
        assert_eq!(event.product_id, product.id);
    }

    #[tokio::test]
    async fn test_write_succeeds_when_publish_fails() {
        let (service, bus) = service().await;
        bus.set_fail_on_publish(true).await;
        let product = service.create(&input("Lamp")).await.unwrap();
        assert_eq!(service.get(product.id).await.unwrap(), Some(product));
        assert_eq!(service.list().await.unwrap().len(), 1);
    }
}
