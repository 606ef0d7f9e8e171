//! Test utilities and mock implementations.
//!
//! Mocks keep state in memory so workflows can be exercised without a
//! database or broker.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::events::OrderPlacedEvent;
use crate::model::{Money, NewOrder, Order, OrderItem, Product, User};
use crate::projection::{ProductCatalog, UserRegistry};
use crate::storage::{OrderStore, Result as StorageResult, StorageError};

pub use crate::bus::MockEventBus;

/// Mock order store that keeps orders in memory.
#[derive(Default)]
pub struct MockOrderStore {
    orders: RwLock<Vec<Order>>,
    staged: RwLock<Vec<OrderPlacedEvent>>,
    next_item_id: RwLock<i64>,
    fail_on_insert: RwLock<bool>,
}

impl MockOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_insert(&self, fail: bool) {
        *self.fail_on_insert.write().await = fail;
    }

    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }

    /// `OrderPlaced` payloads staged by inserts with `stage_event` set.
    pub async fn staged_events(&self) -> Vec<OrderPlacedEvent> {
        self.staged.read().await.clone()
    }
}

#[async_trait]
impl OrderStore for MockOrderStore {
    async fn insert_order(&self, order: &NewOrder, stage_event: bool) -> StorageResult<i64> {
        if *self.fail_on_insert.read().await {
            return Err(StorageError::Database(sqlx::Error::PoolClosed));
        }

        let mut orders = self.orders.write().await;
        let order_id = orders.len() as i64 + 1;
        let mut next_item_id = self.next_item_id.write().await;
        let items = order
            .items
            .iter()
            .map(|item| {
                *next_item_id += 1;
                OrderItem {
                    id: *next_item_id,
                    order_id,
                    product_id: item.product_id,
                    quantity: item.quantity,
                    price: item.price,
                }
            })
            .collect();

        orders.push(Order {
            id: order_id,
            user_id: order.user_id,
            status: order.status.clone(),
            total: order.total,
            created_at: "2024-01-01 00:00:00".to_string(),
            items,
        });

        if stage_event {
            self.staged
                .write()
                .await
                .push(OrderPlacedEvent::for_order(order_id, order));
        }
        Ok(order_id)
    }

    async fn get_order(&self, id: i64) -> StorageResult<Option<Order>> {
        Ok(self
            .orders
            .read()
            .await
            .iter()
            .find(|o| o.id == id)
            .cloned())
    }

    async fn list_orders_for_user(&self, user_id: i64) -> StorageResult<Vec<Order>> {
        Ok(self
            .orders
            .read()
            .await
            .iter()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn set_status(&self, id: i64, status: &str) -> StorageResult<bool> {
        let mut orders = self.orders.write().await;
        match orders.iter_mut().find(|o| o.id == id) {
            Some(order) => {
                order.status = status.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// A product with a predictable name and no description.
pub fn test_product(id: i64, price_cents: i64, inventory: i64) -> Product {
    Product {
        id,
        name: format!("product-{}", id),
        description: String::new(),
        price: Money::from_cents(price_cents),
        inventory,
        created_at: "2024-01-01 00:00:00".to_string(),
    }
}

pub fn test_user(id: i64, username: &str) -> User {
    User {
        id,
        username: username.to_string(),
    }
}

/// A catalog already holding `products`.
pub async fn seeded_catalog(products: Vec<Product>) -> Arc<ProductCatalog> {
    let catalog = Arc::new(ProductCatalog::new());
    for product in products {
        catalog.upsert(product).await;
    }
    catalog
}

/// A registry already holding `users`.
pub async fn seeded_registry(users: Vec<User>) -> Arc<UserRegistry> {
    let registry = Arc::new(UserRegistry::new());
    for user in users {
        registry.upsert(user).await;
    }
    registry
}
