use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::RwLock;

use super::*;
use crate::model::{Money, OrderItemInput};

/// In-memory owning services that count upstream reads.
#[derive(Default)]
struct FakeServices {
    products: RwLock<HashMap<i64, Product>>,
    users: RwLock<HashMap<i64, User>>,
    orders: RwLock<HashMap<i64, Order>>,
    reads: AtomicUsize,
    last_token: RwLock<Option<String>>,
}

impl FakeServices {
    async fn with_product(id: i64, inventory: i64) -> Arc<Self> {
        let fake = Arc::new(Self::default());
        fake.products.write().await.insert(
            id,
            Product {
                id,
                name: "Chair".to_string(),
                description: String::new(),
                price: Money::from_cents(4500),
                inventory,
                created_at: String::new(),
            },
        );
        fake
    }

    fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    async fn record(&self, token: Option<&str>) {
        self.reads.fetch_add(1, Ordering::SeqCst);
        *self.last_token.write().await = token.map(str::to_string);
    }
}

#[async_trait]
impl OwningServices for FakeServices {
    async fn list_users(&self, token: Option<&str>) -> ClientResult<Vec<User>> {
        self.record(token).await;
        Ok(self.users.read().await.values().cloned().collect())
    }

    async fn get_user(&self, id: i64, token: Option<&str>) -> ClientResult<Option<User>> {
        self.record(token).await;
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn list_products(&self, token: Option<&str>) -> ClientResult<Vec<Product>> {
        self.record(token).await;
        Ok(self.products.read().await.values().cloned().collect())
    }

    async fn get_product(&self, id: i64, token: Option<&str>) -> ClientResult<Option<Product>> {
        self.record(token).await;
        Ok(self.products.read().await.get(&id).cloned())
    }

    async fn create_product(&self, input: &ProductInput, _token: Option<&str>) -> ClientResult<String> {
        let mut products = self.products.write().await;
        let id = products.len() as i64 + 1;
        products.insert(
            id,
            Product {
                id,
                name: input.name.clone(),
                description: input.description.clone(),
                price: input.price,
                inventory: input.inventory,
                created_at: String::new(),
            },
        );
        Ok("Product created successfully".to_string())
    }

    async fn update_product(
        &self,
        id: i64,
        input: &ProductInput,
        _token: Option<&str>,
    ) -> ClientResult<String> {
        match self.products.write().await.get_mut(&id) {
            Some(product) => {
                product.name = input.name.clone();
                product.price = input.price;
                product.inventory = input.inventory;
                Ok("Product updated successfully".to_string())
            }
            None => Err(ClientError::Status {
                url: format!("http://products/products/{}", id),
                status: 404,
            }),
        }
    }

    async fn delete_product(&self, id: i64, _token: Option<&str>) -> ClientResult<String> {
        match self.products.write().await.remove(&id) {
            Some(_) => Ok("Product deleted successfully".to_string()),
            None => Err(ClientError::Status {
                url: format!("http://products/products/{}", id),
                status: 404,
            }),
        }
    }

    async fn register_user(&self, input: &RegisterInput) -> ClientResult<String> {
        let mut users = self.users.write().await;
        let id = users.len() as i64 + 1;
        users.insert(
            id,
            User {
                id,
                username: input.username.clone(),
            },
        );
        Ok("User registered successfully".to_string())
    }

    async fn list_orders(&self, token: Option<&str>) -> ClientResult<Vec<Order>> {
        self.record(token).await;
        Ok(self.orders.read().await.values().cloned().collect())
    }

    async fn get_order(&self, id: i64, token: Option<&str>) -> ClientResult<Option<Order>> {
        self.record(token).await;
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn place_order(&self, input: &OrderInput, token: Option<&str>) -> ClientResult<OrderReceipt> {
        self.record(token).await;
        let mut orders = self.orders.write().await;
        let id = orders.len() as i64 + 1;
        orders.insert(
            id,
            Order {
                id,
                user_id: 1,
                status: "placed".to_string(),
                total: Money::from_cents(0),
                created_at: String::new(),
                items: input
                    .items
                    .iter()
                    .map(|item| crate::model::OrderItem {
                        id,
                        order_id: id,
                        product_id: item.product_id,
                        quantity: item.quantity,
                        price: Money::from_cents(0),
                    })
                    .collect(),
            },
        );
        Ok(OrderReceipt {
            message: "Order created successfully".to_string(),
            order_id: id,
        })
    }
}

fn resolver(upstream: Arc<FakeServices>, policy: CachePolicy) -> GatewayResolver {
    let config = GatewayConfig {
        cache: CacheConfig {
            ttl_secs: 300,
            ..CacheConfig::default()
        },
        cache_policy: policy,
    };
    GatewayResolver::new(upstream, Arc::new(InMemoryCache::new()), &config)
}

fn restock(inventory: i64) -> ProductInput {
    ProductInput {
        name: "Chair".to_string(),
        description: String::new(),
        price: Money::from_cents(4500),
        inventory,
    }
}

#[tokio::test(start_paused = true)]
async fn test_entry_served_until_ttl_then_refetched() {
    let upstream = FakeServices::with_product(1, 10).await;
    let gateway = resolver(upstream.clone(), CachePolicy::TtlOnly);

    gateway.product(1, None).await.unwrap();
    assert_eq!(upstream.reads(), 1);

    tokio::time::advance(Duration::from_secs(299)).await;
    gateway.product(1, None).await.unwrap();
    assert_eq!(upstream.reads(), 1);

    tokio::time::advance(Duration::from_secs(2)).await;
    gateway.product(1, None).await.unwrap();
    assert_eq!(upstream.reads(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_read_after_write_within_ttl_is_stale() {
    let upstream = FakeServices::with_product(1, 10).await;
    let gateway = resolver(upstream.clone(), CachePolicy::TtlOnly);

    assert_eq!(gateway.product(1, None).await.unwrap().unwrap().inventory, 10);
    gateway.update_product(1, &restock(25), None).await.unwrap();

    tokio::time::advance(Duration::from_secs(60)).await;
    assert_eq!(gateway.product(1, None).await.unwrap().unwrap().inventory, 10);

    tokio::time::advance(Duration::from_secs(241)).await;
    assert_eq!(gateway.product(1, None).await.unwrap().unwrap().inventory, 25);
}

#[tokio::test]
async fn test_invalidate_on_write_drops_affected_keys() {
    let upstream = FakeServices::with_product(1, 10).await;
    let gateway = resolver(upstream.clone(), CachePolicy::InvalidateOnWrite);

    assert_eq!(gateway.products(None).await.unwrap().len(), 1);
    assert_eq!(gateway.product(1, None).await.unwrap().unwrap().inventory, 10);

    gateway.update_product(1, &restock(3), None).await.unwrap();
    assert_eq!(gateway.product(1, None).await.unwrap().unwrap().inventory, 3);

    gateway.create_product(&restock(1), Some("tok")).await.unwrap();
    assert_eq!(gateway.products(None).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_missing_entity_is_not_cached() {
    let upstream = FakeServices::with_product(1, 10).await;
    let gateway = resolver(upstream.clone(), CachePolicy::TtlOnly);

    assert!(gateway.user(5, None).await.unwrap().is_none());
    assert!(gateway.user(5, None).await.unwrap().is_none());
    assert_eq!(upstream.reads(), 2);

    upstream.users.write().await.insert(
        5,
        User {
            id: 5,
            username: "lin".to_string(),
        },
    );
    assert_eq!(gateway.user(5, None).await.unwrap().unwrap().username, "lin");
}

#[tokio::test]
async fn test_collections_cached_under_fixed_keys() {
    let upstream = FakeServices::with_product(1, 10).await;
    let gateway = resolver(upstream.clone(), CachePolicy::TtlOnly);

    gateway.products(None).await.unwrap();
    gateway.products(None).await.unwrap();
    gateway.users(None).await.unwrap();
    gateway.users(None).await.unwrap();
    assert_eq!(upstream.reads(), 2);
}

#[tokio::test]
async fn test_token_forwarded_on_miss() {
    let upstream = FakeServices::with_product(1, 10).await;
    let gateway = resolver(upstream.clone(), CachePolicy::TtlOnly);

    gateway.product(1, Some("secret")).await.unwrap();
    assert_eq!(upstream.last_token.read().await.as_deref(), Some("secret"));
}

#[tokio::test]
async fn test_write_to_missing_product_is_not_found() {
    let upstream = FakeServices::with_product(1, 10).await;
    let gateway = resolver(upstream, CachePolicy::TtlOnly);

    assert!(matches!(
        gateway.delete_product(9, None).await,
        Err(GatewayError::NotFound {
            entity: "product",
            id: 9
        })
    ));
}

#[tokio::test]
async fn test_undecodable_entry_is_refetched() {
    let upstream = FakeServices::with_product(1, 10).await;
    let cache = Arc::new(InMemoryCache::new());
    cache
        .set("product:1", b"not json".to_vec(), Duration::from_secs(300))
        .await
        .unwrap();
    let gateway = GatewayResolver::new(upstream.clone(), cache, &GatewayConfig::default());

    assert_eq!(gateway.product(1, None).await.unwrap().unwrap().inventory, 10);
    assert_eq!(upstream.reads(), 1);
}

fn one_chair() -> OrderInput {
    OrderInput {
        items: vec![OrderItemInput {
            product_id: 1,
            quantity: 1,
        }],
    }
}

#[tokio::test]
async fn test_orders_pass_through_uncached() {
    let upstream = FakeServices::with_product(1, 10).await;
    let gateway = resolver(upstream.clone(), CachePolicy::TtlOnly);

    let receipt = gateway.place_order(&one_chair(), Some("tok-1")).await.unwrap();
    assert_eq!(upstream.last_token.read().await.as_deref(), Some("tok-1"));

    assert_eq!(gateway.orders(Some("tok-1")).await.unwrap().len(), 1);
    assert_eq!(gateway.orders(Some("tok-1")).await.unwrap().len(), 1);
    let order = gateway.order(receipt.order_id, Some("tok-1")).await.unwrap();
    assert_eq!(order.unwrap().items[0].product_id, 1);
    assert_eq!(upstream.reads(), 4);
}

#[tokio::test]
async fn test_unknown_order_is_none() {
    let upstream = FakeServices::with_product(1, 10).await;
    let gateway = resolver(upstream, CachePolicy::TtlOnly);

    assert!(gateway.order(42, Some("tok")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_writes_without_token_are_unauthorized() {
    let upstream = FakeServices::with_product(1, 10).await;
    let gateway = resolver(upstream.clone(), CachePolicy::TtlOnly);

    assert!(matches!(
        gateway.place_order(&one_chair(), None).await,
        Err(GatewayError::Unauthorized {
            operation: "place_order"
        })
    ));
    assert!(matches!(
        gateway.create_product(&restock(1), Some("")).await,
        Err(GatewayError::Unauthorized {
            operation: "create_product"
        })
    ));
    assert!(upstream.orders.read().await.is_empty());
    assert_eq!(upstream.products.read().await.len(), 1);
}

#[tokio::test]
async fn test_register_user_needs_no_token() {
    let upstream = FakeServices::with_product(1, 10).await;
    let gateway = resolver(upstream.clone(), CachePolicy::TtlOnly);

    let input = RegisterInput {
        username: "grace".to_string(),
        email: "grace@example.com".to_string(),
        password: "hunter2".to_string(),
    };
    gateway.register_user(&input).await.unwrap();
    assert_eq!(gateway.users(None).await.unwrap()[0].username, "grace");
}
