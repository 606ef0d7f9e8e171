//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::time::Duration;

use order_mesh::model::{Money, ProductInput};

/// Poll `check` until it holds, failing the test after about two seconds.
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("Timed out waiting for {}", what);
}

pub fn product_input(name: &str, price_cents: i64, inventory: i64) -> ProductInput {
    ProductInput {
        name: name.to_string(),
        description: format!("{} for testing", name),
        price: Money::from_cents(price_cents),
        inventory,
    }
}
