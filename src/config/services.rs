//! Collaborator service endpoints.

use serde::Deserialize;

/// Base URLs of the services that own products, users and orders.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    /// Product service base URL.
    pub product_service_url: String,
    /// User service base URL.
    pub user_service_url: String,
    /// Order service base URL. Only the gateway calls it.
    pub order_service_url: String,
    /// Per-request timeout for snapshot fetches, in seconds. Gateway reads
    /// are not bounded by it.
    pub request_timeout_secs: u64,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            product_service_url: "http://localhost:8082".to_string(),
            user_service_url: "http://localhost:8081".to_string(),
            order_service_url: "http://localhost:8083".to_string(),
            request_timeout_secs: 30,
        }
    }
}
