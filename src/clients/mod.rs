//! External service clients.
//!
//! `ServiceClient` talks to the product, user and order services over their
//! REST surfaces. Collection reads return `{"products": [...]}`,
//! `{"users": [...]}` or `{"orders": [...]}`; single reads wrap the entity
//! in `{"product": {...}}`, `{"user": {...}}` or `{"order": {...}}`; writes
//! answer with `{"message": "..."}`. A rejected order answers with
//! `{"error": "..."}`.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ServicesConfig;
use crate::model::{Order, OrderInput, Product, ProductInput, RegisterInput, User};

/// Result type for collaborator calls.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur calling a collaborator service.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Response from {url} has no '{field}' field")]
    MissingField { url: String, field: &'static str },

    #[error("{url} rejected the request with HTTP {status}: {message}")]
    Rejected {
        url: String,
        status: u16,
        message: String,
    },

    #[error("Malformed response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Order service answer to a placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub message: String,
    pub order_id: i64,
}

/// HTTP client for the collaborator services.
#[derive(Clone, Debug)]
pub struct ServiceClient {
    http: Client,
    product_service_url: String,
    user_service_url: String,
    order_service_url: String,
    bearer_token: Option<String>,
}

impl ServiceClient {
    /// Client without a request timeout.
    pub fn new(config: &ServicesConfig) -> Result<Self> {
        Self::build(config, Client::builder())
    }

    /// Client whose requests fail after `timeout`.
    pub fn with_timeout(config: &ServicesConfig, timeout: Duration) -> Result<Self> {
        Self::build(config, Client::builder().timeout(timeout))
    }

    fn build(config: &ServicesConfig, builder: reqwest::ClientBuilder) -> Result<Self> {
        Ok(Self {
            http: builder.build()?,
            product_service_url: config.product_service_url.trim_end_matches('/').to_string(),
            user_service_url: config.user_service_url.trim_end_matches('/').to_string(),
            order_service_url: config.order_service_url.trim_end_matches('/').to_string(),
            bearer_token: None,
        })
    }

    /// A copy of this client that forwards `token` as a bearer token.
    pub fn authorized(&self, token: Option<&str>) -> Self {
        Self {
            bearer_token: token.map(str::to_string),
            ..self.clone()
        }
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let request = self.http.request(method, url);
        match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send `request` and pull `field` out of the JSON body.
    ///
    /// A 404 yields `None` when `not_found_is_none` is set.
    async fn fetch_field<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        url: &str,
        field: &'static str,
        not_found_is_none: bool,
    ) -> Result<Option<T>> {
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND && not_found_is_none {
            debug!(url = %url, "Collaborator returned 404");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ClientError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await?;
        let mut body: serde_json::Value = Self::decode(url, &bytes)?;
        let value = body
            .get_mut(field)
            .map(serde_json::Value::take)
            .ok_or_else(|| ClientError::MissingField {
                url: url.to_string(),
                field,
            })?;
        let decoded = serde_json::from_value(value).map_err(|source| ClientError::Decode {
            url: url.to_string(),
            source,
        })?;
        Ok(Some(decoded))
    }

    async fn fetch_required<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        url: &str,
        field: &'static str,
    ) -> Result<T> {
        self.fetch_field(request, url, field, false)
            .await?
            .ok_or_else(|| ClientError::MissingField {
                url: url.to_string(),
                field,
            })
    }

    fn decode<T: DeserializeOwned>(url: &str, bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(|source| ClientError::Decode {
            url: url.to_string(),
            source,
        })
    }

    /// `GET /products`.
    pub async fn list_products(&self) -> Result<Vec<Product>> {
        let url = format!("{}/products", self.product_service_url);
        self.fetch_required(self.request(Method::GET, &url), &url, "products")
            .await
    }

    /// `GET /products/<id>`. None on 404.
    pub async fn get_product(&self, id: i64) -> Result<Option<Product>> {
        let url = format!("{}/products/{}", self.product_service_url, id);
        self.fetch_field(self.request(Method::GET, &url), &url, "product", true)
            .await
    }

    /// `GET /users`.
    pub async fn list_users(&self) -> Result<Vec<User>> {
        let url = format!("{}/users", self.user_service_url);
        self.fetch_required(self.request(Method::GET, &url), &url, "users")
            .await
    }

    /// `GET /users/<id>`. None on 404.
    pub async fn get_user(&self, id: i64) -> Result<Option<User>> {
        let url = format!("{}/users/{}", self.user_service_url, id);
        self.fetch_field(self.request(Method::GET, &url), &url, "user", true)
            .await
    }

    /// `POST /products`. Returns the service's confirmation message.
    pub async fn create_product(&self, input: &ProductInput) -> Result<String> {
        let url = format!("{}/products", self.product_service_url);
        let request = self.request(Method::POST, &url).json(input);
        self.fetch_required(request, &url, "message").await
    }

    /// `PUT /products/<id>`. Returns the service's confirmation message.
    pub async fn update_product(&self, id: i64, input: &ProductInput) -> Result<String> {
        let url = format!("{}/products/{}", self.product_service_url, id);
        let request = self.request(Method::PUT, &url).json(input);
        self.fetch_required(request, &url, "message").await
    }

    /// `DELETE /products/<id>`. Returns the service's confirmation message.
    pub async fn delete_product(&self, id: i64) -> Result<String> {
        let url = format!("{}/products/{}", self.product_service_url, id);
        self.fetch_required(self.request(Method::DELETE, &url), &url, "message")
            .await
    }

    /// `POST /register`. Sent without a bearer token.
    pub async fn register_user(&self, input: &RegisterInput) -> Result<String> {
        let url = format!("{}/register", self.user_service_url);
        let request = self.http.post(&url).json(input);
        self.fetch_required(request, &url, "message").await
    }

    /// `GET /orders`. The order service scopes the list to the token's user.
    pub async fn list_orders(&self) -> Result<Vec<Order>> {
        let url = format!("{}/orders", self.order_service_url);
        self.fetch_required(self.request(Method::GET, &url), &url, "orders")
            .await
    }

    /// `GET /orders/<id>`. None on 404.
    pub async fn get_order(&self, id: i64) -> Result<Option<Order>> {
        let url = format!("{}/orders/{}", self.order_service_url, id);
        self.fetch_field(self.request(Method::GET, &url), &url, "order", true)
            .await
    }

    /// `POST /orders`.
    ///
    /// A non-success answer carrying `{"error": ...}` becomes
    /// `ClientError::Rejected` with that message.
    pub async fn place_order(&self, input: &OrderInput) -> Result<OrderReceipt> {
        let url = format!("{}/orders", self.order_service_url);
        let response = self.request(Method::POST, &url).json(input).send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            let message = serde_json::from_slice::<serde_json::Value>(&bytes)
                .ok()
                .and_then(|body| body.get("error")?.as_str().map(str::to_string));
            return Err(match message {
                Some(message) => ClientError::Rejected {
                    url,
                    status: status.as_u16(),
                    message,
                },
                None => ClientError::Status {
                    url,
                    status: status.as_u16(),
                },
            });
        }
        Self::decode(&url, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_urls_are_trimmed() {
        let config = ServicesConfig {
            product_service_url: "http://products:8082/".to_string(),
            user_service_url: "http://users:8081".to_string(),
            order_service_url: "http://orders:8083//".to_string(),
            request_timeout_secs: 1,
        };
        let client = ServiceClient::new(&config).unwrap();
        assert_eq!(client.product_service_url, "http://products:8082");
        assert_eq!(client.user_service_url, "http://users:8081");
        assert_eq!(client.order_service_url, "http://orders:8083");
    }

    #[test]
    fn test_authorized_sets_token_on_copy() {
        let client = ServiceClient::new(&ServicesConfig::default()).unwrap();
        let authed = client.authorized(Some("abc"));
        assert_eq!(authed.bearer_token.as_deref(), Some("abc"));
        assert!(client.bearer_token.is_none());
    }

    #[tokio::test]
    async fn test_connection_refused_is_http_error() {
        let config = ServicesConfig {
            product_service_url: "http://127.0.0.1:9".to_string(),
            ..ServicesConfig::default()
        };
        let client = ServiceClient::with_timeout(&config, Duration::from_secs(2)).unwrap();
        assert!(matches!(
            client.list_products().await,
            Err(ClientError::Http(_))
        ));
    }
}
