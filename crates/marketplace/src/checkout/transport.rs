//! Transport used by the checkout orchestrator to submit orders.

use std::future::Future;
use std::time::Duration;

use reqwest::header::HeaderValue;
use thiserror::Error;
use url::Url;

use ingresso_core::{OrderPayload, OrderResponse};

use crate::routes::orders::{IDEMPOTENCY_KEY_HEADER, ORDER_TIMEOUT};

/// The order endpoint could not be reached or did not answer.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid endpoint: {0}")]
    Endpoint(String),
}

/// What the order endpoint answered.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    /// `None` when the body was not a JSON order response.
    pub body: Option<OrderResponse>,
}

/// Submits an order payload to the order endpoint.
pub trait OrderTransport: Send + Sync {
    /// Post `payload` under `idempotency_key`.
    fn submit(
        &self,
        payload: &OrderPayload,
        idempotency_key: &str,
    ) -> impl Future<Output = Result<TransportResponse, TransportError>> + Send;
}

/// [`OrderTransport`] over HTTP (`POST {base}/api/pedidos`).
#[derive(Clone)]
pub struct HttpOrderTransport {
    client: reqwest::Client,
    endpoint: Url,
    cookie: Option<HeaderValue>,
}

impl HttpOrderTransport {
    /// Create a transport for the marketplace at `base_url`.
    ///
    /// The base URL may be mounted under a path (`https://host/app`); orders
    /// go to `{base}/api/pedidos` with or without a trailing slash.
    ///
    /// # Errors
    ///
    /// Returns error if the endpoint URL is invalid or the HTTP client fails
    /// to build.
    pub fn new(base_url: &Url) -> Result<Self, TransportError> {
        let endpoint = order_endpoint(base_url)?;
        let client = reqwest::Client::builder()
            // Outlasts the server-side order timeout.
            .timeout(ORDER_TIMEOUT + Duration::from_secs(5))
            .build()?;
        Ok(Self {
            client,
            endpoint,
            cookie: None,
        })
    }

    /// Send a `Cookie` header (e.g. a Supabase session) with every order.
    #[must_use]
    pub fn with_cookie(mut self, cookie: HeaderValue) -> Self {
        self.cookie = Some(cookie);
        self
    }
}

/// `{base}/api/pedidos`, keeping the last segment of `base` as a directory.
fn order_endpoint(base_url: &Url) -> Result<Url, TransportError> {
    let mut base = base_url.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join("api/pedidos")
        .map_err(|e| TransportError::Endpoint(e.to_string()))
}

impl OrderTransport for HttpOrderTransport {
    async fn submit(
        &self,
        payload: &OrderPayload,
        idempotency_key: &str,
    ) -> Result<TransportResponse, TransportError> {
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header(IDEMPOTENCY_KEY_HEADER, idempotency_key)
            .json(payload);
        if let Some(cookie) = &self.cookie {
            request = request.header(reqwest::header::COOKIE, cookie.clone());
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.json::<OrderResponse>().await.ok();
        Ok(TransportResponse { status, body })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[test]
    fn test_order_endpoint_keeps_base_path() {
        for (base, expected) in [
            ("https://loja.example.com", "https://loja.example.com/api/pedidos"),
            ("https://loja.example.com/", "https://loja.example.com/api/pedidos"),
            ("https://loja.example.com/app", "https://loja.example.com/app/api/pedidos"),
            ("https://loja.example.com/app/", "https://loja.example.com/app/api/pedidos"),
        ] {
            let endpoint = order_endpoint(&Url::parse(base).unwrap()).unwrap();
            assert_eq!(endpoint.as_str(), expected, "base {base}");
        }
    }

    #[tokio::test]
    async fn test_posts_with_idempotency_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/pedidos"))
            .and(header(IDEMPOTENCY_KEY_HEADER, "key-1"))
            .and(header_exists("content-type"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "success": true, "pedidoId": 42
            })))
            .mount(&server)
            .await;

        let transport = HttpOrderTransport::new(&Url::parse(&server.uri()).unwrap()).unwrap();
        let response = transport
            .submit(&super::super::tests::payload(), "key-1")
            .await
            .unwrap();

        assert_eq!(response.status, 201);
        assert_eq!(
            response.body.unwrap().confirmed_order().unwrap().as_str(),
            "42"
        );
    }

    #[tokio::test]
    async fn test_non_json_body_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/pedidos"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>Bad Gateway</html>"))
            .mount(&server)
            .await;

        let transport = HttpOrderTransport::new(&Url::parse(&server.uri()).unwrap()).unwrap();
        let response = transport
            .submit(&super::super::tests::payload(), "key-1")
            .await
            .unwrap();

        assert_eq!(response.status, 502);
        assert!(response.body.is_none());
    }
}
