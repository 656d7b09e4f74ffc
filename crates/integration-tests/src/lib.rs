//! Integration tests for the Ingresso marketplace.
//!
//! Each test spawns the full router on an ephemeral port, with Supabase
//! and Asaas played by one [`MockServer`].
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p ingresso-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `checkout_flow` - Checkout orchestrator against the real order endpoint
//! - `session_gate` - Session resolution, refresh and redirects

use std::net::{Ipv4Addr, SocketAddr};

use reqwest::header::HeaderValue;
use secrecy::SecretString;
use serde_json::json;
use tokio::net::TcpListener;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ingresso_marketplace::config::{
    AsaasConfig, AsaasEnvironment, MarketplaceConfig, SessionGateConfig, SupabaseConfig,
};
use ingresso_marketplace::supabase::{SessionCookies, SessionTokens};
use ingresso_marketplace::{AppState, router};

/// Auth cookie name used by every test app.
pub const COOKIE_NAME: &str = "sb-integration-auth-token";

/// Webhook token configured on every test app.
pub const WEBHOOK_TOKEN: &str = "whk_integration_51c0";

/// Order id returned by the mocked `pedidos` table.
pub const ORDER_ID: &str = "42";

/// A marketplace running on a local port.
pub struct TestApp {
    /// Root URL of the running server, with a trailing slash.
    pub base_url: Url,
    /// Supabase and Asaas.
    pub backend: MockServer,
    /// Client that does not follow redirects.
    pub client: reqwest::Client,
}

impl TestApp {
    /// Spawn with the default test configuration.
    pub async fn spawn() -> Self {
        Self::spawn_with(|_| {}).await
    }

    /// Spawn after letting `configure` adjust the configuration.
    ///
    /// # Panics
    ///
    /// Panics if the listener cannot bind or the state cannot be built.
    pub async fn spawn_with(configure: impl FnOnce(&mut MarketplaceConfig)) -> Self {
        let backend = MockServer::start().await;
        let mut config = config(&backend);
        configure(&mut config);

        let state = AppState::new(config).expect("Failed to build app state");
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("Failed to read local address");

        tokio::spawn(async move {
            axum::serve(
                listener,
                router(state).into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
        });

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: Url::parse(&format!("http://{addr}/")).expect("Invalid base URL"),
            backend,
            client,
        }
    }

    /// Absolute URL for `path` on the running server.
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid relative URL.
    pub fn url(&self, path: &str) -> Url {
        self.base_url
            .join(path.trim_start_matches('/'))
            .expect("Invalid path")
    }

    /// Requests the backend received at `path` with `verb`.
    ///
    /// # Panics
    ///
    /// Panics if request recording is disabled on the mock server.
    pub async fn requests_to(&self, verb: &str, path: &str) -> Vec<wiremock::Request> {
        self.backend
            .received_requests()
            .await
            .expect("Request recording is disabled")
            .into_iter()
            .filter(|r| r.method.as_str() == verb && r.url.path() == path)
            .collect()
    }

    /// Mount the Supabase and Asaas endpoints an order needs.
    ///
    /// The `pedidos` table starts empty for idempotency lookups and returns
    /// [`ORDER_ID`] on insert; Asaas knows the buyer and answers `pay_1`.
    pub async fn mount_order_backend(&self) {
        Mock::given(method("GET"))
            .and(path("/rest/v1/pedidos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&self.backend)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/pedidos"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([{
                "id": ORDER_ID, "evento_id": "ev-1", "sessao_id": "se-1",
                "forma_pagamento": "pix", "total": 100.0, "status": "pendente"
            }])))
            .mount(&self.backend)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/pedidos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&self.backend)
            .await;
        Mock::given(method("GET"))
            .and(path("/v3/customers"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "id": "cus_1", "name": "Ana Souza" }]
            })))
            .mount(&self.backend)
            .await;
        Mock::given(method("POST"))
            .and(path("/v3/payments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "pay_1" })))
            .mount(&self.backend)
            .await;
    }

    /// Mount `GET /auth/v1/user` answering for `user_id`.
    pub async fn mount_user(&self, user_id: &str) {
        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": user_id, "email": "ana@example.com"
            })))
            .mount(&self.backend)
            .await;
    }
}

/// Session tokens expiring `expires_in` seconds from now.
pub fn session(access_token: &str, expires_in: i64) -> SessionTokens {
    SessionTokens {
        access_token: access_token.to_string(),
        refresh_token: format!("refresh-{access_token}"),
        expires_at: Some(chrono::Utc::now().timestamp() + expires_in),
        expires_in: Some(expires_in),
        token_type: Some("bearer".to_string()),
        user: None,
    }
}

/// `Cookie` header carrying `session` the way the browser stores it.
///
/// # Panics
///
/// Panics if the session cannot be encoded.
pub fn session_cookie(session: &SessionTokens) -> HeaderValue {
    let mut cookies = SessionCookies::new(COOKIE_NAME, false);
    cookies
        .store_session(session)
        .expect("Failed to encode session");
    cookies.request_header().expect("Session produced no cookie")
}

/// Configuration pointing Supabase and Asaas at `backend`.
///
/// # Panics
///
/// Panics if the mock server URI is not a valid URL.
pub fn config(backend: &MockServer) -> MarketplaceConfig {
    MarketplaceConfig {
        host: Ipv4Addr::LOCALHOST.into(),
        port: 0,
        base_url: Url::parse("http://localhost:3000").expect("Invalid base URL"),
        supabase: SupabaseConfig {
            url: Url::parse(&backend.uri()).expect("Invalid mock URI"),
            anon_key: SecretString::from("anon-key"),
            service_role_key: SecretString::from("service-key"),
            auth_cookie_name: COOKIE_NAME.to_string(),
        },
        asaas: AsaasConfig {
            api_key: SecretString::from("$aact_integration_key"),
            environment: AsaasEnvironment::Sandbox,
            api_url: Url::parse(&format!("{}/v3/", backend.uri())).expect("Invalid mock URI"),
            wallet_id: None,
            split_percent: None,
            due_days: 3,
            webhook_token: Some(SecretString::from(WEBHOOK_TOKEN)),
        },
        session: SessionGateConfig {
            secure_cookies: false,
            ..SessionGateConfig::default()
        },
        sentry_dsn: None,
        sentry_environment: None,
    }
}
