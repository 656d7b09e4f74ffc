//! Shared fixtures for handler and middleware tests.

#![allow(clippy::unwrap_used)]

use secrecy::SecretString;
use url::Url;
use wiremock::MockServer;

use crate::config::{
    AsaasConfig, AsaasEnvironment, MarketplaceConfig, SessionGateConfig, SupabaseConfig,
};
use crate::state::AppState;

pub const COOKIE_NAME: &str = "sb-test-auth-token";
pub const WEBHOOK_TOKEN: &str = "whk_9f8e7d6c5b4a3928";

/// Configuration pointing Supabase and Asaas at one mock server.
pub fn config(server: &MockServer) -> MarketplaceConfig {
    MarketplaceConfig {
        host: "127.0.0.1".parse().unwrap(),
        port: 0,
        base_url: Url::parse("http://localhost:3000").unwrap(),
        supabase: SupabaseConfig {
            url: Url::parse(&server.uri()).unwrap(),
            anon_key: SecretString::from("anon-key"),
            service_role_key: SecretString::from("service-key"),
            auth_cookie_name: COOKIE_NAME.to_string(),
        },
        asaas: AsaasConfig {
            api_key: SecretString::from("$aact_test_key"),
            environment: AsaasEnvironment::Sandbox,
            api_url: Url::parse(&format!("{}/v3/", server.uri())).unwrap(),
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

pub fn state(server: &MockServer) -> AppState {
    AppState::new(config(server)).unwrap()
}
