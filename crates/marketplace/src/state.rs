//! Application state shared across handlers.

use std::sync::Arc;

use thiserror::Error;

use crate::asaas::{AsaasClient, AsaasError};
use crate::config::MarketplaceConfig;
use crate::orders::OrderService;
use crate::supabase::{AuthClient, RestClient, SupabaseError};

/// Error building the application state.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Supabase client: {0}")]
    Supabase(#[from] SupabaseError),
    #[error("Asaas client: {0}")]
    Asaas(#[from] AsaasError),
}

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: MarketplaceConfig,
    auth: AuthClient,
    rest: RestClient,
    orders: OrderService,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub fn new(config: MarketplaceConfig) -> Result<Self, StateError> {
        let auth = AuthClient::new(&config.supabase)?;
        let rest = RestClient::new(&config.supabase)?;
        let asaas = AsaasClient::new(&config.asaas)?;
        let orders = OrderService::new(rest.clone(), asaas, &config.asaas);

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                auth,
                rest,
                orders,
            }),
        })
    }

    /// Get a reference to the marketplace configuration.
    #[must_use]
    pub fn config(&self) -> &MarketplaceConfig {
        &self.inner.config
    }

    /// Get a reference to the Supabase Auth client.
    #[must_use]
    pub fn auth(&self) -> &AuthClient {
        &self.inner.auth
    }

    /// Get a reference to the Supabase REST client.
    #[must_use]
    pub fn rest(&self) -> &RestClient {
        &self.inner.rest
    }

    /// Get a reference to the order service.
    #[must_use]
    pub fn orders(&self) -> &OrderService {
        &self.inner.orders
    }
}
