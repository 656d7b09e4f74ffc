//! HTTP route handlers for the marketplace.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                       - Liveness
//! GET  /health/ready                 - Readiness (Supabase Auth reachable)
//!
//! # Orders
//! POST /api/pedidos                  - Create an order and its payment
//! GET  /api/pedidos/{id}/pagamento   - Payment instructions for an order
//!
//! # Events
//! GET  /api/eventos/busca?q=         - Search published events by title
//!
//! # Gateway
//! POST /api/webhooks/asaas           - Asaas payment notifications
//!
//! # Protected (session gate)
//! GET  /admin                        - Signed-in user summary
//! ```

pub mod admin;
pub mod health;
pub mod orders;
pub mod payments;
pub mod search;
pub mod webhooks;

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

/// Create the order creation router (rate limited separately).
pub fn order_routes() -> Router<AppState> {
    Router::new().route("/api/pedidos", post(orders::create))
}

/// Create the read-only API router.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/api/pedidos/{id}/pagamento", get(payments::show))
        .route("/api/eventos/busca", get(search::events))
}

/// Create all routes that are not rate limited.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .route("/api/webhooks/asaas", post(webhooks::asaas))
        .route("/admin", get(admin::index))
}
