//! Ingresso marketplace server library.
//!
//! The server half of the ticket checkout: a session gate in front of every
//! request, the order endpoint that persists orders in Supabase and charges
//! them through Asaas, and the checkout orchestrator used by clients of that
//! endpoint.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod app;
pub mod asaas;
pub mod checkout;
pub mod config;
pub mod error;
pub mod middleware;
pub mod orders;
pub mod routes;
pub mod state;
pub mod supabase;

#[cfg(test)]
mod test_support;

pub use app::router;
pub use config::MarketplaceConfig;
pub use state::AppState;
