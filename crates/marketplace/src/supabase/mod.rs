//! Supabase Auth and REST clients.
//!
//! # Architecture
//!
//! - Supabase is the source of truth for sessions, events and orders; the
//!   marketplace keeps no durable state of its own
//! - Sessions travel in the `sb-<project-ref>-auth-token` cookie, read and
//!   written through [`SessionCookies`]
//! - Auth calls use the anon key; REST calls use the service-role key and
//!   therefore never run with a buyer's privileges
//!
//! # Example
//!
//! ```rust,ignore
//! let auth = AuthClient::new(&config.supabase)?;
//! let mut cookies = SessionCookies::from_headers(req.headers(), &cookie_name, true);
//! let user = auth.resolve_user(&mut cookies).await?;
//! ```

mod auth;
mod cookies;
mod rest;

pub use auth::{AuthClient, AuthUser, SessionTokens};
pub use cookies::SessionCookies;
pub use rest::{EventSummary, NewOrder, OrderRecord, RestClient};

use thiserror::Error;

/// Errors that can occur when interacting with Supabase.
#[derive(Debug, Error)]
pub enum SupabaseError {
    /// HTTP request failed (connect, timeout, TLS).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider rejected the credentials (expired or revoked session).
    #[error("Session rejected: {0}")]
    Rejected(String),

    /// A unique constraint was violated.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// API returned an unexpected error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse a response body.
    #[error("Parse error: {0}")]
    Parse(String),
}

impl SupabaseError {
    /// Returns true if the provider answered and said no.
    ///
    /// Everything else (transport failures, 5xx, garbage bodies) means the
    /// provider could not give an answer.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

/// Extract a readable message from a Supabase error body.
///
/// Auth answers with `{"error_description": ..}` or `{"msg": ..}`, PostgREST
/// with `{"message": ..}`.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            ["error_description", "msg", "message", "error"]
                .iter()
                .find_map(|key| value.get(key).and_then(|v| v.as_str()).map(str::to_owned))
        })
        .unwrap_or_else(|| body.chars().take(200).collect())
}
