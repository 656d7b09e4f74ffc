//! HTTP middleware stack for the marketplace.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (hub per request, error capture)
//! 2. `TraceLayer` (request span with `request_id` and `user_id` fields)
//! 3. Request ID
//! 4. Security headers
//! 5. Session gate (Supabase session refresh, protected prefix)
//! 6. Rate limiting (per route group)

pub mod auth;
pub mod rate_limit;
pub mod request_id;
pub mod security_headers;
pub mod session_gate;

pub use auth::{AuthRejection, CurrentUser, OptionalUser, RequireUser};
pub use rate_limit::{api_rate_limiter, order_rate_limiter};
pub use request_id::request_id_middleware;
pub use security_headers::security_headers_middleware;
pub use session_gate::{GateDecision, decide, login_redirect, session_gate};
