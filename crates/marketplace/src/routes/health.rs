//! Health check handlers.

use axum::{extract::State, http::StatusCode};

use crate::state::AppState;

/// Liveness probe.
pub async fn health() -> &'static str {
    "ok"
}

/// Readiness probe: Supabase Auth must answer.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.auth().health().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
