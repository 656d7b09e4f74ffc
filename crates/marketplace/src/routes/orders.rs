//! Order creation handler.

use std::time::Duration;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
};
use tracing::instrument;

use ingresso_core::{OrderPayload, OrderResponse};

use crate::error::{AppError, Result};
use crate::middleware::OptionalUser;
use crate::state::AppState;

/// Header carrying the client's idempotency key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Longest idempotency key accepted.
const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

/// Budget for persisting and charging one order.
pub const ORDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Create an order and its gateway payment.
///
/// Responds `201 {"success": true, "pedidoId": ..}`. Failures use the same
/// envelope with `success: false` and a buyer-facing `error`.
#[instrument(skip_all)]
pub async fn create(
    State(state): State<AppState>,
    OptionalUser(user): OptionalUser,
    headers: HeaderMap,
    payload: std::result::Result<Json<OrderPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<OrderResponse>)> {
    let Json(payload) = payload.map_err(|e| {
        tracing::debug!(error = %e, "Malformed order body");
        AppError::BadRequest("Dados do pedido inválidos".to_string())
    })?;
    let idempotency_key = idempotency_key(&headers)?;

    let order_id = tokio::time::timeout(
        ORDER_TIMEOUT,
        state
            .orders()
            .create_order(payload, user.as_ref(), idempotency_key),
    )
    .await
    .map_err(|_| AppError::Timeout("order creation".to_string()))??;

    Ok((StatusCode::CREATED, Json(OrderResponse::created(order_id))))
}

/// Read and check the optional `Idempotency-Key` header.
fn idempotency_key(headers: &HeaderMap) -> Result<Option<&str>> {
    let Some(value) = headers.get(IDEMPOTENCY_KEY_HEADER) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .map(str::trim)
        .filter(|key| !key.is_empty() && key.len() <= MAX_IDEMPOTENCY_KEY_LEN)
        .map(Some)
        .ok_or_else(|| AppError::BadRequest("Idempotency-Key inválida".to_string()))
}
