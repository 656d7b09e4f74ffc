//! Payment instructions handler.

use axum::{
    Json,
    extract::{Path, State},
};

use ingresso_core::OrderId;

use crate::error::Result;
use crate::orders::PaymentInstructions;
use crate::state::AppState;

/// Payment instructions for the confirmation page of an order.
///
/// 404 for unknown orders, 409 while the payment is still being created.
pub async fn show(
    State(state): State<AppState>,
    Path(order_id): Path<OrderId>,
) -> Result<Json<PaymentInstructions>> {
    let instructions = state.orders().payment_instructions(&order_id).await?;
    Ok(Json(instructions))
}
