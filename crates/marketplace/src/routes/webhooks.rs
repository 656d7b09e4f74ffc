//! Asaas webhook handler.

use axum::{Json, body::Bytes, extract::State, http::HeaderMap};
use secrecy::ExposeSecret;
use serde::Serialize;

use crate::asaas::WebhookEvent;
use crate::error::{AppError, Result};
use crate::orders::WebhookOutcome;
use crate::state::AppState;

/// Header in which Asaas sends the shared webhook token.
pub const WEBHOOK_TOKEN_HEADER: &str = "asaas-access-token";

/// Acknowledgement returned to Asaas.
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignored: Option<&'static str>,
}

/// Receive a payment notification.
///
/// Disabled (404) unless `ASAAS_WEBHOOK_TOKEN` is configured. The token is
/// checked before the body is parsed. Events that change nothing are
/// acknowledged so Asaas does not retry them.
pub async fn asaas(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>> {
    let Some(expected) = state.config().asaas.webhook_token.as_ref() else {
        return Err(AppError::NotFound("webhook".to_string()));
    };
    let provided = headers
        .get(WEBHOOK_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !constant_time_eq::constant_time_eq(provided.as_bytes(), expected.expose_secret().as_bytes()) {
        tracing::warn!("Webhook with invalid token");
        return Err(AppError::Unauthorized("webhook token".to_string()));
    }

    let event: WebhookEvent = serde_json::from_slice(&body).map_err(|e| {
        tracing::warn!(error = %e, "Malformed webhook body");
        AppError::BadRequest("Evento de webhook inválido".to_string())
    })?;

    let ignored = match state.orders().apply_webhook(&event).await? {
        WebhookOutcome::Updated { .. } => None,
        WebhookOutcome::Ignored(reason) => {
            tracing::debug!(event = %event.event, reason, "Webhook ignored");
            Some(reason)
        }
    };
    Ok(Json(WebhookAck {
        received: true,
        ignored,
    }))
}
