//! Unified error handling with Sentry integration.
//!
//! Handlers return `Result<T, AppError>`. Every error renders as the order
//! endpoint's JSON envelope, `{"success": false, "error": .., "details": ..}`,
//! with a user-facing (Portuguese) message. Server-side failures are
//! captured to Sentry before responding.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use ingresso_core::{OrderResponse, ValidationError};

use crate::orders::OrderError;
use crate::supabase::SupabaseError;

/// Application-level error type for the marketplace.
#[derive(Debug, Error)]
pub enum AppError {
    /// Order creation, lookup or update failed.
    #[error(transparent)]
    Order(#[from] OrderError),

    /// Supabase operation failed outside the order flow.
    #[error("Database error: {0}")]
    Database(#[from] SupabaseError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller is not allowed to perform the request.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The request did not finish in time.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        Self::Order(OrderError::Validation(err))
    }
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Order(err) => match err {
                OrderError::Validation(_) => StatusCode::BAD_REQUEST,
                OrderError::IdempotencyConflict => StatusCode::UNPROCESSABLE_ENTITY,
                OrderError::NotFound(_) => StatusCode::NOT_FOUND,
                OrderError::PaymentPending(_) => StatusCode::CONFLICT,
                OrderError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
                OrderError::Gateway(_) => StatusCode::BAD_GATEWAY,
            },
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Message shown to the buyer. Internal details are never exposed.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Order(err) => match err {
                OrderError::Validation(validation) => validation.to_string(),
                OrderError::IdempotencyConflict => {
                    "Esta tentativa de compra já foi usada para outro pedido".to_string()
                }
                OrderError::NotFound(_) => "Pedido não encontrado".to_string(),
                OrderError::PaymentPending(_) => {
                    "O pagamento deste pedido ainda está sendo gerado".to_string()
                }
                OrderError::Database(_) => "Erro ao processar pedido".to_string(),
                OrderError::Gateway(_) => {
                    "Não foi possível gerar o pagamento. Tente novamente.".to_string()
                }
            },
            Self::Database(_) | Self::Internal(_) => "Erro interno do servidor".to_string(),
            Self::NotFound(what) => format!("Não encontrado: {what}"),
            Self::Unauthorized(_) => "Não autorizado".to_string(),
            Self::BadRequest(message) => message.clone(),
            Self::Timeout(_) => "Tempo esgotado. Tente novamente.".to_string(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Order(OrderError::Validation(validation)) => {
                Some(serde_json::json!({ "code": validation.code() }))
            }
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        let body = OrderResponse::failure(self.user_message(), self.details());
        (status, Json(body)).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use axum::body::to_bytes;

    use ingresso_core::{CpfError, OrderId};

    use super::*;
    use crate::asaas::AsaasError;

    fn get_status(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            get_status(ValidationError::EmptyCart.into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            get_status(OrderError::IdempotencyConflict.into()),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            get_status(OrderError::NotFound(OrderId::new("1")).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(OrderError::PaymentPending(OrderId::new("1")).into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            get_status(
                OrderError::Gateway(Arc::new(AsaasError::Parse("bad".to_string()))).into()
            ),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            get_status(AppError::Unauthorized("token".to_string())),
            StatusCode::UNAUTHORIZED
        );
    }

    #[tokio::test]
    async fn test_validation_error_body() {
        let err: AppError = ValidationError::InvalidCpf(CpfError::WrongDigitCount { found: 3 }).into();
        let response = err.into_response();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "CPF inválido: informe os 11 dígitos");
        assert_eq!(json["details"]["code"], "invalid_cpf");
    }

    #[tokio::test]
    async fn test_internal_details_are_hidden() {
        let err = AppError::Database(SupabaseError::Parse("column pedidos.secret".to_string()));
        let response = err.into_response();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(json["error"], "Erro interno do servidor");
        assert!(!json.to_string().contains("secret"));
    }
}
