//! Extractors for the user resolved by the session gate.

use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};

use ingresso_core::OrderResponse;

use super::session_gate::login_redirect;
use crate::state::AppState;
use crate::supabase::AuthUser;

/// Request extension holding the gate's verdict for this request.
#[derive(Debug, Clone, Default)]
pub struct CurrentUser(pub Option<AuthUser>);

/// Extractor that requires a signed-in user.
///
/// Page requests are redirected to the login page; `/api/` requests get a
/// JSON 401.
///
/// # Example
///
/// ```rust,ignore
/// async fn dashboard(RequireUser(user): RequireUser) -> impl IntoResponse {
///     format!("Olá, {}!", user.id)
/// }
/// ```
pub struct RequireUser(pub AuthUser);

/// Rejection for [`RequireUser`].
pub enum AuthRejection {
    /// Redirect to the login page (for page requests).
    RedirectToLogin(String),
    /// Unauthorized response (for API requests).
    Unauthorized,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::RedirectToLogin(login_path) => login_redirect(&login_path),
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(OrderResponse::failure("Faça login para continuar", None)),
            )
                .into_response(),
        }
    }
}

impl FromRequestParts<AppState> for RequireUser {
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = parts
            .extensions
            .get::<CurrentUser>()
            .and_then(|current| current.0.clone());

        user.map(Self).ok_or_else(|| {
            if parts.uri.path().starts_with("/api/") {
                AuthRejection::Unauthorized
            } else {
                AuthRejection::RedirectToLogin(state.config().session.login_path.clone())
            }
        })
    }
}

/// Extractor that optionally gets the signed-in user.
pub struct OptionalUser(pub Option<AuthUser>);

impl<S> FromRequestParts<S> for OptionalUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            parts
                .extensions
                .get::<CurrentUser>()
                .and_then(|current| current.0.clone()),
        ))
    }
}
