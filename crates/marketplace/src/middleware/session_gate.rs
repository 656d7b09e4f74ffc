//! Session gate: refreshes the Supabase session on every request and keeps
//! anonymous users out of the protected area.
//!
//! The gate resolves the user once per request, writes any refreshed or
//! cleared session cookies onto the response (pass-through and redirect
//! alike), and stores the result as a [`CurrentUser`] extension.

use axum::{
    Json,
    extract::{Request, State},
    http::{StatusCode, header::LOCATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::Span;

use ingresso_core::OrderResponse;

use super::auth::CurrentUser;
use crate::config::{ProviderErrorPolicy, SessionGateConfig, path_has_prefix};
use crate::error::set_sentry_user;
use crate::state::AppState;
use crate::supabase::{AuthUser, SessionCookies, SupabaseError};

/// Paths served without consulting the auth provider.
const UNGATED_PREFIXES: [&str; 1] = ["/health"];

/// What the gate does with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Let the request through with the resolved user (if any).
    Continue(Option<AuthUser>),
    /// Send the visitor to the login page.
    RedirectToLogin,
    /// The provider is down and the policy refuses to guess.
    Unavailable,
}

/// Decide the fate of a request from the resolution outcome.
///
/// Provider failures never grant access to protected paths. Outside the
/// protected prefix they degrade to an anonymous request.
#[must_use]
pub fn decide(
    path: &str,
    resolution: &Result<Option<AuthUser>, SupabaseError>,
    config: &SessionGateConfig,
) -> GateDecision {
    let protected = path_has_prefix(path, &config.protected_prefix);
    match resolution {
        Ok(Some(user)) => GateDecision::Continue(Some(user.clone())),
        Ok(None) if protected => GateDecision::RedirectToLogin,
        Ok(None) => GateDecision::Continue(None),
        Err(_) if !protected => GateDecision::Continue(None),
        Err(_) => match config.provider_error_policy {
            ProviderErrorPolicy::Redirect => GateDecision::RedirectToLogin,
            ProviderErrorPolicy::Unavailable => GateDecision::Unavailable,
        },
    }
}

/// `302 Found` to the login page.
#[must_use]
pub fn login_redirect(login_path: &str) -> Response {
    (StatusCode::FOUND, [(LOCATION, login_path.to_owned())]).into_response()
}

/// Middleware running the session gate.
pub async fn session_gate(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let path = request.uri().path().to_owned();
    if UNGATED_PREFIXES.iter().any(|prefix| path_has_prefix(&path, prefix)) {
        return next.run(request).await;
    }

    let config = state.config();
    let mut cookies = SessionCookies::from_headers(
        request.headers(),
        &config.supabase.auth_cookie_name,
        config.session.secure_cookies,
    );

    let resolution = state.auth().resolve_user(&mut cookies).await;
    if let Err(e) = &resolution {
        tracing::warn!(error = %e, path = %path, "Auth provider unavailable");
    }

    let mut response = match decide(&path, &resolution, &config.session) {
        GateDecision::Continue(user) => {
            if let Some(user) = &user {
                Span::current().record("user_id", user.id.as_str());
                set_sentry_user(&user.id, user.email.as_deref());
            }
            request.extensions_mut().insert(CurrentUser(user));
            next.run(request).await
        }
        GateDecision::RedirectToLogin => {
            tracing::debug!(path = %path, "Anonymous request to protected path");
            login_redirect(&config.session.login_path)
        }
        GateDecision::Unavailable => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(OrderResponse::failure(
                "Serviço de autenticação indisponível. Tente novamente em instantes.",
                None,
            )),
        )
            .into_response(),
    };

    cookies.apply(response.headers_mut());
    response
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use ingresso_core::UserId;

    use super::*;

    fn user() -> AuthUser {
        AuthUser {
            id: UserId::new("u-1"),
            email: None,
            phone: None,
            role: None,
        }
    }

    fn outage() -> Result<Option<AuthUser>, SupabaseError> {
        Err(SupabaseError::Api {
            status: 503,
            message: "down".to_string(),
        })
    }

    #[test]
    fn test_anonymous_on_protected_path_redirects() {
        let config = SessionGateConfig::default();
        assert_eq!(decide("/admin", &Ok(None), &config), GateDecision::RedirectToLogin);
        assert_eq!(
            decide("/admin/eventos/1", &Ok(None), &config),
            GateDecision::RedirectToLogin
        );
    }

    #[test]
    fn test_anonymous_elsewhere_continues() {
        let config = SessionGateConfig::default();
        assert_eq!(decide("/", &Ok(None), &config), GateDecision::Continue(None));
        assert_eq!(
            decide("/administrator", &Ok(None), &config),
            GateDecision::Continue(None)
        );
    }

    #[test]
    fn test_signed_in_user_continues() {
        let config = SessionGateConfig::default();
        assert_eq!(
            decide("/admin", &Ok(Some(user())), &config),
            GateDecision::Continue(Some(user()))
        );
    }

    #[test]
    fn test_provider_outage_policies() {
        let mut config = SessionGateConfig::default();
        assert_eq!(decide("/admin", &outage(), &config), GateDecision::RedirectToLogin);
        assert_eq!(decide("/eventos", &outage(), &config), GateDecision::Continue(None));

        config.provider_error_policy = ProviderErrorPolicy::Unavailable;
        assert_eq!(decide("/admin", &outage(), &config), GateDecision::Unavailable);
    }

    #[test]
    fn test_login_redirect_is_302() {
        let response = login_redirect("/login");
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers().get(LOCATION).unwrap(), "/login");
    }
}
