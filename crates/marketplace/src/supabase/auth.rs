//! Supabase Auth (GoTrue) client and session resolution.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use url::Url;

use ingresso_core::UserId;

use super::{SessionCookies, SupabaseError, error_message};
use crate::config::SupabaseConfig;

/// Sessions expiring within this many seconds are refreshed before use.
const EXPIRY_MARGIN_SECS: i64 = 10;

/// Timeout for calls to Supabase Auth.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// The signed-in user as reported by `GET /auth/v1/user`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Session tokens as stored in the auth cookie and returned by the token
/// endpoint.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix timestamp (seconds) at which the access token expires.
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<serde_json::Value>,
}

impl std::fmt::Debug for SessionTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTokens")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl SessionTokens {
    /// Returns true if the access token expires within the refresh margin.
    ///
    /// Sessions without an expiry are used as-is; `GET /user` decides.
    #[must_use]
    pub fn expires_soon(&self, now: i64) -> bool {
        self.expires_at
            .is_some_and(|expires_at| expires_at - now <= EXPIRY_MARGIN_SECS)
    }

    /// Fill in `expires_at` from `expires_in` when the provider omitted it.
    fn with_expiry_from(mut self, now: i64) -> Self {
        if self.expires_at.is_none() {
            self.expires_at = self.expires_in.map(|secs| now + secs);
        }
        self
    }
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Supabase Auth client authenticated with the anon key.
#[derive(Clone)]
pub struct AuthClient {
    client: reqwest::Client,
    base_url: Url,
    anon_key: SecretString,
}

impl AuthClient {
    /// Create a new Supabase Auth client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &SupabaseConfig) -> Result<Self, SupabaseError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            HeaderValue::from_str(config.anon_key.expose_secret())
                .map_err(|e| SupabaseError::Parse(format!("Invalid anon key format: {e}")))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.clone(),
            anon_key: config.anon_key.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, SupabaseError> {
        self.base_url
            .join(path)
            .map_err(|e| SupabaseError::Parse(format!("Invalid Supabase URL: {e}")))
    }

    /// Fetch the user owning an access token.
    ///
    /// # Errors
    ///
    /// Returns `SupabaseError::Rejected` for 401/403, other variants when
    /// the provider could not answer.
    #[instrument(skip_all)]
    pub async fn get_user(&self, access_token: &str) -> Result<AuthUser, SupabaseError> {
        let response = self
            .client
            .get(self.endpoint("auth/v1/user")?)
            .bearer_auth(access_token)
            .send()
            .await?;
        let status = response.status();

        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            let body = response.text().await.unwrap_or_default();
            return Err(SupabaseError::Rejected(error_message(&body)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SupabaseError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        response
            .json()
            .await
            .map_err(|e| SupabaseError::Parse(e.to_string()))
    }

    /// Exchange a refresh token for a new session.
    ///
    /// # Errors
    ///
    /// Returns `SupabaseError::Rejected` when the refresh token is invalid
    /// or revoked (any 4xx), other variants when the provider could not
    /// answer.
    #[instrument(skip_all)]
    pub async fn refresh_session(&self, refresh_token: &str) -> Result<SessionTokens, SupabaseError> {
        let response = self
            .client
            .post(self.endpoint("auth/v1/token")?)
            .query(&[("grant_type", "refresh_token")])
            .bearer_auth(self.anon_key.expose_secret())
            .json(&RefreshRequest { refresh_token })
            .send()
            .await?;
        let status = response.status();

        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(SupabaseError::Rejected(error_message(&body)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SupabaseError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let session: SessionTokens = response
            .json()
            .await
            .map_err(|e| SupabaseError::Parse(e.to_string()))?;
        Ok(session.with_expiry_from(chrono::Utc::now().timestamp()))
    }

    /// Check that Supabase Auth is reachable.
    ///
    /// # Errors
    ///
    /// Returns error if the health endpoint does not answer with success.
    pub async fn health(&self) -> Result<(), SupabaseError> {
        let response = self.client.get(self.endpoint("auth/v1/health")?).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(SupabaseError::Api {
                status: status.as_u16(),
                message: "auth health check failed".to_string(),
            })
        }
    }

    /// Resolve the current user from the request's session cookie.
    ///
    /// Refreshes the session when it is about to expire, and once more if
    /// the provider rejects the access token. Refreshed sessions are written
    /// back to `cookies`; sessions the provider rejects are cleared.
    ///
    /// Returns `Ok(None)` for anonymous requests.
    ///
    /// # Errors
    ///
    /// Returns error only when the provider could not answer. A rejected
    /// session is not an error.
    #[instrument(skip_all)]
    pub async fn resolve_user(
        &self,
        cookies: &mut SessionCookies,
    ) -> Result<Option<AuthUser>, SupabaseError> {
        let Some(mut session) = cookies.load_session() else {
            return Ok(None);
        };

        let mut refreshed = false;
        if session.expires_soon(chrono::Utc::now().timestamp()) {
            match self.refresh_into(cookies, &session.refresh_token).await? {
                Some(next) => {
                    session = next;
                    refreshed = true;
                }
                None => return Ok(None),
            }
        }

        match self.get_user(&session.access_token).await {
            Ok(user) => Ok(Some(user)),
            Err(e) if e.is_rejection() && !refreshed => {
                tracing::debug!(error = %e, "Access token rejected, refreshing session");
                let Some(next) = self.refresh_into(cookies, &session.refresh_token).await? else {
                    return Ok(None);
                };
                match self.get_user(&next.access_token).await {
                    Ok(user) => Ok(Some(user)),
                    Err(e) if e.is_rejection() => {
                        cookies.clear_session();
                        Ok(None)
                    }
                    Err(e) => Err(e),
                }
            }
            Err(e) if e.is_rejection() => {
                cookies.clear_session();
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Refresh and persist a session. `Ok(None)` means the refresh token was
    /// rejected and the session has been cleared.
    async fn refresh_into(
        &self,
        cookies: &mut SessionCookies,
        refresh_token: &str,
    ) -> Result<Option<SessionTokens>, SupabaseError> {
        match self.refresh_session(refresh_token).await {
            Ok(session) => {
                if let Err(e) = cookies.store_session(&session) {
                    tracing::warn!(error = %e, "Failed to encode refreshed session");
                }
                Ok(Some(session))
            }
            Err(e) if e.is_rejection() => {
                tracing::debug!(error = %e, "Refresh token rejected, clearing session");
                cookies.clear_session();
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::header::{COOKIE, SET_COOKIE};
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const COOKIE_NAME: &str = "sb-test-auth-token";

    fn client(server: &MockServer) -> AuthClient {
        let config = SupabaseConfig {
            url: Url::parse(&server.uri()).unwrap(),
            anon_key: SecretString::from("anon-key"),
            service_role_key: SecretString::from("service-key"),
            auth_cookie_name: COOKIE_NAME.to_string(),
        };
        AuthClient::new(&config).unwrap()
    }

    fn session(access: &str, refresh: &str, expires_at: i64) -> SessionTokens {
        SessionTokens {
            access_token: access.to_string(),
            refresh_token: refresh.to_string(),
            expires_at: Some(expires_at),
            expires_in: Some(3600),
            token_type: Some("bearer".to_string()),
            user: None,
        }
    }

    fn cookies_with(session: &SessionTokens) -> SessionCookies {
        let mut writer = SessionCookies::new(COOKIE_NAME, false);
        writer.store_session(session).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, writer.request_header().unwrap());
        SessionCookies::from_headers(&headers, COOKIE_NAME, false)
    }

    fn set_cookies(cookies: SessionCookies) -> Vec<String> {
        let mut headers = HeaderMap::new();
        cookies.apply(&mut headers);
        headers
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    fn user_body(id: &str) -> serde_json::Value {
        serde_json::json!({ "id": id, "email": "ana@example.com", "role": "authenticated" })
    }

    fn far_future() -> i64 {
        chrono::Utc::now().timestamp() + 3600
    }

    #[tokio::test]
    async fn test_no_cookie_is_anonymous() {
        let server = MockServer::start().await;
        let mut cookies = SessionCookies::new(COOKIE_NAME, false);

        let user = client(&server).resolve_user(&mut cookies).await.unwrap();

        assert!(user.is_none());
        assert!(!cookies.has_changes());
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_valid_session_resolves_user() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .and(header("apikey", "anon-key"))
            .and(header("authorization", "Bearer access-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(user_body("u-1")))
            .expect(1)
            .mount(&server)
            .await;

        let mut cookies = cookies_with(&session("access-1", "refresh-1", far_future()));
        let user = client(&server).resolve_user(&mut cookies).await.unwrap().unwrap();

        assert_eq!(user.id.as_str(), "u-1");
        assert!(!cookies.has_changes());
    }

    #[tokio::test]
    async fn test_expiring_session_is_refreshed_first() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .and(query_param("grant_type", "refresh_token"))
            .and(body_json(serde_json::json!({ "refresh_token": "refresh-1" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "access-2",
                "refresh_token": "refresh-2",
                "expires_in": 3600,
                "token_type": "bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .and(header("authorization", "Bearer access-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(user_body("u-1")))
            .expect(1)
            .mount(&server)
            .await;

        let expired = chrono::Utc::now().timestamp() - 5;
        let mut cookies = cookies_with(&session("access-1", "refresh-1", expired));
        let user = client(&server).resolve_user(&mut cookies).await.unwrap();

        assert!(user.is_some());
        let written = set_cookies(cookies);
        assert_eq!(written.len(), 1);
        assert!(written[0].starts_with(&format!("{COOKIE_NAME}=base64-")));
    }

    #[tokio::test]
    async fn test_rejected_token_refreshes_once_and_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .and(header("authorization", "Bearer stale"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "code": 401, "msg": "invalid JWT"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "fresh",
                "refresh_token": "refresh-2",
                "expires_at": far_future()
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .and(header("authorization", "Bearer fresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(user_body("u-9")))
            .expect(1)
            .mount(&server)
            .await;

        let mut cookies = cookies_with(&session("stale", "refresh-1", far_future()));
        let user = client(&server).resolve_user(&mut cookies).await.unwrap().unwrap();

        assert_eq!(user.id.as_str(), "u-9");
        assert!(cookies.has_changes());
    }

    #[tokio::test]
    async fn test_rejected_refresh_clears_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Refresh Token Not Found"
            })))
            .mount(&server)
            .await;

        let expired = chrono::Utc::now().timestamp() - 60;
        let mut cookies = cookies_with(&session("access-1", "gone", expired));
        let user = client(&server).resolve_user(&mut cookies).await.unwrap();

        assert!(user.is_none());
        let written = set_cookies(cookies);
        assert_eq!(written.len(), 1);
        assert!(written[0].starts_with(&format!("{COOKIE_NAME}=;")));
        assert!(written[0].contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn test_provider_outage_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let mut cookies = cookies_with(&session("access-1", "refresh-1", far_future()));
        let err = client(&server).resolve_user(&mut cookies).await.unwrap_err();

        assert!(!err.is_rejection());
        assert!(!cookies.has_changes());
    }

    #[test]
    fn test_expires_soon_margin() {
        let tokens = session("a", "r", 1_000);
        assert!(tokens.expires_soon(995));
        assert!(tokens.expires_soon(990));
        assert!(!tokens.expires_soon(989));
    }

    #[test]
    fn test_expiry_filled_from_expires_in() {
        let mut tokens = session("a", "r", 0);
        tokens.expires_at = None;
        tokens.expires_in = Some(60);
        assert_eq!(tokens.with_expiry_from(100).expires_at, Some(160));
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let debug = format!("{:?}", session("secret-access", "secret-refresh", 1));
        assert!(!debug.contains("secret-access"));
        assert!(!debug.contains("secret-refresh"));
    }
}
