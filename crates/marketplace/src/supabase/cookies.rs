//! Per-request view of the Supabase session cookie.
//!
//! Supabase's SSR helpers store the session JSON in `sb-<ref>-auth-token`,
//! prefixed with `base64-` and base64url-encoded. Values longer than
//! [`MAX_CHUNK_SIZE`] are split across `<name>.0`, `<name>.1`, ...

use std::collections::BTreeMap;

use axum::http::HeaderMap;
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::HeaderValue;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use cookie::time::Duration;
use cookie::{Cookie, SameSite};

use super::SessionTokens;

const BASE64_PREFIX: &str = "base64-";

/// Longest value stored in a single cookie.
const MAX_CHUNK_SIZE: usize = 3180;

/// Session cookies live for 400 days (the browser cap); token expiry is
/// enforced by the provider.
const COOKIE_MAX_AGE_DAYS: i64 = 400;

/// Cookies read from a request plus the mutations to send back.
#[derive(Debug, Clone)]
pub struct SessionCookies {
    name: String,
    secure: bool,
    incoming: BTreeMap<String, String>,
    outgoing: Vec<Cookie<'static>>,
}

impl SessionCookies {
    /// An empty store, as for a request without cookies.
    #[must_use]
    pub fn new(name: impl Into<String>, secure: bool) -> Self {
        Self {
            name: name.into(),
            secure,
            incoming: BTreeMap::new(),
            outgoing: Vec::new(),
        }
    }

    /// Read the session cookies carried by a request.
    ///
    /// Unrelated cookies are ignored, as are malformed `Cookie` headers.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap, name: &str, secure: bool) -> Self {
        let mut store = Self::new(name, secure);
        for value in headers.get_all(COOKIE) {
            let Ok(value) = value.to_str() else {
                continue;
            };
            for cookie in Cookie::split_parse_encoded(value).flatten() {
                if store.is_session_cookie(cookie.name()) {
                    store
                        .incoming
                        .insert(cookie.name().to_owned(), cookie.value().to_owned());
                }
            }
        }
        store
    }

    /// Returns true if the session cookie, or any chunk of it, was sent.
    #[must_use]
    pub fn has_session(&self) -> bool {
        !self.incoming.is_empty()
    }

    /// Returns true if the response must carry `Set-Cookie` headers.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.outgoing.is_empty()
    }

    /// Decode the session from the request cookies.
    ///
    /// Returns `None` when there is no session or it cannot be decoded.
    #[must_use]
    pub fn load_session(&self) -> Option<SessionTokens> {
        let raw = self.joined_value()?;
        let json = match raw.strip_prefix(BASE64_PREFIX) {
            Some(encoded) => {
                let bytes = URL_SAFE_NO_PAD
                    .decode(encoded.trim_end_matches('='))
                    .inspect_err(|e| tracing::debug!(error = %e, "Session cookie is not base64url"))
                    .ok()?;
                String::from_utf8(bytes).ok()?
            }
            None => raw,
        };
        serde_json::from_str(&json)
            .inspect_err(|e| tracing::debug!(error = %e, "Session cookie is not a session"))
            .ok()
    }

    /// Replace the session, chunking the encoded value when needed.
    ///
    /// # Errors
    ///
    /// Returns error if the session cannot be serialized.
    pub fn store_session(&mut self, session: &SessionTokens) -> Result<(), serde_json::Error> {
        let json = serde_json::to_string(session)?;
        let value = format!("{BASE64_PREFIX}{}", URL_SAFE_NO_PAD.encode(json));

        self.outgoing.clear();
        let chunks = chunk(&value);
        if let [single] = chunks.as_slice() {
            self.outgoing.push(self.session_cookie(self.name.clone(), single));
            let stale: Vec<String> = self
                .incoming
                .keys()
                .filter(|name| **name != self.name)
                .cloned()
                .collect();
            for name in stale {
                self.outgoing.push(self.removal_cookie(name));
            }
        } else {
            for (index, part) in chunks.iter().enumerate() {
                self.outgoing
                    .push(self.session_cookie(format!("{}.{index}", self.name), part));
            }
            let stale: Vec<String> = self
                .incoming
                .keys()
                .filter(|name| chunk_index(name, &self.name).is_none_or(|i| i >= chunks.len()))
                .cloned()
                .collect();
            for name in stale {
                self.outgoing.push(self.removal_cookie(name));
            }
        }
        Ok(())
    }

    /// Expire the session cookie and every chunk the request carried.
    pub fn clear_session(&mut self) {
        self.outgoing.clear();
        let names: Vec<String> = if self.incoming.is_empty() {
            vec![self.name.clone()]
        } else {
            self.incoming.keys().cloned().collect()
        };
        for name in names {
            self.outgoing.push(self.removal_cookie(name));
        }
    }

    /// Append the pending mutations as `Set-Cookie` headers.
    pub fn apply(self, headers: &mut HeaderMap) {
        for cookie in self.outgoing {
            match HeaderValue::from_str(&cookie.encoded().to_string()) {
                Ok(value) => {
                    headers.append(SET_COOKIE, value);
                }
                Err(e) => tracing::warn!(error = %e, cookie = cookie.name(), "Invalid Set-Cookie value"),
            }
        }
    }

    /// Render the pending (non-removal) cookies as a request `Cookie` header.
    ///
    /// Lets a client replay a session it was just given.
    #[must_use]
    pub fn request_header(&self) -> Option<HeaderValue> {
        let pairs: Vec<String> = self
            .outgoing
            .iter()
            .filter(|cookie| !cookie.value().is_empty())
            .map(|cookie| cookie.stripped().encoded().to_string())
            .collect();
        if pairs.is_empty() {
            return None;
        }
        HeaderValue::from_str(&pairs.join("; ")).ok()
    }

    fn is_session_cookie(&self, name: &str) -> bool {
        name == self.name || chunk_index(name, &self.name).is_some()
    }

    /// The session value, reassembled from chunks if necessary.
    ///
    /// A bare cookie wins over chunks. Chunks must be contiguous from `.0`.
    fn joined_value(&self) -> Option<String> {
        if let Some(value) = self.incoming.get(&self.name) {
            return Some(value.clone());
        }
        let mut joined = String::new();
        for index in 0.. {
            match self.incoming.get(&format!("{}.{index}", self.name)) {
                Some(part) => joined.push_str(part),
                None if index == 0 => return None,
                None => break,
            }
        }
        Some(joined)
    }

    fn session_cookie(&self, name: String, value: &str) -> Cookie<'static> {
        Cookie::build((name, value.to_owned()))
            .path("/")
            .same_site(SameSite::Lax)
            .secure(self.secure)
            .max_age(Duration::days(COOKIE_MAX_AGE_DAYS))
            .build()
    }

    fn removal_cookie(&self, name: String) -> Cookie<'static> {
        Cookie::build((name, ""))
            .path("/")
            .same_site(SameSite::Lax)
            .secure(self.secure)
            .max_age(Duration::ZERO)
            .build()
    }
}

/// Index of a chunk cookie (`<base>.<n>`), if `name` is one.
fn chunk_index(name: &str, base: &str) -> Option<usize> {
    name.strip_prefix(base)?.strip_prefix('.')?.parse().ok()
}

/// Split a cookie value into chunks of at most [`MAX_CHUNK_SIZE`] bytes.
///
/// Values are base64url, so byte boundaries are character boundaries.
fn chunk(value: &str) -> Vec<&str> {
    if value.len() <= MAX_CHUNK_SIZE {
        return vec![value];
    }
    value
        .as_bytes()
        .chunks(MAX_CHUNK_SIZE)
        .filter_map(|part| std::str::from_utf8(part).ok())
        .collect()
}
