//! Marketplace configuration loaded from environment variables.
//!
//! Configuration is read once at start-up into an immutable
//! [`MarketplaceConfig`]. Missing or malformed values abort start-up; there
//! are no placeholder fallbacks for secrets.
//!
//! # Environment Variables
//!
//! ## Required
//! - `MARKETPLACE_BASE_URL` - Public URL of the marketplace
//! - `SUPABASE_URL` - Supabase project URL
//! - `SUPABASE_ANON_KEY` - Supabase anon (publishable) key
//! - `SUPABASE_SERVICE_ROLE_KEY` - Supabase service-role key (server-side only)
//! - `ASAAS_API_KEY` - Asaas API key (`$aact_...`)
//!
//! ## Optional
//! - `MARKETPLACE_HOST` - Bind address (default: 127.0.0.1)
//! - `MARKETPLACE_PORT` - Listen port (default: 3000)
//! - `SUPABASE_AUTH_COOKIE` - Session cookie name (default: `sb-<project-ref>-auth-token`)
//! - `ASAAS_ENVIRONMENT` - `sandbox` (default) or `production`
//! - `ASAAS_WALLET_ID` - Wallet receiving the split (UUID)
//! - `ASAAS_SPLIT_PERCENT` - Percentage split to the wallet (requires wallet id)
//! - `ASAAS_DUE_DAYS` - Days until PIX/boleto charges are due (default: 3)
//! - `ASAAS_WEBHOOK_TOKEN` - Shared token expected on Asaas webhooks
//! - `SESSION_PROTECTED_PREFIX` - Path prefix requiring login (default: /admin)
//! - `SESSION_LOGIN_PATH` - Redirect target for anonymous users (default: /login)
//! - `SESSION_PROVIDER_ERROR_POLICY` - `redirect` (default) or `unavailable`
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use rust_decimal::Decimal;
use secrecy::SecretString;
use thiserror::Error;
use url::Url;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Prefix shared by every Asaas API key.
const ASAAS_KEY_PREFIX: &str = "$aact_";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Marketplace application configuration.
#[derive(Debug, Clone)]
pub struct MarketplaceConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the marketplace
    pub base_url: Url,
    /// Supabase auth and database configuration
    pub supabase: SupabaseConfig,
    /// Asaas payment gateway configuration
    pub asaas: AsaasConfig,
    /// Session gate configuration
    pub session: SessionGateConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Supabase project configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct SupabaseConfig {
    /// Project URL (e.g., `https://abcd.supabase.co`)
    pub url: Url,
    /// Anon key, sent as `apikey` on auth requests
    pub anon_key: SecretString,
    /// Service-role key for server-side REST access (bypasses RLS)
    pub service_role_key: SecretString,
    /// Name of the session cookie (chunks use `.0`, `.1`, ... suffixes)
    pub auth_cookie_name: String,
}

impl std::fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("url", &self.url.as_str())
            .field("anon_key", &"[REDACTED]")
            .field("service_role_key", &"[REDACTED]")
            .field("auth_cookie_name", &self.auth_cookie_name)
            .finish()
    }
}

/// Asaas environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsaasEnvironment {
    Sandbox,
    Production,
}

impl AsaasEnvironment {
    /// API base URL for this environment.
    #[must_use]
    pub const fn api_url(&self) -> &'static str {
        match self {
            Self::Sandbox => "https://sandbox.asaas.com/api/v3/",
            Self::Production => "https://api.asaas.com/v3/",
        }
    }
}

impl FromStr for AsaasEnvironment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sandbox" | "homologacao" => Ok(Self::Sandbox),
            "production" | "producao" => Ok(Self::Production),
            other => Err(format!("expected sandbox or production, got '{other}'")),
        }
    }
}

/// Asaas payment gateway configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct AsaasConfig {
    /// API key (`$aact_...`)
    pub api_key: SecretString,
    /// Sandbox or production
    pub environment: AsaasEnvironment,
    /// API base URL (derived from the environment, overridable in tests)
    pub api_url: Url,
    /// Wallet receiving a split of every payment
    pub wallet_id: Option<String>,
    /// Percentage of each payment split to `wallet_id`
    pub split_percent: Option<Decimal>,
    /// Days until PIX and boleto charges are due
    pub due_days: u32,
    /// Token Asaas sends in the `asaas-access-token` webhook header
    pub webhook_token: Option<SecretString>,
}

impl std::fmt::Debug for AsaasConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsaasConfig")
            .field("api_key", &"[REDACTED]")
            .field("environment", &self.environment)
            .field("api_url", &self.api_url.as_str())
            .field("wallet_id", &self.wallet_id)
            .field("split_percent", &self.split_percent)
            .field("due_days", &self.due_days)
            .field(
                "webhook_token",
                &self.webhook_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// What the session gate does on a protected path when the auth provider
/// cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderErrorPolicy {
    /// Treat the request as anonymous and redirect to login.
    #[default]
    Redirect,
    /// Respond `503 Service Unavailable` without touching the session.
    Unavailable,
}

impl FromStr for ProviderErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "redirect" => Ok(Self::Redirect),
            "unavailable" => Ok(Self::Unavailable),
            other => Err(format!("expected redirect or unavailable, got '{other}'")),
        }
    }
}

/// Session gate configuration.
#[derive(Debug, Clone)]
pub struct SessionGateConfig {
    /// Path prefix that requires an authenticated user
    pub protected_prefix: String,
    /// Where anonymous users are redirected
    pub login_path: String,
    /// Behavior when the auth provider fails
    pub provider_error_policy: ProviderErrorPolicy,
    /// Whether session cookies get the `Secure` attribute
    pub secure_cookies: bool,
}

impl Default for SessionGateConfig {
    fn default() -> Self {
        Self {
            protected_prefix: "/admin".to_string(),
            login_path: "/login".to_string(),
            provider_error_policy: ProviderErrorPolicy::Redirect,
            secure_cookies: true,
        }
    }
}

impl MarketplaceConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check,
    /// Asaas key prefix).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// See [`MarketplaceConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);

        let host = env
            .or_default("MARKETPLACE_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| invalid("MARKETPLACE_HOST", e))?;
        let port = env
            .or_default("MARKETPLACE_PORT", "3000")
            .parse::<u16>()
            .map_err(|e| invalid("MARKETPLACE_PORT", e))?;
        let base_url = env.url("MARKETPLACE_BASE_URL")?;

        let supabase = SupabaseConfig::from_env(&env)?;
        let asaas = AsaasConfig::from_env(&env)?;
        let session = SessionGateConfig::from_env(&env, &base_url)?;

        Ok(Self {
            host,
            port,
            base_url,
            supabase,
            asaas,
            session,
            sentry_dsn: env.optional("SENTRY_DSN"),
            sentry_environment: env.optional("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl SupabaseConfig {
    fn from_env(env: &Env<'_>) -> Result<Self, ConfigError> {
        let url = env.url("SUPABASE_URL")?;
        let project_ref = project_ref(&url).ok_or_else(|| {
            ConfigError::InvalidEnvVar("SUPABASE_URL".to_string(), "URL has no host".to_string())
        })?;
        let auth_cookie_name = env
            .optional("SUPABASE_AUTH_COOKIE")
            .unwrap_or_else(|| format!("sb-{project_ref}-auth-token"));

        Ok(Self {
            url,
            anon_key: env.validated_secret("SUPABASE_ANON_KEY")?,
            service_role_key: env.validated_secret("SUPABASE_SERVICE_ROLE_KEY")?,
            auth_cookie_name,
        })
    }
}

impl AsaasConfig {
    fn from_env(env: &Env<'_>) -> Result<Self, ConfigError> {
        let environment = env
            .or_default("ASAAS_ENVIRONMENT", "sandbox")
            .parse::<AsaasEnvironment>()
            .map_err(|e| ConfigError::InvalidEnvVar("ASAAS_ENVIRONMENT".to_string(), e))?;

        let api_key = env.required("ASAAS_API_KEY")?;
        validate_asaas_key(&api_key, environment)?;

        let wallet_id = env.optional("ASAAS_WALLET_ID");
        if let Some(wallet) = &wallet_id {
            uuid::Uuid::parse_str(wallet).map_err(|e| invalid("ASAAS_WALLET_ID", e))?;
        }

        let split_percent = env
            .optional("ASAAS_SPLIT_PERCENT")
            .map(|raw| parse_split_percent(&raw))
            .transpose()?;
        if split_percent.is_some() && wallet_id.is_none() {
            return Err(ConfigError::MissingEnvVar("ASAAS_WALLET_ID".to_string()));
        }

        let due_days = env
            .or_default("ASAAS_DUE_DAYS", "3")
            .parse::<u32>()
            .map_err(|e| invalid("ASAAS_DUE_DAYS", e))?;

        let webhook_token = env
            .optional("ASAAS_WEBHOOK_TOKEN")
            .map(|token| {
                validate_secret_strength(&token, "ASAAS_WEBHOOK_TOKEN")?;
                Ok::<_, ConfigError>(SecretString::from(token))
            })
            .transpose()?;

        let api_url = Url::parse(environment.api_url()).map_err(|e| invalid("ASAAS_ENVIRONMENT", e))?;

        Ok(Self {
            api_key: SecretString::from(api_key),
            environment,
            api_url,
            wallet_id,
            split_percent,
            due_days,
            webhook_token,
        })
    }
}

impl SessionGateConfig {
    fn from_env(env: &Env<'_>, base_url: &Url) -> Result<Self, ConfigError> {
        let protected_prefix = env.or_default("SESSION_PROTECTED_PREFIX", "/admin");
        let login_path = env.or_default("SESSION_LOGIN_PATH", "/login");
        for (key, value) in [
            ("SESSION_PROTECTED_PREFIX", &protected_prefix),
            ("SESSION_LOGIN_PATH", &login_path),
        ] {
            if !value.starts_with('/') {
                return Err(ConfigError::InvalidEnvVar(
                    key.to_string(),
                    "must start with '/'".to_string(),
                ));
            }
        }
        if path_has_prefix(&login_path, &protected_prefix) {
            return Err(ConfigError::InvalidEnvVar(
                "SESSION_LOGIN_PATH".to_string(),
                "login path cannot be under the protected prefix".to_string(),
            ));
        }

        let provider_error_policy = env
            .or_default("SESSION_PROVIDER_ERROR_POLICY", "redirect")
            .parse::<ProviderErrorPolicy>()
            .map_err(|e| ConfigError::InvalidEnvVar("SESSION_PROVIDER_ERROR_POLICY".to_string(), e))?;

        Ok(Self {
            protected_prefix,
            login_path,
            provider_error_policy,
            secure_cookies: base_url.scheme() == "https",
        })
    }
}

/// Returns true if `path` equals `prefix` or continues it with a new segment.
///
/// `/admin` covers `/admin` and `/admin/events`, not `/administrator`.
#[must_use]
pub fn path_has_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return true;
    }
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'))
}

/// Supabase project ref: the first label of the project host.
fn project_ref(url: &Url) -> Option<String> {
    url.host_str()
        .and_then(|host| host.split('.').next())
        .filter(|label| !label.is_empty())
        .map(str::to_owned)
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Variable lookup shared by the `from_env` constructors.
struct Env<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Env<'_> {
    /// Get a required variable.
    fn required(&self, key: &str) -> Result<String, ConfigError> {
        (self.0)(key)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    /// Get an optional variable (blank counts as unset).
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    /// Get a variable with a default value.
    fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    /// Get a required absolute URL with a host.
    fn url(&self, key: &str) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.required(key)?).map_err(|e| invalid(key, e))?;
        if url.host_str().is_none() {
            return Err(ConfigError::InvalidEnvVar(
                key.to_string(),
                "URL must have a host".to_string(),
            ));
        }
        Ok(url)
    }

    /// Load and validate a secret.
    fn validated_secret(&self, key: &str) -> Result<SecretString, ConfigError> {
        let value = self.required(key)?;
        validate_secret_strength(&value, key)?;
        Ok(SecretString::from(value))
    }
}

fn invalid(key: &str, err: impl std::fmt::Display) -> ConfigError {
    ConfigError::InvalidEnvVar(key.to_string(), err.to_string())
}

/// Validate the Asaas key prefix and, when the key names its environment,
/// that it matches `ASAAS_ENVIRONMENT`.
fn validate_asaas_key(key: &str, environment: AsaasEnvironment) -> Result<(), ConfigError> {
    let Some(rest) = key.strip_prefix(ASAAS_KEY_PREFIX) else {
        return Err(ConfigError::InsecureSecret(
            "ASAAS_API_KEY".to_string(),
            format!("must start with '{ASAAS_KEY_PREFIX}'"),
        ));
    };

    let key_environment = if rest.starts_with("prod_") {
        Some(AsaasEnvironment::Production)
    } else if rest.starts_with("hmlg_") {
        Some(AsaasEnvironment::Sandbox)
    } else {
        None
    };
    if let Some(key_environment) = key_environment
        && key_environment != environment
    {
        return Err(ConfigError::InvalidEnvVar(
            "ASAAS_API_KEY".to_string(),
            format!("key is for {key_environment:?} but ASAAS_ENVIRONMENT is {environment:?}"),
        ));
    }

    validate_secret_strength(rest, "ASAAS_API_KEY")
}

fn parse_split_percent(raw: &str) -> Result<Decimal, ConfigError> {
    let percent = Decimal::from_str(raw).map_err(|e| invalid("ASAAS_SPLIT_PERCENT", e))?;
    if percent <= Decimal::ZERO || percent > Decimal::ONE_HUNDRED {
        return Err(invalid("ASAAS_SPLIT_PERCENT", "must be in (0, 100]"));
    }
    Ok(percent)
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1})"
            ),
        ));
    }

    Ok(())
}
