//! Gateway configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `PADGATE_BASE_URL` - Public URL of the gateway (https enables secure cookies)
//! - `PADGATE_UPSTREAM_URL` - Base URL of the collaborative editor behind the gateway
//! - `PADGATE_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `LDAP_URL` - Directory URL (e.g., ldaps://ldap.example.com)
//! - `LDAP_SEARCH_DN` - DN used to search for accounts and groups
//! - `LDAP_SEARCH_PWD` - Password for `LDAP_SEARCH_DN`
//! - `LDAP_ACCOUNT_BASE` - Search base for user accounts
//! - `LDAP_GROUP_SEARCH_BASE` - Search base for the administrative group
//!
//! ## Optional
//! - `PADGATE_HOST` - Bind address (default: 127.0.0.1)
//! - `PADGATE_PORT` - Listen port (default: 9002)
//! - `PADGATE_AUTH_REALM` - Basic auth realm (default: Collaborative Editor)
//! - `PADGATE_PENDING_NAME_TTL_SECS` - Idle lifetime of a pending display name (default: 86400)
//! - `PADGATE_PENDING_NAME_CAPACITY` - Maximum pending display names (default: 10000)
//! - `PADGATE_CONNECTION_TTL_SECS` - Idle lifetime of a live connection binding (default: 3600)
//! - `PADGATE_CONNECTION_CAPACITY` - Maximum live connection bindings (default: 100000)
//! - `LDAP_ACCOUNT_PATTERN` - Account filter (default: `(&(objectClass=*)(uid={{username}}))`)
//! - `LDAP_SEARCH_SCOPE` - `base`, `one` or `sub` (default: sub)
//! - `LDAP_DISPLAY_NAME_ATTRIBUTE` - Display name attribute (default: cn)
//! - `LDAP_GROUP_ATTRIBUTE` - Group membership attribute (default: member)
//! - `LDAP_GROUP_ATTRIBUTE_IS_DN` - Membership values are DNs (default: true)
//! - `LDAP_GROUP_SEARCH` - Group filter template (default: `(&(cn=admin)(objectClass=groupOfNames))`)
//! - `LDAP_CACHE` - Cache account and group lookups (default: true)
//! - `LDAP_TIMEOUT_SECS` - Per-operation directory timeout (default: 10)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//!
//! ## Optional (TLS)
//! - `PADGATE_TLS_CERT` - PEM-encoded certificate chain
//! - `PADGATE_TLS_KEY` - PEM-encoded private key

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.0;
const DEFAULT_ACCOUNT_PATTERN: &str = "(&(objectClass=*)(uid={{username}}))";
const DEFAULT_GROUP_SEARCH: &str = "(&(cn=admin)(objectClass=groupOfNames))";
const DEFAULT_AUTH_REALM: &str = "Collaborative Editor";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "supersecret",
    "password",
    "xxx",
    "todo",
    "fixme",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL of the gateway
    pub base_url: String,
    /// Base URL of the collaborative editor being fronted
    pub upstream_url: Url,
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// Realm announced in `WWW-Authenticate` challenges
    pub auth_realm: String,
    /// Pending display name table sizing
    pub pending_names: PendingNamesConfig,
    /// Live connection registry sizing
    pub connections: ConnectionsConfig,
    /// Directory (LDAP) configuration
    pub directory: DirectoryConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "staging", "production")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate for performance monitoring (0.0 to 1.0)
    pub sentry_traces_sample_rate: f32,
    /// TLS configuration for HTTPS (optional)
    pub tls: Option<TlsConfig>,
}

/// Sizing of the session id -> display name table.
#[derive(Debug, Clone, Copy)]
pub struct PendingNamesConfig {
    /// Entries untouched for this long are evicted.
    pub time_to_idle: Duration,
    /// Upper bound on the number of entries.
    pub capacity: u64,
}

impl Default for PendingNamesConfig {
    fn default() -> Self {
        Self {
            time_to_idle: Duration::from_secs(24 * 60 * 60),
            capacity: 10_000,
        }
    }
}

/// Sizing of the connection id -> session id registry.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionsConfig {
    /// Bindings not polled or looked up for this long are evicted.
    pub time_to_idle: Duration,
    /// Upper bound on the number of bindings.
    pub capacity: u64,
}

impl Default for ConnectionsConfig {
    fn default() -> Self {
        Self {
            time_to_idle: Duration::from_secs(60 * 60),
            capacity: 100_000,
        }
    }
}

/// Search scope for account lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchScope {
    /// Only the base entry itself.
    Base,
    /// Direct children of the base.
    OneLevel,
    /// The whole subtree under the base.
    #[default]
    Subtree,
}

impl FromStr for SearchScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "base" => Ok(Self::Base),
            "one" | "onelevel" => Ok(Self::OneLevel),
            "sub" | "subtree" => Ok(Self::Subtree),
            other => Err(format!("unknown search scope '{other}' (expected base, one or sub)")),
        }
    }
}

/// Directory (LDAP) configuration.
///
/// Implements `Debug` manually to redact the bind password.
#[derive(Clone)]
pub struct DirectoryConfig {
    /// Directory URL (ldap:// or ldaps://)
    pub url: String,
    /// DN used for account and group searches
    pub bind_dn: String,
    /// Password for `bind_dn`
    pub bind_password: SecretString,
    /// Search base for user accounts
    pub account_base: String,
    /// Account filter; `{{username}}` is replaced by the escaped username
    pub account_pattern: String,
    /// Scope of account and group searches
    pub search_scope: SearchScope,
    /// Attribute holding the human-readable display name
    pub display_name_attribute: String,
    /// Search base for the administrative group
    pub group_search_base: String,
    /// Membership attribute on group entries
    pub group_attribute: String,
    /// Whether membership values are user DNs (otherwise usernames)
    pub group_attribute_is_dn: bool,
    /// Group filter template
    pub group_search: String,
    /// Cache account and group lookups
    pub cache: bool,
    /// Per-operation timeout
    pub timeout: Duration,
}

impl std::fmt::Debug for DirectoryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryConfig")
            .field("url", &self.url)
            .field("bind_dn", &self.bind_dn)
            .field("bind_password", &"[REDACTED]")
            .field("account_base", &self.account_base)
            .field("account_pattern", &self.account_pattern)
            .field("search_scope", &self.search_scope)
            .field("display_name_attribute", &self.display_name_attribute)
            .field("group_search_base", &self.group_search_base)
            .field("group_attribute", &self.group_attribute)
            .field("group_attribute_is_dn", &self.group_attribute_is_dn)
            .field("group_search", &self.group_search)
            .field("cache", &self.cache)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl DirectoryConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let bind_password = get_required_env("LDAP_SEARCH_PWD")?;
        if let Err(reason) = check_secret_strength(&bind_password) {
            tracing::warn!("LDAP_SEARCH_PWD validation warning: {reason}");
        }

        let search_scope = get_env_or_default("LDAP_SEARCH_SCOPE", "sub")
            .parse::<SearchScope>()
            .map_err(|e| ConfigError::InvalidEnvVar("LDAP_SEARCH_SCOPE".to_string(), e))?;
        let timeout_secs = get_env_or_default("LDAP_TIMEOUT_SECS", "10")
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidEnvVar("LDAP_TIMEOUT_SECS".to_string(), e.to_string()))?;

        Ok(Self {
            url: get_required_env("LDAP_URL")?,
            bind_dn: get_required_env("LDAP_SEARCH_DN")?,
            bind_password: SecretString::from(bind_password),
            account_base: get_required_env("LDAP_ACCOUNT_BASE")?,
            account_pattern: get_env_or_default("LDAP_ACCOUNT_PATTERN", DEFAULT_ACCOUNT_PATTERN),
            search_scope,
            display_name_attribute: get_env_or_default("LDAP_DISPLAY_NAME_ATTRIBUTE", "cn"),
            group_search_base: get_required_env("LDAP_GROUP_SEARCH_BASE")?,
            group_attribute: get_env_or_default("LDAP_GROUP_ATTRIBUTE", "member"),
            group_attribute_is_dn: get_bool_env("LDAP_GROUP_ATTRIBUTE_IS_DN", true)?,
            group_search: get_env_or_default("LDAP_GROUP_SEARCH", DEFAULT_GROUP_SEARCH),
            cache: get_bool_env("LDAP_CACHE", true)?,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

/// TLS configuration for HTTPS.
#[derive(Clone)]
pub struct TlsConfig {
    /// PEM-encoded certificate chain
    pub cert_pem: String,
    /// PEM-encoded private key
    pub key_pem: SecretString,
}

impl std::fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConfig")
            .field("cert_pem", &"[CERTIFICATE]")
            .field("key_pem", &"[REDACTED]")
            .finish()
    }
}

impl TlsConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let cert_pem = get_optional_env("PADGATE_TLS_CERT");
        let key_pem = get_optional_env("PADGATE_TLS_KEY");

        match (cert_pem, key_pem) {
            (Some(cert), Some(key)) => Ok(Some(Self {
                cert_pem: cert,
                key_pem: SecretString::from(key),
            })),
            (None, None) => Ok(None),
            _ => Err(ConfigError::InvalidEnvVar(
                "PADGATE_TLS_*".to_string(),
                "Both PADGATE_TLS_CERT and PADGATE_TLS_KEY must be set together".to_string(),
            )),
        }
    }
}

impl PendingNamesConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let ttl_secs = get_u64_env("PADGATE_PENDING_NAME_TTL_SECS")?;
        let capacity = get_u64_env("PADGATE_PENDING_NAME_CAPACITY")?;

        Ok(Self {
            time_to_idle: ttl_secs.map_or(defaults.time_to_idle, Duration::from_secs),
            capacity: capacity.unwrap_or(defaults.capacity),
        })
    }
}

impl ConnectionsConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let ttl_secs = get_u64_env("PADGATE_CONNECTION_TTL_SECS")?;
        let capacity = get_u64_env("PADGATE_CONNECTION_CAPACITY")?;

        Ok(Self {
            time_to_idle: ttl_secs.map_or(defaults.time_to_idle, Duration::from_secs),
            capacity: capacity.unwrap_or(defaults.capacity),
        })
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let host = get_env_or_default("PADGATE_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("PADGATE_HOST".to_string(), e.to_string()))?;
        let port = get_env_or_default("PADGATE_PORT", "9002")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("PADGATE_PORT".to_string(), e.to_string()))?;
        let base_url = get_required_env("PADGATE_BASE_URL")?;
        let upstream_url = parse_upstream_url(&get_required_env("PADGATE_UPSTREAM_URL")?)?;
        let database_url = get_database_url("PADGATE_DATABASE_URL")?;
        let auth_realm = get_env_or_default("PADGATE_AUTH_REALM", DEFAULT_AUTH_REALM);

        let pending_names = PendingNamesConfig::from_env()?;
        let connections = ConnectionsConfig::from_env()?;
        let directory = DirectoryConfig::from_env()?;
        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");
        let sentry_sample_rate = get_optional_env("SENTRY_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let sentry_traces_sample_rate = get_optional_env("SENTRY_TRACES_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let tls = TlsConfig::from_env()?;

        Ok(Self {
            host,
            port,
            base_url,
            upstream_url,
            database_url,
            auth_realm,
            pending_names,
            connections,
            directory,
            sentry_dsn,
            sentry_environment,
            sentry_sample_rate,
            sentry_traces_sample_rate,
            tls,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether session cookies should carry the `Secure` attribute.
    #[must_use]
    pub fn secure_cookies(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get an optional unsigned integer environment variable.
fn get_u64_env(key: &str) -> Result<Option<u64>, ConfigError> {
    get_optional_env(key)
        .map(|s| {
            s.parse::<u64>()
                .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
        })
        .transpose()
}

/// Get a boolean environment variable with a default value.
fn get_bool_env(key: &str, default: bool) -> Result<bool, ConfigError> {
    get_optional_env(key).map_or(Ok(default), |value| {
        parse_bool(&value).ok_or_else(|| {
            ConfigError::InvalidEnvVar(key.to_string(), format!("expected a boolean, got '{value}'"))
        })
    })
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse the upstream URL, requiring an http(s) scheme.
fn parse_upstream_url(value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|e| {
        ConfigError::InvalidEnvVar("PADGATE_UPSTREAM_URL".to_string(), e.to_string())
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::InvalidEnvVar(
            "PADGATE_UPSTREAM_URL".to_string(),
            format!("unsupported scheme '{other}'"),
        )),
    }
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

/// Check that a secret is not a placeholder and has reasonable entropy.
///
/// Returns a human-readable reason when the secret looks weak.
fn check_secret_strength(secret: &str) -> Result<(), String> {
    let lower = secret.to_lowercase();

    if let Some(pattern) = PLACEHOLDER_PATTERNS.iter().find(|p| lower.contains(*p)) {
        return Err(format!("appears to be a placeholder (contains '{pattern}')"));
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(format!(
            "entropy low ({entropy:.2} bits/char, recommended >= {MIN_ENTROPY_BITS_PER_CHAR:.1})"
        ));
    }

    Ok(())
}

impl DirectoryConfig {
    /// Expose the bind password for a bind operation.
    pub(crate) fn bind_password(&self) -> &str {
        self.bind_password.expose_secret()
    }
}
