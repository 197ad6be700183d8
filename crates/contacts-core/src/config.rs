//! Contacts Configuration Management
//!
//! Handles configuration from environment variables and config files
//! with sensible defaults for development.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const DEV_JWT_SECRET: &str = "development-secret-key-change-in-production";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Database connection
    pub database: DatabaseConfig,

    /// Token and password settings
    pub auth: AuthConfig,

    /// Session cache settings
    pub cache: CacheConfig,

    /// Login/registration throttling
    pub rate_limit: RateLimitConfig,

    /// Outgoing mail
    pub mail: MailConfig,

    /// Avatar image host
    pub upload: UploadConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

fn env_list(key: &str) -> Option<Vec<String>> {
    std::env::var(key).ok().map(|v| {
        v.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Load `CONFIG_FILE` when set, then apply environment overrides and validate
    pub fn load() -> Result<Self, ConfigError> {
        let config = match std::env::var("CONFIG_FILE") {
            Ok(path) => Self::from_file(path)?.with_env_override()?,
            Err(_) => Self::from_env()?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        self.apply_env()?;
        Ok(self)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        // Server
        if let Ok(host) = std::env::var("API_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_parse("API_PORT")? {
            self.server.port = port;
        }
        if let Ok(url) = std::env::var("PUBLIC_BASE_URL") {
            self.server.public_base_url = url;
        }
        // CORS origins from environment variable (comma-separated)
        if let Some(origins) = env_list("CORS_ORIGINS") {
            self.server.cors_origins = origins;
        }

        // Database
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database.url = Some(url);
        }
        if let Some(size) = env_parse("DATABASE_POOL_SIZE")? {
            self.database.pool_size = size;
        }

        // Auth
        if let Ok(secret) = std::env::var("JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Ok(issuer) = std::env::var("JWT_ISSUER") {
            self.auth.issuer = issuer;
        }
        if let Some(ttl) = env_parse("JWT_ACCESS_TTL_SECS")? {
            self.auth.access_ttl_secs = ttl;
        }
        if let Some(ttl) = env_parse("JWT_REFRESH_TTL_SECS")? {
            self.auth.refresh_ttl_secs = ttl;
        }
        if let Some(ttl) = env_parse("EMAIL_TOKEN_TTL_SECS")? {
            self.auth.email_token_ttl_secs = ttl;
        }
        if let Some(ttl) = env_parse("RESET_TOKEN_TTL_SECS")? {
            self.auth.reset_token_ttl_secs = ttl;
        }
        if let Some(emails) = env_list("ADMIN_EMAILS") {
            self.auth.admin_emails = emails;
        }
        if let Some(flag) = env_parse("REQUIRE_VERIFIED_LOGIN")? {
            self.auth.require_verified_login = flag;
        }

        // Cache
        if let Some(enabled) = env_parse("CACHE_ENABLED")? {
            self.cache.enabled = enabled;
        }
        if let Some(ttl) = env_parse("CACHE_TTL_SECS")? {
            self.cache.ttl_secs = ttl;
        }
        if let Some(cap) = env_parse("CACHE_MAX_ENTRIES")? {
            self.cache.max_entries = cap;
        }

        // Rate limits
        if let Some(enabled) = env_parse("RATE_LIMIT_ENABLED")? {
            self.rate_limit.enabled = enabled;
        }
        if let Some(n) = env_parse("RATE_LIMIT_LOGIN_ATTEMPTS")? {
            self.rate_limit.login_attempts = n;
        }
        if let Some(n) = env_parse("RATE_LIMIT_REGISTER_ATTEMPTS")? {
            self.rate_limit.register_attempts = n;
        }
        if let Some(secs) = env_parse("RATE_LIMIT_AUTH_WINDOW_SECS")? {
            self.rate_limit.auth_window_secs = secs;
        }
        if let Some(n) = env_parse("RATE_LIMIT_PROFILE_REQUESTS")? {
            self.rate_limit.profile_requests = n;
        }
        if let Some(secs) = env_parse("RATE_LIMIT_PROFILE_WINDOW_SECS")? {
            self.rate_limit.profile_window_secs = secs;
        }
        if let Some(trust) = env_parse("RATE_LIMIT_TRUST_PROXY")? {
            self.rate_limit.trust_proxy = trust;
        }

        // Mail
        if let Ok(from) = std::env::var("MAIL_FROM") {
            self.mail.from_address = from;
        }
        if let Ok(name) = std::env::var("MAIL_FROM_NAME") {
            self.mail.from_name = name;
        }

        // Upload
        if let Ok(name) = std::env::var("CLD_NAME") {
            self.upload.cloud_name = Some(name);
        }
        if let Ok(key) = std::env::var("CLD_API_KEY") {
            self.upload.api_key = Some(key);
        }
        if let Ok(secret) = std::env::var("CLD_API_SECRET") {
            self.upload.api_secret = Some(secret);
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = env_parse("LOG_JSON")? {
            self.logging.json_format = json;
        }

        Ok(())
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.jwt_secret.trim().is_empty() {
            return Err(ConfigError::MissingRequired("JWT_SECRET".to_string()));
        }
        let positive = [
            ("JWT_ACCESS_TTL_SECS", self.auth.access_ttl_secs),
            ("JWT_REFRESH_TTL_SECS", self.auth.refresh_ttl_secs),
            ("EMAIL_TOKEN_TTL_SECS", self.auth.email_token_ttl_secs),
            ("RESET_TOKEN_TTL_SECS", self.auth.reset_token_ttl_secs),
            ("CACHE_TTL_SECS", self.cache.ttl_secs),
            ("RATE_LIMIT_AUTH_WINDOW_SECS", self.rate_limit.auth_window_secs),
            ("RATE_LIMIT_PROFILE_WINDOW_SECS", self.rate_limit.profile_window_secs),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: value.to_string(),
                });
            }
        }
        if self.auth.refresh_ttl_secs < self.auth.access_ttl_secs {
            return Err(ConfigError::InvalidValue {
                key: "JWT_REFRESH_TTL_SECS".to_string(),
                value: format!(
                    "{} (shorter than the access token TTL)",
                    self.auth.refresh_ttl_secs
                ),
            });
        }
        Ok(())
    }

    /// Whether the development secret is still in place
    pub fn uses_default_secret(&self) -> bool {
        self.auth.jwt_secret == DEV_JWT_SECRET
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Base URL used in links sent by email
    pub public_base_url: String,

    /// Allowed origins for CORS
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            public_base_url: "http://localhost:8000".to_string(),
            // Empty by default for security - set via CORS_ORIGINS env var
            cors_origins: vec![],
        }
    }
}

/// Database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL; `None` runs on the in-memory store
    pub url: Option<String>,

    /// Connection pool size
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            pool_size: 10,
        }
    }
}

/// Token issuing and password hashing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret for token signing
    pub jwt_secret: String,

    /// Token issuer claim
    pub issuer: String,

    /// Access token lifetime
    pub access_ttl_secs: u64,

    /// Refresh token lifetime
    pub refresh_ttl_secs: u64,

    /// Email verification token lifetime
    pub email_token_ttl_secs: u64,

    /// Password reset token lifetime
    pub reset_token_ttl_secs: u64,

    /// Accounts registered with these emails become admins
    pub admin_emails: Vec<String>,

    /// Refuse to log in accounts whose email is not confirmed
    pub require_verified_login: bool,

    /// Argon2 memory cost in KiB
    pub argon2_memory_kib: u32,

    /// Argon2 iterations
    pub argon2_iterations: u32,

    /// Argon2 lanes
    pub argon2_parallelism: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: DEV_JWT_SECRET.to_string(),
            issuer: "contacts-api".to_string(),
            access_ttl_secs: 3600,
            refresh_ttl_secs: 7 * 24 * 3600,
            email_token_ttl_secs: 7 * 24 * 3600,
            reset_token_ttl_secs: 3600,
            admin_emails: vec![],
            require_verified_login: false,
            argon2_memory_kib: 65536, // 64 MB
            argon2_iterations: 3,
            argon2_parallelism: 4,
        }
    }
}

impl AuthConfig {
    pub fn is_admin_email(&self, email: &str) -> bool {
        let email = crate::normalize_email(email);
        self.admin_emails
            .iter()
            .any(|e| crate::normalize_email(e) == email)
    }
}

/// Session cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Disable to resolve every request against the store
    pub enabled: bool,

    /// Upper bound on an entry's lifetime
    pub ttl_secs: u64,

    /// Maximum number of cached identities
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 600,
            max_entries: 10_000,
        }
    }
}

/// Rate limit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,

    /// Login attempts per client per window
    pub login_attempts: u32,

    /// Registrations per client per window
    pub register_attempts: u32,

    /// Window shared by login and registration
    pub auth_window_secs: u64,

    /// Profile reads per client per window
    pub profile_requests: u32,

    pub profile_window_secs: u64,

    /// Key clients on `X-Forwarded-For`/`X-Real-IP` instead of the socket
    /// address. Only safe behind a proxy that overwrites those headers.
    pub trust_proxy: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            login_attempts: 5,
            register_attempts: 5,
            auth_window_secs: 60,
            profile_requests: 10,
            profile_window_secs: 60,
            trust_proxy: false,
        }
    }
}

/// Outgoing mail configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    pub from_address: String,
    pub from_name: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            from_address: "no-reply@contacts.local".to_string(),
            from_name: "Contacts API".to_string(),
        }
    }
}

/// Image host credentials; uploads are disabled until all three are set
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct UploadConfig {
    pub cloud_name: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
}

impl UploadConfig {
    pub fn is_configured(&self) -> bool {
        self.cloud_name.is_some() && self.api_key.is_some() && self.api_secret.is_some()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.auth.access_ttl_secs, 3600);
        assert!(config.cache.enabled);
        assert!(config.validate().is_ok());
        assert!(config.uses_default_secret());
    }

    #[test]
    fn test_validate_rejects_empty_secret() {
        let mut config = AppConfig::default();
        config.auth.jwt_secret = "  ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingRequired(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let mut config = AppConfig::default();
        config.rate_limit.auth_window_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_refresh_shorter_than_access() {
        let mut config = AppConfig::default();
        config.auth.refresh_ttl_secs = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml() {
        let config: AppConfig = toml::from_str(
            r#"
            [auth]
            jwt_secret = "from-file"
            access_ttl_secs = 900

            [cache]
            enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(config.auth.jwt_secret, "from-file");
        assert_eq!(config.auth.access_ttl_secs, 900);
        assert_eq!(config.auth.issuer, "contacts-api");
        assert!(!config.cache.enabled);
        assert_eq!(config.rate_limit.login_attempts, 5);
    }

    #[test]
    fn test_admin_email_match_is_case_insensitive() {
        let mut auth = AuthConfig::default();
        auth.admin_emails = vec!["Root@Example.com".to_string()];
        assert!(auth.is_admin_email("root@example.COM"));
        assert!(!auth.is_admin_email("user@example.com"));
    }
}
