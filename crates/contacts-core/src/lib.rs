//! Contacts Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used by the contacts service:
//! - User accounts, roles and the cached identity snapshot
//! - Personal contacts and their validation rules
//! - Common error types
//! - Storage traits for credentials and contacts
//! - Configuration management
//! - PostgreSQL and in-memory storage backends

pub mod config;
pub mod contact;
pub mod memory;
pub mod postgres;
pub mod store;

pub use config::{
    AppConfig, AuthConfig, CacheConfig, ConfigError, DatabaseConfig, LoggingConfig, MailConfig,
    RateLimitConfig, ServerConfig, UploadConfig,
};
pub use contact::{Contact, ContactDraft, ContactFilter};
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use store::{ContactStore, CredentialStore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for contacts operations
#[derive(Error, Debug)]
pub enum ContactsError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ContactsError>;

// ============================================================================
// Users
// ============================================================================

/// Access level of an account
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    User,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Admin => "admin",
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UserRole {
    type Err = ContactsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "user" => Ok(UserRole::User),
            "admin" => Ok(UserRole::Admin),
            other => Err(ContactsError::ValidationError(format!(
                "Unknown role: {other}"
            ))),
        }
    }
}

/// Persisted user account
///
/// Accounts are never hard-deleted; `is_active = false` disables one while
/// keeping its contacts referentially intact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    /// Always stored lower-cased
    pub email: String,
    /// Argon2id PHC string, never serialized
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_verified: bool,
    pub role: UserRole,
    pub avatar_url: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Build a fresh, unverified account
    pub fn new(username: &str, email: &str, password_hash: String, role: UserRole) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            username: username.trim().to_string(),
            email: normalize_email(email),
            password_hash,
            is_verified: false,
            role,
            avatar_url: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Snapshot without credentials, safe to cache and hand to handlers
    pub fn identity(&self) -> Identity {
        Identity {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            is_verified: self.is_verified,
            role: self.role,
            avatar_url: self.avatar_url.clone(),
            is_active: self.is_active,
        }
    }
}

/// Resolved identity of an authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Identity {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub is_verified: bool,
    pub role: UserRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub is_active: bool,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

/// Emails compare case-insensitively; the canonical form is trimmed lower-case.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse() {
        assert_eq!("ADMIN".parse::<UserRole>().unwrap(), UserRole::Admin);
        assert_eq!("user".parse::<UserRole>().unwrap(), UserRole::User);
        assert!("editor".parse::<UserRole>().is_err());
    }

    #[test]
    fn test_new_user_normalizes_email() {
        let user = User::new("alice", "  Alice@Example.COM ", "hash".into(), UserRole::User);
        assert_eq!(user.email, "alice@example.com");
        assert!(!user.is_verified);
        assert!(user.is_active);
    }

    #[test]
    fn test_identity_drops_password() {
        let user = User::new("bob", "bob@example.com", "secret-hash".into(), UserRole::Admin);
        let identity = user.identity();
        assert_eq!(identity.id, user.id);
        assert!(identity.is_admin());

        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret-hash"));
    }
}
