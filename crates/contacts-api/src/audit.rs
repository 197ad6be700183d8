//! Security audit logging for authentication events
//!
//! Every event is emitted at INFO level on the `audit` target as a single
//! structured record, so security events can be filtered and routed apart
//! from application logs:
//!
//! ```text
//! RUST_LOG=info,audit=info
//! ```
//!
//! Author: hephaex@gmail.com

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tracing::info;
use uuid::Uuid;

/// Security audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    LoginSuccess {
        user_id: Uuid,
        email: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    LoginFailure {
        email: String,
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    Logout {
        user_id: Uuid,
        email: String,
        ip_address: Option<String>,
        refresh_revoked: bool,
    },

    TokenRefresh {
        user_id: Uuid,
        ip_address: Option<String>,
    },

    RegistrationSuccess {
        user_id: Uuid,
        email: String,
        role: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    RegistrationFailure {
        email: String,
        reason: String,
        ip_address: Option<String>,
    },

    EmailVerified {
        user_id: Uuid,
        email: String,
    },

    PasswordChange {
        user_id: Uuid,
        email: String,
        ip_address: Option<String>,
    },

    /// Password set through an emailed reset token
    PasswordReset {
        user_id: Uuid,
        email: String,
    },

    /// Authenticated but refused by an access policy
    AccessDenied {
        user_id: Option<Uuid>,
        email: Option<String>,
        resource: String,
        reason: String,
        ip_address: Option<String>,
    },

    /// Missing, malformed, expired or revoked token
    InvalidToken {
        ip_address: Option<String>,
        user_agent: Option<String>,
        reason: String,
    },

    RateLimited {
        scope: String,
        client: String,
        retry_after_secs: u64,
    },

    RoleChanged {
        user_id: Uuid,
        new_role: String,
        changed_by: Uuid,
    },

    AccountDisabled {
        user_id: Uuid,
        disabled_by: Uuid,
    },
}

impl AuditEvent {
    fn summary(&self) -> &'static str {
        match self {
            AuditEvent::LoginSuccess { .. } => "Login successful",
            AuditEvent::LoginFailure { .. } => "Login failed",
            AuditEvent::Logout { .. } => "User logout",
            AuditEvent::TokenRefresh { .. } => "Token refresh",
            AuditEvent::RegistrationSuccess { .. } => "Registration successful",
            AuditEvent::RegistrationFailure { .. } => "Registration failed",
            AuditEvent::EmailVerified { .. } => "Email verified",
            AuditEvent::PasswordChange { .. } => "Password changed",
            AuditEvent::PasswordReset { .. } => "Password reset",
            AuditEvent::AccessDenied { .. } => "Access denied",
            AuditEvent::InvalidToken { .. } => "Invalid token",
            AuditEvent::RateLimited { .. } => "Rate limit exceeded",
            AuditEvent::RoleChanged { .. } => "Role changed",
            AuditEvent::AccountDisabled { .. } => "Account disabled",
        }
    }

    fn user_id(&self) -> Option<Uuid> {
        match self {
            AuditEvent::LoginSuccess { user_id, .. }
            | AuditEvent::Logout { user_id, .. }
            | AuditEvent::TokenRefresh { user_id, .. }
            | AuditEvent::RegistrationSuccess { user_id, .. }
            | AuditEvent::EmailVerified { user_id, .. }
            | AuditEvent::PasswordChange { user_id, .. }
            | AuditEvent::PasswordReset { user_id, .. }
            | AuditEvent::RoleChanged { user_id, .. }
            | AuditEvent::AccountDisabled { user_id, .. } => Some(*user_id),
            AuditEvent::AccessDenied { user_id, .. } => *user_id,
            _ => None,
        }
    }

    fn ip_address(&self) -> Option<&str> {
        match self {
            AuditEvent::LoginSuccess { ip_address, .. }
            | AuditEvent::LoginFailure { ip_address, .. }
            | AuditEvent::Logout { ip_address, .. }
            | AuditEvent::TokenRefresh { ip_address, .. }
            | AuditEvent::RegistrationSuccess { ip_address, .. }
            | AuditEvent::RegistrationFailure { ip_address, .. }
            | AuditEvent::PasswordChange { ip_address, .. }
            | AuditEvent::AccessDenied { ip_address, .. }
            | AuditEvent::InvalidToken { ip_address, .. } => ip_address.as_deref(),
            AuditEvent::RateLimited { client, .. } => Some(client.as_str()),
            _ => None,
        }
    }
}

/// Log a security audit event with structured fields
///
/// The full event is attached as JSON alongside the commonly queried
/// `user_id` and `ip_address` fields.
pub fn audit_log(event: &AuditEvent) {
    let event_json = serde_json::to_string(event)
        .unwrap_or_else(|e| format!("{{\"error\":\"Failed to serialize audit event: {e}\"}}"));

    info!(
        target: "audit",
        timestamp = %chrono::Utc::now(),
        event = %event_json,
        user_id = ?event.user_id(),
        ip_address = ?event.ip_address(),
        "{}",
        event.summary()
    );
}

/// Extract the client IP from proxy headers
///
/// Checks X-Forwarded-For (first hop) and then X-Real-IP.
pub fn extract_ip_address(headers: &axum::http::HeaderMap) -> Option<String> {
    if let Some(first_ip) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return Some(first_ip.to_string());
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Proxy headers first, then the socket peer address
pub fn client_ip(headers: &axum::http::HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    extract_ip_address(headers).or_else(|| peer.map(|addr| addr.ip().to_string()))
}

pub fn extract_user_agent(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|ua| ua.to_str().ok())
        .map(|s| s.to_string())
}
