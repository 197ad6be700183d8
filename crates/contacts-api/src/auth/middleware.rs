//! Request authentication
//!
//! [`Authenticator`] turns a bearer token into an [`AuthenticatedUser`]:
//!
//! 1. verify the access token (signature, issuer, expiry);
//! 2. reject revoked token ids;
//! 3. resolve the identity through an [`IdentityLookup`] (cache, then store);
//! 4. enforce the route's [`AccessPolicy`].
//!
//! Any failure to resolve the identity, including store or cache errors,
//! denies the request.
//!
//! The axum wrappers [`require_user`], [`require_verified`] and
//! [`require_admin`] are meant for `middleware::from_fn_with_state`:
//!
//! ```ignore
//! Router::new()
//!     .route("/api/contacts", get(list_contacts))
//!     .route_layer(middleware::from_fn_with_state(state.clone(), require_verified));
//! ```
//!
//! Handlers then take `Extension<AuthenticatedUser>`.

use super::jwt::{TokenError, TokenIssuer, TokenKind};
use super::lookup::IdentityLookup;
use super::revocation::RevocationList;
use crate::audit::{audit_log, extract_ip_address, extract_user_agent, AuditEvent};
use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use contacts_core::{Identity, UserRole};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Authentication and authorization failures
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Token has expired")]
    ExpiredToken,

    /// Missing or malformed token, revoked token, unknown or disabled
    /// account, or identity lookup failure
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Email address not verified")]
    AccountUnverified,

    #[error("Insufficient permissions")]
    Forbidden,

    #[error("Too many requests, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
}

impl AuthError {
    pub fn unauthenticated(reason: impl Into<String>) -> Self {
        AuthError::Unauthenticated(reason.into())
    }

    /// Stable label for metrics and error codes
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidSignature => "INVALID_SIGNATURE",
            AuthError::ExpiredToken => "TOKEN_EXPIRED",
            AuthError::Unauthenticated(_) => "UNAUTHENTICATED",
            AuthError::AccountUnverified => "ACCOUNT_UNVERIFIED",
            AuthError::Forbidden => "FORBIDDEN",
            AuthError::RateLimited { .. } => "RATE_LIMITED",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::InvalidSignature
            | AuthError::ExpiredToken
            | AuthError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AuthError::AccountUnverified | AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::ExpiredToken => AuthError::ExpiredToken,
            TokenError::InvalidSignature => AuthError::InvalidSignature,
            other => AuthError::Unauthenticated(other.to_string()),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AuthError::InvalidSignature => "Invalid token signature",
            AuthError::ExpiredToken => "Token has expired",
            AuthError::Unauthenticated(_) => "Could not validate credentials",
            AuthError::AccountUnverified => "Email address not verified",
            AuthError::Forbidden => "Insufficient permissions",
            AuthError::RateLimited { .. } => "Too many requests",
        };

        let mut response = (status, Json(ApiError::new(self.code(), message))).into_response();
        let headers = response.headers_mut();
        match &self {
            AuthError::RateLimited { retry_after_secs } => {
                headers.insert(header::RETRY_AFTER, HeaderValue::from(*retry_after_secs));
            }
            _ if status == StatusCode::UNAUTHORIZED => {
                headers.insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            }
            _ => {}
        }
        response
    }
}

/// What a route demands beyond a valid token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessPolicy {
    pub require_verified: bool,
    pub required_role: Option<UserRole>,
}

impl AccessPolicy {
    /// Any active account
    pub const AUTHENTICATED: Self = Self {
        require_verified: false,
        required_role: None,
    };

    /// Active account with a confirmed email
    pub const VERIFIED: Self = Self {
        require_verified: true,
        required_role: None,
    };

    pub const ADMIN: Self = Self {
        require_verified: false,
        required_role: Some(UserRole::Admin),
    };

    fn check(&self, identity: &Identity) -> Result<(), AuthError> {
        if self.require_verified && !identity.is_verified {
            return Err(AuthError::AccountUnverified);
        }
        match self.required_role {
            Some(role) if identity.role != role && !identity.is_admin() => {
                Err(AuthError::Forbidden)
            }
            _ => Ok(()),
        }
    }
}

/// Caller resolved from a bearer token, available to handlers as an extension
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub identity: Identity,
    /// Access token id, revoked on logout
    pub jti: String,
    /// Access token expiry (Unix seconds)
    pub expires_at: u64,
}

impl AuthenticatedUser {
    pub fn id(&self) -> Uuid {
        self.identity.id
    }

    pub fn is_admin(&self) -> bool {
        self.identity.is_admin()
    }

    /// Remaining lifetime of the presented access token
    pub fn token_remaining(&self) -> Duration {
        Duration::from_secs(self.expires_at.saturating_sub(super::jwt::now_secs()))
    }
}

/// Bearer token validation with cached identity resolution
#[derive(Clone)]
pub struct Authenticator {
    tokens: Arc<TokenIssuer>,
    lookup: Arc<dyn IdentityLookup>,
    revoked: Arc<RevocationList>,
}

impl Authenticator {
    pub fn new(
        tokens: Arc<TokenIssuer>,
        lookup: Arc<dyn IdentityLookup>,
        revoked: Arc<RevocationList>,
    ) -> Self {
        Self {
            tokens,
            lookup,
            revoked,
        }
    }

    pub async fn authenticate(
        &self,
        token: &str,
        policy: AccessPolicy,
    ) -> Result<AuthenticatedUser, AuthError> {
        let verified = self.tokens.verify_kind(token, TokenKind::Access)?;

        if self.revoked.is_revoked(&verified.jti) {
            return Err(AuthError::unauthenticated("token has been revoked"));
        }

        let user_id = verified.user_id()?;
        let ttl = Duration::from_secs(verified.remaining_secs());
        let identity = match self.lookup.resolve(user_id, ttl).await {
            Ok(Some(identity)) => identity,
            Ok(None) => return Err(AuthError::unauthenticated("unknown user")),
            Err(e) => {
                tracing::warn!(%user_id, error = %e, "identity lookup failed, denying request");
                return Err(AuthError::unauthenticated("identity lookup failed"));
            }
        };

        if !identity.is_active {
            return Err(AuthError::unauthenticated("account disabled"));
        }

        policy.check(&identity)?;

        Ok(AuthenticatedUser {
            identity,
            jti: verified.jti,
            expires_at: verified.expires_at,
        })
    }
}

/// Extract the token from `Authorization: Bearer <token>`
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| AuthError::unauthenticated("missing Authorization header"))?
        .to_str()
        .map_err(|_| AuthError::unauthenticated("invalid Authorization header"))?;

    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => {
            Ok(token.trim())
        }
        _ => Err(AuthError::unauthenticated("invalid Authorization header format")),
    }
}

async fn authorize(
    state: &AppState,
    policy: AccessPolicy,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let outcome = match bearer_token(request.headers()) {
        Ok(token) => state.authenticator.authenticate(token, policy).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(user) => {
            state.metrics.record_auth("ok");
            request.extensions_mut().insert(user);
            Ok(next.run(request).await)
        }
        Err(err) => {
            state.metrics.record_auth(err.code());
            let ip_address = extract_ip_address(request.headers());
            match &err {
                AuthError::AccountUnverified | AuthError::Forbidden => {
                    audit_log(&AuditEvent::AccessDenied {
                        user_id: None,
                        email: None,
                        resource: request.uri().path().to_string(),
                        reason: err.to_string(),
                        ip_address,
                    });
                }
                _ => {
                    audit_log(&AuditEvent::InvalidToken {
                        ip_address,
                        user_agent: extract_user_agent(request.headers()),
                        reason: err.to_string(),
                    });
                }
            }
            Err(err)
        }
    }
}

/// Any active account
pub async fn require_user(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    authorize(&state, AccessPolicy::AUTHENTICATED, request, next).await
}

/// Active account with a confirmed email
pub async fn require_verified(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    authorize(&state, AccessPolicy::VERIFIED, request, next).await
}

/// Admin accounts only
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    authorize(&state, AccessPolicy::ADMIN, request, next).await
}
