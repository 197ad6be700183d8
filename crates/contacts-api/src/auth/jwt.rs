//! JWT token issuing and verification
//!
//! Implements HMAC-SHA256 signed tokens of four kinds. Access and refresh
//! tokens carry the user id as subject; email verification and password
//! reset tokens carry the email address.

use contacts_core::AuthConfig;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

/// What a token may be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
    EmailVerification,
    PasswordReset,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
            TokenKind::EmailVerification => "email_verification",
            TokenKind::PasswordReset => "password_reset",
        }
    }
}

/// JWT Claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Token issuer
    pub iss: String,
    /// Subject - user id or email, depending on `kind`
    pub sub: String,
    /// JWT ID - unique token identifier for revocation
    pub jti: String,
    /// Issued at timestamp (Unix epoch)
    pub iat: u64,
    /// Expiration timestamp (Unix epoch)
    pub exp: u64,
    pub kind: TokenKind,
}

/// Token verification errors
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Failed to encode JWT: {0}")]
    EncodingError(#[from] jsonwebtoken::errors::Error),

    #[error("Malformed token")]
    Malformed,

    #[error("Token has expired")]
    ExpiredToken,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Expected a {expected} token, got {actual}")]
    WrongKind { expected: &'static str, actual: &'static str },

    #[error("System time error: {0}")]
    SystemTimeError(#[from] std::time::SystemTimeError),
}

/// Signing secret, issuer and lifetimes per token kind
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Secret key for HMAC signing
    pub secret: String,
    pub issuer: String,
    pub access_ttl_secs: u64,
    pub refresh_ttl_secs: u64,
    pub email_ttl_secs: u64,
    pub reset_ttl_secs: u64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self::from(&AuthConfig::default())
    }
}

impl From<&AuthConfig> for JwtConfig {
    fn from(auth: &AuthConfig) -> Self {
        Self {
            secret: auth.jwt_secret.clone(),
            issuer: auth.issuer.clone(),
            access_ttl_secs: auth.access_ttl_secs,
            refresh_ttl_secs: auth.refresh_ttl_secs,
            email_ttl_secs: auth.email_token_ttl_secs,
            reset_ttl_secs: auth.reset_token_ttl_secs,
        }
    }
}

impl JwtConfig {
    pub fn ttl_for(&self, kind: TokenKind) -> u64 {
        match kind {
            TokenKind::Access => self.access_ttl_secs,
            TokenKind::Refresh => self.refresh_ttl_secs,
            TokenKind::EmailVerification => self.email_ttl_secs,
            TokenKind::PasswordReset => self.reset_ttl_secs,
        }
    }
}

/// A freshly signed token
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub jti: String,
    /// Unix seconds
    pub expires_at: u64,
}

/// Access and refresh token returned by login and refresh
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: IssuedToken,
    pub refresh: IssuedToken,
    /// Access token lifetime in seconds
    pub expires_in: u64,
}

/// Claims of a token that passed signature, issuer and expiry checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    pub subject: String,
    pub kind: TokenKind,
    pub jti: String,
    pub issued_at: u64,
    pub expires_at: u64,
}

impl VerifiedToken {
    /// Subject as a user id; only meaningful for access and refresh tokens
    pub fn user_id(&self) -> Result<Uuid, TokenError> {
        Uuid::parse_str(&self.subject).map_err(|_| TokenError::Malformed)
    }

    /// Seconds until expiry, zero once expired
    pub fn remaining_secs(&self) -> u64 {
        self.expires_at.saturating_sub(now_secs())
    }
}

pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Creates and verifies signed tokens with an injected configuration
#[derive(Clone)]
pub struct TokenIssuer {
    config: JwtConfig,
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("issuer", &self.config.issuer)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    pub fn new(config: JwtConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&config.issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        // `exp < now` is expired, no grace period
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            config,
        }
    }

    pub fn config(&self) -> &JwtConfig {
        &self.config
    }

    /// Sign a token of `kind` for `subject` with the configured lifetime
    pub fn issue(&self, subject: &str, kind: TokenKind) -> Result<IssuedToken, TokenError> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
        self.issue_at(subject, kind, now, now + self.config.ttl_for(kind))
    }

    pub(crate) fn issue_at(
        &self,
        subject: &str,
        kind: TokenKind,
        iat: u64,
        exp: u64,
    ) -> Result<IssuedToken, TokenError> {
        let claims = Claims {
            iss: self.config.issuer.clone(),
            sub: subject.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat,
            exp,
            kind,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;

        Ok(IssuedToken {
            token,
            jti: claims.jti,
            expires_at: exp,
        })
    }

    /// Issue an access and a refresh token for a user
    pub fn issue_pair(&self, user_id: Uuid) -> Result<TokenPair, TokenError> {
        let subject = user_id.to_string();
        Ok(TokenPair {
            access: self.issue(&subject, TokenKind::Access)?,
            refresh: self.issue(&subject, TokenKind::Refresh)?,
            expires_in: self.config.access_ttl_secs,
        })
    }

    /// Check signature, issuer and expiry.
    ///
    /// The signature is checked before the expiry, so a token that is past
    /// its `exp` but correctly signed always yields `ExpiredToken`.
    pub fn verify(&self, token: &str) -> Result<VerifiedToken, TokenError> {
        use jsonwebtoken::errors::ErrorKind;

        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::ExpiredToken,
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                _ => TokenError::Malformed,
            }
        })?;

        let claims = data.claims;
        Ok(VerifiedToken {
            subject: claims.sub,
            kind: claims.kind,
            jti: claims.jti,
            issued_at: claims.iat,
            expires_at: claims.exp,
        })
    }

    /// [`verify`](Self::verify) and require a specific kind
    pub fn verify_kind(&self, token: &str, expected: TokenKind) -> Result<VerifiedToken, TokenError> {
        let verified = self.verify(token)?;
        if verified.kind != expected {
            return Err(TokenError::WrongKind {
                expected: expected.as_str(),
                actual: verified.kind.as_str(),
            });
        }
        Ok(verified)
    }
}
