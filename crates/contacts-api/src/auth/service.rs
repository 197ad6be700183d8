//! Authentication service layer
//!
//! Business logic for registration, login, token rotation, logout, email
//! verification and password management. Persistence goes through
//! [`CredentialStore`]; every change to an account that a cached identity
//! could reflect is followed by an invalidation through [`IdentityLookup`].

use super::jwt::{TokenIssuer, TokenKind, VerifiedToken};
use super::lookup::IdentityLookup;
use super::middleware::{AuthError, AuthenticatedUser};
use super::models::{
    ChangePasswordRequest, LoginRequest, RegisterRequest, ResetPasswordRequest, TokenResponse,
    UserResponse,
};
use super::password::{hash_password, validate_password_strength, verify_password, PasswordConfig};
use super::revocation::RevocationList;
use crate::audit::{audit_log, AuditEvent};
use crate::error::AppError;
use crate::services::{EmailMessage, Mailer};
use contacts_core::{normalize_email, AuthConfig, CredentialStore, User, UserRole};
use std::sync::Arc;
use std::time::Duration;
use validator::Validate;

const INVALID_CREDENTIALS: &str = "Invalid email or password";

/// Where a request came from, for audit records
#[derive(Debug, Clone, Default)]
pub struct ClientContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Authentication service
pub struct AuthService {
    users: Arc<dyn CredentialStore>,
    tokens: Arc<TokenIssuer>,
    lookup: Arc<dyn IdentityLookup>,
    revoked: Arc<RevocationList>,
    mailer: Arc<dyn Mailer>,
    passwords: PasswordConfig,
    config: AuthConfig,
    public_base_url: String,
}

impl AuthService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        users: Arc<dyn CredentialStore>,
        tokens: Arc<TokenIssuer>,
        lookup: Arc<dyn IdentityLookup>,
        revoked: Arc<RevocationList>,
        mailer: Arc<dyn Mailer>,
        config: AuthConfig,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            users,
            tokens,
            lookup,
            revoked,
            mailer,
            passwords: PasswordConfig::from(&config),
            config,
            public_base_url: public_base_url.into(),
        }
    }

    /// Register a new, unverified account and send a verification email.
    ///
    /// A failed email delivery does not fail the registration; the user can
    /// ask for another message through `request_verification`.
    pub async fn register(
        &self,
        request: RegisterRequest,
        client: &ClientContext,
    ) -> Result<UserResponse, AppError> {
        let email = normalize_email(&request.email);

        if let Err(errors) = request.validate() {
            self.registration_failed(&email, "validation failed", client);
            return Err(errors.into());
        }
        if let Err(reason) = validate_password_strength(&request.password) {
            self.registration_failed(&email, &reason, client);
            return Err(AppError::Validation(reason));
        }

        if self.users.find_by_email(&email).await?.is_some() {
            self.registration_failed(&email, "email taken", client);
            return Err(AppError::Conflict("Account already exists".to_string()));
        }
        if self
            .users
            .find_by_username(request.username.trim())
            .await?
            .is_some()
        {
            self.registration_failed(&email, "username taken", client);
            return Err(AppError::Conflict("Username already taken".to_string()));
        }

        let password_hash = self.hash(request.password).await?;
        let role = if self.config.is_admin_email(&email) {
            UserRole::Admin
        } else {
            UserRole::User
        };

        // The store enforces uniqueness too, so a concurrent duplicate still yields 409
        let user = self
            .users
            .create(User::new(&request.username, &email, password_hash, role))
            .await?;

        audit_log(&AuditEvent::RegistrationSuccess {
            user_id: user.id,
            email: user.email.clone(),
            role: user.role.to_string(),
            ip_address: client.ip_address.clone(),
            user_agent: client.user_agent.clone(),
        });

        self.send_verification(&user).await;
        Ok(user.into())
    }

    /// Exchange email and password for a token pair
    pub async fn login(
        &self,
        request: LoginRequest,
        client: &ClientContext,
    ) -> Result<TokenResponse, AppError> {
        let email = normalize_email(&request.email);

        let Some(user) = self.users.find_by_email(&email).await? else {
            self.login_failed(&email, "unknown email", client);
            return Err(AppError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        };

        if !self.check_password(request.password, &user.password_hash).await? {
            self.login_failed(&email, "wrong password", client);
            return Err(AppError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        }

        if !user.is_active {
            self.login_failed(&email, "account disabled", client);
            return Err(AppError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        }

        if self.config.require_verified_login && !user.is_verified {
            self.login_failed(&email, "email not verified", client);
            return Err(AuthError::AccountUnverified.into());
        }

        let pair = self.tokens.issue_pair(user.id).map_err(AuthError::from)?;

        audit_log(&AuditEvent::LoginSuccess {
            user_id: user.id,
            email: user.email,
            ip_address: client.ip_address.clone(),
            user_agent: client.user_agent.clone(),
        });

        Ok(pair.into())
    }

    /// Rotate a refresh token.
    ///
    /// The presented refresh token is revoked and the user's cached identity
    /// is dropped, so the new access token always starts from store state.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        client: &ClientContext,
    ) -> Result<TokenResponse, AppError> {
        let verified = self
            .tokens
            .verify_kind(refresh_token, TokenKind::Refresh)
            .map_err(AuthError::from)?;

        let user_id = verified.user_id().map_err(AuthError::from)?;
        if !self.claim(&verified).await {
            return Err(AuthError::unauthenticated("refresh token revoked").into());
        }

        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| AuthError::unauthenticated("unknown or disabled account"))?;

        self.lookup.invalidate(user.id).await;

        let pair = self.tokens.issue_pair(user.id).map_err(AuthError::from)?;

        audit_log(&AuditEvent::TokenRefresh {
            user_id: user.id,
            ip_address: client.ip_address.clone(),
        });

        Ok(pair.into())
    }

    /// Revoke the presented access token and, when given, a refresh token
    /// belonging to the same user.
    pub async fn logout(
        &self,
        user: &AuthenticatedUser,
        refresh_token: Option<&str>,
        client: &ClientContext,
    ) -> Result<(), AppError> {
        self.revoked.revoke(&user.jti, user.token_remaining()).await;

        let mut refresh_revoked = false;
        if let Some(token) = refresh_token {
            let verified = self
                .tokens
                .verify_kind(token, TokenKind::Refresh)
                .map_err(AuthError::from)?;
            if verified.user_id().ok() != Some(user.id()) {
                return Err(AppError::BadRequest(
                    "Refresh token belongs to another account".to_string(),
                ));
            }
            self.revoke(&verified).await;
            refresh_revoked = true;
        }

        self.lookup.invalidate(user.id()).await;

        audit_log(&AuditEvent::Logout {
            user_id: user.id(),
            email: user.identity.email.clone(),
            ip_address: client.ip_address.clone(),
            refresh_revoked,
        });
        Ok(())
    }

    /// Mark the account named by an email verification token as verified
    pub async fn confirm_email(&self, token: &str) -> Result<(), AppError> {
        let verified = self
            .tokens
            .verify_kind(token, TokenKind::EmailVerification)
            .map_err(|_| AppError::BadRequest("Verification error".to_string()))?;

        let user = self
            .users
            .find_by_email(&verified.subject)
            .await?
            .ok_or_else(|| AppError::BadRequest("Verification error".to_string()))?;

        if user.is_verified {
            return Ok(());
        }

        self.users.set_verified(user.id).await?;
        self.lookup.invalidate(user.id).await;

        audit_log(&AuditEvent::EmailVerified {
            user_id: user.id,
            email: user.email,
        });
        Ok(())
    }

    /// Send a fresh verification email.
    ///
    /// The outcome does not reveal whether the address is registered.
    pub async fn request_verification(&self, email: &str) -> Result<(), AppError> {
        let email = normalize_email(email);
        match self.users.find_by_email(&email).await? {
            Some(user) if !user.is_verified => self.send_verification(&user).await,
            Some(_) => tracing::debug!(%email, "verification requested for verified account"),
            None => tracing::debug!(%email, "verification requested for unknown email"),
        }
        Ok(())
    }

    /// Email a password reset link.
    ///
    /// Always succeeds from the caller's point of view.
    pub async fn forgot_password(&self, email: &str) -> Result<(), AppError> {
        let email = normalize_email(email);
        let Some(user) = self.users.find_by_email(&email).await? else {
            tracing::debug!(%email, "password reset requested for unknown email");
            return Ok(());
        };
        if !user.is_active {
            return Ok(());
        }

        let token = self.tokens.issue(&user.email, TokenKind::PasswordReset).map_err(AuthError::from)?;
        let message = EmailMessage::password_reset(
            &self.public_base_url,
            &user.email,
            &user.username,
            &token.token,
        );
        if let Err(e) = self.mailer.send(message).await {
            tracing::warn!(error = %e, user_id = %user.id, "failed to send password reset email");
        }
        Ok(())
    }

    /// Set a new password from a reset token. Each token works once.
    pub async fn reset_password(&self, request: ResetPasswordRequest) -> Result<(), AppError> {
        request.validate()?;
        validate_password_strength(&request.new_password).map_err(AppError::Validation)?;

        let verified = self
            .tokens
            .verify_kind(&request.token, TokenKind::PasswordReset)
            .map_err(|_| AppError::BadRequest("Invalid or expired reset token".to_string()))?;

        if !self.claim(&verified).await {
            return Err(AppError::BadRequest(
                "Invalid or expired reset token".to_string(),
            ));
        }

        let user = self
            .users
            .find_by_email(&verified.subject)
            .await?
            .ok_or_else(|| AppError::BadRequest("Invalid or expired reset token".to_string()))?;

        let password_hash = self.hash(request.new_password).await?;
        self.users.update_password(user.id, &password_hash).await?;
        self.lookup.invalidate(user.id).await;

        audit_log(&AuditEvent::PasswordReset {
            user_id: user.id,
            email: user.email,
        });
        Ok(())
    }

    /// Change the caller's password after re-checking the current one
    pub async fn change_password(
        &self,
        user: &AuthenticatedUser,
        request: ChangePasswordRequest,
        client: &ClientContext,
    ) -> Result<(), AppError> {
        request.validate()?;
        validate_password_strength(&request.new_password).map_err(AppError::Validation)?;

        let stored = self
            .users
            .find_by_id(user.id())
            .await?
            .ok_or_else(|| AuthError::unauthenticated("unknown account"))?;

        if !self
            .check_password(request.current_password, &stored.password_hash)
            .await?
        {
            return Err(AppError::Unauthorized(
                "Current password is incorrect".to_string(),
            ));
        }

        let password_hash = self.hash(request.new_password).await?;
        self.users.update_password(stored.id, &password_hash).await?;
        self.lookup.invalidate(stored.id).await;

        audit_log(&AuditEvent::PasswordChange {
            user_id: stored.id,
            email: stored.email,
            ip_address: client.ip_address.clone(),
        });
        Ok(())
    }

    async fn send_verification(&self, user: &User) {
        let token = match self.tokens.issue(&user.email, TokenKind::EmailVerification) {
            Ok(token) => token,
            Err(e) => {
                tracing::error!(error = %e, user_id = %user.id, "failed to issue verification token");
                return;
            }
        };
        let message = EmailMessage::verification(
            &self.public_base_url,
            &user.email,
            &user.username,
            &token.token,
        );
        if let Err(e) = self.mailer.send(message).await {
            tracing::warn!(error = %e, user_id = %user.id, "failed to send verification email");
        }
    }

    /// Consume a single-use token before any work is done with it
    async fn claim(&self, token: &VerifiedToken) -> bool {
        self.revoked
            .try_claim(&token.jti, Duration::from_secs(token.remaining_secs()))
            .await
    }

    async fn revoke(&self, token: &VerifiedToken) {
        self.revoked
            .revoke(&token.jti, Duration::from_secs(token.remaining_secs()))
            .await;
    }

    /// Argon2 is CPU bound, keep it off the async workers
    async fn hash(&self, password: String) -> Result<String, AppError> {
        let config = self.passwords;
        let hash = tokio::task::spawn_blocking(move || hash_password(&password, &config))
            .await
            .map_err(|e| AppError::Internal(format!("Hashing task failed: {e}")))??;
        Ok(hash)
    }

    async fn check_password(&self, password: String, hash: &str) -> Result<bool, AppError> {
        let hash = hash.to_string();
        let valid = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| AppError::Internal(format!("Verification task failed: {e}")))??;
        Ok(valid)
    }

    fn login_failed(&self, email: &str, reason: &str, client: &ClientContext) {
        audit_log(&AuditEvent::LoginFailure {
            email: email.to_string(),
            reason: reason.to_string(),
            ip_address: client.ip_address.clone(),
            user_agent: client.user_agent.clone(),
        });
    }

    fn registration_failed(&self, email: &str, reason: &str, client: &ClientContext) {
        audit_log(&AuditEvent::RegistrationFailure {
            email: email.to_string(),
            reason: reason.to_string(),
            ip_address: client.ip_address.clone(),
        });
    }
}
