//! Request and response bodies for account endpoints

use super::jwt::TokenPair;
use super::password::{MAX_PASSWORD_LEN, MIN_PASSWORD_LEN};
use contacts_core::{Identity, User, UserRole};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Account registration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 32))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = "MIN_PASSWORD_LEN", max = "MAX_PASSWORD_LEN"))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Logout; the refresh token is revoked as well when given
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct LogoutRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Email address for verification resend and password reset requests
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct EmailRequest {
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ResetPasswordRequest {
    pub token: String,
    #[validate(length(min = "MIN_PASSWORD_LEN", max = "MAX_PASSWORD_LEN"))]
    pub new_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    #[validate(length(min = "MIN_PASSWORD_LEN", max = "MAX_PASSWORD_LEN"))]
    pub new_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RoleUpdateRequest {
    pub role: UserRole,
}

/// Token pair returned by login and refresh
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Always `bearer`
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
}

impl From<TokenPair> for TokenResponse {
    fn from(pair: TokenPair) -> Self {
        Self {
            access_token: pair.access.token,
            refresh_token: pair.refresh.token,
            token_type: "bearer".to_string(),
            expires_in: pair.expires_in,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Public view of an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: UserRole,
    pub is_verified: bool,
    pub is_active: bool,
    pub avatar_url: Option<String>,
}

impl From<Identity> for UserResponse {
    fn from(identity: Identity) -> Self {
        Self {
            id: identity.id,
            username: identity.username,
            email: identity.email,
            role: identity.role,
            is_verified: identity.is_verified,
            is_active: identity.is_active,
            avatar_url: identity.avatar_url,
        }
    }
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        user.identity().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_validation() {
        let ok = RegisterRequest {
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password: "Secret123".to_string(),
        };
        assert!(ok.validate().is_ok());

        let bad = RegisterRequest {
            username: "al".to_string(),
            email: "not-an-email".to_string(),
            password: "short".to_string(),
        };
        let errors = bad.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("username"));
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("password"));
    }

    #[test]
    fn test_password_length_bounds() {
        let request = |len: usize| ResetPasswordRequest {
            token: "t".to_string(),
            new_password: "a1".repeat(len / 2) + &"b".repeat(len % 2),
        };
        assert!(request(MIN_PASSWORD_LEN as usize - 1).validate().is_err());
        assert!(request(MIN_PASSWORD_LEN as usize).validate().is_ok());
        assert!(request(MAX_PASSWORD_LEN as usize).validate().is_ok());
        assert!(request(MAX_PASSWORD_LEN as usize + 1).validate().is_err());

        let change = ChangePasswordRequest {
            current_password: "whatever".to_string(),
            new_password: "x".repeat(MAX_PASSWORD_LEN as usize + 1),
        };
        assert!(change.validate().is_err());
    }

    #[test]
    fn test_user_response_hides_password() {
        let user = User::new("bob", "bob@example.com", "phc-hash".into(), UserRole::User);
        let json = serde_json::to_string(&UserResponse::from(user)).unwrap();
        assert!(!json.contains("phc-hash"));
        assert!(json.contains("\"role\":\"user\""));
    }
}
