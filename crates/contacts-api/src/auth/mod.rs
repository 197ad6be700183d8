//! Authentication and authorization module
//!
//! - Token issuing and verification (HS256 JWT, four token kinds)
//! - Password hashing with Argon2id
//! - Session cache of resolved identities, with version-stamped invalidation
//! - Revocation list for logged-out and rotated tokens
//! - Middleware enforcing per-route access policies
//! - Authentication service for account flows

pub mod jwt;
pub mod lookup;
pub mod middleware;
pub mod models;
pub mod password;
pub mod revocation;
pub mod service;
pub mod session_cache;

pub use jwt::{Claims, JwtConfig, TokenError, TokenIssuer, TokenKind, TokenPair, VerifiedToken};
pub use lookup::{CacheBackedLookup, DirectLookup, IdentityLookup};
pub use middleware::{
    bearer_token, require_admin, require_user, require_verified, AccessPolicy, AuthError,
    AuthenticatedUser, Authenticator,
};
pub use models::{
    ChangePasswordRequest, EmailRequest, LoginRequest, LogoutRequest, MessageResponse,
    RefreshRequest, RegisterRequest, ResetPasswordRequest, RoleUpdateRequest, TokenResponse,
    UserResponse,
};
pub use password::{hash_password, validate_password_strength, verify_password, PasswordConfig};
pub use revocation::RevocationList;
pub use service::{AuthService, ClientContext};
pub use session_cache::{CacheStats, SessionCache};
