//! Authentication API handlers
//!
//! Registration, login, token rotation, logout, email confirmation and
//! password reset. Login and registration are rate limited per client.
//!
//! Author: hephaex@gmail.com

use super::client_context;
use crate::auth::{
    AuthenticatedUser, EmailRequest, LoginRequest, LogoutRequest, MessageResponse,
    RefreshRequest, RegisterRequest, ResetPasswordRequest,
};
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use std::net::SocketAddr;
use std::sync::Arc;
use validator::Validate;

/// Register a new user account
///
/// The account starts unverified; a confirmation link is emailed to the
/// given address. Addresses listed in `ADMIN_EMAILS` get the admin role.
#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered successfully", body = UserResponse),
        (status = 409, description = "Email or username already in use", body = crate::error::ApiError),
        (status = 422, description = "Invalid input", body = crate::error::ApiError),
        (status = 429, description = "Too many registrations", body = crate::error::ApiError),
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(request): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let client = client_context(&headers, peer);
    let user = state.auth.register(request, &client).await?;

    Ok((StatusCode::CREATED, Json(user)))
}

/// Login with email and password
#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = TokenResponse),
        (status = 401, description = "Invalid credentials", body = crate::error::ApiError),
        (status = 403, description = "Email not verified", body = crate::error::ApiError),
        (status = 429, description = "Too many login attempts", body = crate::error::ApiError),
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(request): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    request.validate()?;
    let client = client_context(&headers, peer);
    let tokens = state.auth.login(request, &client).await?;

    Ok(Json(tokens))
}

/// Refresh access token
///
/// The presented refresh token is revoked and a new pair is issued.
#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    tag = "auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Token refreshed successfully", body = TokenResponse),
        (status = 401, description = "Invalid, expired or revoked refresh token", body = crate::error::ApiError),
    )
)]
pub async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(request): Json<RefreshRequest>,
) -> Result<impl IntoResponse, AppError> {
    let client = client_context(&headers, peer);
    let tokens = state.auth.refresh(&request.refresh_token, &client).await?;

    Ok(Json(tokens))
}

/// Logout current session
///
/// Revokes the presented access token and, if one is sent, the refresh token.
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    tag = "auth",
    request_body(content = LogoutRequest, description = "Refresh token to revoke (optional)"),
    responses(
        (status = 200, description = "Logout successful", body = MessageResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    request: Option<Json<LogoutRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let client = client_context(&headers, peer);
    let request = request.map(|Json(r)| r).unwrap_or_default();
    state
        .auth
        .logout(&user, request.refresh_token.as_deref(), &client)
        .await?;

    Ok(Json(MessageResponse::new("Logged out successfully")))
}

/// Confirm an email address from the emailed link
#[utoipa::path(
    get,
    path = "/api/auth/confirmed_email/{token}",
    tag = "auth",
    params(("token" = String, Path, description = "Email verification token")),
    responses(
        (status = 200, description = "Email confirmed", body = MessageResponse),
        (status = 400, description = "Invalid or expired token", body = crate::error::ApiError),
    )
)]
pub async fn confirm_email_handler(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state.auth.confirm_email(&token).await?;

    Ok(Json(MessageResponse::new("Email confirmed")))
}

/// Send another confirmation email
#[utoipa::path(
    post,
    path = "/api/auth/request_email",
    tag = "auth",
    request_body = EmailRequest,
    responses(
        (status = 200, description = "Request accepted", body = MessageResponse),
        (status = 422, description = "Invalid email", body = crate::error::ApiError),
    )
)]
pub async fn request_email_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<EmailRequest>,
) -> Result<impl IntoResponse, AppError> {
    request.validate()?;
    state.auth.request_verification(&request.email).await?;

    Ok(Json(MessageResponse::new(
        "Check your email for confirmation",
    )))
}

/// Email a password reset link
#[utoipa::path(
    post,
    path = "/api/auth/forgot_password",
    tag = "auth",
    request_body = EmailRequest,
    responses(
        (status = 200, description = "Request accepted", body = MessageResponse),
        (status = 422, description = "Invalid email", body = crate::error::ApiError),
    )
)]
pub async fn forgot_password_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<EmailRequest>,
) -> Result<impl IntoResponse, AppError> {
    request.validate()?;
    state.auth.forgot_password(&request.email).await?;

    Ok(Json(MessageResponse::new(
        "If the account exists, a password reset link has been sent",
    )))
}

/// Set a new password with a reset token
#[utoipa::path(
    post,
    path = "/api/auth/reset_password",
    tag = "auth",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password updated", body = MessageResponse),
        (status = 400, description = "Invalid, expired or used token", body = crate::error::ApiError),
        (status = 422, description = "Weak password", body = crate::error::ApiError),
    )
)]
pub async fn reset_password_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.auth.reset_password(request).await?;

    Ok(Json(MessageResponse::new("Password updated")))
}
