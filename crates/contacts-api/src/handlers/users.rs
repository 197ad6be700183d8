//! Account handlers
//!
//! Profile reads come from the authenticated identity. Every write ends with
//! a session cache invalidation for the affected user, so the next request
//! sees the new state.

use super::client_context;
use crate::audit::{audit_log, AuditEvent};
use crate::auth::{
    AuthenticatedUser, ChangePasswordRequest, MessageResponse, RoleUpdateRequest, UserResponse,
};
use crate::error::AppError;
use crate::services::AvatarUpload;
use crate::state::AppState;
use axum::{
    extract::{ConnectInfo, Multipart, Path, State},
    http::HeaderMap,
    response::IntoResponse,
    Extension, Json,
};
use std::net::SocketAddr;
use std::sync::Arc;
use uuid::Uuid;

/// Get current user profile
#[utoipa::path(
    get,
    path = "/api/users/me",
    tag = "users",
    responses(
        (status = 200, description = "Current user profile", body = UserResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
        (status = 429, description = "Too many requests", body = crate::error::ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn me_handler(Extension(user): Extension<AuthenticatedUser>) -> impl IntoResponse {
    Json(UserResponse::from(user.identity))
}

/// Change the caller's password
#[utoipa::path(
    put,
    path = "/api/users/me/password",
    tag = "users",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 401, description = "Wrong current password", body = crate::error::ApiError),
        (status = 422, description = "Weak password", body = crate::error::ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn change_password_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let client = client_context(&headers, peer);
    state.auth.change_password(&user, request, &client).await?;

    Ok(Json(MessageResponse::new("Password changed")))
}

/// Upload a new avatar for the caller
///
/// Multipart form with a single `file` field holding the image.
#[utoipa::path(
    patch,
    path = "/api/users/avatar",
    tag = "users",
    responses(
        (status = 200, description = "Avatar updated", body = UserResponse),
        (status = 400, description = "Missing or invalid image", body = crate::error::ApiError),
        (status = 403, description = "Admin only", body = crate::error::ApiError),
        (status = 502, description = "Image host failed", body = crate::error::ApiError),
        (status = 503, description = "Image host not configured", body = crate::error::ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn update_avatar_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let content_type = field.content_type().map(str::to_string);
        let file_name = field.file_name().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to read file: {e}")))?;
        upload = Some(AvatarUpload {
            bytes: bytes.to_vec(),
            content_type,
            file_name,
        });
        break;
    }

    let upload = upload.ok_or_else(|| AppError::BadRequest("Missing file field".to_string()))?;
    let url = state
        .avatars
        .upload(&user.identity.username, upload)
        .await?;

    let updated = state.users.update_avatar(user.id(), &url).await?;
    state.lookup.invalidate(user.id()).await;

    Ok(Json(UserResponse::from(updated)))
}

/// Change another account's role
#[utoipa::path(
    patch,
    path = "/api/users/{id}/role",
    tag = "users",
    params(("id" = Uuid, Path, description = "User id")),
    request_body = RoleUpdateRequest,
    responses(
        (status = 200, description = "Role updated", body = UserResponse),
        (status = 403, description = "Admin only", body = crate::error::ApiError),
        (status = 404, description = "User not found", body = crate::error::ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn update_role_handler(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
    Json(request): Json<RoleUpdateRequest>,
) -> Result<impl IntoResponse, AppError> {
    let updated = state.users.set_role(id, request.role).await?;
    state.lookup.invalidate(id).await;

    audit_log(&AuditEvent::RoleChanged {
        user_id: id,
        new_role: updated.role.to_string(),
        changed_by: admin.id(),
    });

    Ok(Json(UserResponse::from(updated)))
}

/// Disable an account
///
/// The account keeps its data but can no longer log in, and tokens already
/// issued to it stop working on the next request.
#[utoipa::path(
    post,
    path = "/api/users/{id}/disable",
    tag = "users",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "Account disabled", body = UserResponse),
        (status = 400, description = "Cannot disable own account", body = crate::error::ApiError),
        (status = 403, description = "Admin only", body = crate::error::ApiError),
        (status = 404, description = "User not found", body = crate::error::ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn disable_user_handler(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    if id == admin.id() {
        return Err(AppError::BadRequest(
            "Cannot disable your own account".to_string(),
        ));
    }

    let updated = state.users.set_active(id, false).await?;
    state.lookup.invalidate(id).await;

    audit_log(&AuditEvent::AccountDisabled {
        user_id: id,
        disabled_by: admin.id(),
    });

    Ok(Json(UserResponse::from(updated)))
}
