//! Contact handlers
//!
//! All routes require a verified account and only ever touch the caller's
//! own contacts.

use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::Utc;
use contacts_core::contact::UPCOMING_BIRTHDAY_DAYS;
use contacts_core::{ContactDraft, ContactFilter};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// List contacts
#[utoipa::path(
    get,
    path = "/api/contacts",
    tag = "contacts",
    params(ContactFilter),
    responses(
        (status = 200, description = "Contacts page", body = [Contact]),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
        (status = 403, description = "Email not verified", body = crate::error::ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_contacts(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(filter): Query<ContactFilter>,
) -> Result<impl IntoResponse, AppError> {
    let contacts = state.contacts.list(user.id(), &filter).await?;
    Ok(Json(contacts))
}

/// Contacts with a birthday in the next seven days
#[utoipa::path(
    get,
    path = "/api/contacts/birthdays",
    tag = "contacts",
    responses(
        (status = 200, description = "Upcoming birthdays", body = [Contact]),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn upcoming_birthdays(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<impl IntoResponse, AppError> {
    let today = Utc::now().date_naive();
    let contacts = state
        .contacts
        .upcoming_birthdays(user.id(), today, UPCOMING_BIRTHDAY_DAYS)
        .await?;
    Ok(Json(contacts))
}

/// Get a contact by id
#[utoipa::path(
    get,
    path = "/api/contacts/{id}",
    tag = "contacts",
    params(("id" = Uuid, Path, description = "Contact id")),
    responses(
        (status = 200, description = "Contact", body = Contact),
        (status = 404, description = "Contact not found", body = crate::error::ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_contact(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let contact = state
        .contacts
        .get(user.id(), id)
        .await?
        .ok_or_else(|| AppError::NotFound("Contact".to_string()))?;
    Ok(Json(contact))
}

/// Create a contact
#[utoipa::path(
    post,
    path = "/api/contacts",
    tag = "contacts",
    request_body = ContactDraft,
    responses(
        (status = 201, description = "Contact created", body = Contact),
        (status = 409, description = "Contact with this email exists", body = crate::error::ApiError),
        (status = 422, description = "Invalid input", body = crate::error::ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn create_contact(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(draft): Json<ContactDraft>,
) -> Result<impl IntoResponse, AppError> {
    draft.validate()?;
    let contact = state.contacts.create(user.id(), draft).await?;

    tracing::debug!(contact_id = %contact.id, owner_id = %user.id(), "contact created");
    Ok((StatusCode::CREATED, Json(contact)))
}

/// Replace a contact
#[utoipa::path(
    put,
    path = "/api/contacts/{id}",
    tag = "contacts",
    params(("id" = Uuid, Path, description = "Contact id")),
    request_body = ContactDraft,
    responses(
        (status = 200, description = "Contact updated", body = Contact),
        (status = 404, description = "Contact not found", body = crate::error::ApiError),
        (status = 422, description = "Invalid input", body = crate::error::ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn update_contact(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
    Json(draft): Json<ContactDraft>,
) -> Result<impl IntoResponse, AppError> {
    draft.validate()?;
    let contact = state
        .contacts
        .update(user.id(), id, draft)
        .await?
        .ok_or_else(|| AppError::NotFound("Contact".to_string()))?;
    Ok(Json(contact))
}

/// Delete a contact, returning it
#[utoipa::path(
    delete,
    path = "/api/contacts/{id}",
    tag = "contacts",
    params(("id" = Uuid, Path, description = "Contact id")),
    responses(
        (status = 200, description = "Contact deleted", body = Contact),
        (status = 404, description = "Contact not found", body = crate::error::ApiError),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn delete_contact(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let contact = state
        .contacts
        .delete(user.id(), id)
        .await?
        .ok_or_else(|| AppError::NotFound("Contact".to_string()))?;
    Ok(Json(contact))
}
