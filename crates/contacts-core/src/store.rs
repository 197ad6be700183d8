//! Storage traits
//!
//! The API layer only talks to persistence through these traits, so the
//! PostgreSQL backend and the in-memory backend are interchangeable.

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::{Contact, ContactDraft, ContactFilter, Result, User, UserRole};

/// Persisted user accounts
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up by email, case-insensitively
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;

    async fn find_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Insert a new account. Fails with `Conflict` on a duplicate email or username.
    async fn create(&self, user: User) -> Result<User>;

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<()>;

    async fn set_verified(&self, id: Uuid) -> Result<()>;

    async fn update_avatar(&self, id: Uuid, avatar_url: &str) -> Result<User>;

    async fn set_role(&self, id: Uuid, role: UserRole) -> Result<User>;

    /// Soft enable/disable; accounts are never deleted
    async fn set_active(&self, id: Uuid, active: bool) -> Result<User>;

    /// Cheap connectivity probe for readiness checks
    async fn health_check(&self) -> Result<()>;
}

/// Contacts owned by users. Every operation is scoped to `owner_id`.
#[async_trait]
pub trait ContactStore: Send + Sync {
    async fn list(&self, owner_id: Uuid, filter: &ContactFilter) -> Result<Vec<Contact>>;

    async fn get(&self, owner_id: Uuid, id: Uuid) -> Result<Option<Contact>>;

    /// Fails with `Conflict` when the owner already has a contact with this email.
    async fn create(&self, owner_id: Uuid, draft: ContactDraft) -> Result<Contact>;

    async fn update(&self, owner_id: Uuid, id: Uuid, draft: ContactDraft)
        -> Result<Option<Contact>>;

    /// Returns the removed contact, if it existed
    async fn delete(&self, owner_id: Uuid, id: Uuid) -> Result<Option<Contact>>;

    /// Contacts whose next birthday is within `days` of `today`
    async fn upcoming_birthdays(
        &self,
        owner_id: Uuid,
        today: NaiveDate,
        days: i64,
    ) -> Result<Vec<Contact>>;
}
