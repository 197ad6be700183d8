//! In-memory storage backend
//!
//! Implements both [`CredentialStore`] and [`ContactStore`] on top of
//! `tokio::sync::RwLock`-guarded maps. Used by tests and for running the
//! server without a database.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::store::{ContactStore, CredentialStore};
use crate::{
    normalize_email, Contact, ContactDraft, ContactFilter, ContactsError, Result, User, UserRole,
};

/// Process-local store for users and contacts
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<Uuid, User>>,
    contacts: RwLock<HashMap<Uuid, Contact>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn modify_user<F>(&self, id: Uuid, f: F) -> Result<User>
    where
        F: FnOnce(&mut User),
    {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(&id)
            .ok_or_else(|| ContactsError::NotFound(format!("user {id}")))?;
        f(user);
        user.updated_at = Utc::now();
        Ok(user.clone())
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let email = normalize_email(email);
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.username == username).cloned())
    }

    async fn create(&self, mut user: User) -> Result<User> {
        user.email = normalize_email(&user.email);

        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == user.email) {
            return Err(ContactsError::Conflict("email already registered".into()));
        }
        if users.values().any(|u| u.username == user.username) {
            return Err(ContactsError::Conflict("username already taken".into()));
        }
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<()> {
        self.modify_user(id, |u| u.password_hash = password_hash.to_string())
            .await
            .map(|_| ())
    }

    async fn set_verified(&self, id: Uuid) -> Result<()> {
        self.modify_user(id, |u| u.is_verified = true).await.map(|_| ())
    }

    async fn update_avatar(&self, id: Uuid, avatar_url: &str) -> Result<User> {
        self.modify_user(id, |u| u.avatar_url = Some(avatar_url.to_string()))
            .await
    }

    async fn set_role(&self, id: Uuid, role: UserRole) -> Result<User> {
        self.modify_user(id, |u| u.role = role).await
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<User> {
        self.modify_user(id, |u| u.is_active = active).await
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl ContactStore for MemoryStore {
    async fn list(&self, owner_id: Uuid, filter: &ContactFilter) -> Result<Vec<Contact>> {
        let contacts = self.contacts.read().await;
        let mut owned: Vec<Contact> = contacts
            .values()
            .filter(|c| c.owner_id == owner_id && c.matches(filter))
            .cloned()
            .collect();
        owned.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        Ok(owned
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.page_size() as usize)
            .collect())
    }

    async fn get(&self, owner_id: Uuid, id: Uuid) -> Result<Option<Contact>> {
        let contacts = self.contacts.read().await;
        Ok(contacts
            .get(&id)
            .filter(|c| c.owner_id == owner_id)
            .cloned())
    }

    async fn create(&self, owner_id: Uuid, draft: ContactDraft) -> Result<Contact> {
        let contact = Contact::from_draft(owner_id, draft);

        let mut contacts = self.contacts.write().await;
        if contacts
            .values()
            .any(|c| c.owner_id == owner_id && c.email == contact.email)
        {
            return Err(ContactsError::Conflict(
                "a contact with this email already exists".into(),
            ));
        }
        contacts.insert(contact.id, contact.clone());
        Ok(contact)
    }

    async fn update(
        &self,
        owner_id: Uuid,
        id: Uuid,
        draft: ContactDraft,
    ) -> Result<Option<Contact>> {
        let mut contacts = self.contacts.write().await;

        let email = normalize_email(&draft.email);
        if contacts
            .values()
            .any(|c| c.owner_id == owner_id && c.id != id && c.email == email)
        {
            return Err(ContactsError::Conflict(
                "a contact with this email already exists".into(),
            ));
        }

        match contacts.get_mut(&id).filter(|c| c.owner_id == owner_id) {
            Some(contact) => {
                contact.apply(draft);
                Ok(Some(contact.clone()))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, owner_id: Uuid, id: Uuid) -> Result<Option<Contact>> {
        let mut contacts = self.contacts.write().await;
        if contacts.get(&id).is_some_and(|c| c.owner_id == owner_id) {
            Ok(contacts.remove(&id))
        } else {
            Ok(None)
        }
    }

    async fn upcoming_birthdays(
        &self,
        owner_id: Uuid,
        today: NaiveDate,
        days: i64,
    ) -> Result<Vec<Contact>> {
        let contacts = self.contacts.read().await;
        let mut upcoming: Vec<Contact> = contacts
            .values()
            .filter(|c| c.owner_id == owner_id && c.birthday_within(today, days))
            .cloned()
            .collect();
        upcoming.sort_by_key(|c| c.next_birthday(today));
        Ok(upcoming)
    }
}
