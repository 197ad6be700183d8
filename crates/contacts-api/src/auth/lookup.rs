//! Identity resolution for verified tokens
//!
//! [`CacheBackedLookup`] goes through the [`SessionCache`] first and falls back
//! to the credential store; [`DirectLookup`] always asks the store. Both
//! return the same identity for the same user, so the cache can be turned
//! off without changing behavior.

use async_trait::async_trait;
use contacts_core::{CredentialStore, Identity, Result};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::session_cache::SessionCache;

#[async_trait]
pub trait IdentityLookup: Send + Sync {
    /// Resolve `user_id`. `max_ttl` bounds how long the result may be cached,
    /// normally the remaining lifetime of the presented token.
    async fn resolve(&self, user_id: Uuid, max_ttl: Duration) -> Result<Option<Identity>>;

    /// Forget anything remembered about `user_id`
    async fn invalidate(&self, user_id: Uuid);
}

/// Store-only lookup
pub struct DirectLookup {
    store: Arc<dyn CredentialStore>,
}

impl DirectLookup {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl IdentityLookup for DirectLookup {
    async fn resolve(&self, user_id: Uuid, _max_ttl: Duration) -> Result<Option<Identity>> {
        Ok(self.store.find_by_id(user_id).await?.map(|u| u.identity()))
    }

    async fn invalidate(&self, _user_id: Uuid) {}
}

/// Cache-then-store lookup
pub struct CacheBackedLookup {
    cache: Arc<SessionCache>,
    store: Arc<dyn CredentialStore>,
}

impl CacheBackedLookup {
    pub fn new(cache: Arc<SessionCache>, store: Arc<dyn CredentialStore>) -> Self {
        Self { cache, store }
    }
}

#[async_trait]
impl IdentityLookup for CacheBackedLookup {
    async fn resolve(&self, user_id: Uuid, max_ttl: Duration) -> Result<Option<Identity>> {
        if let Some(identity) = self.cache.get(user_id).await {
            return Ok(Some(identity));
        }

        let stamp = self.cache.stamp(user_id);
        let Some(user) = self.store.find_by_id(user_id).await? else {
            return Ok(None);
        };

        let identity = user.identity();
        if !self
            .cache
            .put(user_id, identity.clone(), max_ttl, stamp)
            .await
        {
            tracing::debug!(%user_id, "identity not cached");
        }
        Ok(Some(identity))
    }

    async fn invalidate(&self, user_id: Uuid) {
        self.cache.invalidate(user_id).await;
    }
}
