//! Application state management
//!
//! Author: hephaex@gmail.com

use crate::auth::{
    AuthService, Authenticator, CacheBackedLookup, DirectLookup, IdentityLookup, JwtConfig,
    RevocationList, SessionCache, TokenIssuer,
};
use crate::metrics::Metrics;
use crate::middleware::RateLimiters;
use crate::services::{AvatarStore, Mailer, MemoryAvatarStore, OutboxMailer};
use contacts_core::{AppConfig, ContactStore, CredentialStore, MemoryStore};
use std::sync::Arc;
use std::time::Instant;

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    pub users: Arc<dyn CredentialStore>,
    pub contacts: Arc<dyn ContactStore>,
    pub tokens: Arc<TokenIssuer>,
    /// Identity cache; a disabled cache when caching is turned off
    pub sessions: Arc<SessionCache>,
    pub lookup: Arc<dyn IdentityLookup>,
    pub revoked: Arc<RevocationList>,
    pub authenticator: Authenticator,
    pub auth: AuthService,
    pub avatars: Arc<dyn AvatarStore>,
    pub limiters: RateLimiters,
    pub metrics: Metrics,
    /// Server start time
    pub start_time: Instant,
}

impl AppState {
    /// Wire every component from `config`.
    ///
    /// `store` backs both accounts and contacts.
    pub fn new<S>(
        config: AppConfig,
        store: Arc<S>,
        mailer: Arc<dyn Mailer>,
        avatars: Arc<dyn AvatarStore>,
    ) -> Result<Self, prometheus::Error>
    where
        S: CredentialStore + ContactStore + 'static,
    {
        let users: Arc<dyn CredentialStore> = store.clone();
        let contacts: Arc<dyn ContactStore> = store;

        let tokens = Arc::new(TokenIssuer::new(JwtConfig::from(&config.auth)));
        let revoked = Arc::new(RevocationList::default());

        let (sessions, lookup): (Arc<SessionCache>, Arc<dyn IdentityLookup>) =
            if config.cache.enabled {
                let sessions = Arc::new(SessionCache::new(&config.cache));
                let lookup = Arc::new(CacheBackedLookup::new(
                    Arc::clone(&sessions),
                    Arc::clone(&users),
                ));
                (sessions, lookup)
            } else {
                (
                    Arc::new(SessionCache::disabled()),
                    Arc::new(DirectLookup::new(Arc::clone(&users))),
                )
            };

        let authenticator = Authenticator::new(
            Arc::clone(&tokens),
            Arc::clone(&lookup),
            Arc::clone(&revoked),
        );
        let auth = AuthService::new(
            Arc::clone(&users),
            Arc::clone(&tokens),
            Arc::clone(&lookup),
            Arc::clone(&revoked),
            mailer,
            config.auth.clone(),
            config.server.public_base_url.clone(),
        );

        let limiters = RateLimiters::new(&config.rate_limit);

        Ok(Self {
            users,
            contacts,
            tokens,
            sessions,
            lookup,
            revoked,
            authenticator,
            auth,
            avatars,
            limiters,
            metrics: Metrics::new()?,
            start_time: Instant::now(),
            config,
        })
    }

    /// In-memory state for tests and local runs without a database.
    ///
    /// Returns the outbox so callers can read sent emails.
    pub fn in_memory(config: AppConfig) -> Result<(Self, Arc<OutboxMailer>), prometheus::Error> {
        let outbox = Arc::new(OutboxMailer::new());
        let state = Self::new(
            config,
            Arc::new(MemoryStore::new()),
            outbox.clone(),
            Arc::new(MemoryAvatarStore::new()),
        )?;
        Ok((state, outbox))
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
