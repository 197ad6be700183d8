//! Revoked token ids
//!
//! Logout and refresh rotation revoke tokens by `jti`. Each entry lives only
//! as long as the token it revokes could still verify, which bounds memory
//! without a cleanup task.

use moka::future::Cache;
use std::time::{Duration, Instant};

/// Entry value is the instant the revoked token expires
struct RevocationExpiry;

impl moka::Expiry<String, Instant> for RevocationExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Instant,
        created_at: Instant,
    ) -> Option<Duration> {
        Some(value.saturating_duration_since(created_at))
    }
}

pub struct RevocationList {
    revoked: Cache<String, Instant>,
}

impl RevocationList {
    pub fn new(max_capacity: u64) -> Self {
        let revoked = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(RevocationExpiry)
            .build();
        Self { revoked }
    }

    /// Revoke `jti` for the `remaining` lifetime of its token
    pub async fn revoke(&self, jti: &str, remaining: Duration) {
        if remaining.is_zero() {
            // Already expired, verification rejects it anyway
            return;
        }
        self.revoked
            .insert(jti.to_owned(), Instant::now() + remaining)
            .await;
    }

    /// Atomically mark `jti` as used. Returns `false` when it was already
    /// revoked or claimed, so only one caller can consume a single-use token.
    pub async fn try_claim(&self, jti: &str, remaining: Duration) -> bool {
        if remaining.is_zero() {
            return false;
        }
        self.revoked
            .entry(jti.to_owned())
            .or_insert(Instant::now() + remaining)
            .await
            .is_fresh()
    }

    pub fn is_revoked(&self, jti: &str) -> bool {
        self.revoked.contains_key(jti)
    }
}

impl Default for RevocationList {
    fn default() -> Self {
        Self::new(100_000)
    }
}
