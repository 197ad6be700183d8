//! Session cache for resolved identities
//!
//! Maps a user id to the [`Identity`] last read from the credential store so
//! that authenticated requests do not hit the store every time.
//!
//! Ordering between populate and invalidate is kept with version stamps
//! drawn from one monotonic generation counter:
//!
//! 1. a reader takes [`SessionCache::stamp`] *before* reading the store;
//! 2. [`SessionCache::invalidate`] records a new generation for the user and
//!    then drops the entry;
//! 3. [`SessionCache::put`] refuses a stamp older than the user's last
//!    invalidation, and [`SessionCache::get`] ignores such an entry.
//!
//! A populate that races with an invalidation can therefore still land in
//! the map, but it is never served.
//!
//! Invalidation records are kept for the cache TTL plus [`LOOKUP_GRACE`].
//! After that every entry they could shadow has expired, so they are pruned
//! and the map does not grow with the number of users ever invalidated.

use contacts_core::{CacheConfig, Identity};
use moka::future::Cache;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct CachedIdentity {
    identity: Identity,
    stamp: u64,
    ttl: Duration,
}

/// Upper bound on a store read between taking a stamp and calling `put`
pub const LOOKUP_GRACE: Duration = Duration::from_secs(60);

/// Invalidation records are swept once the map grows past this many users
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Debug, Clone, Copy)]
struct Invalidation {
    generation: u64,
    at: Instant,
}

/// Per-entry lifetime, set when the entry is written
struct IdentityExpiry;

impl moka::Expiry<Uuid, CachedIdentity> for IdentityExpiry {
    fn expire_after_create(
        &self,
        _key: &Uuid,
        value: &CachedIdentity,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &Uuid,
        value: &CachedIdentity,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Hit/miss counters
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    invalidations: AtomicU64,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn invalidations(&self) -> u64 {
        self.invalidations.load(Ordering::Relaxed)
    }

    /// Hit rate (0.0 - 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses();
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }
}

/// Identity cache keyed by user id
pub struct SessionCache {
    /// `None` when caching is disabled: every `get` misses
    entries: Option<Cache<Uuid, CachedIdentity>>,
    generation: AtomicU64,
    invalidated: Mutex<HashMap<Uuid, Invalidation>>,
    max_ttl: Duration,
    stats: CacheStats,
}

impl SessionCache {
    pub fn new(config: &CacheConfig) -> Self {
        if !config.enabled {
            return Self::disabled();
        }

        let entries = Cache::builder()
            .max_capacity(config.max_entries)
            .expire_after(IdentityExpiry)
            .build();

        Self {
            entries: Some(entries),
            generation: AtomicU64::new(0),
            invalidated: Mutex::new(HashMap::new()),
            max_ttl: Duration::from_secs(config.ttl_secs),
            stats: CacheStats::default(),
        }
    }

    /// A cache that never stores anything
    pub fn disabled() -> Self {
        Self {
            entries: None,
            generation: AtomicU64::new(0),
            invalidated: Mutex::new(HashMap::new()),
            max_ttl: Duration::ZERO,
            stats: CacheStats::default(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.entries.is_some()
    }

    /// Stamp for a populate of `key`; take it before reading the store
    pub fn stamp(&self, _key: Uuid) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Whether `stamp` was taken before the last invalidation of `key`
    fn is_stale(&self, key: Uuid, stamp: u64) -> bool {
        self.invalidated
            .lock()
            .get(&key)
            .is_some_and(|inv| stamp < inv.generation)
    }

    fn retention(&self) -> Duration {
        self.max_ttl + LOOKUP_GRACE
    }

    pub async fn get(&self, key: Uuid) -> Option<Identity> {
        let cached = match &self.entries {
            Some(entries) => entries.get(&key).await,
            None => None,
        };

        match cached {
            Some(entry) if !self.is_stale(key, entry.stamp) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.identity)
            }
            _ => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store `identity` under `key` for at most `ttl` (capped by the
    /// configured cache TTL).
    ///
    /// Returns `false` when nothing was stored: caching disabled, zero TTL,
    /// or `stamp` outdated by an invalidation since it was taken.
    pub async fn put(&self, key: Uuid, identity: Identity, ttl: Duration, stamp: u64) -> bool {
        let Some(entries) = &self.entries else {
            return false;
        };

        let ttl = ttl.min(self.max_ttl);
        if ttl.is_zero() || self.is_stale(key, stamp) {
            return false;
        }

        entries
            .insert(
                key,
                CachedIdentity {
                    identity,
                    stamp,
                    ttl,
                },
            )
            .await;
        self.stats.writes.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Drop the entry for `key`. Every `get` that starts after the version
    /// bump misses, whichever task calls it.
    pub async fn invalidate(&self, key: Uuid) {
        self.record_invalidation(key, Instant::now());
        if let Some(entries) = &self.entries {
            entries.invalidate(&key).await;
        }
        self.stats.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    fn record_invalidation(&self, key: Uuid, now: Instant) {
        let mut invalidated = self.invalidated.lock();
        if invalidated.len() >= PRUNE_THRESHOLD {
            let retention = self.retention();
            invalidated.retain(|_, inv| now.saturating_duration_since(inv.at) < retention);
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        invalidated.insert(key, Invalidation { generation, at: now });
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn entry_count(&self) -> u64 {
        self.entries.as_ref().map_or(0, |e| e.entry_count())
    }

    #[cfg(test)]
    fn tracked_invalidations(&self) -> usize {
        self.invalidated.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contacts_core::UserRole;
    use std::sync::Arc;

    fn identity(id: Uuid) -> Identity {
        Identity {
            id,
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            is_verified: true,
            role: UserRole::User,
            avatar_url: None,
            is_active: true,
        }
    }

    fn cache() -> SessionCache {
        SessionCache::new(&CacheConfig {
            enabled: true,
            ttl_secs: 60,
            max_entries: 100,
        })
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let cache = cache();
        let id = Uuid::new_v4();

        assert!(cache.get(id).await.is_none());
        let stamp = cache.stamp(id);
        assert!(cache.put(id, identity(id), Duration::from_secs(30), stamp).await);
        assert_eq!(cache.get(id).await, Some(identity(id)));

        assert_eq!(cache.stats().hits(), 1);
        assert_eq!(cache.stats().misses(), 1);
        assert_eq!(cache.stats().writes(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_is_visible_to_other_tasks() {
        let cache = Arc::new(cache());
        let id = Uuid::new_v4();
        cache
            .put(id, identity(id), Duration::from_secs(30), cache.stamp(id))
            .await;

        cache.invalidate(id).await;

        let other = Arc::clone(&cache);
        let seen = tokio::spawn(async move { other.get(id).await }).await.unwrap();
        assert!(seen.is_none());
        assert!(cache.get(id).await.is_none());
    }

    #[tokio::test]
    async fn test_stale_stamp_is_refused() {
        let cache = cache();
        let id = Uuid::new_v4();

        // Reader takes its stamp, then an invalidation lands before it populates
        let stamp = cache.stamp(id);
        cache.invalidate(id).await;

        assert!(!cache.put(id, identity(id), Duration::from_secs(30), stamp).await);
        assert!(cache.get(id).await.is_none());

        // A fresh stamp works again
        let fresh = cache.stamp(id);
        assert!(fresh > stamp);
        assert!(cache.put(id, identity(id), Duration::from_secs(30), fresh).await);
        assert!(cache.get(id).await.is_some());
    }

    #[tokio::test]
    async fn test_entry_from_before_invalidation_is_not_served() {
        let cache = cache();
        let id = Uuid::new_v4();
        let stamp = cache.stamp(id);
        cache.put(id, identity(id), Duration::from_secs(30), stamp).await;

        // Simulate a populate that passed the stamp check just before an
        // invalidation was recorded
        cache.invalidated.lock().insert(
            id,
            Invalidation {
                generation: stamp + 1,
                at: Instant::now(),
            },
        );
        assert!(cache.get(id).await.is_none());
    }

    #[tokio::test]
    async fn test_put_ttl_is_capped_by_cache_ttl() {
        let cache = SessionCache::new(&CacheConfig {
            enabled: true,
            ttl_secs: 1,
            max_entries: 100,
        });
        let id = Uuid::new_v4();
        assert!(
            cache
                .put(id, identity(id), Duration::from_secs(3600), cache.stamp(id))
                .await
        );

        let stored = cache.entries.as_ref().unwrap().get(&id).await.unwrap();
        assert_eq!(stored.ttl, Duration::from_secs(1));

        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert!(cache.get(id).await.is_none());
    }

    #[tokio::test]
    async fn test_put_keeps_shorter_token_ttl() {
        let cache = cache();
        let id = Uuid::new_v4();
        cache
            .put(id, identity(id), Duration::from_secs(5), cache.stamp(id))
            .await;

        let stored = cache.entries.as_ref().unwrap().get(&id).await.unwrap();
        assert_eq!(stored.ttl, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_old_invalidations_are_pruned() {
        let cache = cache();
        let t0 = Instant::now();
        for _ in 0..PRUNE_THRESHOLD {
            cache.record_invalidation(Uuid::new_v4(), t0);
        }
        assert_eq!(cache.tracked_invalidations(), PRUNE_THRESHOLD);

        // Within retention nothing is dropped
        cache.record_invalidation(Uuid::new_v4(), t0 + Duration::from_secs(1));
        assert_eq!(cache.tracked_invalidations(), PRUNE_THRESHOLD + 1);

        let id = Uuid::new_v4();
        let stamp = cache.stamp(id);
        cache.record_invalidation(id, t0 + cache.retention() + Duration::from_secs(2));
        assert_eq!(cache.tracked_invalidations(), 1);
        assert!(!cache.put(id, identity(id), Duration::from_secs(30), stamp).await);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let cache = cache();
        let id = Uuid::new_v4();
        cache
            .put(id, identity(id), Duration::from_millis(50), cache.stamp(id))
            .await;

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(cache.get(id).await.is_none());
    }

    #[tokio::test]
    async fn test_zero_ttl_is_not_stored() {
        let cache = cache();
        let id = Uuid::new_v4();
        assert!(!cache.put(id, identity(id), Duration::ZERO, 0).await);
    }

    #[tokio::test]
    async fn test_disabled_cache_always_misses() {
        let cache = SessionCache::disabled();
        let id = Uuid::new_v4();

        assert!(!cache.is_enabled());
        assert!(!cache.put(id, identity(id), Duration::from_secs(30), 0).await);
        assert!(cache.get(id).await.is_none());
        assert_eq!(cache.stats().misses(), 1);
        assert_eq!(cache.entry_count(), 0);
    }
}
