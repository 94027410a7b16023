//! TTL cache for cluster resource listings.
//!
//! Listing `/cluster/resources` is expensive on large clusters, so each
//! [`ResourceKind`] is cached separately:
//!
//! | Kind | TTL |
//! |------|-----|
//! | `vm` | 5 seconds |
//! | `storage` | 60 seconds |
//! | others | configured default |
//!
//! VM state changes constantly, hence the short TTL plus explicit
//! [`ResourceCache::invalidate`] after every mutation.
//!
//! The cache never builds a request itself: callers hand [`ResourceCache::get`]
//! the fetch to run on a miss. Fetch errors are returned untouched and are
//! never cached.

use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::clock::{expiry_after, is_live, Clock, SystemClock};
use crate::types::ResourceKind;

/// TTL for VM listings.
pub const VM_TTL: Duration = Duration::from_secs(5);

/// TTL for storage listings.
pub const STORAGE_TTL: Duration = Duration::from_secs(60);

/// TTL for every other kind unless configured otherwise.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

struct CacheEntry<V> {
    value: Arc<V>,
    /// `None` never expires
    expires_at: Option<Instant>,
}

/// Per-kind listing cache.
pub struct ResourceCache<V> {
    entries: DashMap<ResourceKind, CacheEntry<V>>,
    default_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<V> ResourceCache<V> {
    /// Create a cache on the system clock with [`DEFAULT_TTL`].
    pub fn new() -> Self {
        Self::with_clock(DEFAULT_TTL, Arc::new(SystemClock))
    }

    /// Create a cache with an explicit default TTL and time source.
    pub fn with_clock(default_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl,
            clock,
        }
    }

    /// Expiry applied to freshly stored entries of `kind`.
    pub fn ttl_for(&self, kind: ResourceKind) -> Duration {
        match kind {
            ResourceKind::Vm => VM_TTL,
            ResourceKind::Storage => STORAGE_TTL,
            ResourceKind::Node | ResourceKind::Sdn => self.default_ttl,
        }
    }

    /// Return the cached listing for `kind`, running `fetch` on a miss.
    ///
    /// No shard lock is held while `fetch` runs, so concurrent misses on the
    /// same kind may each fetch; the last store wins.
    pub async fn get<F, Fut, E>(&self, kind: ResourceKind, fetch: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.peek(kind) {
            return Ok(value);
        }

        let value = fetch().await?;
        Ok(self.set(kind, value))
    }

    /// Live entry for `kind`, without fetching. An expired entry is dropped.
    pub fn peek(&self, kind: ResourceKind) -> Option<Arc<V>> {
        let now = self.clock.now();

        if let Some(entry) = self.entries.get(&kind) {
            if is_live(entry.expires_at, now) {
                return Some(Arc::clone(&entry.value));
            }
            drop(entry);
            self.entries
                .remove_if(&kind, |_, entry| !is_live(entry.expires_at, now));
        }
        None
    }

    /// Store `value` for `kind` with the kind's TTL.
    pub fn set(&self, kind: ResourceKind, value: V) -> Arc<V> {
        let value = Arc::new(value);
        let entry = CacheEntry {
            value: Arc::clone(&value),
            expires_at: expiry_after(self.clock.now(), self.ttl_for(kind)),
        };

        self.entries.insert(kind, entry);
        value
    }

    /// Drop the entry for `kind`. Idempotent.
    pub fn invalidate(&self, kind: ResourceKind) {
        self.entries.remove(&kind);
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| is_live(entry.expires_at, now));
        before.saturating_sub(self.entries.len())
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V> Default for ResourceCache<V> {
    fn default() -> Self {
        Self::new()
    }
}
