//! In-memory key/value cache with per-entry expiry.
//!
//! Readers never observe an expired entry: expiry is checked on every
//! `get`, the background sweep only reclaims memory.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Default time-to-live for cached source payloads (1 hour)
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// Default interval between expiry sweeps (5 minutes)
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

/// TTL cache safe for concurrent use.
///
/// Any number of readers may proceed together; `set`, `delete`, `clear`
/// and the sweep take the write lock.
pub struct TtlCache<V> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    ttl: Duration,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Store `value` under `key` with expiry now + TTL, replacing any prior entry.
    pub fn set(&self, key: impl Into<String>, value: V) {
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + self.ttl,
        };
        self.entries.write().insert(key.into(), entry);
    }

    /// Return the live value for `key`, or `None` if absent or expired.
    pub fn get(&self, key: &str) -> Option<V> {
        let entries = self.entries.read();
        let entry = entries.get(key)?;
        if Instant::now() >= entry.expires_at {
            return None;
        }
        Some(entry.value.clone())
    }

    /// Remove `key`. Returns whether an entry existed.
    pub fn delete(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| now < entry.expires_at);
        before - entries.len()
    }
}

impl<V: Clone + Send + Sync + 'static> TtlCache<V> {
    /// Start the periodic expiry sweep.
    ///
    /// The task holds only a weak reference and exits once the cache is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = weak.upgrade() else {
                    break;
                };
                let removed = cache.purge_expired();
                if removed > 0 {
                    debug!("Cache sweep removed {} expired entries", removed);
                }
            }
        })
    }
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}
