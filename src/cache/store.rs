//! In-memory response cache with per-entry TTL.
//!
//! # Responsibilities
//! - Map cache keys to encoded response snapshots
//! - Expire entries lazily on read and in a periodic background sweep
//!
//! # Design Decisions
//! - `DashMap` shards its locks, so writers to unrelated keys never wait on
//!   each other and callers need no locking of their own
//! - Concurrent writes to one key resolve last-write-wins
//! - Purely time based: no size bound, no LRU
//! - Uses `tokio::time::Instant` so tests can drive the clock

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::cache::key::CacheKey;
use crate::observability::metrics;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Bytes,
    inserted_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) > self.ttl
    }
}

/// Concurrent TTL cache of encoded responses.
///
/// Cloning is cheap and every clone shares the same entries.
#[derive(Debug, Clone)]
pub struct CacheStore {
    entries: Arc<DashMap<CacheKey, CacheEntry>>,
    default_ttl: Duration,
}

impl CacheStore {
    /// Create an empty store whose `set_default` uses `default_ttl`.
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            default_ttl,
        }
    }

    /// Look up a live entry. An expired entry is removed and reported missing,
    /// whether or not the sweep has run.
    pub fn get(&self, key: &CacheKey) -> Option<Bytes> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };

        // Re-check under the write lock: a fresh value may have landed meanwhile.
        if expired && self.entries.remove_if(key, |_, e| e.is_expired(now)).is_some() {
            metrics::record_cache_evictions(1);
            metrics::record_cache_entries(self.entries.len());
        }
        None
    }

    /// Insert or replace an entry.
    pub fn set(&self, key: CacheKey, value: Bytes, ttl: Duration) {
        self.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
                ttl,
            },
        );
        metrics::record_cache_store();
        metrics::record_cache_entries(self.entries.len());
    }

    /// Insert with the store's default TTL.
    pub fn set_default(&self, key: CacheKey, value: Bytes) {
        self.set(key, value, self.default_ttl);
    }

    /// Number of entries held, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = !entry.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });

        if removed > 0 {
            metrics::record_cache_evictions(removed);
        }
        metrics::record_cache_entries(self.entries.len());
        removed
    }

    /// Sweep every `interval` until `shutdown` fires.
    pub fn spawn_sweeper(
        &self,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            tracing::info!(interval = ?interval, "Cache sweeper starting");
            let mut ticker = time::interval_at(Instant::now() + interval, interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = store.sweep();
                        tracing::debug!(removed, remaining = store.len(), "Cache sweep finished");
                    }
                    _ = shutdown.recv() => {
                        tracing::info!("Cache sweeper received shutdown signal, exiting loop");
                        break;
                    }
                }
            }
        })
    }
}
