// Resilience cache: last known canonical record per company id, used to answer
// when a provider is unreachable.

use std::{
    collections::{BTreeMap, HashSet},
    sync::Arc,
    time::{Duration, Instant},
};

use bytes::Bytes;
use dashmap::{mapref::entry::Entry, DashMap};
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::debug;

pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub items_count: usize,
    pub hit_count: usize,
    pub miss_count: usize,
    pub stored_count: usize,
    pub expired_count: usize,
}

// Cache configuration options
#[derive(Debug, Clone)]
pub struct CacheConfig {
    // `None` (or zero) keeps entries forever
    pub default_ttl: Option<Duration>,
    // `None` (or zero) disables the janitor; expired entries are then swept on access
    pub cleanup_interval: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Some(DEFAULT_TTL),
            cleanup_interval: None,
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    value: Bytes,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_alive(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

#[derive(Debug)]
pub struct ResilienceCache {
    store: DashMap<String, CacheEntry>,
    config: CacheConfig,
    cache_stats: RwLock<CacheStats>,
    // expiry instant -> keys due at that instant
    expirations: Mutex<BTreeMap<Instant, HashSet<String>>>,
}

impl Default for ResilienceCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl ResilienceCache {
    pub fn new(config: CacheConfig) -> Self {
        let config = CacheConfig {
            default_ttl: config.default_ttl.filter(|ttl| !ttl.is_zero()),
            cleanup_interval: config.cleanup_interval.filter(|every| !every.is_zero()),
        };

        Self {
            store: DashMap::new(),
            config,
            cache_stats: RwLock::new(CacheStats::default()),
            expirations: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn sweeps_on_access(&self) -> bool {
        self.config.cleanup_interval.is_none()
    }

    /// Returns the live value for `key` with `true`, or stores `value` with the
    /// default TTL and returns it with `false`. A live entry is never
    /// overwritten; the check and the insert happen under the same shard lock.
    pub fn store_or_load(&self, key: &str, value: impl Into<Bytes>) -> (Bytes, bool) {
        if self.sweeps_on_access() {
            self.delete_expired();
        }

        let value = value.into();
        let now = Instant::now();
        let expires_at = self.config.default_ttl.map(|ttl| now + ttl);

        let (effective, loaded) = match self.store.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_alive(now) {
                    (occupied.get().value.clone(), true)
                } else {
                    occupied.insert(CacheEntry {
                        value: value.clone(),
                        expires_at,
                    });
                    (value, false)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CacheEntry {
                    value: value.clone(),
                    expires_at,
                });
                (value, false)
            }
        };

        if loaded {
            self.cache_stats.write().hit_count += 1;
        } else {
            if let Some(at) = expires_at {
                self.expirations
                    .lock()
                    .entry(at)
                    .or_default()
                    .insert(key.to_string());
            }
            self.cache_stats.write().stored_count += 1;
        }

        (effective, loaded)
    }

    /// Setup helper: stores or loads and hands the cache back. The hit/miss
    /// outcome is discarded.
    pub fn chain_store_or_load(self, key: &str, value: impl Into<Bytes>) -> Self {
        self.store_or_load(key, value);
        self
    }

    /// Live value for `key`, if any. Never writes.
    pub fn get(&self, key: &str) -> Option<Bytes> {
        if self.sweeps_on_access() {
            self.delete_expired();
        }

        let now = Instant::now();
        let found = self
            .store
            .get(key)
            .filter(|entry| entry.is_alive(now))
            .map(|entry| entry.value.clone());

        let mut stats = self.cache_stats.write();
        if found.is_some() {
            stats.hit_count += 1;
        } else {
            stats.miss_count += 1;
        }

        found
    }

    /// Purges every entry whose expiry has passed and returns how many were
    /// removed.
    pub fn delete_expired(&self) -> usize {
        let now = Instant::now();

        let due = {
            let mut expirations = self.expirations.lock();
            let pending = expirations.split_off(&now);
            std::mem::replace(&mut *expirations, pending)
        };

        let mut removed = 0;
        for (at, keys) in due {
            for key in keys {
                // the key may have been stored again with a later expiry
                if self
                    .store
                    .remove_if(&key, |_, entry| entry.expires_at == Some(at))
                    .is_some()
                {
                    removed += 1;
                }
            }
        }

        if removed > 0 {
            self.cache_stats.write().expired_count += removed;
        }

        removed
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = self.cache_stats.read().clone();
        stats.items_count = self.store.len();
        stats
    }

    /// Starts the periodic sweep when a cleanup interval is configured. The
    /// task ends once the last strong reference to the cache is gone.
    pub fn spawn_janitor(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let every = self.config.cleanup_interval?;
        let cache = Arc::downgrade(self);

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;

                let Some(live) = cache.upgrade() else {
                    break;
                };

                let purged = live.delete_expired();
                if purged > 0 {
                    debug!(purged, "janitor purged expired cache entries");
                }
            }
        }))
    }
}
