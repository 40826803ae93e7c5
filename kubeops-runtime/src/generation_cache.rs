//! Tracks the last-seen `.metadata.generation` per object UID, so the watcher can drop
//! status-only updates before they ever reach the timed queue.
//!
//! Kubernetes bumps `generation` only on a spec change; status and metadata-only updates
//! (most commonly a controller writing back its own status subresource) leave it untouched.
//! Reconciling on every `Modified` event would mean every status write causes another
//! reconciliation, which in turn writes status again: a busy loop. The cache breaks that loop.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Eviction policy for a [`GenerationCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheConfig {
    /// Never evict. Entries are only removed explicitly, via
    /// [`GenerationCache::remove`] (typically on object deletion).
    Unbounded,
    /// Keep at most `capacity` entries, evicting the least recently observed UID first.
    Lru {
        /// Maximum number of UIDs tracked at once.
        capacity: usize,
    },
    /// Evict an entry once it has not been observed for `ttl`.
    ///
    /// Expiry is checked lazily, on the next [`observe`](GenerationCache::observe) or
    /// [`get`](GenerationCache::get) for the same UID; there is no background sweep.
    Ttl {
        /// How long an entry survives without being re-observed.
        #[serde(with = "humantime_serde")]
        ttl: Duration,
    },
}

enum Backend {
    Unbounded(DashMap<String, i64>),
    Lru(Mutex<LruCache<String, i64>>),
    Ttl(DashMap<String, (i64, Instant)>, Duration),
}

/// A concurrent UID -> generation map used to filter stale `Modified` watch events.
///
/// # Invariants
///
/// - A UID maps to at most one generation at a time.
/// - The generation recorded for a UID never decreases across successive
///   [`observe`](Self::observe) calls, since watch events for a single object arrive in causal
///   order and Kubernetes itself never decreases `generation`.
/// - [`remove`](Self::remove) is idempotent; removing an absent UID is a no-op.
pub struct GenerationCache {
    backend: Backend,
}

impl GenerationCache {
    /// Builds a cache with the given eviction policy.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        let backend = match config {
            CacheConfig::Unbounded => Backend::Unbounded(DashMap::new()),
            CacheConfig::Lru { capacity } => {
                let capacity = std::num::NonZeroUsize::new(capacity.max(1)).unwrap();
                Backend::Lru(Mutex::new(LruCache::new(capacity)))
            }
            CacheConfig::Ttl { ttl } => Backend::Ttl(DashMap::new(), ttl),
        };
        Self { backend }
    }

    /// The last generation observed for `uid`, if any and not expired.
    #[must_use]
    pub fn get(&self, uid: &str) -> Option<i64> {
        match &self.backend {
            Backend::Unbounded(map) => map.get(uid).map(|g| *g),
            Backend::Lru(map) => map.lock().peek(uid).copied(),
            Backend::Ttl(map, ttl) => map.get(uid).and_then(|entry| {
                let (generation, seen_at) = *entry;
                (seen_at.elapsed() < *ttl).then_some(generation)
            }),
        }
    }

    /// Records that `uid` was observed at `generation`.
    ///
    /// Returns `true` if this is a new UID or the generation advanced (the object's spec
    /// changed, so it is worth reconciling), `false` if the recorded generation was already
    /// at least `generation` (a status-only update, or a redelivery of an event already seen).
    pub fn observe(&self, uid: &str, generation: i64) -> bool {
        match &self.backend {
            Backend::Unbounded(map) => {
                let mut changed = true;
                map.entry(uid.to_owned())
                    .and_modify(|g| {
                        changed = generation > *g;
                        *g = (*g).max(generation);
                    })
                    .or_insert(generation);
                changed
            }
            Backend::Lru(map) => {
                let mut map = map.lock();
                match map.get_mut(uid) {
                    Some(g) => {
                        let changed = generation > *g;
                        *g = (*g).max(generation);
                        changed
                    }
                    None => {
                        map.put(uid.to_owned(), generation);
                        true
                    }
                }
            }
            Backend::Ttl(map, ttl) => {
                let now = Instant::now();
                let mut changed = true;
                map.entry(uid.to_owned())
                    .and_modify(|(g, seen_at)| {
                        changed = generation > *g || seen_at.elapsed() >= *ttl;
                        *g = (*g).max(generation);
                        *seen_at = now;
                    })
                    .or_insert((generation, now));
                changed
            }
        }
    }

    /// Forgets `uid` entirely. Called once an object's deletion has been fully processed, so a
    /// future object re-created with the same name (and hence, eventually, a fresh UID) starts
    /// from a clean slate.
    pub fn remove(&self, uid: &str) {
        match &self.backend {
            Backend::Unbounded(map) => {
                map.remove(uid);
            }
            Backend::Lru(map) => {
                map.lock().pop(uid);
            }
            Backend::Ttl(map, _) => {
                map.remove(uid);
            }
        }
    }
}

impl Default for GenerationCache {
    fn default() -> Self {
        Self::new(CacheConfig::Unbounded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_of_a_uid_is_always_a_change() {
        let cache = GenerationCache::default();
        assert!(cache.observe("uid-1", 1));
        assert_eq!(cache.get("uid-1"), Some(1));
    }

    #[test]
    fn repeated_generation_is_not_a_change() {
        let cache = GenerationCache::default();
        assert!(cache.observe("uid-1", 3));
        assert!(!cache.observe("uid-1", 3));
        assert!(!cache.observe("uid-1", 2), "generation must not regress");
        assert_eq!(cache.get("uid-1"), Some(3));
    }

    #[test]
    fn advancing_generation_is_a_change() {
        let cache = GenerationCache::default();
        assert!(cache.observe("uid-1", 1));
        assert!(cache.observe("uid-1", 2));
        assert_eq!(cache.get("uid-1"), Some(2));
    }

    #[test]
    fn remove_forgets_the_uid() {
        let cache = GenerationCache::default();
        cache.observe("uid-1", 5);
        cache.remove("uid-1");
        assert_eq!(cache.get("uid-1"), None);
        assert!(cache.observe("uid-1", 1), "a removed uid starts fresh");
    }

    #[test]
    fn lru_evicts_least_recently_observed() {
        let cache = GenerationCache::new(CacheConfig::Lru { capacity: 1 });
        cache.observe("uid-1", 1);
        cache.observe("uid-2", 1);
        assert_eq!(cache.get("uid-1"), None);
        assert_eq!(cache.get("uid-2"), Some(1));
    }
}
