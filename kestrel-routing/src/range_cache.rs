//! Range location cache - remembers which replicas own which key ranges.
//!
//! Caching resolved locations skips the two metadata lookups for keys in
//! recently used ranges. Entries may go stale when ranges split or move;
//! callers evict an entry when a dispatch to its replicas fails.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::ops::Bound::{Excluded, Unbounded};
use std::sync::{Mutex, MutexGuard, PoisonError};

use kestrel_core::{Key, Limits, RangeLocations};
use lru::LruCache;
use tracing::trace;

/// Configuration for the range cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeCacheConfig {
    /// Maximum number of entries in the cache. Zero disables caching.
    pub max_entries: usize,
}

impl Default for RangeCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: Limits::new().max_range_cache_entries as usize,
        }
    }
}

#[derive(Debug)]
struct Inner {
    /// Locations keyed by the end bound of their range.
    ranges: BTreeMap<Key, RangeLocations>,
    /// End bounds of `ranges`, least recently used first out.
    recency: LruCache<Key, ()>,
}

impl Inner {
    /// Returns the end bound of the cached range containing `key`.
    fn containing(&self, key: &Key) -> Option<Key> {
        // The containing range is the one with the smallest end above `key`.
        self.ranges
            .range((Excluded(key.clone()), Unbounded))
            .next()
            .filter(|(_, locations)| locations.contains(key))
            .map(|(end, _)| end.clone())
    }

    fn remove(&mut self, end: &Key) -> bool {
        self.recency.pop(end);
        self.ranges.remove(end).is_some()
    }
}

/// Bounded, least-recently-used cache of range locations.
///
/// Internally synchronized; share it behind an `Arc`.
#[derive(Debug)]
pub struct RangeCache {
    capacity: Option<NonZeroUsize>,
    inner: Mutex<Inner>,
}

impl RangeCache {
    /// Creates a new cache with the given configuration.
    #[must_use]
    pub fn new(config: RangeCacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_entries);
        Self {
            capacity,
            inner: Mutex::new(Inner {
                ranges: BTreeMap::new(),
                recency: LruCache::new(capacity.unwrap_or(NonZeroUsize::MIN)),
            }),
        }
    }

    /// Creates a new cache with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(RangeCacheConfig::default())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the cached locations of the range containing `key`.
    ///
    /// A hit refreshes the entry's recency.
    #[must_use]
    pub fn get(&self, key: &Key) -> Option<RangeLocations> {
        let mut guard = self.lock();
        let end = guard.containing(key)?;
        guard.recency.promote(&end);
        guard.ranges.get(&end).cloned()
    }

    /// Caches `locations`, replacing any entries whose ranges overlap it.
    ///
    /// If the cache is full, the least recently used entry is evicted.
    pub fn insert(&self, locations: RangeLocations) {
        if self.capacity.is_none() {
            return;
        }
        let end = locations.end_bound();
        let mut guard = self.lock();

        let overlapping: Vec<Key> = guard
            .ranges
            .range((Excluded(locations.start_key.clone()), Unbounded))
            .take_while(|(_, cached)| cached.start_key < end)
            .map(|(cached_end, _)| cached_end.clone())
            .collect();
        for cached_end in overlapping {
            trace!(end = %cached_end, "dropping overlapping range cache entry");
            guard.remove(&cached_end);
        }

        let displaced = guard.recency.push(end.clone(), ());
        if let Some((evicted, ())) = displaced {
            if evicted != end {
                trace!(end = %evicted, "evicting least recently used range");
                guard.ranges.remove(&evicted);
            }
        }
        guard.ranges.insert(end, locations);
    }

    /// Removes the entry for the range containing `key`.
    ///
    /// Returns true if an entry was removed.
    pub fn evict(&self, key: &Key) -> bool {
        let mut guard = self.lock();
        guard
            .containing(key)
            .is_some_and(|end| guard.remove(&end))
    }

    /// Clears all entries in the cache.
    pub fn clear(&self) {
        let mut guard = self.lock();
        guard.ranges.clear();
        guard.recency.clear();
    }

    /// Returns the number of entries in the cache.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().ranges.len()
    }

    /// Returns true if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RangeCache {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use kestrel_core::{NodeId, Replica, KEY_MIN};

    use super::*;

    fn range(start: &'static str, end: &'static str, node: u64) -> RangeLocations {
        RangeLocations::new(
            Key::from(start),
            Key::from(end),
            vec![Replica::new(NodeId::new(node))],
        )
    }

    #[test]
    fn test_insert_and_get() {
        let cache = RangeCache::with_defaults();
        cache.insert(range("a", "m", 1));
        cache.insert(range("m", "z", 2));

        assert_eq!(cache.get(&Key::from("a")), Some(range("a", "m", 1)));
        assert_eq!(cache.get(&Key::from("lzz")), Some(range("a", "m", 1)));
        assert_eq!(cache.get(&Key::from("m")), Some(range("m", "z", 2)));
        assert_eq!(cache.get(&Key::from("z")), None);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_gap_is_a_miss() {
        let cache = RangeCache::with_defaults();
        cache.insert(range("m", "z", 2));

        // "c" sorts before the cached range's start.
        assert_eq!(cache.get(&Key::from("c")), None);
    }

    #[test]
    fn test_open_ended_range() {
        let cache = RangeCache::with_defaults();
        cache.insert(RangeLocations {
            start_key: KEY_MIN,
            end_key: None,
            replicas: vec![Replica::new(NodeId::new(1))],
        });

        assert!(cache.get(&Key::from("anything")).is_some());
    }

    #[test]
    fn test_evict() {
        let cache = RangeCache::with_defaults();
        cache.insert(range("a", "m", 1));

        assert!(cache.evict(&Key::from("b")));
        assert!(!cache.evict(&Key::from("b")));
        assert!(cache.get(&Key::from("b")).is_none());
    }

    #[test]
    fn test_split_replaces_stale_entry() {
        let cache = RangeCache::with_defaults();
        cache.insert(range("a", "z", 1));

        // The range split at "m"; the left half was re-resolved.
        cache.insert(range("a", "m", 3));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&Key::from("b")), Some(range("a", "m", 3)));
        // The stale [a, z) entry must not answer for the right half.
        assert_eq!(cache.get(&Key::from("q")), None);
    }

    #[test]
    fn test_lru_eviction() {
        let cache = RangeCache::new(RangeCacheConfig { max_entries: 2 });
        cache.insert(range("a", "c", 1));
        cache.insert(range("c", "e", 2));

        // Touch [a, c) so [c, e) becomes least recently used.
        assert!(cache.get(&Key::from("b")).is_some());

        cache.insert(range("e", "g", 3));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&Key::from("b")).is_some());
        assert!(cache.get(&Key::from("d")).is_none());
        assert!(cache.get(&Key::from("f")).is_some());
    }

    #[test]
    fn test_zero_capacity_disables_caching() {
        let cache = RangeCache::new(RangeCacheConfig { max_entries: 0 });
        cache.insert(range("a", "m", 1));

        assert!(cache.is_empty());
        assert_eq!(cache.get(&Key::from("b")), None);
    }

    #[test]
    fn test_lru_eviction_after_overlap_and_evict() {
        let cache = RangeCache::new(RangeCacheConfig { max_entries: 2 });
        cache.insert(range("a", "c", 1));
        cache.insert(range("c", "e", 2));
        assert!(cache.evict(&Key::from("d")));

        // Room was freed by the evict; nothing else may be dropped.
        cache.insert(range("e", "g", 3));
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&Key::from("b")).is_some());

        // [a, c) is now most recent; [e, g) goes first.
        cache.insert(range("g", "i", 4));
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&Key::from("f")).is_none());
        assert!(cache.get(&Key::from("b")).is_some());
        assert!(cache.get(&Key::from("h")).is_some());
    }

    #[test]
    fn test_clear() {
        let cache = RangeCache::with_defaults();
        cache.insert(range("a", "c", 1));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_access() {
        let cache = Arc::new(RangeCache::new(RangeCacheConfig { max_entries: 8 }));
        let keys = ["a", "b", "c", "d", "e", "f", "g", "h", "i", "j"];

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for (i, window) in keys.windows(2).enumerate() {
                        let locations = RangeLocations::new(
                            Key::from(window[0]),
                            Key::from(window[1]),
                            vec![Replica::new(NodeId::new((t * 10 + i) as u64))],
                        );
                        cache.insert(locations);
                        let _ = cache.get(&Key::from(window[0]));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(cache.len() <= 8);
    }
}
