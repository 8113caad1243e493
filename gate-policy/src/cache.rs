//! Bounded, time-limited memo of allow decisions.

use std::collections::{HashMap, VecDeque};
use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use gate_primitives::{CacheKey, Decision};
use tracing::trace;

/// Least-recently-used cache of allow decisions with a fixed time-to-live.
///
/// An entry read at or after `ttl` since it was recorded counts as a miss and
/// is dropped. A hit refreshes recency but not the recorded time. Only
/// [`Decision::is_allow`] decisions are ever stored.
#[derive(Debug)]
pub struct DecisionCache {
    ttl: Duration,
    capacity: NonZeroUsize,
    inner: Mutex<CacheInner>,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<CacheKey, CacheEntry>,
    // Recency log, oldest first. A slot is live only while its stamp matches the
    // entry's current stamp; superseded slots are skipped and compacted lazily.
    recency: VecDeque<(CacheKey, u64)>,
    clock: u64,
}

#[derive(Debug)]
struct CacheEntry {
    decision: Decision,
    recorded_at: Instant,
    stamp: u64,
}

impl DecisionCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(capacity: NonZeroUsize, ttl: Duration) -> Self {
        Self {
            ttl,
            capacity,
            inner: Mutex::new(CacheInner::default()),
        }
    }

    /// Returns the configured time-to-live.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the configured capacity.
    #[must_use]
    pub const fn capacity(&self) -> NonZeroUsize {
        self.capacity
    }

    /// Looks up a fresh decision, promoting it to most recently used.
    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<Decision> {
        self.get_at(key, Instant::now())
    }

    /// Stores an allow decision, evicting the least recently used entry when full.
    ///
    /// Returns false when the decision was not cacheable.
    pub fn put(&self, key: CacheKey, decision: Decision) -> bool {
        self.put_at(key, decision, Instant::now())
    }

    pub(crate) fn get_at(&self, key: &CacheKey, now: Instant) -> Option<Decision> {
        let mut guard = self.lock();
        let inner = &mut *guard;

        let expired = {
            let entry = inner.entries.get(key)?;
            now.saturating_duration_since(entry.recorded_at) >= self.ttl
        };
        if expired {
            inner.entries.remove(key);
            trace!(key = key.as_str(), "cached decision expired");
            return None;
        }

        inner.clock += 1;
        let stamp = inner.clock;
        let entry = inner.entries.get_mut(key)?;
        entry.stamp = stamp;
        let decision = entry.decision.clone();
        inner.recency.push_back((key.clone(), stamp));
        inner.compact(self.capacity.get());
        Some(decision)
    }

    pub(crate) fn put_at(&self, key: CacheKey, decision: Decision, now: Instant) -> bool {
        if !decision.is_allow() {
            return false;
        }

        let mut guard = self.lock();
        let inner = &mut *guard;

        inner.clock += 1;
        let stamp = inner.clock;
        inner.recency.push_back((key.clone(), stamp));
        inner.entries.insert(
            key,
            CacheEntry {
                decision,
                recorded_at: now,
                stamp,
            },
        );

        while inner.entries.len() > self.capacity.get() {
            if !inner.evict_oldest() {
                break;
            }
        }
        inner.compact(self.capacity.get());
        true
    }

    /// Returns the number of stored entries, including expired ones not yet read.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Returns true when the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Drops every entry.
    pub fn clear(&self) {
        let mut guard = self.lock();
        guard.entries.clear();
        guard.recency.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CacheInner {
    fn evict_oldest(&mut self) -> bool {
        while let Some((key, stamp)) = self.recency.pop_front() {
            let live = self
                .entries
                .get(&key)
                .is_some_and(|entry| entry.stamp == stamp);
            if live {
                self.entries.remove(&key);
                trace!(key = key.as_str(), "evicted least recently used decision");
                return true;
            }
        }
        false
    }

    fn compact(&mut self, capacity: usize) {
        if self.recency.len() <= capacity.saturating_mul(2).saturating_add(16) {
            return;
        }
        let entries = &self.entries;
        self.recency.retain(|(key, stamp)| {
            entries
                .get(key)
                .is_some_and(|entry| entry.stamp == *stamp)
        });
    }
}

#[cfg(test)]
mod tests {
    use gate_primitives::{ActionDescriptor, ActionType, Outcome};

    use super::*;

    fn key(name: &str) -> CacheKey {
        ActionDescriptor::new(ActionType::CommandExec, name).cache_key()
    }

    fn allow(reason: &str) -> Decision {
        Decision::new(Outcome::Allow).with_reason(reason)
    }

    fn cache(capacity: usize, ttl: Duration) -> DecisionCache {
        DecisionCache::new(NonZeroUsize::new(capacity).unwrap(), ttl)
    }

    #[test]
    fn hit_within_ttl_and_miss_after() {
        let cache = cache(4, Duration::from_secs(5));
        let start = Instant::now();
        assert!(cache.put_at(key("ls"), allow("ok"), start));

        let hit = cache.get_at(&key("ls"), start + Duration::from_millis(4_999));
        assert_eq!(hit.map(|d| d.reason().to_owned()), Some("ok".into()));

        assert!(cache.get_at(&key("ls"), start + Duration::from_secs(5)).is_none());
        assert!(cache.is_empty(), "expired entry is removed on read");
    }

    #[test]
    fn access_does_not_extend_ttl() {
        let cache = cache(4, Duration::from_secs(5));
        let start = Instant::now();
        cache.put_at(key("ls"), allow("ok"), start);

        assert!(cache.get_at(&key("ls"), start + Duration::from_secs(4)).is_some());
        assert!(cache.get_at(&key("ls"), start + Duration::from_secs(6)).is_none());
    }

    #[test]
    fn evicts_least_recently_inserted_when_untouched() {
        let cache = cache(2, Duration::from_secs(60));
        let now = Instant::now();
        cache.put_at(key("a"), allow("a"), now);
        cache.put_at(key("b"), allow("b"), now);
        cache.put_at(key("c"), allow("c"), now);

        assert_eq!(cache.len(), 2);
        assert!(cache.get_at(&key("a"), now).is_none());
        assert!(cache.get_at(&key("b"), now).is_some());
        assert!(cache.get_at(&key("c"), now).is_some());
    }

    #[test]
    fn access_protects_entry_from_eviction() {
        let cache = cache(2, Duration::from_secs(60));
        let now = Instant::now();
        cache.put_at(key("a"), allow("a"), now);
        cache.put_at(key("b"), allow("b"), now);
        assert!(cache.get_at(&key("a"), now).is_some());
        cache.put_at(key("c"), allow("c"), now);

        assert!(cache.get_at(&key("a"), now).is_some());
        assert!(cache.get_at(&key("b"), now).is_none());
        assert!(cache.get_at(&key("c"), now).is_some());
    }

    #[test]
    fn overwrite_refreshes_entry_without_growing() {
        let cache = cache(2, Duration::from_secs(60));
        let now = Instant::now();
        cache.put_at(key("a"), allow("first"), now);
        cache.put_at(key("b"), allow("b"), now);
        cache.put_at(key("a"), allow("second"), now);
        cache.put_at(key("c"), allow("c"), now);

        assert_eq!(cache.len(), 2);
        assert_eq!(
            cache.get_at(&key("a"), now).map(|d| d.reason().to_owned()),
            Some("second".into())
        );
        assert!(cache.get_at(&key("b"), now).is_none());
    }

    #[test]
    fn refuses_non_allow_decisions() {
        let cache = cache(2, Duration::from_secs(60));
        assert!(!cache.put(key("rm"), Decision::new(Outcome::Deny)));
        assert!(!cache.put(
            key("rm"),
            Decision::new(Outcome::ApprovalRequired).with_request_id("r")
        ));
        assert!(cache.is_empty());
    }

    #[test]
    fn recency_log_stays_bounded_under_repeated_hits() {
        let cache = cache(3, Duration::from_secs(60));
        let now = Instant::now();
        cache.put_at(key("a"), allow("a"), now);
        for _ in 0..10_000 {
            assert!(cache.get_at(&key("a"), now).is_some());
        }
        let recency = cache.lock().recency.len();
        assert!(recency <= 3 * 2 + 16 + 1, "recency log grew to {recency}");
    }

    #[test]
    fn zero_ttl_disables_caching() {
        let cache = cache(2, Duration::ZERO);
        let now = Instant::now();
        cache.put_at(key("a"), allow("a"), now);
        assert!(cache.get_at(&key("a"), now).is_none());
    }
}
