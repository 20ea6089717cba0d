// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Gateway Response Cache
//
// Bounded LRU of fingerprint -> value with a per-entry TTL. Expired entries
// stay in the LRU until evicted so a failing upstream can still be answered
// with the last known value (`get_stale`).
//
// Concurrent misses for the same key are coalesced: the first caller holds
// the key's gate while it fetches, later callers wait on the gate and then
// find the freshly inserted value.

use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// Outcome of [`ResponseCache::get_or_try_insert`].
#[derive(Debug, Clone, PartialEq)]
pub struct CacheLookup<V> {
    pub value: V,
    /// True when no fetch was performed by this caller.
    pub hit: bool,
}

pub struct ResponseCache<V> {
    entries: Mutex<LruCache<String, Entry<V>>>,
    gates: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl<V: Clone> ResponseCache<V> {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            gates: DashMap::new(),
        }
    }

    /// Fresh value for `key`.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            _ => None,
        }
    }

    /// Last value stored for `key`, expired or not.
    pub fn get_stale(&self, key: &str) -> Option<V> {
        self.entries.lock().peek(key).map(|entry| entry.value.clone())
    }

    pub fn insert(&self, key: impl Into<String>, value: V, ttl: Duration) {
        self.entries.lock().put(
            key.into(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the fresh value for `key`, or runs `fetch` once across all
    /// concurrent callers and caches its result for `ttl`. Errors are not
    /// cached; waiters behind a failed fetch try again themselves.
    pub async fn get_or_try_insert<F, Fut, E>(
        &self,
        key: &str,
        ttl: Duration,
        fetch: F,
    ) -> Result<CacheLookup<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(key) {
            return Ok(CacheLookup { value, hit: true });
        }

        let gate = self
            .gates
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let release = GateRelease {
            gates: &self.gates,
            key,
            gate,
        };
        let _guard = release.gate.lock().await;
        match self.get(key) {
            Some(value) => Ok(CacheLookup { value, hit: true }),
            None => fetch().await.map(|value| {
                self.insert(key, value.clone(), ttl);
                CacheLookup { value, hit: false }
            }),
        }
    }
}

/// Drops the key's gate from the map once nobody else holds or awaits it.
/// Runs on drop, so a caller cancelled while queued or fetching cleans up too.
struct GateRelease<'a> {
    gates: &'a DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    key: &'a str,
    gate: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for GateRelease<'_> {
    fn drop(&mut self) {
        // Our clone plus the map's: nobody else is queued on this gate.
        self.gates.remove_if(self.key, |_, gate| {
            Arc::ptr_eq(gate, &self.gate) && Arc::strong_count(gate) <= 2
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_concurrent_misses_fetch_once() {
        let cache = Arc::new(ResponseCache::<u32>::new(8));
        let fetches = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let fetches = Arc::clone(&fetches);
            tasks.push(tokio::spawn(async move {
                cache
                    .get_or_try_insert("k", Duration::from_secs(60), || async {
                        fetches.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok::<_, ()>(7)
                    })
                    .await
                    .unwrap()
            }));
        }
        let mut misses = 0;
        for task in tasks {
            let lookup = task.await.unwrap();
            assert_eq!(lookup.value, 7);
            if !lookup.hit {
                misses += 1;
            }
        }

        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert_eq!(misses, 1);
        assert!(cache.gates.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_callers_release_their_gate() {
        let cache = Arc::new(ResponseCache::<u32>::new(8));

        let mut tasks = Vec::new();
        for _ in 0..3 {
            let cache = Arc::clone(&cache);
            tasks.push(tokio::spawn(async move {
                cache
                    .get_or_try_insert("slow", Duration::from_secs(60), || async {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        Ok::<_, ()>(1)
                    })
                    .await
            }));
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.gates.len(), 1);

        // One fetching, two queued behind it.
        for task in tasks {
            task.abort();
            assert!(task.await.unwrap_err().is_cancelled());
        }
        assert!(cache.gates.is_empty());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_expired_entry_is_stale_only() {
        let cache = ResponseCache::new(8);
        cache.insert("k", "v".to_string(), Duration::from_millis(10));
        assert_eq!(cache.get("k").as_deref(), Some("v"));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.get_stale("k").as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_cached() {
        let cache = ResponseCache::<u32>::new(8);
        let err = cache
            .get_or_try_insert("k", Duration::from_secs(60), || async { Err::<u32, _>("down") })
            .await
            .unwrap_err();
        assert_eq!(err, "down");
        assert!(cache.is_empty());
    }
}
