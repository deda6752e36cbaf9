//! In-memory TTL cache with in-flight request coalescing
//!
//! Every key has at most one request in flight. Callers that ask for a key
//! while its request is pending await the same shared result instead of
//! issuing another call. Successful results are stored with a TTL; failures
//! are handed to every waiter and never stored.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use log::debug;
use tokio::time::Instant;

use crate::error::{Error, Result};

type SharedResult<T> = std::result::Result<T, Arc<Error>>;
type SharedFetch<T> = Shared<BoxFuture<'static, SharedResult<T>>>;

/// A cached value together with the moment it was fetched.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub value: T,
    pub fetched_at: Instant,
    pub ttl: Duration,
}

impl<T> CacheEntry<T> {
    /// Fresh iff `now - fetched_at < ttl`.
    pub fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.fetched_at) < self.ttl
    }
}

struct InFlight<T> {
    id: u64,
    fetch: SharedFetch<T>,
}

struct Inner<T> {
    entries: HashMap<String, CacheEntry<T>>,
    in_flight: HashMap<String, InFlight<T>>,
    /// Bumped by `invalidate_all`; results started under an older generation are dropped
    generation: u64,
    next_id: u64,
}

/// Snapshot of cache occupancy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TtlCacheStats {
    pub total_entries: usize,
    pub fresh_entries: usize,
    pub expired_entries: usize,
    pub in_flight: usize,
}

/// Keyed TTL cache with request deduplication.
///
/// Cloning gives another handle onto the same cache.
pub struct TtlCache<T> {
    name: &'static str,
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for TtlCache<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            inner: Arc::clone(&self.inner),
        }
    }
}

fn lock<T>(inner: &Mutex<Inner<T>>) -> MutexGuard<'_, Inner<T>> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T> TtlCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create an empty cache. `name` only shows up in debug logs.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: Arc::new(Mutex::new(Inner {
                entries: HashMap::new(),
                in_flight: HashMap::new(),
                generation: 0,
                next_id: 0,
            })),
        }
    }

    /// Cached value for `key` if it is still fresh.
    pub fn get(&self, key: &str) -> Option<T> {
        let inner = lock(&self.inner);
        inner
            .entries
            .get(key)
            .filter(|entry| entry.is_fresh(Instant::now()))
            .map(|entry| entry.value.clone())
    }

    /// Store a value directly, replacing any previous entry for `key`.
    pub fn insert(&self, key: &str, value: T, ttl: Duration) {
        let mut inner = lock(&self.inner);
        inner.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                fetched_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Return the fresh value for `key`, join the pending request for it, or
    /// start a new one with `loader`.
    ///
    /// The loader runs on its own task, so it settles (and populates the
    /// cache) even if every caller stops waiting.
    pub async fn fetch<F, Fut>(&self, key: &str, loader: F, ttl: Duration) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let fetch = {
            let mut inner = lock(&self.inner);

            if let Some(entry) = inner.entries.get(key)
                && entry.is_fresh(Instant::now())
            {
                debug!("Cache hit: {} {}", self.name, key);
                return Ok(entry.value.clone());
            }

            if let Some(pending) = inner.in_flight.get(key) {
                debug!("Joining in-flight request: {} {}", self.name, key);
                pending.fetch.clone()
            } else {
                debug!("Cache miss: {} {}", self.name, key);
                let id = inner.next_id;
                inner.next_id += 1;

                let task = tokio::spawn(settle(
                    Arc::clone(&self.inner),
                    key.to_string(),
                    id,
                    inner.generation,
                    ttl,
                    loader(),
                ));

                let cleanup = (Arc::downgrade(&self.inner), key.to_string());
                let fetch = async move {
                    match task.await {
                        Ok(result) => result,
                        Err(join_err) => {
                            // A panicked loader never reaches `settle`
                            let (inner, key) = cleanup;
                            if let Some(inner) = inner.upgrade() {
                                forget_in_flight(&inner, &key, id);
                            }
                            Err(Arc::new(Error::Other(format!(
                                "request task failed: {}",
                                join_err
                            ))))
                        }
                    }
                }
                .boxed()
                .shared();

                inner.in_flight.insert(
                    key.to_string(),
                    InFlight {
                        id,
                        fetch: fetch.clone(),
                    },
                );
                fetch
            }
        };

        fetch.await.map_err(Error::from)
    }

    /// Drop the cached entry for `key`. A request already in flight is left
    /// alone and repopulates the entry when it completes.
    pub fn invalidate(&self, key: &str) {
        lock(&self.inner).entries.remove(key);
    }

    /// Drop every cached entry whose key starts with `prefix`.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut inner = lock(&self.inner);
        let before = inner.entries.len();
        inner.entries.retain(|key, _| !key.starts_with(prefix));
        before - inner.entries.len()
    }

    /// Drop all entries and forget every in-flight request.
    ///
    /// Pending requests still resolve for whoever awaits them, but their
    /// results are not stored.
    pub fn invalidate_all(&self) {
        let mut inner = lock(&self.inner);
        inner.entries.clear();
        inner.in_flight.clear();
        inner.generation += 1;
        debug!("Cache cleared: {}", self.name);
    }

    /// Current occupancy counts
    pub fn stats(&self) -> TtlCacheStats {
        let inner = lock(&self.inner);
        let now = Instant::now();
        let fresh = inner.entries.values().filter(|e| e.is_fresh(now)).count();

        TtlCacheStats {
            total_entries: inner.entries.len(),
            fresh_entries: fresh,
            expired_entries: inner.entries.len() - fresh,
            in_flight: inner.in_flight.len(),
        }
    }
}

/// Remove the in-flight marker for `key` if it still belongs to request `id`
fn forget_in_flight<T>(inner: &Mutex<Inner<T>>, key: &str, id: u64) {
    let mut guard = lock(inner);
    if guard.in_flight.get(key).is_some_and(|f| f.id == id) {
        guard.in_flight.remove(key);
    }
}

async fn settle<T, Fut>(
    inner: Arc<Mutex<Inner<T>>>,
    key: String,
    id: u64,
    generation: u64,
    ttl: Duration,
    request: Fut,
) -> SharedResult<T>
where
    T: Clone,
    Fut: Future<Output = Result<T>>,
{
    let result = request.await.map_err(Arc::new);

    forget_in_flight(&inner, &key, id);
    let mut guard = lock(&inner);

    match &result {
        Ok(value) if guard.generation == generation => {
            guard.entries.insert(
                key,
                CacheEntry {
                    value: value.clone(),
                    fetched_at: Instant::now(),
                    ttl,
                },
            );
        }
        Ok(_) => debug!("Discarding result for {} fetched before a full clear", key),
        Err(err) => debug!("Not caching failed request for {}: {}", key, err),
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TTL: Duration = Duration::from_secs(60);

    fn counting_loader(
        calls: &Arc<AtomicUsize>,
        value: &'static str,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<String>> + use<> {
        let calls = Arc::clone(calls);
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(value.to_string())
            }
            .boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_fetches_call_loader_once() {
        let cache: TtlCache<String> = TtlCache::new("test");
        let calls = Arc::new(AtomicUsize::new(0));

        let fetches = (0..5).map(|_| cache.fetch("k", counting_loader(&calls, "v"), TTL));
        let results = futures::future::join_all(fetches).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(results.len(), 5);
        for result in results {
            assert_eq!(result.unwrap(), "v");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_entry_skips_loader() {
        let cache: TtlCache<String> = TtlCache::new("test");
        let calls = Arc::new(AtomicUsize::new(0));

        cache.fetch("k", counting_loader(&calls, "v1"), TTL).await.unwrap();
        let second = cache.fetch("k", counting_loader(&calls, "v2"), TTL).await.unwrap();

        assert_eq!(second, "v1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_exactly_at_ttl() {
        let cache: TtlCache<u32> = TtlCache::new("test");
        cache.insert("k", 7, TTL);

        tokio::time::advance(TTL - Duration::from_millis(1)).await;
        assert_eq!(cache.get("k"), Some(7));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(cache.get("k"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_not_cached() {
        let cache: TtlCache<String> = TtlCache::new("test");
        let calls = Arc::new(AtomicUsize::new(0));

        let failing = {
            let calls = Arc::clone(&calls);
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<String, Error>(ApiError::ServerError("boom".to_string()).into())
            }
        };

        let err = cache.fetch("k", failing, TTL).await.unwrap_err();
        assert!(matches!(err.root(), Error::Api(ApiError::ServerError(_))));
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.stats().in_flight, 0);

        let value = cache.fetch("k", counting_loader(&calls, "ok"), TTL).await.unwrap();
        assert_eq!(value, "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_loader_does_not_block_key() {
        let cache: TtlCache<String> = TtlCache::new("test");
        let calls = Arc::new(AtomicUsize::new(0));

        let panicking = || async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if true {
                panic!("loader blew up");
            }
            Ok::<String, Error>(String::new())
        };

        let err = cache.fetch("k", panicking, TTL).await.unwrap_err();
        assert!(err.to_string().contains("request task failed"));
        assert_eq!(cache.stats().in_flight, 0);

        let value = cache.fetch("k", counting_loader(&calls, "ok"), TTL).await.unwrap();
        assert_eq!(value, "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_reaches_every_waiter() {
        let cache: TtlCache<String> = TtlCache::new("test");

        let failing = || async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Err::<String, Error>(ApiError::Network("down".to_string()).into())
        };

        let (a, b) = tokio::join!(
            cache.fetch("k", failing, TTL),
            cache.fetch("k", failing, TTL)
        );

        assert!(a.is_err());
        assert!(b.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_keeps_in_flight_request() {
        let cache: TtlCache<String> = TtlCache::new("test");
        let calls = Arc::new(AtomicUsize::new(0));

        let handle = tokio::spawn({
            let cache = cache.clone();
            let loader = counting_loader(&calls, "v");
            async move { cache.fetch("k", loader, TTL).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(cache.stats().in_flight, 1);

        cache.invalidate("k");
        assert_eq!(handle.await.unwrap().unwrap(), "v");
        assert_eq!(cache.get("k"), Some("v".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_all_discards_pending_result() {
        let cache: TtlCache<String> = TtlCache::new("test");
        let calls = Arc::new(AtomicUsize::new(0));
        cache.insert("other", "x".to_string(), TTL);

        let handle = tokio::spawn({
            let cache = cache.clone();
            let loader = counting_loader(&calls, "v");
            async move { cache.fetch("k", loader, TTL).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        cache.invalidate_all();
        assert_eq!(cache.stats(), TtlCacheStats::default());

        // the waiter still gets its value
        assert_eq!(handle.await.unwrap().unwrap(), "v");
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.get("other"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_prefix() {
        let cache: TtlCache<u32> = TtlCache::new("test");
        cache.insert("lines:list:a", 1, TTL);
        cache.insert("lines:list:b", 2, TTL);
        cache.insert("lines:item:1", 3, TTL);

        assert_eq!(cache.invalidate_prefix("lines:list:"), 2);
        assert_eq!(cache.get("lines:list:a"), None);
        assert_eq!(cache.get("lines:item:1"), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_counts_expired_entries() {
        let cache: TtlCache<u32> = TtlCache::new("test");
        cache.insert("short", 1, Duration::from_secs(1));
        cache.insert("long", 2, TTL);

        tokio::time::advance(Duration::from_secs(2)).await;
        let stats = cache.stats();

        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.fresh_entries, 1);
        assert_eq!(stats.expired_entries, 1);
    }
}
