//! Palate keyed fetch caches.
//!
//! One [`ResourceCache`] instance owns the lifecycle of every remote lookup
//! of one kind: each key moves Idle -> Loading -> Ready/Error exactly once,
//! concurrent callers coalesce onto the in-flight fetch, and an epoch
//! channel wakes whoever is waiting for a key to settle.

#![forbid(unsafe_code)]

use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use metrics::counter;
use palate_api::{ApiError, ApiResult};
use rustc_hash::FxHashMap;
use tokio::sync::watch;

pub mod allergens;
pub mod resolver;

pub use allergens::{AllergenEntry, AllergenStore};
pub use resolver::{RecipeResolver, RecipeSteps};

/// Lifecycle of one cached remote fetch. There is exactly one state per
/// key; parallel "loading" and "error" books for the same key are what
/// this type exists to prevent.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchState<T> {
    Idle,
    Loading,
    Ready(T),
    Error(ApiError),
}

impl<T> FetchState<T> {
    pub fn is_idle(&self) -> bool {
        matches!(self, FetchState::Idle)
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, FetchState::Loading)
    }

    pub fn as_ready(&self) -> Option<&T> {
        match self {
            FetchState::Ready(v) => Some(v),
            _ => None,
        }
    }

    /// Ready or Error; Loading and Idle are not.
    pub fn is_settled(&self) -> bool {
        matches!(self, FetchState::Ready(_) | FetchState::Error(_))
    }
}

/// Per-key memoizing fetch cache. Cheap to clone; clones share state, so a
/// spawned task can complete an entry the store began.
#[derive(Clone)]
pub struct ResourceCache<K, T> {
    inner: Arc<CacheInner<K, T>>,
}

struct CacheInner<K, T> {
    /// Metric label, e.g. "resolver" or "allergens".
    name: &'static str,
    map: Mutex<FxHashMap<K, FetchState<T>>>,
    epoch_tx: watch::Sender<u64>,
}

impl<K, T> ResourceCache<K, T>
where
    K: Eq + Hash + Clone,
    T: Clone,
{
    pub fn new(name: &'static str) -> Self {
        let (epoch_tx, _) = watch::channel(0u64);
        Self {
            inner: Arc::new(CacheInner { name, map: Mutex::new(FxHashMap::default()), epoch_tx }),
        }
    }

    /// Current state for a key; absent keys read as Idle.
    pub fn state(&self, key: &K) -> FetchState<T> {
        self.inner.map.lock().unwrap().get(key).cloned().unwrap_or(FetchState::Idle)
    }

    pub fn keys(&self) -> Vec<K> {
        self.inner.map.lock().unwrap().keys().cloned().collect()
    }

    /// Receiver that changes whenever any entry settles.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.epoch_tx.subscribe()
    }

    /// Move Idle to Loading under one lock. True means the caller owns the
    /// fetch; false means another fetch is in flight or the key settled.
    pub fn begin(&self, key: &K) -> bool {
        let mut map = self.inner.map.lock().unwrap();
        match map.get(key) {
            None | Some(FetchState::Idle) => {
                map.insert(key.clone(), FetchState::Loading);
                counter!("store_fetch_started_total", 1u64, "cache" => self.inner.name);
                true
            }
            _ => false,
        }
    }

    /// Like [`begin`](Self::begin) but a settled Error also rearms, for
    /// stores where selecting again is the retry gesture.
    pub fn begin_retry(&self, key: &K) -> bool {
        let mut map = self.inner.map.lock().unwrap();
        match map.get(key) {
            None | Some(FetchState::Idle) | Some(FetchState::Error(_)) => {
                map.insert(key.clone(), FetchState::Loading);
                counter!("store_fetch_started_total", 1u64, "cache" => self.inner.name);
                true
            }
            _ => false,
        }
    }

    /// Record a fetch outcome and wake waiters.
    pub fn complete(&self, key: &K, outcome: ApiResult<T>) {
        {
            let mut map = self.inner.map.lock().unwrap();
            match outcome {
                Ok(v) => {
                    map.insert(key.clone(), FetchState::Ready(v));
                }
                Err(e) => {
                    counter!("store_fetch_errors_total", 1u64, "cache" => self.inner.name);
                    map.insert(key.clone(), FetchState::Error(e));
                }
            }
        }
        self.inner.epoch_tx.send_modify(|e| *e += 1);
    }

    /// Memoized fetch. The first caller per key runs `fetch`; everyone else
    /// either gets the settled outcome straight from the map or awaits the
    /// in-flight fetch. Errors settle too and replay to later callers.
    pub async fn get_or_fetch<F, Fut>(&self, key: K, fetch: F) -> ApiResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        // Subscribe before inspecting state so a completion racing this
        // call still wakes us.
        let mut rx = self.subscribe();
        if self.begin(&key) {
            counter!("store_cache_miss_total", 1u64, "cache" => self.inner.name);
            let outcome = fetch().await;
            self.complete(&key, outcome.clone());
            return outcome;
        }
        loop {
            match self.state(&key) {
                FetchState::Ready(v) => {
                    counter!("store_cache_hit_total", 1u64, "cache" => self.inner.name);
                    return Ok(v);
                }
                FetchState::Error(e) => {
                    counter!("store_cache_hit_total", 1u64, "cache" => self.inner.name);
                    return Err(e);
                }
                // Loading (or a reset we did not cause): wait for a bump.
                _ => {}
            }
            if rx.changed().await.is_err() {
                return Err(ApiError::Internal("cache epoch channel closed".into()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_is_single_shot_until_complete() {
        let cache: ResourceCache<String, u32> = ResourceCache::new("test");
        let key = "k".to_string();
        assert!(cache.state(&key).is_idle());
        assert!(cache.begin(&key));
        assert!(!cache.begin(&key), "second begin must lose while loading");
        assert!(cache.state(&key).is_loading());

        cache.complete(&key, Ok(7));
        assert!(!cache.begin(&key), "ready entries never refetch");
        assert_eq!(cache.state(&key).as_ready(), Some(&7));
    }

    #[test]
    fn begin_retry_rearms_only_errors() {
        let cache: ResourceCache<String, u32> = ResourceCache::new("test");
        let key = "k".to_string();
        cache.complete(&key, Err(ApiError::Remote { status: 500, message: "boom".into() }));
        assert!(cache.begin_retry(&key), "error entries rearm");
        cache.complete(&key, Ok(1));
        assert!(!cache.begin_retry(&key), "ready entries stay settled");
    }

    #[test]
    fn epoch_bumps_on_complete() {
        let cache: ResourceCache<String, u32> = ResourceCache::new("test");
        let rx = cache.subscribe();
        let before = *rx.borrow();
        cache.complete(&"a".to_string(), Ok(1));
        cache.complete(&"b".to_string(), Err(ApiError::NotFound("x".into())));
        assert_eq!(*rx.borrow(), before + 2);
    }
}
