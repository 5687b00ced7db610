//! Read-through memoisation shared by the managers.
//!
//! Entries are keyed by operation name plus argument list. Managers
//! invalidate the keys their own writes affect; nothing watches the
//! underlying stores, so a write that goes straight to a driver stays
//! invisible until the entry is invalidated.

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::time::{Duration, Instant};

use super::error::{EntityKind, ServiceError};
use crate::config::CacheConfig;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub operation: &'static str,
    pub args: Vec<String>,
}

impl CacheKey {
    pub fn new(operation: &'static str, args: &[&str]) -> Self {
        Self {
            operation,
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone)]
enum Cached {
    Value(Value),
    NotFound { kind: EntityKind, id: String },
}

#[derive(Debug, Clone)]
struct CacheEntry {
    cached: Cached,
    stored_at: Instant,
}

pub struct Cache {
    entries: DashMap<CacheKey, CacheEntry>,
    enabled: bool,
    expiration: Option<Duration>,
}

impl Default for Cache {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

impl Cache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            enabled: config.enabled,
            expiration: config.expiration(),
        }
    }

    /// Return the cached outcome for `(operation, args)` or run `loader` and
    /// remember its result. NotFound outcomes are remembered too; other
    /// errors are passed through uncached.
    pub async fn memoize<T, F, Fut>(
        &self,
        operation: &'static str,
        args: &[&str],
        loader: F,
    ) -> Result<T, ServiceError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        if !self.enabled {
            return loader().await;
        }

        let key = CacheKey::new(operation, args);
        if let Some(cached) = self.lookup(&key) {
            return match cached {
                Cached::Value(value) => serde_json::from_value(value)
                    .map_err(|e| ServiceError::Unexpected(e.into())),
                Cached::NotFound { kind, id } => Err(ServiceError::not_found(kind, id)),
            };
        }

        tracing::debug!(operation = operation, args = ?key.args, "cache miss");
        let result = loader().await;
        let cached = match &result {
            Ok(value) => Some(Cached::Value(
                serde_json::to_value(value).map_err(|e| ServiceError::Unexpected(e.into()))?,
            )),
            Err(ServiceError::NotFound { kind, id }) => Some(Cached::NotFound {
                kind: *kind,
                id: id.clone(),
            }),
            Err(_) => None,
        };
        if let Some(cached) = cached {
            self.entries.insert(
                key,
                CacheEntry {
                    cached,
                    stored_at: Instant::now(),
                },
            );
        }
        result
    }

    fn lookup(&self, key: &CacheKey) -> Option<Cached> {
        let entry = self.entries.get(key).map(|e| e.value().clone())?;
        if self
            .expiration
            .is_some_and(|ttl| entry.stored_at.elapsed() >= ttl)
        {
            self.entries.remove(key);
            return None;
        }
        Some(entry.cached)
    }

    pub fn invalidate(&self, operation: &'static str, args: &[&str]) {
        self.entries.remove(&CacheKey::new(operation, args));
    }

    pub fn invalidate_operation(&self, operation: &'static str) {
        self.entries.retain(|key, _| key.operation != operation);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn load(calls: &AtomicUsize, value: &str) -> Result<String, ServiceError> {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(value.to_string())
    }

    #[tokio::test]
    async fn test_second_read_is_served_from_cache() {
        let cache = Cache::default();
        let calls = AtomicUsize::new(0);
        let first: String = cache.memoize("op", &["a"], || load(&calls, "v1")).await.unwrap();
        let second: String = cache.memoize("op", &["a"], || load(&calls, "v2")).await.unwrap();
        assert_eq!(first, "v1");
        assert_eq!(second, "v1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_arguments_are_part_of_the_key() {
        let cache = Cache::default();
        let calls = AtomicUsize::new(0);
        let _: String = cache.memoize("op", &["a"], || load(&calls, "v")).await.unwrap();
        let _: String = cache.memoize("op", &["b"], || load(&calls, "v")).await.unwrap();
        let _: String = cache.memoize("other", &["a"], || load(&calls, "v")).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_not_found_cached_until_invalidated() {
        let cache = Cache::default();
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let missing = || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<String, _>(ServiceError::not_found(EntityKind::Project, "p1"))
        };
        assert!(cache.memoize("get_project", &["p1"], missing).await.is_err());
        let err = cache.memoize("get_project", &["p1"], missing).await.unwrap_err();
        assert!(err.is_not_found_of(EntityKind::Project));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cache.invalidate("get_project", &["p1"]);
        let found: String = cache
            .memoize("get_project", &["p1"], || load(calls, "now here"))
            .await
            .unwrap();
        assert_eq!(found, "now here");
    }

    #[tokio::test]
    async fn test_other_errors_not_cached() {
        let cache = Cache::default();
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let failing = || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<String, _>(ServiceError::unexpected("backend down"))
        };
        assert!(cache.memoize("op", &[], failing).await.is_err());
        assert!(cache.memoize("op", &[], failing).await.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_cache_always_loads() {
        let cache = Cache::new(&CacheConfig {
            enabled: false,
            expiration_seconds: None,
        });
        let calls = AtomicUsize::new(0);
        let _: String = cache.memoize("op", &[], || load(&calls, "v")).await.unwrap();
        let _: String = cache.memoize("op", &[], || load(&calls, "v")).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_operation() {
        let cache = Cache::default();
        let calls = AtomicUsize::new(0);
        let _: String = cache.memoize("op", &["a"], || load(&calls, "v")).await.unwrap();
        let _: String = cache.memoize("op", &["b"], || load(&calls, "v")).await.unwrap();
        let _: String = cache.memoize("keep", &["a"], || load(&calls, "v")).await.unwrap();
        cache.invalidate_operation("op");
        assert_eq!(cache.len(), 1);
    }
}
