//! Deadline applied to every store call.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use super::{Store, StoreError, StoreLoader, StoreResult};

async fn bounded<T>(
    limit: Duration,
    call: impl Future<Output = StoreResult<T>> + Send,
) -> StoreResult<T> {
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| StoreError::Timeout(limit))?
}

/// Store wrapper failing any call that outlives `limit`.
pub struct TimeoutStore {
    inner: Box<dyn Store>,
    limit: Duration,
}

impl TimeoutStore {
    pub fn new(inner: Box<dyn Store>, limit: Duration) -> Self {
        Self { inner, limit }
    }
}

#[async_trait]
impl Store for TimeoutStore {
    async fn get(&self, key: &str) -> StoreResult<String> {
        bounded(self.limit, self.inner.get(key)).await
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        bounded(self.limit, self.inner.set(key, value)).await
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        bounded(self.limit, self.inner.delete(key)).await
    }
}

/// Loader whose stores are wrapped in [`TimeoutStore`].
///
/// Building the store is bounded as well, since cloud builders authenticate.
pub struct TimeoutLoader<'a> {
    inner: &'a dyn StoreLoader,
    limit: Duration,
}

impl<'a> TimeoutLoader<'a> {
    pub fn new(inner: &'a dyn StoreLoader, limit: Duration) -> Self {
        Self { inner, limit }
    }
}

#[async_trait]
impl StoreLoader for TimeoutLoader<'_> {
    async fn resolve_store(&self, name: &str) -> StoreResult<Box<dyn Store>> {
        let store = bounded(self.limit, self.inner.resolve_store(name)).await?;
        Ok(Box::new(TimeoutStore::new(store, self.limit)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowStore;

    #[async_trait]
    impl Store for SlowStore {
        async fn get(&self, _key: &str) -> StoreResult<String> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("late".to_string())
        }

        async fn set(&self, _key: &str, _value: &str) -> StoreResult<()> {
            Ok(())
        }

        async fn delete(&self, _key: &str) -> StoreResult<()> {
            Err(StoreError::KeyNotFound)
        }
    }

    struct SlowLoader;

    #[async_trait]
    impl StoreLoader for SlowLoader {
        async fn resolve_store(&self, _name: &str) -> StoreResult<Box<dyn Store>> {
            Ok(Box::new(SlowStore))
        }
    }

    #[tokio::test]
    async fn test_slow_call_times_out() {
        let store = TimeoutStore::new(Box::new(SlowStore), Duration::from_millis(20));

        let err = store.get("key").await.unwrap_err();
        assert!(matches!(err, StoreError::Timeout(limit) if limit == Duration::from_millis(20)));
    }

    #[tokio::test]
    async fn test_fast_calls_pass_through() {
        let store = TimeoutStore::new(Box::new(SlowStore), Duration::from_secs(5));

        store.set("key", "value").await.unwrap();
        assert!(store.delete("key").await.unwrap_err().is_key_not_found());
    }

    #[tokio::test]
    async fn test_loader_wraps_stores() {
        let loader = TimeoutLoader::new(&SlowLoader, Duration::from_millis(10));
        let store = loader.resolve_store("default").await.unwrap();

        assert!(matches!(
            store.get("key").await.unwrap_err(),
            StoreError::Timeout(_)
        ));
    }
}
