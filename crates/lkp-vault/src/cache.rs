// SPDX-License-Identifier: MIT OR Apache-2.0
//! Process-wide secret cache.
//!
//! Entries live for an absolute 5 minutes from fetch. Concurrent requests
//! for the same path collapse into one upstream fetch: the per-path slot
//! lock is held across the fetch, so followers wake up to a fresh value.

use crate::error::VaultError;
use crate::store::SecretStore;
use lkp_core::CancelToken;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

/// Default absolute time-to-live for cached secrets.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

#[derive(Default)]
struct Slot {
    value: Option<(String, Instant)>,
}

/// Concurrency-safe secret cache with absolute TTL and per-key single
/// flight.
pub struct SecretCache {
    ttl: Duration,
    slots: Mutex<HashMap<String, Arc<tokio::sync::Mutex<Slot>>>>,
}

impl Default for SecretCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretCache {
    /// A cache with the default 5-minute TTL.
    #[must_use]
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    /// A cache with a custom TTL; used by tests to exercise expiry.
    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached value for `path`, fetching through `store` when
    /// absent or expired.
    ///
    /// Waiting on the slot lock is itself cancellable; a caller whose token
    /// fires while another fetch is in flight gets [`VaultError::Cancelled`]
    /// without disturbing that fetch.
    pub async fn get_or_fetch(
        &self,
        path: &str,
        store: &dyn SecretStore,
        cancel: &CancelToken,
    ) -> Result<String, VaultError> {
        let slot = {
            let mut slots = self.slots.lock().expect("secret cache poisoned");
            Arc::clone(slots.entry(path.to_string()).or_default())
        };

        let mut guard = tokio::select! {
            () = cancel.cancelled() => return Err(VaultError::Cancelled),
            guard = slot.lock() => guard,
        };

        if let Some((value, fetched_at)) = &guard.value {
            if fetched_at.elapsed() < self.ttl {
                return Ok(value.clone());
            }
            debug!(target: "lakeport.vault", path, "cached secret expired; refetching");
        }

        let value = store.get_secret(path, cancel).await?;
        guard.value = Some((value.clone(), Instant::now()));
        Ok(value)
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        self.slots.lock().expect("secret cache poisoned").clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingStore {
        fetches: AtomicUsize,
        delay: Duration,
    }

    impl CountingStore {
        fn new(delay: Duration) -> Self {
            Self {
                fetches: AtomicUsize::new(0),
                delay,
            }
        }

        fn fetch_count(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SecretStore for CountingStore {
        fn provider_name(&self) -> &str {
            "counting"
        }

        async fn get_secret(
            &self,
            path: &str,
            _cancel: &CancelToken,
        ) -> Result<String, VaultError> {
            let n = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(format!("{path}#{n}"))
        }
    }

    #[tokio::test]
    async fn repeat_fetches_within_ttl_hit_the_cache() {
        let cache = SecretCache::new();
        let store = CountingStore::new(Duration::ZERO);
        let cancel = CancelToken::new();

        let first = cache.get_or_fetch("oracle/hr", &store, &cancel).await.unwrap();
        let second = cache.get_or_fetch("oracle/hr", &store, &cancel).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.fetch_count(), 1);
    }

    #[tokio::test]
    async fn expired_entries_refetch() {
        let cache = SecretCache::with_ttl(Duration::from_millis(10));
        let store = CountingStore::new(Duration::ZERO);
        let cancel = CancelToken::new();

        let first = cache.get_or_fetch("p", &store, &cancel).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let second = cache.get_or_fetch("p", &store, &cancel).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(store.fetch_count(), 2);
    }

    #[tokio::test]
    async fn concurrent_requests_collapse_to_one_fetch() {
        let cache = Arc::new(SecretCache::new());
        let store = Arc::new(CountingStore::new(Duration::from_millis(50)));
        let cancel = CancelToken::new();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let store = Arc::clone(&store);
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                cache.get_or_fetch("shared", store.as_ref(), &cancel).await
            }));
        }
        let mut values = Vec::new();
        for handle in handles {
            values.push(handle.await.unwrap().unwrap());
        }
        assert_eq!(store.fetch_count(), 1, "single flight collapsed fetches");
        assert!(values.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn distinct_paths_fetch_independently() {
        let cache = SecretCache::new();
        let store = CountingStore::new(Duration::ZERO);
        let cancel = CancelToken::new();

        cache.get_or_fetch("a", &store, &cancel).await.unwrap();
        cache.get_or_fetch("b", &store, &cancel).await.unwrap();
        assert_eq!(store.fetch_count(), 2);
    }

    #[tokio::test]
    async fn cancelled_waiter_does_not_disturb_the_fetch() {
        let cache = Arc::new(SecretCache::new());
        let store = Arc::new(CountingStore::new(Duration::from_millis(80)));

        let leader_cancel = CancelToken::new();
        let leader = {
            let cache = Arc::clone(&cache);
            let store = Arc::clone(&store);
            let cancel = leader_cancel.clone();
            tokio::spawn(async move { cache.get_or_fetch("k", store.as_ref(), &cancel).await })
        };

        // Give the leader time to take the slot lock.
        tokio::time::sleep(Duration::from_millis(10)).await;

        let follower_cancel = CancelToken::new();
        follower_cancel.cancel();
        let followed = cache
            .get_or_fetch("k", store.as_ref(), &follower_cancel)
            .await;
        assert_eq!(followed, Err(VaultError::Cancelled));

        let led = leader.await.unwrap();
        assert!(led.is_ok());
        assert_eq!(store.fetch_count(), 1);
    }
}
