// Keyed cache of recent-item lists with in-flight fetch coalescing.
// Concurrent requests for the same key share a single underlying fetch.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};

use crate::error::{Result, SharedResult};

use super::store::CachedData;

/// Handle to an in-flight list fetch. Cloning joins the same fetch.
pub type ListTask<Item> = Shared<BoxFuture<'static, SharedResult<Vec<Item>>>>;

struct Inner<Item: Clone> {
    entries: HashMap<String, CachedData<Vec<Item>>>,
    inflight: HashMap<String, ListTask<Item>>,
}

pub struct RecentListCache<Item: Clone> {
    inner: Mutex<Inner<Item>>,
}

impl<Item: Clone> Default for RecentListCache<Item> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                inflight: HashMap::new(),
            }),
        }
    }
}

impl<Item> RecentListCache<Item>
where
    Item: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored list if it was fetched within `max_age` of `now`.
    pub fn cached(&self, key: &str, now: DateTime<Utc>, max_age: Duration) -> Option<Vec<Item>> {
        self.lock()
            .entries
            .get(key)
            .filter(|entry| entry.is_valid(now, max_age))
            .map(|entry| entry.data.clone())
    }

    /// Stored list regardless of age, used as a fallback after a failed refresh.
    pub fn stale(&self, key: &str) -> Option<Vec<Item>> {
        self.lock().entries.get(key).map(|entry| entry.data.clone())
    }

    pub fn needs_refresh(&self, key: &str, now: DateTime<Utc>, max_age: Duration) -> bool {
        match self.lock().entries.get(key) {
            Some(entry) => entry.is_expired(now, max_age),
            None => true,
        }
    }

    /// Join the fetch already running for `key`, or start one with `factory`.
    ///
    /// `factory` is only invoked when no fetch for `key` is outstanding.
    pub fn task<F, Fut>(&self, key: &str, factory: F) -> ListTask<Item>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Item>>> + Send + 'static,
    {
        let mut inner = self.lock();
        if let Some(existing) = inner.inflight.get(key) {
            log::debug!("Joining in-flight fetch for {}", key);
            return existing.clone();
        }

        let task = factory().map(|result| result.map_err(Arc::new)).boxed().shared();
        inner.inflight.insert(key.to_string(), task.clone());
        task
    }

    pub fn clear_inflight(&self, key: &str) {
        self.lock().inflight.remove(key);
    }

    pub fn is_inflight(&self, key: &str) -> bool {
        self.lock().inflight.contains_key(key)
    }

    /// Replace the entry for `key` wholesale.
    pub fn store(&self, items: Vec<Item>, key: &str, fetched_at: DateTime<Utc>) {
        self.lock()
            .entries
            .insert(key.to_string(), CachedData::new(items, fetched_at));
    }

    fn lock(&self) -> MutexGuard<'_, Inner<Item>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
