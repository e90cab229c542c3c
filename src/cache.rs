//! Summary cache and singleflight coordinator.
//!
//! Per key the lifecycle is Empty -> Generating -> Cached -> Expired ->
//! Generating -> ... At most one caller generates at a time; the rest wait on
//! the in-flight marker and re-check the cache when it clears. Forced callers
//! skip both the freshness check and the marker, then write their result like
//! anyone else.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::Result;

struct CacheEntry<T> {
    payload: Arc<T>,
    created_at: Instant,
}

pub struct SummaryCache<T> {
    entries: Mutex<HashMap<String, CacheEntry<T>>>,
    inflight: Mutex<HashMap<String, watch::Receiver<()>>>,
}

// Removes the in-flight marker before the held sender drops, so woken waiters
// always observe a clean map.
struct FlightGuard<'a, T> {
    cache: &'a SummaryCache<T>,
    key: String,
    _tx: watch::Sender<()>,
}

impl<T> Drop for FlightGuard<'_, T> {
    fn drop(&mut self) {
        self.cache.inflight.lock().unwrap().remove(&self.key);
    }
}

impl<T> Default for SummaryCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SummaryCache<T> {
    pub fn new() -> Self {
        SummaryCache {
            entries: Mutex::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    fn fresh(&self, key: &str, ttl: Duration) -> Option<Arc<T>> {
        let entries = self.entries.lock().unwrap();
        entries
            .get(key)
            .filter(|entry| entry.created_at.elapsed() < ttl)
            .map(|entry| Arc::clone(&entry.payload))
    }

    fn store(&self, key: &str, payload: Arc<T>) {
        let entry = CacheEntry {
            payload,
            created_at: Instant::now(),
        };
        self.entries.lock().unwrap().insert(key.to_string(), entry);
    }

    /// Returns the cached value for `key` or produces one via `generator`,
    /// making sure at most one generation per key runs at a time. `force`
    /// regenerates unconditionally and overwrites whatever lands last.
    pub async fn request<F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        force: bool,
        generator: F,
    ) -> Result<Arc<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if force {
            tracing::info!("forced regeneration for {}", key);
            let value = Arc::new(generator().await?);
            self.store(key, Arc::clone(&value));
            return Ok(value);
        }

        enum Role {
            Waiter(watch::Receiver<()>),
            Leader(watch::Sender<()>),
        }

        loop {
            if let Some(hit) = self.fresh(key, ttl) {
                tracing::debug!("cache hit for {}", key);
                return Ok(hit);
            }

            let role = {
                let mut inflight = self.inflight.lock().unwrap();
                match inflight.get(key) {
                    Some(rx) => Role::Waiter(rx.clone()),
                    None => {
                        let (tx, rx) = watch::channel(());
                        inflight.insert(key.to_string(), rx);
                        Role::Leader(tx)
                    }
                }
            };

            match role {
                Role::Waiter(mut rx) => {
                    tracing::debug!("awaiting in-flight generation for {}", key);
                    // A closed channel means the generation already finished
                    let _ = rx.changed().await;
                }
                Role::Leader(tx) => {
                    let _guard = FlightGuard {
                        cache: self,
                        key: key.to_string(),
                        _tx: tx,
                    };

                    // A result may have landed between the freshness check
                    // and taking the marker
                    if let Some(hit) = self.fresh(key, ttl) {
                        return Ok(hit);
                    }

                    tracing::info!("generating {}", key);
                    let value = Arc::new(generator().await?);
                    self.store(key, Arc::clone(&value));
                    return Ok(value);
                }
            }
        }
    }
}
