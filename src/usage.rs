use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::kv::{KvError, KvStore};
use crate::retry::{self, Backoff};

const COUNTER_KEY: &str = "usage:counter";
const LOCK_KEY: &str = "usage:lock";

const LOCK_TTL: Duration = Duration::from_secs(5);
const LOCK_ATTEMPTS: u32 = 3;
const LOCK_BACKOFF_BASE: Duration = Duration::from_millis(100);

// Counters idle out a month after the last write
const COUNTER_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

#[derive(Debug, thiserror::Error)]
pub enum UsageError {
    #[error("usage lock unavailable after {0} attempts")]
    LockUnavailable(u32),

    #[error(transparent)]
    Store(#[from] KvError),

    #[error("usage counter serialization: {0}")]
    Codec(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
enum AcquireError {
    #[error("lock is held")]
    Busy,

    #[error(transparent)]
    Store(#[from] KvError),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UsageCounter {
    pub period_start: DateTime<Utc>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub requests: u64,
}

impl UsageCounter {
    fn fresh(now: DateTime<Utc>) -> Self {
        UsageCounter {
            period_start: month_start(now),
            input_tokens: 0,
            output_tokens: 0,
            requests: 0,
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    fn same_period(&self, now: DateTime<Utc>) -> bool {
        self.period_start.year() == now.year() && self.period_start.month() == now.month()
    }
}

fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

/// Accumulates token usage into a monthly counter in the external store. The
/// counter is shared across instances, so updates go through a short-lived
/// conditional-set lock.
pub struct UsageTracker {
    store: Arc<dyn KvStore>,
}

impl UsageTracker {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        UsageTracker { store }
    }

    /// Adds one request's token counts to the monthly counter. Callers treat
    /// a failure here as loggable noise, never as a request failure.
    pub async fn record(
        &self,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Result<UsageCounter, UsageError> {
        self.acquire_lock().await?;

        let result = self.update(input_tokens, output_tokens).await;

        // Release runs whether the update succeeded or not
        if let Err(err) = self.store.del(LOCK_KEY).await {
            tracing::warn!("failed to release usage lock: {}", err);
        }

        result
    }

    /// Lock-free read for the admin dashboard.
    pub async fn current(&self) -> Result<UsageCounter, UsageError> {
        let now = Utc::now();
        match self.store.get(COUNTER_KEY).await? {
            Some(raw) => {
                let counter: UsageCounter = serde_json::from_str(&raw)?;
                if counter.same_period(now) {
                    Ok(counter)
                } else {
                    Ok(UsageCounter::fresh(now))
                }
            }
            None => Ok(UsageCounter::fresh(now)),
        }
    }

    async fn acquire_lock(&self) -> Result<(), UsageError> {
        let outcome = retry::run(
            || async {
                match self.store.set_nx(LOCK_KEY, "held", LOCK_TTL).await {
                    Ok(true) => Ok(()),
                    Ok(false) => Err(AcquireError::Busy),
                    Err(err) => Err(AcquireError::Store(err)),
                }
            },
            |_| true,
            LOCK_ATTEMPTS,
            Backoff {
                base: LOCK_BACKOFF_BASE,
                max_jitter: Duration::ZERO,
            },
        )
        .await;

        outcome.map_err(|_| UsageError::LockUnavailable(LOCK_ATTEMPTS))
    }

    async fn update(
        &self,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Result<UsageCounter, UsageError> {
        let now = Utc::now();

        let mut counter = match self.store.get(COUNTER_KEY).await? {
            Some(raw) => serde_json::from_str::<UsageCounter>(&raw).unwrap_or_else(|err| {
                tracing::warn!("resetting undecodable usage counter: {}", err);
                UsageCounter::fresh(now)
            }),
            None => UsageCounter::fresh(now),
        };

        if !counter.same_period(now) {
            counter = UsageCounter::fresh(now);
        }

        counter.input_tokens += input_tokens;
        counter.output_tokens += output_tokens;
        counter.requests += 1;

        let raw = serde_json::to_string(&counter)?;
        self.store.set_ex(COUNTER_KEY, &raw, COUNTER_TTL).await?;

        Ok(counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;
    use tokio::time::Instant;

    fn tracker() -> (Arc<MemoryKv>, UsageTracker) {
        let store = Arc::new(MemoryKv::new());
        let tracker = UsageTracker::new(store.clone() as Arc<dyn KvStore>);
        (store, tracker)
    }

    #[tokio::test]
    async fn accumulates_tokens_and_request_counts() {
        let (_, tracker) = tracker();

        let first = tracker.record(100, 50).await.unwrap();
        assert_eq!(first.input_tokens, 100);
        assert_eq!(first.output_tokens, 50);
        assert_eq!(first.requests, 1);

        let second = tracker.record(7, 3).await.unwrap();
        assert_eq!(second.input_tokens, 107);
        assert_eq!(second.output_tokens, 53);
        assert_eq!(second.requests, 2);
        assert_eq!(second.total_tokens(), 160);
    }

    #[tokio::test]
    async fn concurrent_records_do_not_lose_updates() {
        let (_, tracker) = tracker();

        let (a, b) = tokio::join!(tracker.record(100, 50), tracker.record(100, 50));
        a.unwrap();
        b.unwrap();

        let settled = tracker.current().await.unwrap();
        assert_eq!(settled.input_tokens, 200);
        assert_eq!(settled.output_tokens, 100);
        assert_eq!(settled.requests, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_a_held_lock_to_clear() {
        let (store, _) = tracker();
        let tracker = UsageTracker::new(store.clone() as Arc<dyn KvStore>);

        // Simulate another instance holding the lock
        assert!(store.set_nx(LOCK_KEY, "other", Duration::from_secs(60)).await.unwrap());

        let recorder = tokio::spawn(async move {
            let started = Instant::now();
            let counter = tracker.record(100, 50).await;
            (counter, started.elapsed())
        });

        // Release after the first two acquisition attempts have failed
        tokio::time::sleep(Duration::from_millis(150)).await;
        store.del(LOCK_KEY).await.unwrap();

        let (counter, elapsed) = recorder.await.unwrap();
        let counter = counter.unwrap();
        assert_eq!(counter.requests, 1);
        // Two poll intervals: 100ms then 200ms
        assert!(elapsed >= Duration::from_millis(300), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_when_the_lock_never_clears() {
        let (store, tracker) = tracker();
        assert!(store.set_nx(LOCK_KEY, "other", Duration::from_secs(3600)).await.unwrap());

        let err = tracker.record(100, 50).await.unwrap_err();
        assert!(matches!(err, UsageError::LockUnavailable(3)));

        // The counter was never touched
        assert!(store.get(COUNTER_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rolls_over_to_a_new_month() {
        let (store, tracker) = tracker();

        let stale = UsageCounter {
            period_start: Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).single().unwrap(),
            input_tokens: 999,
            output_tokens: 999,
            requests: 42,
        };
        store
            .set_ex(COUNTER_KEY, &serde_json::to_string(&stale).unwrap(), COUNTER_TTL)
            .await
            .unwrap();

        let counter = tracker.record(10, 5).await.unwrap();
        assert_eq!(counter.input_tokens, 10);
        assert_eq!(counter.output_tokens, 5);
        assert_eq!(counter.requests, 1);
        assert_eq!(counter.period_start, month_start(Utc::now()));
    }

    #[tokio::test]
    async fn resets_an_undecodable_counter() {
        let (store, tracker) = tracker();
        store.set_ex(COUNTER_KEY, "not json", COUNTER_TTL).await.unwrap();

        let counter = tracker.record(10, 5).await.unwrap();
        assert_eq!(counter.input_tokens, 10);
        assert_eq!(counter.requests, 1);
    }
}
