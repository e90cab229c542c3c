use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;

/// Exponential backoff schedule: `base * 2^attempt` plus up to `max_jitter`
/// of random spread.
#[derive(Clone, Copy)]
pub struct Backoff {
    pub base: Duration,
    pub max_jitter: Duration,
}

impl Backoff {
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponential = self.base.saturating_mul(2u32.saturating_pow(attempt));
        let jitter_ms = self.max_jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return exponential;
        }
        exponential + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }
}

/// Runs `operation` up to `max_attempts` times, sleeping per `backoff` between
/// attempts. Errors the predicate rejects abort immediately; exhausting the
/// attempts returns the last error seen.
pub async fn run<F, Fut, T, E>(
    mut operation: F,
    is_retryable: impl Fn(&E) -> bool,
    max_attempts: u32,
    backoff: Backoff,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    for attempt in 0..max_attempts {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!("operation succeeded after {} retries", attempt);
                }
                return Ok(value);
            }
            Err(err) => {
                if attempt + 1 == max_attempts || !is_retryable(&err) {
                    return Err(err);
                }

                let delay = backoff.delay(attempt);
                tracing::warn!(
                    "attempt {}/{} failed, retrying in {:?}: {}",
                    attempt + 1,
                    max_attempts,
                    delay,
                    err
                );
                sleep(delay).await;
            }
        }
    }

    unreachable!("max_attempts must be at least 1")
}
