//! Caller-requested retry with exponential backoff.
//!
//! The core never retries on its own. A caller opts in per call by setting
//! [`RequestOptions::retry`](crate::RequestOptions::retry); the requester then
//! runs the whole request/reply cycle through [`retry_with_backoff`], building
//! a fresh envelope for every attempt.
//!
//! Only transport failures
//! ([`RpcError::is_transport`](crate::RpcError::is_transport)) are retried.
//! A reply that arrived, whether it carried a failed status or did not
//! decode, is final.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use uuid::Uuid;

use crate::{log_debug, Result};

/// Retry configuration with exponential backoff.
///
/// # Example
///
/// ```
/// use subject_rpc::{RequestOptions, RetryConfig};
/// use std::time::Duration;
///
/// let opts = RequestOptions::default().with_retry(RetryConfig {
///     max_attempts: 5,
///     multiplier: 2.0,
///     initial_delay: Duration::from_millis(100),
///     max_delay: Duration::from_secs(10),
/// });
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt. `0` means a single attempt.
    pub max_attempts: u32,

    /// Factor applied to the delay after each retry.
    pub multiplier: f32,

    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    /// Three retries starting at 100ms, doubling, capped at 5s.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            multiplier: 2.0,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryConfig {
    /// Nominal delay before each retry, before jitter.
    fn schedule(&self) -> impl Iterator<Item = Duration> + '_ {
        // ---
        let first = self.initial_delay.min(self.max_delay);
        std::iter::successors(Some(first), move |prev| {
            let next = prev.as_secs_f64() * f64::from(self.multiplier);
            Some(Duration::from_secs_f64(next).min(self.max_delay))
        })
        .take(self.max_attempts as usize)
    }
}

/// Run `operation`, retrying transport failures per `config`.
///
/// With `config` set to `None` the operation runs exactly once.
pub(crate) async fn retry_with_backoff<F, Fut, T>(
    config: Option<&RetryConfig>,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    // ---
    let Some(config) = config else {
        return operation().await;
    };

    let mut delays = config.schedule();
    let mut attempt = 1u32;

    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transport() => err,
            Err(err) => return Err(err),
        };

        let Some(delay) = delays.next() else {
            log_debug!("giving up after {attempt} attempts: {err}");
            return Err(err);
        };

        let delay = jitter(delay);
        log_debug!("attempt {attempt} failed ({err}), retrying in {delay:?}");
        sleep(delay).await;
        attempt += 1;
    }
}

/// Scale `delay` by a random factor in `[0.75, 1.25]`.
fn jitter(delay: Duration) -> Duration {
    let spread = (Uuid::new_v4().as_u128() % 1001) as f64 / 1000.0;
    delay.mul_f64(0.75 + spread * 0.5)
}
