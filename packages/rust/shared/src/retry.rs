//! Bounded retry with exponential backoff for adapter calls.

use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::exponential::ExponentialBackoff;
use tracing::warn;

use crate::error::{NewsletterError, Result};

/// How many times, and how patiently, to retry a transient failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay: initial_delay.saturating_mul(32),
        }
    }

    /// Single attempt, never retry.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    fn backoff(&self) -> ExponentialBackoff<backoff::SystemClock> {
        ExponentialBackoff {
            current_interval: self.initial_delay,
            initial_interval: self.initial_delay,
            max_interval: self.max_delay,
            multiplier: 2.0,
            // Attempts are bounded by `max_retries`, not wall time.
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_millis(500))
    }
}

/// Outcome of one attempt that did not succeed.
#[derive(Debug)]
pub enum RetryError {
    /// Worth another attempt (rate limit, 5xx, transport hiccup).
    Transient(NewsletterError),
    /// Retrying cannot help (auth, bad request, malformed body).
    Permanent(NewsletterError),
}

impl RetryError {
    fn into_inner(self) -> NewsletterError {
        match self {
            Self::Transient(e) | Self::Permanent(e) => e,
        }
    }
}

/// Run `operation` until it succeeds, fails permanently, or the policy's
/// retries are exhausted. The last error is returned on exhaustion.
pub async fn retry<T, F, Fut>(policy: RetryPolicy, what: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, RetryError>>,
{
    let mut backoff = policy.backoff();
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(RetryError::Permanent(e)) => return Err(e),
            Err(RetryError::Transient(e)) => {
                if attempt >= policy.max_retries {
                    return Err(e);
                }
                let Some(delay) = backoff.next_backoff() else {
                    return Err(e);
                };
                attempt += 1;
                warn!(
                    "Attempt {} of {} failed: {}, retrying in {:?}",
                    attempt, what, e, delay
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Collapse a [`RetryError`] when the caller only wants the error.
impl From<RetryError> for NewsletterError {
    fn from(e: RetryError) -> Self {
        e.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = retry(fast_policy(3), "search", || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(RetryError::Transient(NewsletterError::Search("429".into())))
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failure_stops_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<()> = retry(fast_policy(5), "search", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(RetryError::Permanent(NewsletterError::Search("401".into())))
            }
        })
        .await;

        assert!(matches!(result, Err(NewsletterError::Search(msg)) if msg == "401"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_return_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<()> = retry(fast_policy(2), "completion", || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                Err(RetryError::Transient(NewsletterError::Completion(format!(
                    "503 #{n}"
                ))))
            }
        })
        .await;

        assert!(matches!(result, Err(NewsletterError::Completion(msg)) if msg == "503 #2"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn no_retry_policy_makes_one_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let _: Result<()> = retry(RetryPolicy::none(), "search", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(RetryError::Transient(NewsletterError::Search("timeout".into())))
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
