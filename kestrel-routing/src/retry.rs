//! Exponential backoff and the retry loop.

use std::future::Future;
use std::time::Duration;

use kestrel_core::{Error, Limits, Result, Retryable};
use tracing::{debug, warn};

/// Backoff multiplier applied after each failed attempt.
pub const RETRY_MULTIPLIER_DEFAULT: u32 = 2;

/// Retry policy: exponential backoff with a ceiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOptions {
    /// Delay after the first failure.
    pub backoff: Duration,
    /// Upper bound on any single delay.
    pub max_backoff: Duration,
    /// Factor applied to the delay after each failure.
    pub multiplier: u32,
    /// Maximum number of attempts; zero retries forever.
    pub max_attempts: u32,
}

impl RetryOptions {
    /// Returns options retrying forever with the given backoff bounds.
    #[must_use]
    pub const fn indefinite(backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            backoff,
            max_backoff,
            multiplier: RETRY_MULTIPLIER_DEFAULT,
            max_attempts: 0,
        }
    }

    /// Sets the attempt bound.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

impl Default for RetryOptions {
    fn default() -> Self {
        let limits = Limits::new();
        Self::indefinite(
            Duration::from_micros(limits.retry_backoff_us),
            Duration::from_micros(limits.max_retry_backoff_us),
        )
    }
}

/// Sequence of backoff delays derived from [`RetryOptions`].
///
/// Delays never decrease and never exceed `max_backoff`. The sequence ends
/// once `max_attempts` attempts have failed (never, if it is zero).
#[derive(Debug, Clone)]
pub struct Backoff {
    options: RetryOptions,
    failures: u32,
    next: Duration,
}

impl Backoff {
    /// Creates a backoff sequence for the given options.
    #[must_use]
    pub fn new(options: RetryOptions) -> Self {
        let next = options.backoff.min(options.max_backoff);
        Self {
            options,
            failures: 0,
            next,
        }
    }

    /// Returns the number of failures recorded so far.
    #[must_use]
    pub const fn failures(&self) -> u32 {
        self.failures
    }

    /// Records a failure and returns how long to wait before the next
    /// attempt, or `None` if no attempts remain.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.failures = self.failures.saturating_add(1);
        if self.options.max_attempts > 0 && self.failures >= self.options.max_attempts {
            return None;
        }
        let delay = self.next;
        self.next = self
            .next
            .saturating_mul(self.options.multiplier.max(1))
            .min(self.options.max_backoff);
        Some(delay)
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_delay()
    }
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or the
/// attempt bound is reached.
///
/// `op` receives the 1-based attempt number. Retryable failures are logged
/// and followed by a backoff sleep.
///
/// # Errors
///
/// Returns the first non-retryable error, or `Error::RetriesExhausted`
/// wrapping the last error when `max_attempts` is reached.
pub async fn retry_with_backoff<T, F, Fut>(tag: &str, options: &RetryOptions, mut op: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut backoff = Backoff::new(options.clone());
    loop {
        let attempt = backoff.failures() + 1;
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if err.can_retry() => {
                let Some(delay) = backoff.next_delay() else {
                    debug!(tag, attempt, error = %err, "retry attempts exhausted");
                    return Err(Error::RetriesExhausted {
                        attempts: attempt,
                        last: Box::new(err),
                    });
                };
                warn!(
                    tag,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "retryable failure, backing off"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use kestrel_core::api::Method;

    use super::*;

    fn transient() -> Error {
        Error::NoNodeAddrsAvailable { method: Method::Get }
    }

    #[test]
    fn test_backoff_doubles_then_caps() {
        let options = RetryOptions::indefinite(Duration::from_secs(1), Duration::from_secs(30));
        let delays: Vec<u64> = Backoff::new(options).take(8).map(|d| d.as_secs()).collect();

        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30, 30]);
    }

    #[test]
    fn test_backoff_monotonic_over_long_run() {
        let options = RetryOptions {
            backoff: Duration::from_millis(7),
            max_backoff: Duration::from_millis(900),
            multiplier: 3,
            max_attempts: 0,
        };

        let mut previous = Duration::ZERO;
        for delay in Backoff::new(options).take(10_000) {
            assert!(delay >= previous, "backoff decreased: {delay:?} < {previous:?}");
            assert!(delay <= Duration::from_millis(900));
            previous = delay;
        }
        assert_eq!(previous, Duration::from_millis(900));
    }

    #[test]
    fn test_backoff_initial_above_cap_is_clamped() {
        let options = RetryOptions::indefinite(Duration::from_secs(60), Duration::from_secs(30));
        let first = Backoff::new(options).next();
        assert_eq!(first, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_backoff_bounded_attempts() {
        let options = RetryOptions::indefinite(Duration::from_millis(1), Duration::from_millis(4))
            .with_max_attempts(3);

        // Three attempts means two delays between them.
        assert_eq!(Backoff::new(options).count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_until_success() {
        let calls = AtomicU32::new(0);
        let options = RetryOptions::indefinite(Duration::from_secs(1), Duration::from_secs(30));

        let result = retry_with_backoff("test", &options, |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt <= 5 {
                    Err(transient())
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(6));
        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let options = RetryOptions::default();

        let result: Result<()> = retry_with_backoff("test", &options, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::EmptyReplicaSet { method: Method::Get }) }
        })
        .await;

        assert!(matches!(result, Err(Error::EmptyReplicaSet { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_attempts_wrap_last_error() {
        let options = RetryOptions::default().with_max_attempts(4);

        let result: Result<()> =
            retry_with_backoff("test", &options, |_| async { Err(transient()) }).await;

        match result {
            Err(Error::RetriesExhausted { attempts, last }) => {
                assert_eq!(attempts, 4);
                assert_eq!(*last, transient());
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }
}
