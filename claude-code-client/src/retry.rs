//! Retry helper with linear backoff
//!
//! The client never retries on its own. Callers that want to re-run a query
//! after a transient failure wrap it in [`retry_with_backoff`].

use crate::errors::SdkError;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Configuration for retry logic
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt; attempt `n` waits `n` times this
    pub base_delay: Duration,
    /// Upper bound for a single delay
    pub max_delay: Duration,
    /// Jitter factor (0.0 to 1.0) to add randomness to delays
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    /// Delay after the given failed attempt (1-based), before jitter
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(attempt.max(1))
            .min(self.max_delay)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter_factor <= 0.0 {
            return delay;
        }
        let range = delay.as_secs_f64() * self.jitter_factor.min(1.0);
        delay + Duration::from_secs_f64(rand::random::<f64>() * range)
    }

    /// Retry `operation` on errors that report themselves as retryable
    pub async fn retry<F, Fut, T, E>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        retry_with_backoff(self, E::is_retryable, operation).await
    }
}

/// Errors that know whether another attempt could succeed
pub trait Retryable {
    /// Whether the failed operation is worth running again
    fn is_retryable(&self) -> bool;
}

impl Retryable for SdkError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            SdkError::Timeout { .. }
                | SdkError::ChannelClosed
                | SdkError::CliError { .. }
        )
    }
}

/// Run `operation` until it succeeds, fails with an error `is_retryable`
/// rejects, or `max_attempts` attempts were made.
pub async fn retry_with_backoff<F, Fut, T, E, P>(
    config: &RetryConfig,
    is_retryable: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    info!("Operation succeeded after {} attempts", attempt);
                }
                return Ok(value);
            },
            Err(err) if attempt < max_attempts && is_retryable(&err) => {
                let delay = config.jittered(config.delay_for(attempt));
                warn!(
                    "Attempt {}/{} failed, retrying in {:?}: {}",
                    attempt, max_attempts, delay, err
                );
                sleep(delay).await;
            },
            Err(err) => {
                error!("Operation failed after {} attempts: {}", attempt, err);
                return Err(err);
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter_factor: 0.0,
        }
    }

    #[test]
    fn test_linear_delay_is_capped() {
        let config = RetryConfig {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(250),
            jitter_factor: 0.0,
        };
        assert_eq!(config.delay_for(1), Duration::from_millis(100));
        assert_eq!(config.delay_for(2), Duration::from_millis(200));
        assert_eq!(config.delay_for(3), Duration::from_millis(250));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let config = RetryConfig {
            jitter_factor: 0.5,
            ..RetryConfig::default()
        };
        let base = Duration::from_millis(100);
        for _ in 0..20 {
            let delay = config.jittered(base);
            assert!(delay >= base && delay <= Duration::from_millis(150));
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = fast()
            .retry(|| {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(SdkError::timeout(1))
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
    async fn test_gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), SdkError> = fast()
            .retry(|| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(SdkError::ChannelClosed)
                }
            })
            .await;

        assert!(matches!(result, Err(SdkError::ChannelClosed)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_process_exit_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), SdkError> = fast()
            .retry(|| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(SdkError::ProcessExited {
                        code: Some(1),
                        stderr: None,
                    })
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_start_failure_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), SdkError> = fast()
            .retry(|| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(SdkError::ProcessStart {
                        path: "/usr/local/bin/claude".into(),
                        source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(SdkError::ProcessStart { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_custom_predicate() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<u32, String> = retry_with_backoff(
            &fast(),
            |err: &String| err.contains("busy"),
            || {
                let counter = counter.clone();
                async move {
                    match counter.fetch_add(1, Ordering::SeqCst) {
                        0 => Err("busy".to_string()),
                        1 => Err("broken".to_string()),
                        n => Ok(n),
                    }
                }
            },
        )
        .await;

        assert_eq!(result.unwrap_err(), "broken");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
