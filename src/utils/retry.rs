//! Exponential-backoff retry for transient network failures.
//!
//! Used by DNS-seed resolution and peer reconnect, where a single failed
//! attempt is expected and worth a few retries before giving up on that
//! peer/seed entirely.

use std::time::Duration;
use tokio::time::sleep;

/// Backoff parameters for [`retry_async_with_backoff`].
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }

    /// Defaults tuned for peer reconnect / DNS-seed fallback.
    pub fn network() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }
}

/// Retry an async operation with exponential backoff.
pub async fn retry_async_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = config.initial_delay;
    let mut last_error = None;

    for attempt in 0..config.max_attempts {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                last_error = Some(e);
                if attempt < config.max_attempts - 1 {
                    tracing::debug!(
                        attempt = attempt + 1,
                        max_attempts = config.max_attempts,
                        error = %last_error.as_ref().unwrap(),
                        ?delay,
                        "retrying after failure"
                    );
                    sleep(delay).await;
                    delay = std::cmp::min(
                        Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier),
                        config.max_delay,
                    );
                }
            }
        }
    }

    Err(last_error.expect("loop runs at least once since max_attempts >= 1"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry() {
        let config = RetryConfig::new(3, Duration::from_millis(1));
        let result: Result<u32, &str> = retry_async_with_backoff(&config, || async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let config = RetryConfig::new(5, Duration::from_millis(1));
        let attempts = AtomicU32::new(0);
        let result: Result<u32, &str> = retry_async_with_backoff(&config, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("not yet")
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let config = RetryConfig::new(3, Duration::from_millis(1));
        let result: Result<u32, &str> =
            retry_async_with_backoff(&config, || async { Err("still failing") }).await;
        assert!(result.is_err());
    }
}
