use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::errors::ServiceError;

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Factor to multiply delay by after each attempt
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(25),
            max_delay: Duration::from_millis(500),
            backoff_factor: 2.0,
        }
    }
}

/// Retry policy for determining if an error is retryable
pub trait RetryPolicy<E> {
    fn is_retryable(&self, error: &E) -> bool;
}

/// Retries optimistic-lock conflicts; every other service error is final.
pub struct ConflictRetryPolicy;

impl RetryPolicy<ServiceError> for ConflictRetryPolicy {
    fn is_retryable(&self, error: &ServiceError) -> bool {
        error.is_retryable()
    }
}

/// Execute an async operation with retries and jittered backoff.
pub async fn with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    policy: impl RetryPolicy<E>,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = config.initial_delay;
    let mut attempts = 0;

    loop {
        attempts += 1;

        match operation().await {
            Ok(result) => {
                if attempts > 1 {
                    debug!("Operation succeeded after {} attempts", attempts);
                }
                return Ok(result);
            }
            Err(error) => {
                if attempts >= config.max_attempts || !policy.is_retryable(&error) {
                    if attempts > 1 {
                        warn!("Operation failed after {} attempts: {}", attempts, error);
                    }
                    return Err(error);
                }

                // Jitter keeps colliding writers from retrying in lockstep
                let jitter_ms = rand::thread_rng().gen_range(0..=delay.as_millis() as u64 / 2);
                let wait = delay + Duration::from_millis(jitter_ms);

                warn!(
                    "Attempt {} failed: {}. Retrying in {:?}...",
                    attempts, error, wait
                );

                sleep(wait).await;

                delay = Duration::from_secs_f64(
                    (delay.as_secs_f64() * config.backoff_factor)
                        .min(config.max_delay.as_secs_f64()),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            backoff_factor: 2.0,
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_conflicts() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast_config(), ConflictRetryPolicy, || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ServiceError::ConcurrencyConflict("stock_levels:1".into()))
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), ServiceError> =
            with_retry(&fast_config(), ConflictRetryPolicy, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ServiceError::ConcurrencyConflict("stock_levels:1".into()))
            })
            .await;

        assert!(matches!(result, Err(ServiceError::ConcurrencyConflict(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_fails_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), ServiceError> =
            with_retry(&fast_config(), ConflictRetryPolicy, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ServiceError::ValidationError("bad input".into()))
            })
            .await;

        assert!(matches!(result, Err(ServiceError::ValidationError(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
