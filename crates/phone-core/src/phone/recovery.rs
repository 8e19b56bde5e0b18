//! Retry and timeout helpers
//!
//! Used on setup paths where waiting is acceptable: implicit registration
//! before dialing, directory lookups and the accept wait of a room.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::error::{PhoneError, PhoneResult};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Spread delays by up to 10% either way
    pub use_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            use_jitter: true,
        }
    }
}

impl RetryConfig {
    /// Short delays, for operations the user is waiting on
    pub fn quick() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            backoff_multiplier: 1.5,
            use_jitter: true,
        }
    }

    fn delay_with_jitter(&self, delay: Duration) -> Duration {
        if !self.use_jitter {
            return delay;
        }
        let jitter = (rand::random::<f64>() - 0.5) * 0.2;
        let millis = delay.as_millis() as f64;
        Duration::from_millis((millis * (1.0 + jitter)) as u64)
    }
}

/// Retry an operation with exponential backoff.
///
/// Only errors for which [`PhoneError::is_recoverable`] holds are retried.
pub async fn retry_with_backoff<T, F, Fut>(
    operation_name: &str,
    config: RetryConfig,
    mut operation: F,
) -> PhoneResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PhoneResult<T>>,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;
        debug!(
            operation = operation_name,
            attempt,
            max_attempts = config.max_attempts,
            "Attempting operation"
        );

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(operation = operation_name, attempt, "Operation succeeded after retries");
                }
                return Ok(result);
            }
            Err(e) if e.is_recoverable() && attempt < config.max_attempts => {
                warn!(
                    operation = operation_name,
                    attempt,
                    error = %e,
                    category = e.category(),
                    next_delay_ms = delay.as_millis() as u64,
                    "Recoverable error, will retry"
                );

                sleep(config.delay_with_jitter(delay)).await;

                let next_delay_ms = (delay.as_millis() as f64 * config.backoff_multiplier) as u64;
                delay = Duration::from_millis(next_delay_ms).min(config.max_delay);
            }
            Err(e) => {
                if attempt >= config.max_attempts {
                    error!(
                        operation = operation_name,
                        attempts = attempt,
                        error = %e,
                        "Operation failed after all retry attempts"
                    );
                } else {
                    error!(
                        operation = operation_name,
                        error = %e,
                        category = e.category(),
                        "Non-recoverable error, not retrying"
                    );
                }
                return Err(e);
            }
        }
    }
}

/// Adds context to an error while keeping its category visible in logs
pub trait ErrorContext<T> {
    fn context(self, context: &str) -> PhoneResult<T>;

    fn with_context<F>(self, f: F) -> PhoneResult<T>
    where
        F: FnOnce() -> String;
}

impl<T> ErrorContext<T> for PhoneResult<T> {
    fn context(self, context: &str) -> PhoneResult<T> {
        self.with_context(|| context.to_string())
    }

    fn with_context<F>(self, f: F) -> PhoneResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let context = f();
            warn!(
                error = %e,
                context = %context,
                category = e.category(),
                "Operation failed with context"
            );
            match e {
                // Keep variants callers match on
                PhoneError::OperationTimeout { .. }
                | PhoneError::ConferenceNotFound { .. }
                | PhoneError::RoomNotConnected => e,
                other => PhoneError::InternalError {
                    message: format!("{context}: {other}"),
                },
            }
        })
    }
}

/// Bound a future by `timeout`, mapping the elapsed deadline to
/// [`PhoneError::OperationTimeout`]
pub async fn with_timeout<T, F>(operation_name: &str, timeout: Duration, future: F) -> PhoneResult<T>
where
    F: Future<Output = PhoneResult<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => {
            error!(
                operation = operation_name,
                timeout_ms = timeout.as_millis() as u64,
                "Operation timed out"
            );
            Err(PhoneError::OperationTimeout {
                duration_ms: timeout.as_millis() as u64,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn retries_recoverable_errors_until_success() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let result = retry_with_backoff("register", RetryConfig::quick(), move || {
            let counter = counter.clone();
            async move {
                let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if attempt < 3 {
                    Err(TransportError::new("register", "temporary failure").into())
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.expect("third attempt succeeds"), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_configuration_errors() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let result: PhoneResult<()> = retry_with_backoff("lookup", RetryConfig::default(), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(PhoneError::MissingConfiguration {
                    field: "extension".to_string(),
                })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_maps_to_operation_timeout() {
        let result: PhoneResult<()> = with_timeout("accept", Duration::from_millis(500), async {
            sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(PhoneError::OperationTimeout { duration_ms: 500 })));
    }

    #[test]
    fn context_keeps_timeouts_intact() {
        let result: PhoneResult<()> = Err(PhoneError::OperationTimeout { duration_ms: 10 });
        assert!(matches!(
            result.context("joining room"),
            Err(PhoneError::OperationTimeout { .. })
        ));

        let result: PhoneResult<()> = Err(PhoneError::call_failed("busy"));
        let err = result.context("dialing").expect_err("still an error");
        assert_eq!(err.to_string(), "Internal error: dialing: Call failed: busy");
    }
}
