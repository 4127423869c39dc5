use crate::config::GlobalConfig;
use crate::error::CoreError;
use crate::error_utils::ErrorExt;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// Retry strategy based on error type
#[derive(Debug, Clone, PartialEq)]
pub enum RetryStrategy {
    /// Retry after the policy's fixed delay
    Retry,
    /// Retry after a delay dictated by the remote side (rate limits)
    RetryWithDelay(Duration),
    /// Don't retry (for permanent failures)
    NoRetry,
}

/// Determine retry strategy based on error type
pub fn get_retry_strategy(error: &CoreError) -> RetryStrategy {
    if !error.is_retryable() {
        return RetryStrategy::NoRetry;
    }
    match error.retry_after() {
        Some(delay) => RetryStrategy::RetryWithDelay(delay),
        None => RetryStrategy::Retry,
    }
}

/// Fixed-delay retry policy shared by every collaborator boundary.
///
/// An operation gets `max_retries + 1` attempts. When `attempt_timeout` is
/// set, an attempt running longer is abandoned and counts as a retryable
/// [`CoreError::Timeout`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
    /// Upper bound for server-requested delays.
    pub max_delay: Duration,
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(120),
            attempt_timeout: None,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            delay,
            ..Default::default()
        }
    }

    pub fn from_config(config: &GlobalConfig) -> Self {
        Self::new(config.max_retries, config.retry_delay())
            .with_attempt_timeout(config.default_timeout())
    }

    pub fn with_attempt_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = Some(attempt_timeout);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    fn delay_for(&self, strategy: &RetryStrategy) -> Duration {
        match strategy {
            RetryStrategy::RetryWithDelay(delay) => (*delay).min(self.max_delay),
            _ => self.delay,
        }
    }

    async fn attempt<Fut, T>(&self, fut: Fut) -> Result<T, CoreError>
    where
        Fut: Future<Output = Result<T, CoreError>>,
    {
        match self.attempt_timeout {
            Some(limit) => timeout(limit, fut).await.unwrap_or_else(|_| {
                Err(CoreError::Timeout {
                    seconds: limit.as_secs(),
                })
            }),
            None => fut.await,
        }
    }

    /// Execute an operation with retry logic.
    ///
    /// Returns the last error once attempts are exhausted or a permanent
    /// error is seen.
    pub async fn execute<F, Fut, T>(&self, operation_name: &str, operation: F) -> Result<T, CoreError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let max_attempts = self.max_attempts();
        let mut total_delay = Duration::ZERO;
        let mut attempt = 0;

        loop {
            attempt += 1;
            if attempt > 1 {
                debug!("Retry attempt {} for {}", attempt - 1, operation_name);
            }

            let start_time = Instant::now();
            let error = match self.attempt(operation()).await {
                Ok(result) => {
                    if attempt > 1 {
                        info!(
                            "Operation {} succeeded after {} retries (total delay: {:?})",
                            operation_name,
                            attempt - 1,
                            total_delay
                        );
                    }
                    return Ok(result);
                }
                Err(error) => error,
            };

            debug!(
                "Attempt {} failed for {} after {:?}: {}",
                attempt,
                operation_name,
                start_time.elapsed(),
                error
            );

            let strategy = get_retry_strategy(&error);
            if strategy == RetryStrategy::NoRetry {
                debug!("Not retrying {} due to error type: {}", operation_name, error);
                return Err(error);
            }
            if attempt >= max_attempts {
                warn!(
                    "Operation {} failed after {} attempts with total delay of {:?}: {}",
                    operation_name, attempt, total_delay, error
                );
                return Err(error);
            }

            let delay = self.delay_for(&strategy);
            total_delay += delay;
            info!("Retrying {} in {:?} due to: {}", operation_name, delay, error);
            sleep(delay).await;
        }
    }
}
