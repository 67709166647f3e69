use std::time::Duration;
use tokio::time::sleep;

use crate::config::TraversalConfig;
use crate::error::{ExplorerError, SourceError, SystemError};
use crate::logging::{ErrorLogger, LogContext, PerformanceMonitor};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first call included
    pub max_attempts: u32,
    /// Initial delay between retries in seconds
    pub initial_delay_seconds: u64,
    /// Maximum delay between retries in seconds
    pub max_delay_seconds: u64,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Whether to add jitter to prevent thundering herd
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_seconds: 1,
            max_delay_seconds: 30,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl From<&TraversalConfig> for RetryConfig {
    fn from(config: &TraversalConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            initial_delay_seconds: config.retry_delay_seconds,
            max_delay_seconds: config.max_retry_delay_seconds,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Retry mechanism with exponential backoff and jitter
pub struct RetryManager {
    config: RetryConfig,
    operation_name: String,
}

impl RetryManager {
    pub fn new(operation_name: &str, config: RetryConfig) -> Self {
        Self {
            config,
            operation_name: operation_name.to_string(),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Run `operation` until it succeeds, fails with a non-recoverable
    /// error, or the attempt budget is spent. The last error is returned.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T, ExplorerError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, ExplorerError>>,
    {
        let monitor = PerformanceMonitor::new(&format!("retry_{}", self.operation_name));
        let mut last_error = None;

        for attempt in 1..=self.config.max_attempts {
            match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        ErrorLogger::log_recovery_success(
                            &self.operation_name,
                            attempt,
                            monitor.elapsed_ms(),
                        );
                    }
                    return Ok(result);
                }
                Err(error) => {
                    if !error.is_recoverable() {
                        LogContext::new("retry", &self.operation_name)
                            .with_retry_count(attempt)
                            .with_metadata("reason", serde_json::json!("non_recoverable"))
                            .debug(&format!("Non-recoverable error, not retrying: {}", error));
                        return Err(error);
                    }

                    ErrorLogger::log_recovery_attempt(&error, attempt, self.config.max_attempts);

                    if attempt >= self.config.max_attempts {
                        last_error = Some(error);
                        break;
                    }

                    let delay = self.delay_for(attempt, &error);
                    LogContext::new("retry", &self.operation_name)
                        .with_retry_count(attempt)
                        .with_metadata("delay_ms", serde_json::json!(delay.as_millis() as u64))
                        .info(&format!(
                            "Retrying in {}ms (attempt {} of {})",
                            delay.as_millis(),
                            attempt,
                            self.config.max_attempts
                        ));

                    sleep(delay).await;
                    last_error = Some(error);
                }
            }
        }

        let final_error = last_error.unwrap_or_else(|| {
            ExplorerError::System(SystemError::ResourceExhausted(
                "All retry attempts exhausted".to_string(),
            ))
        });

        LogContext::new("retry", &self.operation_name)
            .with_metadata("max_attempts", serde_json::json!(self.config.max_attempts))
            .warn(&format!(
                "All {} attempts failed: {}",
                self.config.max_attempts, final_error
            ));

        Err(final_error)
    }

    /// Backoff for `attempt`, stretched to a rate limit's requested wait.
    /// Never longer than `max_delay_seconds`.
    pub fn delay_for(&self, attempt: u32, error: &ExplorerError) -> Duration {
        let backoff = self.calculate_delay(attempt);
        match error {
            ExplorerError::Source(SourceError::RateLimited { seconds }) => {
                let ceiling = Duration::from_secs(self.config.max_delay_seconds);
                backoff.max(Duration::from_secs(*seconds)).min(ceiling)
            }
            _ => backoff,
        }
    }

    /// Delay before the attempt following `attempt`
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_delay = self.config.initial_delay_seconds as f64;
        let exponential_delay = base_delay * self.config.backoff_multiplier.powi(attempt as i32 - 1);

        let capped_delay = exponential_delay.min(self.config.max_delay_seconds as f64);

        let final_delay = if self.config.jitter {
            let jitter_factor = 0.1;
            let jitter = capped_delay * jitter_factor * (rand::random::<f64>() - 0.5);
            (capped_delay + jitter).max(0.0)
        } else {
            capped_delay
        };

        Duration::from_secs_f64(final_delay)
    }
}
