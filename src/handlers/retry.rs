//! Retry manager with exponential backoff
//!
//! Bounded retry for handler invocations:
//! - Only outcomes the handler marks transient are retried
//! - At most `max_retries` extra attempts after the first
//! - Binary exponential delay with ±25% jitter, capped
//! - A cancellation request ends the wait early

use crate::handlers::types::HandlerOutcome;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Default retries after the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay for exponential backoff
pub const DEFAULT_BASE_DELAY_MS: u64 = 250;

/// Maximum delay cap (4 seconds)
const MAX_DELAY_MS: u64 = 4000;

/// Retry manager with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryManager {
    /// Retries allowed after the first attempt
    max_retries: u32,

    /// Base delay in milliseconds
    base_delay_ms: u64,

    /// Maximum delay cap in milliseconds
    max_delay_ms: u64,

    /// Enable jitter
    enable_jitter: bool,
}

impl Default for RetryManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryManager {
    /// Create new retry manager with default settings
    pub fn new() -> Self {
        Self::with_config(DEFAULT_MAX_RETRIES, DEFAULT_BASE_DELAY_MS)
    }

    /// Create retry manager with custom settings
    pub fn with_config(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            max_delay_ms: MAX_DELAY_MS.max(base_delay_ms),
            enable_jitter: true,
        }
    }

    /// Disable jitter (deterministic delays)
    pub fn without_jitter(mut self) -> Self {
        self.enable_jitter = false;
        self
    }

    /// Run `operation` until it succeeds, fails permanently, runs out of
    /// retries, or `cancel` fires. Returns the last outcome.
    pub async fn execute_with_retry<F, Fut>(&self, cancel: &CancellationToken, mut operation: F) -> HandlerOutcome
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = HandlerOutcome>,
    {
        let mut attempt = 0;

        loop {
            let outcome = operation(attempt).await;
            if !outcome.is_retryable() {
                return outcome;
            }

            if attempt >= self.max_retries {
                debug!(attempts = attempt + 1, "retries exhausted");
                return outcome;
            }

            attempt += 1;
            let delay = self.calculate_delay(attempt);
            debug!(attempt, delay_ms = delay.as_millis() as u64, message = %outcome.message, "transient failure, retrying");

            tokio::select! {
                _ = cancel.cancelled() => return outcome,
                _ = sleep(delay) => {}
            }
        }
    }

    /// Calculate delay before retry number `attempt` (1-based)
    fn calculate_delay(&self, attempt: u32) -> Duration {
        // Binary exponential backoff: base * 2^(attempt - 1)
        let exponential_delay = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));

        // Cap at maximum delay
        let delay_ms = exponential_delay.min(self.max_delay_ms);

        // Add jitter if enabled (±25% random variation)
        let final_delay = if self.enable_jitter {
            let jitter = (delay_ms / 4) as i64;
            let random_jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter as f64;
            ((delay_ms as i64) + random_jitter as i64).max(0) as u64
        } else {
            delay_ms
        };

        Duration::from_millis(final_delay)
    }
}
