//! Handler executor
//!
//! Looks up the handler for a request, applies the per-attempt timeout and
//! drives transient-only retry.

use crate::errors::{AssistantError, Result};
use crate::handlers::registry::HandlerRegistry;
use crate::handlers::retry::RetryManager;
use crate::handlers::types::HandlerOutcome;
use crate::types::ActionRequest;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default per-attempt handler timeout
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(30);

/// Handler executor with retry and timeout
#[derive(Debug, Clone)]
pub struct HandlerExecutor {
    /// Handler registry
    registry: Arc<HandlerRegistry>,

    /// Retry manager
    retry_manager: RetryManager,

    /// Per-attempt timeout
    timeout: Duration,
}

impl HandlerExecutor {
    /// Create new executor
    pub fn new(registry: HandlerRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            retry_manager: RetryManager::new(),
            timeout: DEFAULT_HANDLER_TIMEOUT,
        }
    }

    /// Replace the retry policy
    pub fn with_retry(mut self, retry_manager: RetryManager) -> Self {
        self.retry_manager = retry_manager;
        self
    }

    /// Replace the per-attempt timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Invoke the handler registered for `request`.
    ///
    /// Errors only when no handler exists; every handler-level failure is
    /// reported through the returned outcome.
    pub async fn invoke(&self, request: &ActionRequest, cancel: &CancellationToken) -> Result<HandlerOutcome> {
        let handler = self
            .registry
            .get(request.action_type())
            .ok_or_else(|| AssistantError::UnknownHandler {
                action_type: request.action_type().to_string(),
            })?;

        if cancel.is_cancelled() {
            return Ok(HandlerOutcome::cancelled());
        }

        let per_attempt = self.timeout;
        let params = request.parameters();
        let action_type = request.action_type();

        let outcome = self
            .retry_manager
            .execute_with_retry(cancel, |attempt| {
                let handler = handler.clone();
                async move {
                    debug!(action = action_type, attempt, "invoking handler");
                    match timeout(per_attempt, handler.execute(params, cancel)).await {
                        Ok(outcome) => outcome,
                        Err(_) => {
                            warn!(action = action_type, timeout_ms = per_attempt.as_millis() as u64, "handler timed out");
                            HandlerOutcome::transient_failure(
                                AssistantError::Timeout {
                                    duration_ms: per_attempt.as_millis() as u64,
                                }
                                .to_string(),
                            )
                        }
                    }
                }
            })
            .await;

        // a pending retry abandoned by cancellation
        if outcome.is_retryable() && cancel.is_cancelled() {
            return Ok(HandlerOutcome::cancelled());
        }

        Ok(outcome)
    }
}
