//! Handler capability types
//!
//! Every concrete action (messaging, media, browser, system settings,
//! custom) satisfies one contract: `execute(parameters, cancel)` returning
//! `{ok, message, transient}`.

use crate::types::Params;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Result of one handler invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerOutcome {
    /// Whether the action succeeded
    pub ok: bool,

    /// Human-readable result or failure reason
    pub message: String,

    /// Failure may succeed if retried (e.g. a UI element not yet ready)
    pub transient: bool,
}

impl HandlerOutcome {
    /// Create successful outcome
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
            transient: false,
        }
    }

    /// Create permanent failure
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
            transient: false,
        }
    }

    /// Create retryable failure
    pub fn transient_failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
            transient: true,
        }
    }

    /// Outcome for work stopped by a cancellation request
    pub fn cancelled() -> Self {
        Self::failure("cancelled")
    }

    /// True when a retry is allowed
    pub fn is_retryable(&self) -> bool {
        !self.ok && self.transient
    }
}

/// Executor for one action type
///
/// Long-running handlers must poll `cancel` between discrete sub-steps and
/// return early once it fires.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn execute(&self, params: &Params, cancel: &CancellationToken) -> HandlerOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_constructors() {
        assert!(HandlerOutcome::success("done").ok);
        assert!(!HandlerOutcome::failure("no").is_retryable());
        assert!(HandlerOutcome::transient_failure("busy").is_retryable());
        assert_eq!(HandlerOutcome::cancelled().message, "cancelled");
    }
}
