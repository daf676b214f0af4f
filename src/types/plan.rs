//! Dispatch results
//!
//! A `PlanResult` is derived for one dispatch cycle and never stored.

use crate::types::request::ActionRequest;
use serde::{Deserialize, Serialize};

/// Outcome of dispatching a single request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestOutcome {
    pub request: ActionRequest,
    pub ok: bool,
    pub message: String,
}

impl RequestOutcome {
    pub fn success(request: ActionRequest, message: impl Into<String>) -> Self {
        Self {
            request,
            ok: true,
            message: message.into(),
        }
    }

    pub fn failure(request: ActionRequest, message: impl Into<String>) -> Self {
        Self {
            request,
            ok: false,
            message: message.into(),
        }
    }
}

/// Ordered outcomes of one dispatch cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanResult {
    per_request_outcomes: Vec<RequestOutcome>,
    overall_ok: bool,
}

impl PlanResult {
    pub fn new(per_request_outcomes: Vec<RequestOutcome>) -> Self {
        let overall_ok = per_request_outcomes.iter().all(|o| o.ok);
        Self {
            per_request_outcomes,
            overall_ok,
        }
    }

    pub fn outcomes(&self) -> &[RequestOutcome] {
        &self.per_request_outcomes
    }

    /// True only if every outcome is ok (vacuously true for an empty plan)
    pub fn overall_ok(&self) -> bool {
        self.overall_ok
    }

    pub fn len(&self) -> usize {
        self.per_request_outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.per_request_outcomes.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.per_request_outcomes.iter().filter(|o| o.ok).count()
    }

    /// One-line summary for the feedback sink
    pub fn summary(&self) -> String {
        let total = self.len();
        let ok = self.succeeded();
        match (total, ok) {
            (0, _) => "Nothing to do.".to_string(),
            (1, _) => self.per_request_outcomes[0].message.clone(),
            (t, o) if o == t => format!("Completed all {} tasks.", t),
            (_, 0) => "Failed to complete any tasks.".to_string(),
            (t, o) => format!("Completed {} of {} tasks.", o, t),
        }
    }
}
