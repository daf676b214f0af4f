//! Type definitions module
//!
//! Core types shared by resolution, dispatch and learning.

pub mod request;
pub mod plan;

// Re-export commonly used types
pub use request::{action, params, ActionRequest, ClarifyReason, Params, SourceStage};
pub use plan::{PlanResult, RequestOutcome};
