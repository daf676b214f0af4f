//! Handler capabilities
//!
//! The single `execute(parameters, cancel)` contract, the registry that
//! maps action types to handlers, and the executor that wraps every call
//! with a timeout and transient-only retry.

pub mod builtin;
pub mod executor;
pub mod registry;
pub mod retry;
pub mod types;

pub use builtin::{register_dry_run, DryRunHandler, FnHandler, HotkeyLoopHandler};
pub use executor::HandlerExecutor;
pub use registry::HandlerRegistry;
pub use retry::RetryManager;
pub use types::{ActionHandler, HandlerOutcome};
