//! deskpilot - natural-language command interpreter
//!
//! Converts free-form utterances into structured desktop actions and learns
//! new commands by demonstration.
//!
//! # Architecture
//!
//! - **nlu**: normalizer + regex → entity → generative fallback chain
//! - **memory**: bounded conversation memory for pronouns and defaults
//! - **planner**: ordered dispatch with partial-failure semantics
//! - **handlers**: handler capability registry, timeout and retry
//! - **learning**: record / replay of user-taught tasks
//! - **runtime**: interruptible acquisition → dispatch loop

pub mod errors;
pub mod types;

pub use errors::{AssistantError, RecordingStateError, Result};

pub mod config;
pub mod handlers;
pub mod learning;
pub mod memory;
pub mod nlu;
pub mod planner;
pub mod runtime;

pub mod cli;
