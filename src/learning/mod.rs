//! Demonstration learning
//!
//! Record a live sequence of dispatched actions under a name, persist it,
//! and replay it later with template slots bound from the current turn.

pub mod engine;
pub mod store;
pub mod task;

pub use engine::{LearningEngine, LearningStats};
pub use store::{default_store_path, JsonTaskStore, MemoryTaskStore, TaskStore};
pub use task::{task_key, LearnedTask, RecordingSession};
