//! Conversation memory
//!
//! Recent turns used for pronoun/ellipsis resolution and default slots.

pub mod conversation;

pub use conversation::{ConversationMemory, ConversationTurn, TurnOutcome, DEFAULT_MEMORY_CAPACITY};
