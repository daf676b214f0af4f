//! Error types for deskpilot
//!
//! Every component converts its internal failures into one of these kinds
//! before handing them to the next component.

use thiserror::Error;

/// Recording state machine violations (user errors, never fatal)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordingStateError {
    /// A recording is already in progress
    #[error("Already recording '{active}'; stop teaching first")]
    AlreadyRecording { active: String },

    /// Stop requested while idle
    #[error("Not recording anything right now")]
    NotRecording,

    /// Start requested without a task name
    #[error("A task name is required to start teaching")]
    EmptyTaskName,

    /// Stop requested but no action was captured
    #[error("Nothing was recorded for '{name}'")]
    NothingRecorded { name: String },
}

/// Main error type for the assistant core
#[derive(Error, Debug)]
pub enum AssistantError {
    /// No stage reached the confidence threshold
    #[error("Could not understand '{utterance}'")]
    UnresolvedIntent { utterance: String },

    /// A required slot is still absent after every stage
    #[error("Missing parameter '{slot}' for action '{action_type}'")]
    MissingParameter { action_type: String, slot: String },

    /// No handler registered for the action type
    #[error("unknown action")]
    UnknownHandler { action_type: String },

    /// Handler reported a failure
    #[error("Handler for '{action_type}' failed: {message}")]
    HandlerFailure {
        action_type: String,
        message: String,
        transient: bool,
    },

    /// Start/stop teaching in the wrong state
    #[error(transparent)]
    RecordingState(#[from] RecordingStateError),

    /// Replay of an unknown learned task
    #[error("No learned task named '{name}'")]
    TaskNotFound { name: String },

    /// Timeout errors
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Generative classifier failures
    #[error("Classifier error: {message}")]
    Classifier { message: String, transient: bool },

    /// Learned task store failures
    #[error("Storage error: {0}")]
    Storage(String),

    /// Utterance acquisition failed (fatal for the current turn)
    #[error("Acquisition error: {0}")]
    Acquisition(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Generic errors with context
    #[error("Assistant error: {0}")]
    Generic(String),
}

impl AssistantError {
    /// Whether a retry may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            AssistantError::Timeout { .. } => true,
            AssistantError::HandlerFailure { transient, .. } => *transient,
            AssistantError::Classifier { transient, .. } => *transient,
            _ => false,
        }
    }

    /// Message suitable for speaking or displaying to the user
    pub fn user_message(&self) -> String {
        match self {
            AssistantError::UnresolvedIntent { .. } => {
                "I didn't quite catch that. Could you rephrase?".to_string()
            }
            AssistantError::MissingParameter { slot, .. } => {
                format!("Which {} do you mean?", slot.replace('_', " "))
            }
            AssistantError::UnknownHandler { .. } => "unknown action".to_string(),
            other => other.to_string(),
        }
    }
}

/// Result type alias for assistant operations
pub type Result<T> = std::result::Result<T, AssistantError>;

/// Convert anyhow errors to AssistantError
impl From<anyhow::Error> for AssistantError {
    fn from(err: anyhow::Error) -> Self {
        AssistantError::Generic(format!("{:#}", err))
    }
}
