//! Action request types
//!
//! An `ActionRequest` is the structured command produced by intent
//! resolution and consumed by the dispatcher. Requests are immutable:
//! every transformation builds a new value.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Parameter map (ordered, so identical inputs serialize identically)
pub type Params = BTreeMap<String, Value>;

/// Action types the core interprets itself instead of routing to a handler
pub mod action {
    pub const CLARIFY: &str = "clarify";
    pub const CANCEL: &str = "cancel";
    pub const START_TEACHING: &str = "start_teaching";
    pub const STOP_TEACHING: &str = "stop_teaching";
    pub const DO_LEARNED_TASK: &str = "do_learned_task";
    pub const LIST_LEARNED_TASKS: &str = "list_learned_tasks";
    pub const FORGET_LEARNED_TASK: &str = "forget_learned_task";

    /// Control actions are never captured into a recording
    pub fn is_control(action_type: &str) -> bool {
        matches!(
            action_type,
            CLARIFY
                | CANCEL
                | START_TEACHING
                | STOP_TEACHING
                | DO_LEARNED_TASK
                | LIST_LEARNED_TASKS
                | FORGET_LEARNED_TASK
        )
    }
}

/// Resolution stage that produced a request.
///
/// Declaration order is precedence order: `Regex` beats `Entity` beats `Llm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStage {
    Regex,
    Entity,
    Llm,
    Learned,
}

impl fmt::Display for SourceStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceStage::Regex => write!(f, "regex"),
            SourceStage::Entity => write!(f, "entity"),
            SourceStage::Llm => write!(f, "llm"),
            SourceStage::Learned => write!(f, "learned"),
        }
    }
}

/// Structured, typed command derived from an utterance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    action_type: String,
    parameters: Params,
    confidence: f32,
    source_stage: SourceStage,
    raw_span: String,
}

impl ActionRequest {
    /// Create a request; confidence is clamped into [0, 1]
    pub fn new(
        action_type: impl Into<String>,
        parameters: Params,
        confidence: f32,
        source_stage: SourceStage,
        raw_span: impl Into<String>,
    ) -> Self {
        Self {
            action_type: action_type.into(),
            parameters,
            confidence: confidence.clamp(0.0, 1.0),
            source_stage,
            raw_span: raw_span.into(),
        }
    }

    /// Low-confidence request asking the user to rephrase or fill a gap
    pub fn clarify(utterance: &str, reason: ClarifyReason, stage: SourceStage) -> Self {
        let mut parameters = Params::new();
        parameters.insert("utterance".to_string(), Value::String(utterance.to_string()));
        parameters.insert("reason".to_string(), Value::String(reason.code().to_string()));
        match reason {
            ClarifyReason::MissingParameter { action_type, slots } => {
                parameters.insert("intended_action".to_string(), Value::String(action_type));
                parameters.insert(
                    "missing".to_string(),
                    Value::Array(slots.into_iter().map(Value::String).collect()),
                );
            }
            ClarifyReason::LowConfidence { action_type: Some(action_type) } => {
                parameters.insert("intended_action".to_string(), Value::String(action_type));
            }
            _ => {}
        }
        Self::new(action::CLARIFY, parameters, 0.0, stage, utterance)
    }

    pub fn action_type(&self) -> &str {
        &self.action_type
    }

    pub fn parameters(&self) -> &Params {
        &self.parameters
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn source_stage(&self) -> SourceStage {
        self.source_stage
    }

    pub fn raw_span(&self) -> &str {
        &self.raw_span
    }

    /// String value of a parameter, if present and a string
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(Value::as_str)
    }

    pub fn is_clarify(&self) -> bool {
        self.action_type == action::CLARIFY
    }

    /// Copy of this request with replaced parameters
    pub fn with_parameters(&self, parameters: Params) -> Self {
        Self {
            parameters,
            ..self.clone()
        }
    }

    /// Copy of this request attributed to another stage
    pub fn restaged(&self, source_stage: SourceStage, confidence: f32) -> Self {
        Self {
            source_stage,
            confidence: confidence.clamp(0.0, 1.0),
            ..self.clone()
        }
    }
}

impl fmt::Display for ActionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params = serde_json::to_string(&self.parameters).unwrap_or_default();
        write!(
            f,
            "{} {} [{} {:.2}]",
            self.action_type, params, self.source_stage, self.confidence
        )
    }
}

/// Why a `clarify` request was emitted
#[derive(Debug, Clone, PartialEq)]
pub enum ClarifyReason {
    /// Nothing matched at all
    Unresolved,
    /// The best guess stayed below the confidence threshold
    LowConfidence { action_type: Option<String> },
    /// An action was found but required slots stayed empty
    MissingParameter { action_type: String, slots: Vec<String> },
}

impl ClarifyReason {
    pub fn code(&self) -> &'static str {
        match self {
            ClarifyReason::Unresolved => "unresolved",
            ClarifyReason::LowConfidence { .. } => "low_confidence",
            ClarifyReason::MissingParameter { .. } => "missing_parameter",
        }
    }
}

/// Build a `Params` map from literal pairs
pub fn params<I, K, V>(pairs: I) -> Params
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
