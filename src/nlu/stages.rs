//! Resolution stages
//!
//! Each stage implements `ResolutionStage::try_resolve`: it sees the
//! normalized utterance, the memory snapshot and the candidate left by
//! earlier stages, and returns an improved candidate (or none). Stages are
//! run in a fixed order by `IntentPipeline`.

use crate::memory::ConversationMemory;
use crate::nlu::classifier::{is_no_match, IntentClassifier};
use crate::nlu::entities;
use crate::nlu::normalizer::Normalized;
use crate::nlu::patterns::{PatternRules, Required};
use crate::types::{ActionRequest, Params, SourceStage};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Confidence of a candidate whose gaps were filled by entity extraction
pub const ENTITY_CONFIDENCE: f32 = 0.9;

/// What a stage sees
pub struct StageInput<'a> {
    pub normalized: &'a Normalized,
    pub memory: &'a ConversationMemory,
}

/// Partial resolution carried between stages
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub action_type: String,
    pub params: Params,
    pub confidence: f32,
    pub stage: SourceStage,
    pub span: String,
    pub required: Required,
    pub fan_out: Option<&'static str>,
}

impl Candidate {
    /// Required slots still empty
    pub fn missing(&self) -> Vec<String> {
        self.required.missing(&self.params)
    }

    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }

    pub fn into_request(self) -> ActionRequest {
        ActionRequest::new(self.action_type, self.params, self.confidence, self.stage, self.span)
    }
}

/// One link of the fallback chain
#[async_trait]
pub trait ResolutionStage: Send + Sync {
    /// Stage identity used for attribution and logging
    fn stage(&self) -> SourceStage;

    /// Produce or improve a candidate; `None` means "nothing to offer"
    async fn try_resolve(&self, input: &StageInput<'_>, pending: Option<Candidate>) -> Option<Candidate>;
}

/// Deterministic rule table
pub struct PatternStage {
    rules: Arc<PatternRules>,
}

impl PatternStage {
    pub fn new(rules: Arc<PatternRules>) -> Self {
        Self { rules }
    }
}

#[async_trait]
impl ResolutionStage for PatternStage {
    fn stage(&self) -> SourceStage {
        SourceStage::Regex
    }

    async fn try_resolve(&self, input: &StageInput<'_>, pending: Option<Candidate>) -> Option<Candidate> {
        if pending.is_some() {
            return pending;
        }
        let hit = self.rules.match_first(input.normalized)?;
        debug!(rule = %hit.rule, action = %hit.action_type, "pattern matched");
        Some(Candidate {
            action_type: hit.action_type,
            params: hit.params,
            confidence: 1.0,
            stage: SourceStage::Regex,
            span: hit.span,
            required: hit.required,
            fan_out: hit.fan_out,
        })
    }
}

/// Fills missing typed slots from entities found anywhere in the utterance
#[derive(Default)]
pub struct EntityStage;

#[async_trait]
impl ResolutionStage for EntityStage {
    fn stage(&self) -> SourceStage {
        SourceStage::Entity
    }

    async fn try_resolve(&self, input: &StageInput<'_>, pending: Option<Candidate>) -> Option<Candidate> {
        let mut candidate = pending?;
        let missing = candidate.missing();
        if missing.is_empty() {
            return Some(candidate);
        }

        let found = entities::extract(input.normalized);
        let mut filled = Vec::new();
        for slot in missing {
            if let Some(value) = found.value_for(&slot) {
                candidate.params.insert(slot.clone(), value);
                filled.push(slot);
            }
        }

        if !filled.is_empty() {
            debug!(action = %candidate.action_type, slots = ?filled, "entities filled slots");
            candidate.stage = SourceStage::Entity;
            candidate.confidence = candidate.confidence.min(ENTITY_CONFIDENCE);
        }
        Some(candidate)
    }
}

/// Generative fallback, bounded by a timeout
pub struct GenerativeStage {
    classifier: Arc<dyn IntentClassifier>,
    rules: Arc<PatternRules>,
    timeout: Duration,
    context_turns: usize,
}

impl GenerativeStage {
    pub fn new(
        classifier: Arc<dyn IntentClassifier>,
        rules: Arc<PatternRules>,
        timeout: Duration,
        context_turns: usize,
    ) -> Self {
        Self {
            classifier,
            rules,
            timeout,
            context_turns,
        }
    }
}

#[async_trait]
impl ResolutionStage for GenerativeStage {
    fn stage(&self) -> SourceStage {
        SourceStage::Llm
    }

    async fn try_resolve(&self, input: &StageInput<'_>, pending: Option<Candidate>) -> Option<Candidate> {
        if pending.as_ref().is_some_and(Candidate::is_complete) {
            return pending;
        }

        let context = input.memory.recent(self.context_turns);
        let text = input.normalized.cased();
        let guess = match tokio::time::timeout(self.timeout, self.classifier.classify(text, &context)).await {
            Ok(Ok(guess)) => guess,
            Ok(Err(e)) => {
                warn!(error = %e, transient = e.is_transient(), "classifier failed");
                return pending;
            }
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "classifier timed out");
                return pending;
            }
        };
        debug!(action = %guess.action_type, confidence = guess.confidence, "classifier guess");
        if is_no_match(&guess.action_type) {
            return pending;
        }

        match pending {
            None => Some(Candidate {
                required: self.rules.required_for(&guess.action_type),
                action_type: guess.action_type,
                params: guess.parameters,
                confidence: guess.confidence,
                stage: SourceStage::Llm,
                span: text.to_string(),
                fan_out: None,
            }),
            Some(mut candidate) => {
                // An earlier stage already chose the action; only borrow slot values
                if guess.action_type != candidate.action_type {
                    return Some(candidate);
                }
                let mut filled = false;
                for slot in candidate.missing() {
                    if let Some(value) = guess.parameters.get(&slot).filter(|v| !v.is_null()) {
                        candidate.params.insert(slot, value.clone());
                        filled = true;
                    }
                }
                if filled {
                    candidate.stage = SourceStage::Llm;
                    candidate.confidence = candidate.confidence.min(guess.confidence);
                }
                Some(candidate)
            }
        }
    }
}
