//! Intent resolution pipeline
//!
//! normalize → (atomic control check) → compound split → per segment:
//! pattern stage → entity stage → generative stage, stopping at the first
//! complete candidate above the confidence threshold. Afterwards:
//! - fan-out of multi-recipient requests
//! - default `contact` / `app` from memory
//! - anaphora substitution
//! - anything still uncertain or incomplete becomes `clarify`

use crate::config::ResolutionConfig;
use crate::memory::ConversationMemory;
use crate::nlu::anaphora::{substitute, Substitution};
use crate::nlu::classifier::IntentClassifier;
use crate::nlu::compound::split_compound;
use crate::nlu::entities::split_recipients;
use crate::nlu::normalizer::{normalize, Normalized};
use crate::nlu::patterns::PatternRules;
use crate::nlu::stages::{Candidate, EntityStage, GenerativeStage, PatternStage, ResolutionStage, StageInput};
use crate::types::{ActionRequest, ClarifyReason, SourceStage};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Slots that fall back to the most recent remembered value
const CONTEXT_DEFAULT_SLOTS: &[&str] = &["contact", "app"];

/// Layered resolver from utterance to ordered action requests
pub struct IntentPipeline {
    stages: Vec<Box<dyn ResolutionStage>>,
    rules: Arc<PatternRules>,
    confidence_threshold: f32,
}

impl IntentPipeline {
    /// Standard chain: patterns, entities, then the classifier when one is given
    pub fn new(
        rules: PatternRules,
        classifier: Option<Arc<dyn IntentClassifier>>,
        settings: &ResolutionConfig,
    ) -> Self {
        let rules = Arc::new(rules);
        let mut stages: Vec<Box<dyn ResolutionStage>> = vec![
            Box::new(PatternStage::new(Arc::clone(&rules))),
            Box::new(EntityStage),
        ];
        if let Some(classifier) = classifier {
            stages.push(Box::new(GenerativeStage::new(
                classifier,
                Arc::clone(&rules),
                Duration::from_millis(settings.classifier_timeout_ms),
                settings.context_turns,
            )));
        }
        Self::from_stages(stages, rules, settings.confidence_threshold)
    }

    /// Custom stage chain
    pub fn from_stages(
        stages: Vec<Box<dyn ResolutionStage>>,
        rules: Arc<PatternRules>,
        confidence_threshold: f32,
    ) -> Self {
        Self {
            stages,
            rules,
            confidence_threshold: confidence_threshold.clamp(0.0, 1.0),
        }
    }

    pub fn rules(&self) -> &PatternRules {
        &self.rules
    }

    /// Resolve an utterance into requests, in spoken order.
    ///
    /// Never fails: anything that cannot be resolved comes back as a
    /// `clarify` request. Blank input yields no requests.
    pub async fn resolve(&self, utterance: &str, memory: &ConversationMemory) -> Vec<ActionRequest> {
        let normalized = normalize(utterance);
        if normalized.is_empty() {
            return Vec::new();
        }

        if self.rules.match_atomic(&normalized).is_some() {
            return self.resolve_segment(&normalized, memory).await;
        }

        let segments = split_compound(normalized.text());
        if segments.len() <= 1 {
            return self.resolve_segment(&normalized, memory).await;
        }

        debug!(segments = segments.len(), "compound utterance");
        let mut requests = Vec::new();
        for range in segments {
            let segment = normalize(normalized.cased_span(range));
            if segment.is_empty() {
                continue;
            }
            requests.extend(self.resolve_segment(&segment, memory).await);
        }
        requests
    }

    async fn resolve_segment(&self, normalized: &Normalized, memory: &ConversationMemory) -> Vec<ActionRequest> {
        let input = StageInput { normalized, memory };
        let mut candidate: Option<Candidate> = None;
        let mut last_stage = SourceStage::Regex;

        for stage in &self.stages {
            last_stage = stage.stage();
            candidate = stage.try_resolve(&input, candidate).await;
            if candidate
                .as_ref()
                .is_some_and(|c| c.is_complete() && c.confidence >= self.confidence_threshold)
            {
                break;
            }
        }

        let Some(candidate) = candidate else {
            info!(utterance = %normalized.cased(), "no stage resolved the utterance");
            return vec![ActionRequest::clarify(
                normalized.cased(),
                ClarifyReason::Unresolved,
                last_stage,
            )];
        };

        fan_out(candidate)
            .into_iter()
            .map(|c| self.finish(c, normalized, memory))
            .collect()
    }

    /// Threshold, context defaults and anaphora for one candidate
    fn finish(&self, mut candidate: Candidate, normalized: &Normalized, memory: &ConversationMemory) -> ActionRequest {
        if candidate.confidence < self.confidence_threshold {
            info!(
                action = %candidate.action_type,
                confidence = candidate.confidence,
                "below confidence threshold"
            );
            return ActionRequest::clarify(
                normalized.cased(),
                ClarifyReason::LowConfidence {
                    action_type: Some(candidate.action_type),
                },
                candidate.stage,
            );
        }

        for slot in candidate.missing() {
            if !CONTEXT_DEFAULT_SLOTS.contains(&slot.as_str()) {
                continue;
            }
            if let Some(value) = memory.find_slot(&slot) {
                debug!(slot = %slot, "slot defaulted from memory");
                candidate.params.insert(slot, value);
            }
        }

        let missing = candidate.missing();
        if !missing.is_empty() {
            return ActionRequest::clarify(
                normalized.cased(),
                ClarifyReason::MissingParameter {
                    action_type: candidate.action_type,
                    slots: missing,
                },
                candidate.stage,
            );
        }

        let stage = candidate.stage;
        match substitute(&candidate.into_request(), |slot| memory.find_slot(slot)) {
            Substitution::Resolved(request) => {
                debug!(request = %request, "resolved");
                request
            }
            Substitution::Unresolved { request, slots } => ActionRequest::clarify(
                normalized.cased(),
                ClarifyReason::MissingParameter {
                    action_type: request.action_type().to_string(),
                    slots,
                },
                stage,
            ),
        }
    }
}

/// One candidate per recipient when the rule fans out
fn fan_out(candidate: Candidate) -> Vec<Candidate> {
    let Some(key) = candidate.fan_out else {
        return vec![candidate];
    };
    let Some(Value::String(joined)) = candidate.params.get(key) else {
        return vec![candidate];
    };

    let recipients = split_recipients(joined);
    if recipients.len() <= 1 {
        return vec![candidate];
    }

    recipients
        .into_iter()
        .map(|recipient| {
            let mut single = candidate.clone();
            single.params.insert(key.to_string(), Value::String(recipient));
            single
        })
        .collect()
}
