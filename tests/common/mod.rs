//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use deskpilot::config::ResolutionConfig;
use deskpilot::handlers::{
    register_dry_run, ActionHandler, HandlerExecutor, HandlerOutcome, HandlerRegistry, RetryManager,
};
use deskpilot::learning::LearningEngine;
use deskpilot::memory::{ConversationMemory, ConversationTurn};
use deskpilot::nlu::{Classification, ClassifierError, IntentClassifier, IntentPipeline, PatternRules};
use deskpilot::planner::Dispatcher;
use deskpilot::runtime::Assistant;
use deskpilot::types::Params;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Handler that records every invocation
#[derive(Default)]
pub struct Spy {
    pub calls: Mutex<Vec<Params>>,
}

impl Spy {
    pub fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ActionHandler for Spy {
    async fn execute(&self, params: &Params, _: &CancellationToken) -> HandlerOutcome {
        self.calls.lock().unwrap().push(params.clone());
        HandlerOutcome::success("ok")
    }
}

/// Classifier returning a fixed guess
pub struct FixedGuess {
    pub action_type: String,
    pub parameters: Params,
    pub confidence: f32,
}

#[async_trait]
impl IntentClassifier for FixedGuess {
    async fn classify(&self, _: &str, _: &[Arc<ConversationTurn>]) -> Result<Classification, ClassifierError> {
        Ok(Classification {
            action_type: self.action_type.clone(),
            parameters: self.parameters.clone(),
            confidence: self.confidence,
        })
    }
}

/// Dry-run handlers for every built-in action, with `spied` actions
/// replaced by the given spy
pub fn registry_with(spy: &Arc<Spy>, spied: &[&str]) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    register_dry_run(&mut registry, PatternRules::builtin().action_types());
    for action_type in spied {
        registry.register(*action_type, spy.clone());
    }
    registry
}

pub fn assistant_with(registry: HandlerRegistry, classifier: Option<Arc<dyn IntentClassifier>>) -> Assistant {
    let pipeline = IntentPipeline::new(PatternRules::builtin(), classifier, &ResolutionConfig::default());
    let executor = HandlerExecutor::new(registry).with_retry(RetryManager::with_config(2, 1));
    Assistant::new(
        pipeline,
        Dispatcher::new(executor),
        ConversationMemory::new(),
        Some(LearningEngine::in_memory()),
    )
}
