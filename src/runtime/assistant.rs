//! One assistant turn: normalize → resolve → dispatch → record

use crate::config::AssistantConfig;
use crate::errors::Result;
use crate::handlers::{HandlerExecutor, HandlerRegistry, RetryManager};
use crate::learning::{JsonTaskStore, LearningEngine};
use crate::memory::ConversationMemory;
use crate::nlu::{normalize, IntentClassifier, IntentPipeline, OllamaClassifier, PatternRules};
use crate::planner::{DispatchContext, Dispatcher};
use crate::types::{action, ActionRequest, PlanResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// How the assistant should be assembled from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildOptions {
    /// Use the configured task file instead of a volatile store
    pub persist_tasks: bool,

    /// Allow the generative classifier if the config enables it
    pub use_classifier: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            persist_tasks: true,
            use_classifier: true,
        }
    }
}

/// Owns every piece of process-wide state for one assistant instance
pub struct Assistant {
    pipeline: IntentPipeline,
    dispatcher: Dispatcher,
    memory: RwLock<ConversationMemory>,
    learning: Option<LearningEngine>,
}

impl Assistant {
    pub fn new(
        pipeline: IntentPipeline,
        dispatcher: Dispatcher,
        memory: ConversationMemory,
        learning: Option<LearningEngine>,
    ) -> Self {
        Self {
            pipeline,
            dispatcher,
            memory: RwLock::new(memory),
            learning,
        }
    }

    /// Assemble from configuration with the given handlers
    pub fn from_config(config: &AssistantConfig, registry: HandlerRegistry, options: BuildOptions) -> Result<Self> {
        config.validate()?;

        let rules = PatternRules::with_custom(&config.rules)?;

        let classifier: Option<Arc<dyn IntentClassifier>> = if options.use_classifier && config.classifier.enabled {
            let classifier = OllamaClassifier::new(
                config.classifier.url.clone(),
                config.classifier.model.clone(),
                Duration::from_millis(config.resolution.classifier_timeout_ms),
            )?;
            info!(model = %config.classifier.model, "generative classifier enabled");
            Some(Arc::new(classifier))
        } else {
            None
        };

        let pipeline = IntentPipeline::new(rules, classifier, &config.resolution);

        let executor = HandlerExecutor::new(registry)
            .with_retry(RetryManager::with_config(
                config.dispatch.max_retries,
                config.dispatch.retry_base_delay_ms,
            ))
            .with_timeout(Duration::from_millis(config.dispatch.handler_timeout_ms));

        let mut memory = ConversationMemory::with_capacity(config.memory.capacity);
        if let Some(max_age) = config.memory.max_age()? {
            memory = memory.with_max_age(max_age);
        }

        let learning = if options.persist_tasks {
            let store = JsonTaskStore::new(&config.learning.store_path)
                .map_err(|e| crate::errors::AssistantError::Storage(format!("{:#}", e)))?;
            LearningEngine::new(Box::new(store))?
        } else {
            LearningEngine::in_memory()
        };

        Ok(Self::new(pipeline, Dispatcher::new(executor), memory, Some(learning)))
    }

    /// Resolve without dispatching
    pub async fn interpret(&self, utterance: &str) -> Vec<ActionRequest> {
        let snapshot = self.memory.read().await.snapshot();
        self.pipeline.resolve(utterance, &snapshot).await
    }

    /// Run one full turn under `cancel`
    pub async fn handle(&self, utterance: &str, cancel: &CancellationToken) -> PlanResult {
        let requests = self.interpret(utterance).await;
        debug!(utterance, requests = requests.len(), "resolved");

        let ctx = DispatchContext {
            utterance,
            memory: &self.memory,
            learning: self.learning.as_ref(),
            cancel,
        };
        self.dispatcher.dispatch(requests, &ctx).await
    }

    /// True if the utterance asks to stop whatever is running
    pub fn is_interrupt(&self, utterance: &str) -> bool {
        self.pipeline
            .rules()
            .match_atomic(&normalize(utterance))
            .is_some_and(|m| m.action_type == action::CANCEL)
    }

    pub fn memory(&self) -> &RwLock<ConversationMemory> {
        &self.memory
    }

    pub fn learning(&self) -> Option<&LearningEngine> {
        self.learning.as_ref()
    }
}

impl std::fmt::Debug for Assistant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assistant")
            .field("rules", &self.pipeline.rules().len())
            .field("dispatcher", &self.dispatcher)
            .field("learning", &self.learning)
            .finish()
    }
}
