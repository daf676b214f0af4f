//! Action dispatcher
//!
//! Runs resolved requests strictly in the order given. A failing request
//! never aborts the rest of the plan. Control actions (clarify, cancel,
//! teaching, learned tasks) are interpreted here; everything else goes to
//! the handler registry through the executor.

use crate::errors::AssistantError;
use crate::handlers::HandlerExecutor;
use crate::learning::LearningEngine;
use crate::memory::{ConversationMemory, ConversationTurn};
use crate::types::{action, ActionRequest, PlanResult, RequestOutcome};
use serde_json::Value;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Everything one dispatch cycle reads or writes besides the handlers
pub struct DispatchContext<'a> {
    /// Utterance the plan was resolved from
    pub utterance: &'a str,

    pub memory: &'a RwLock<ConversationMemory>,

    /// Learning engine; absent means no recording hook and no replay
    pub learning: Option<&'a LearningEngine>,

    pub cancel: &'a CancellationToken,
}

/// Sequential dispatcher with partial-failure semantics
#[derive(Debug, Clone)]
pub struct Dispatcher {
    executor: HandlerExecutor,
}

impl Dispatcher {
    pub fn new(executor: HandlerExecutor) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &HandlerExecutor {
        &self.executor
    }

    /// Dispatch every request in order and collect the outcomes.
    ///
    /// A `do_learned_task` request is replaced in place by the outcomes of
    /// its steps. A turn is appended to memory after every request.
    pub async fn dispatch(&self, requests: Vec<ActionRequest>, ctx: &DispatchContext<'_>) -> PlanResult {
        let mut outcomes = Vec::with_capacity(requests.len());

        for request in requests {
            if ctx.cancel.is_cancelled() {
                let outcome = RequestOutcome::failure(request, "cancelled");
                remember(ctx, &outcome).await;
                outcomes.push(outcome);
                continue;
            }

            if request.action_type() == action::DO_LEARNED_TASK {
                self.replay_learned(request, ctx, &mut outcomes).await;
                continue;
            }

            let outcome = self.dispatch_one(request, ctx).await;
            remember(ctx, &outcome).await;
            outcomes.push(outcome);
        }

        let plan = PlanResult::new(outcomes);
        info!(requests = plan.len(), succeeded = plan.succeeded(), overall_ok = plan.overall_ok(), "plan dispatched");
        plan
    }

    /// Splice the steps of a learned task into the plan
    async fn replay_learned(&self, request: ActionRequest, ctx: &DispatchContext<'_>, outcomes: &mut Vec<RequestOutcome>) {
        let name = request.param_str("task").unwrap_or_default().to_string();

        let Some(engine) = ctx.learning else {
            let outcome = RequestOutcome::failure(request, "Learned tasks are not available");
            remember(ctx, &outcome).await;
            outcomes.push(outcome);
            return;
        };

        let steps = {
            let memory = ctx.memory.read().await;
            engine.replay(&name, request.raw_span(), &memory)
        };

        let steps = match steps {
            Ok(steps) => steps,
            Err(e) => {
                let outcome = RequestOutcome::failure(request, e.user_message());
                remember(ctx, &outcome).await;
                outcomes.push(outcome);
                return;
            }
        };

        info!(task = %name, steps = steps.len(), "replaying learned task");
        let total = steps.len();
        let mut succeeded = 0;

        for step in steps {
            let outcome = if ctx.cancel.is_cancelled() {
                RequestOutcome::failure(step, "cancelled")
            } else {
                self.dispatch_one(step, ctx).await
            };
            if outcome.ok {
                succeeded += 1;
            }
            remember(ctx, &outcome).await;
            outcomes.push(outcome);
        }

        engine.mark_replayed(&name, succeeded, total).await;
    }

    async fn dispatch_one(&self, request: ActionRequest, ctx: &DispatchContext<'_>) -> RequestOutcome {
        debug!(%request, "dispatching");

        match request.action_type() {
            action::CLARIFY => {
                let question = clarify_question(&request);
                RequestOutcome::failure(request, question)
            }
            action::CANCEL => RequestOutcome::success(request, "Cancelled."),
            action::START_TEACHING
            | action::STOP_TEACHING
            | action::LIST_LEARNED_TASKS
            | action::FORGET_LEARNED_TASK => match ctx.learning {
                Some(engine) => teaching_control(engine, request).await,
                None => RequestOutcome::failure(request, "Learning is not available"),
            },
            _ => self.invoke_handler(request, ctx).await,
        }
    }

    async fn invoke_handler(&self, request: ActionRequest, ctx: &DispatchContext<'_>) -> RequestOutcome {
        match self.executor.invoke(&request, ctx.cancel).await {
            Ok(outcome) if outcome.ok => {
                if let Some(engine) = ctx.learning {
                    engine.record(&request);
                }
                RequestOutcome::success(request, outcome.message)
            }
            Ok(outcome) => {
                let failure = AssistantError::HandlerFailure {
                    action_type: request.action_type().to_string(),
                    message: outcome.message.clone(),
                    transient: outcome.transient,
                };
                warn!(error = %failure, "handler failed");
                RequestOutcome::failure(request, outcome.message)
            }
            Err(e) => {
                warn!(action = request.action_type(), error = %e, "dispatch failed");
                RequestOutcome::failure(request, e.user_message())
            }
        }
    }
}

/// Append the turn for one dispatched request
async fn remember(ctx: &DispatchContext<'_>, outcome: &RequestOutcome) {
    let turn = ConversationTurn::new(ctx.utterance, vec![outcome.request.clone()])
        .with_outcome(outcome.ok, outcome.message.clone());
    ctx.memory.write().await.record(turn);
}

/// Start/stop/list/forget handled against the learning engine
async fn teaching_control(engine: &LearningEngine, request: ActionRequest) -> RequestOutcome {
    match request.action_type() {
        action::START_TEACHING => {
            let name = request.param_str("task_name").unwrap_or_default().to_string();
            match engine.start(&name) {
                Ok(()) => RequestOutcome::success(
                    request,
                    format!("Started teaching '{}'. Show me the steps, then say 'stop teaching'.", name.trim()),
                ),
                Err(e) => RequestOutcome::failure(request, AssistantError::from(e).user_message()),
            }
        }
        action::STOP_TEACHING => {
            let slots: Vec<String> = request
                .parameters()
                .get("slots")
                .and_then(Value::as_array)
                .map(|slots| slots.iter().filter_map(Value::as_str).map(str::to_string).collect())
                .unwrap_or_default();
            match engine.stop(&slots).await {
                Ok(task) => RequestOutcome::success(
                    request,
                    format!("Learned '{}' with {} step(s).", task.name, task.steps.len()),
                ),
                Err(e) => RequestOutcome::failure(request, e.user_message()),
            }
        }
        action::LIST_LEARNED_TASKS => {
            let names = engine.list();
            let message = if names.is_empty() {
                "I haven't learned any tasks yet.".to_string()
            } else {
                format!(
                    "I know {} task(s): {}",
                    names.len(),
                    names.into_iter().collect::<Vec<_>>().join(", ")
                )
            };
            RequestOutcome::success(request, message)
        }
        action::FORGET_LEARNED_TASK => {
            let name = request.param_str("task").unwrap_or_default().to_string();
            match engine.forget(&name).await {
                Ok(task) => RequestOutcome::success(request, format!("Forgot '{}'.", task.name)),
                Err(e) => RequestOutcome::failure(request, e.user_message()),
            }
        }
        other => {
            let other = other.to_string();
            RequestOutcome::failure(request, format!("Unsupported control action '{}'", other))
        }
    }
}

/// Follow-up question for a clarify request
fn clarify_question(request: &ActionRequest) -> String {
    let utterance = request.param_str("utterance").unwrap_or_default().to_string();
    let intended = request.param_str("intended_action").map(str::to_string);

    match request.param_str("reason") {
        Some("missing_parameter") => {
            let slot = request
                .parameters()
                .get("missing")
                .and_then(Value::as_array)
                .and_then(|slots| slots.first())
                .and_then(Value::as_str)
                .unwrap_or("detail")
                .to_string();
            AssistantError::MissingParameter {
                action_type: intended.unwrap_or_default(),
                slot,
            }
            .user_message()
        }
        Some("low_confidence") => match intended {
            Some(action_type) => format!(
                "Did you want me to {}? Please say it again more specifically.",
                action_type.replace('_', " ")
            ),
            None => AssistantError::UnresolvedIntent { utterance }.user_message(),
        },
        _ => AssistantError::UnresolvedIntent { utterance }.user_message(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{FnHandler, HandlerOutcome, HandlerRegistry, RetryManager};
    use crate::types::{params, ClarifyReason, Params, SourceStage};
    use serde_json::json;
    use std::sync::Arc;

    fn dispatcher() -> Dispatcher {
        let registry = HandlerRegistry::new()
            .with(
                "launch_app",
                Arc::new(FnHandler(|p: &Params| {
                    HandlerOutcome::success(format!("Opened {}", p["app"].as_str().unwrap_or("?")))
                })),
            )
            .with("broken", Arc::new(FnHandler(|_: &Params| HandlerOutcome::failure("window missing"))));
        Dispatcher::new(HandlerExecutor::new(registry).with_retry(RetryManager::with_config(1, 1)))
    }

    fn req(action_type: &str, p: Params) -> ActionRequest {
        ActionRequest::new(action_type, p, 1.0, SourceStage::Regex, action_type)
    }

    fn launch(app: &str) -> ActionRequest {
        req("launch_app", params([("app", app)]))
    }

    struct Fixture {
        memory: RwLock<ConversationMemory>,
        engine: LearningEngine,
        cancel: CancellationToken,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                memory: RwLock::new(ConversationMemory::new()),
                engine: LearningEngine::in_memory(),
                cancel: CancellationToken::new(),
            }
        }

        fn ctx<'a>(&'a self, utterance: &'a str) -> DispatchContext<'a> {
            DispatchContext {
                utterance,
                memory: &self.memory,
                learning: Some(&self.engine),
                cancel: &self.cancel,
            }
        }
    }

    #[tokio::test]
    async fn test_partial_failure_continues() {
        let fx = Fixture::new();
        let plan = dispatcher()
            .dispatch(
                vec![launch("Excel"), req("teleport", Params::new()), launch("Word")],
                &fx.ctx("open excel and teleport and open word"),
            )
            .await;

        assert_eq!(plan.len(), 3);
        assert!(plan.outcomes()[0].ok);
        assert!(!plan.outcomes()[1].ok);
        assert_eq!(plan.outcomes()[1].message, "unknown action");
        assert!(plan.outcomes()[2].ok);
        assert!(!plan.overall_ok());
        assert_eq!(fx.memory.read().await.len(), 3);
    }

    #[tokio::test]
    async fn test_failed_request_remembered() {
        let fx = Fixture::new();
        dispatcher()
            .dispatch(vec![req("broken", params([("app", "Paint")]))], &fx.ctx("do it"))
            .await;

        let memory = fx.memory.read().await;
        let last = memory.last().unwrap();
        let outcome = last.outcome().unwrap();
        assert!(!outcome.ok);
        assert_eq!(memory.find_slot("app"), Some(json!("Paint")));
    }

    #[tokio::test]
    async fn test_clarify_not_dispatched() {
        let fx = Fixture::new();
        let clarify = ActionRequest::clarify("blorp", ClarifyReason::Unresolved, SourceStage::Llm);
        let plan = dispatcher().dispatch(vec![clarify], &fx.ctx("blorp")).await;
        assert!(!plan.overall_ok());
        assert!(plan.outcomes()[0].message.contains("rephrase"));
    }

    #[tokio::test]
    async fn test_missing_parameter_question() {
        let fx = Fixture::new();
        let clarify = ActionRequest::clarify(
            "call him",
            ClarifyReason::MissingParameter {
                action_type: "whatsapp_call".into(),
                slots: vec!["contact".into()],
            },
            SourceStage::Regex,
        );
        let plan = dispatcher().dispatch(vec![clarify], &fx.ctx("call him")).await;
        assert_eq!(plan.outcomes()[0].message, "Which contact do you mean?");
    }

    #[tokio::test]
    async fn test_recording_hook_captures_successes_only() {
        let fx = Fixture::new();
        let d = dispatcher();
        let start = req(action::START_TEACHING, params([("task_name", "setup")]));
        let stop = req(action::STOP_TEACHING, Params::new());

        let plan = d
            .dispatch(
                vec![start, launch("Excel"), req("broken", Params::new()), stop],
                &fx.ctx("teach"),
            )
            .await;
        assert_eq!(plan.succeeded(), 3);

        let task = fx.engine.task("setup").unwrap();
        assert_eq!(task.steps, vec![launch("Excel")]);
    }

    #[tokio::test]
    async fn test_learned_task_spliced_in_place() {
        let fx = Fixture::new();
        let d = dispatcher();
        fx.engine.start("morning").unwrap();
        fx.engine.record(&launch("Excel"));
        fx.engine.record(&launch("Outlook"));
        fx.engine.stop(&[]).await.unwrap();

        let run = ActionRequest::new(
            action::DO_LEARNED_TASK,
            params([("task", "morning")]),
            1.0,
            SourceStage::Regex,
            "do the task morning",
        );
        let plan = d
            .dispatch(vec![launch("Word"), run], &fx.ctx("open word and do the task morning"))
            .await;

        let apps: Vec<&str> = plan
            .outcomes()
            .iter()
            .map(|o| o.request.param_str("app").unwrap_or_default())
            .collect();
        assert_eq!(apps, vec!["Word", "Excel", "Outlook"]);
        assert_eq!(plan.outcomes()[1].request.source_stage(), SourceStage::Learned);
        assert_eq!(fx.engine.task("morning").unwrap().usage_count, 1);
        assert_eq!(fx.memory.read().await.len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_learned_task() {
        let fx = Fixture::new();
        let run = req(action::DO_LEARNED_TASK, params([("task", "ghost")]));
        let plan = dispatcher().dispatch(vec![run], &fx.ctx("do the task ghost")).await;
        assert!(!plan.overall_ok());
        assert!(plan.outcomes()[0].message.contains("ghost"));
    }

    #[tokio::test]
    async fn test_cancelled_plan_skips_remaining() {
        let fx = Fixture::new();
        fx.cancel.cancel();
        let plan = dispatcher()
            .dispatch(vec![launch("Excel"), launch("Word")], &fx.ctx("open excel and word"))
            .await;
        assert_eq!(plan.succeeded(), 0);
        assert!(plan.outcomes().iter().all(|o| o.message == "cancelled"));
    }

    #[tokio::test]
    async fn test_nested_start_reports_error() {
        let fx = Fixture::new();
        let d = dispatcher();
        let start = |name: &str| req(action::START_TEACHING, params([("task_name", name)]));
        let plan = d.dispatch(vec![start("a"), start("b")], &fx.ctx("teach")).await;

        assert!(plan.outcomes()[0].ok);
        assert!(!plan.outcomes()[1].ok);
        assert!(plan.outcomes()[1].message.contains("Already recording 'a'"));
        assert_eq!(fx.engine.active_recording().as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_without_learning_engine() {
        let memory = RwLock::new(ConversationMemory::new());
        let cancel = CancellationToken::new();
        let ctx = DispatchContext {
            utterance: "list my tasks",
            memory: &memory,
            learning: None,
            cancel: &cancel,
        };
        let plan = dispatcher()
            .dispatch(vec![req(action::LIST_LEARNED_TASKS, Params::new()), launch("Excel")], &ctx)
            .await;
        assert!(!plan.outcomes()[0].ok);
        assert!(plan.outcomes()[1].ok);
    }
}
