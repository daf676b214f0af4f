//! Demonstration learning engine
//!
//! State machine with at most one active recording:
//!
//! ```text
//! Idle --start(name)--> Recording --stop(slots)--> Idle (+ LearnedTask)
//! ```
//!
//! Every operation takes the same lock, so start/stop/record/replay are
//! serialized and a replay never observes a half-written task. Changes are
//! persisted from a snapshot after the lock is released, on the blocking
//! pool, one write at a time.

use crate::errors::{AssistantError, RecordingStateError, Result};
use crate::learning::store::{MemoryTaskStore, TaskStore};
use crate::learning::task::{task_key, LearnedTask, RecordingSession};
use crate::memory::ConversationMemory;
use crate::nlu::anaphora::{is_placeholder, substitute, Substitution};
use crate::nlu::entities::{extract, parse_bindings};
use crate::nlu::normalizer::normalize;
use crate::types::{ActionRequest, ClarifyReason, SourceStage};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};
use tracing::{debug, info, warn};

static BINDING_INTRO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(?:with|for|to|using)\s+(?P<rest>.+)$").expect("binding intro regex"));

static FALLBACK_INTRO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s(?:with|using)\s+(?P<rest>.+)$").expect("fallback intro regex"));

#[derive(Debug, Default)]
struct EngineState {
    session: Option<RecordingSession>,
    tasks: HashMap<String, LearnedTask>,
}

impl EngineState {
    fn snapshot(&self) -> BTreeMap<String, LearnedTask> {
        self.tasks.iter().map(|(k, t)| (k.clone(), t.clone())).collect()
    }
}

/// Aggregate usage statistics over all learned tasks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningStats {
    pub task_count: usize,
    pub total_replays: u64,
    pub average_success_rate: f64,
    pub most_used: Option<String>,
}

/// Records demonstrations and replays learned tasks
pub struct LearningEngine {
    state: Mutex<EngineState>,
    store: Arc<dyn TaskStore>,
    /// Orders snapshot writes
    persist: tokio::sync::Mutex<()>,
}

impl LearningEngine {
    /// Create engine backed by `store`, loading every persisted task
    pub fn new(store: Box<dyn TaskStore>) -> Result<Self> {
        let stored = store
            .load_all()
            .map_err(|e| AssistantError::Storage(format!("{:#}", e)))?;

        let tasks: HashMap<String, LearnedTask> = stored
            .into_values()
            .map(|task| (task.key(), task))
            .collect();
        info!(count = tasks.len(), "loaded learned tasks");

        Ok(Self {
            state: Mutex::new(EngineState {
                session: None,
                tasks,
            }),
            store: Arc::from(store),
            persist: tokio::sync::Mutex::new(()),
        })
    }

    /// Engine with a volatile store
    pub fn in_memory() -> Self {
        Self {
            state: Mutex::new(EngineState::default()),
            store: Arc::new(MemoryTaskStore::new()),
            persist: tokio::sync::Mutex::new(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Write `tasks` to the store off the async worker threads
    async fn write(&self, tasks: BTreeMap<String, LearnedTask>) -> anyhow::Result<()> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.save_all(&tasks)).await?
    }

    /// Begin recording under `name`
    pub fn start(&self, name: &str) -> std::result::Result<(), RecordingStateError> {
        let mut state = self.lock();
        if let Some(active) = &state.session {
            return Err(RecordingStateError::AlreadyRecording {
                active: active.name().to_string(),
            });
        }

        let session = RecordingSession::start(name)?;
        info!(task = session.name(), "recording started");
        state.session = Some(session);
        Ok(())
    }

    /// Capture a successfully dispatched request into the active session.
    /// Returns false when idle or when the request is a control action.
    pub fn record(&self, request: &ActionRequest) -> bool {
        let mut state = self.lock();
        match state.session.as_mut() {
            Some(session) => {
                let captured = session.record(request);
                if captured {
                    debug!(task = session.name(), action = request.action_type(), "step recorded");
                }
                captured
            }
            None => false,
        }
    }

    /// Finish the active recording. The values of `template_slots` become
    /// placeholders bound at replay time. A same-named task is overwritten.
    ///
    /// The task stays usable for this session even when writing it to the
    /// store fails; that failure is returned as `Storage`.
    pub async fn stop(&self, template_slots: &[String]) -> Result<LearnedTask> {
        let _write = self.persist.lock().await;
        let (task, snapshot) = {
            let mut state = self.lock();
            let session = state.session.take().ok_or(RecordingStateError::NotRecording)?;
            let task = session.finish(template_slots)?;
            info!(task = %task.name, steps = task.steps.len(), slots = ?task.parameter_slots, "recording stopped");
            state.tasks.insert(task.key(), task.clone());
            (task, state.snapshot())
        };

        if let Err(e) = self.write(snapshot).await {
            warn!(task = %task.name, error = %format!("{:#}", e), "failed to persist learned task");
            return Err(AssistantError::Storage(format!(
                "Learned '{}' but could not save it: {:#}",
                task.name, e
            )));
        }
        Ok(task)
    }

    /// Resolve a learned task into concrete requests for the current turn.
    ///
    /// Placeholders are bound, in order, from explicit bindings in
    /// `utterance` ("with contact Dad"), entities found in `utterance`,
    /// then `memory`. Steps that stay unresolved become `clarify` requests.
    pub fn replay(&self, name: &str, utterance: &str, memory: &ConversationMemory) -> Result<Vec<ActionRequest>> {
        let task = {
            let state = self.lock();
            state
                .tasks
                .get(&task_key(name))
                .cloned()
                .ok_or_else(|| AssistantError::TaskNotFound { name: name.to_string() })?
        };

        let bindings = parse_bindings(&binding_text(utterance, &task.name));
        let entities = extract(&normalize(utterance));

        let lookup = |slot: &str| -> Option<Value> {
            let bound = bindings
                .get(slot)
                .cloned()
                .or_else(|| entities.value_for(slot));
            match bound {
                Some(value) if is_placeholder(&value) => memory.find_slot(slot),
                Some(value) => Some(value),
                None => memory.find_slot(slot),
            }
        };

        let steps = task
            .steps
            .iter()
            .map(|step| match substitute(step, &lookup) {
                Substitution::Resolved(request) => request.restaged(SourceStage::Learned, 1.0),
                Substitution::Unresolved { request, slots } => ActionRequest::clarify(
                    utterance,
                    ClarifyReason::MissingParameter {
                        action_type: request.action_type().to_string(),
                        slots,
                    },
                    SourceStage::Learned,
                ),
            })
            .collect::<Vec<_>>();

        debug!(task = %task.name, steps = steps.len(), "replaying learned task");
        Ok(steps)
    }

    /// Update usage statistics after a replay was dispatched
    pub async fn mark_replayed(&self, name: &str, succeeded: usize, total: usize) {
        let _write = self.persist.lock().await;
        let snapshot = {
            let mut state = self.lock();
            let Some(task) = state.tasks.get_mut(&task_key(name)) else {
                return;
            };
            task.record_usage(succeeded, total);
            state.snapshot()
        };

        if let Err(e) = self.write(snapshot).await {
            warn!(task = name, error = %format!("{:#}", e), "failed to persist task statistics");
        }
    }

    /// Names of every learned task
    pub fn list(&self) -> BTreeSet<String> {
        self.lock().tasks.values().map(|task| task.name.clone()).collect()
    }

    /// Delete a learned task from memory and the store
    pub async fn forget(&self, name: &str) -> Result<LearnedTask> {
        let _write = self.persist.lock().await;
        let (task, snapshot) = {
            let mut state = self.lock();
            let task = state
                .tasks
                .remove(&task_key(name))
                .ok_or_else(|| AssistantError::TaskNotFound { name: name.to_string() })?;
            (task, state.snapshot())
        };

        if let Err(e) = self.write(snapshot).await {
            warn!(task = %task.name, error = %format!("{:#}", e), "failed to remove task from store");
            return Err(AssistantError::Storage(format!(
                "Forgot '{}' for now but could not update the task file: {:#}",
                task.name, e
            )));
        }
        info!(task = %task.name, "learned task forgotten");
        Ok(task)
    }

    pub fn task(&self, name: &str) -> Option<LearnedTask> {
        self.lock().tasks.get(&task_key(name)).cloned()
    }

    pub fn is_recording(&self) -> bool {
        self.lock().session.is_some()
    }

    /// Name of the active recording, if any
    pub fn active_recording(&self) -> Option<String> {
        self.lock().session.as_ref().map(|s| s.name().to_string())
    }

    /// Steps captured so far by the active recording
    pub fn recorded_steps(&self) -> Vec<ActionRequest> {
        self.lock()
            .session
            .as_ref()
            .map(|s| s.buffer().to_vec())
            .unwrap_or_default()
    }

    pub fn stats(&self) -> LearningStats {
        let state = self.lock();
        let task_count = state.tasks.len();
        if task_count == 0 {
            return LearningStats::default();
        }

        let total_replays = state.tasks.values().map(|t| t.usage_count).sum();
        let average_success_rate =
            state.tasks.values().map(|t| t.success_rate).sum::<f64>() / task_count as f64;
        let most_used = state
            .tasks
            .values()
            .filter(|t| t.usage_count > 0)
            .max_by(|a, b| a.usage_count.cmp(&b.usage_count).then_with(|| b.name.cmp(&a.name)))
            .map(|t| t.name.clone());

        LearningStats {
            task_count,
            total_replays,
            average_success_rate,
            most_used,
        }
    }
}

impl std::fmt::Debug for LearningEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("LearningEngine")
            .field("recording", &state.session.as_ref().map(|s| s.name().to_string()))
            .field("tasks", &state.tasks.len())
            .finish()
    }
}

/// Text after the task name that may carry slot bindings
fn binding_text(utterance: &str, task_name: &str) -> String {
    let lowered = utterance.to_lowercase();
    let key = task_key(task_name);

    if let Some(pos) = lowered.find(&key) {
        let tail = utterance.get(pos + key.len()..).unwrap_or_default();
        return BINDING_INTRO
            .captures(tail)
            .and_then(|caps| caps.name("rest"))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
    }

    FALLBACK_INTRO
        .captures(utterance)
        .and_then(|caps| caps.name("rest"))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}
