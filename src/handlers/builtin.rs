//! Built-in handlers
//!
//! Concrete desktop automation lives outside the core. These handlers log
//! what would have happened so the binary and the tests can exercise the
//! full dispatch path.

use crate::handlers::registry::HandlerRegistry;
use crate::handlers::types::{ActionHandler, HandlerOutcome};
use crate::types::{action, Params};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Upper bound on loop iterations when neither a duration nor a repeat count
/// was given
const MAX_UNBOUNDED_ITERATIONS: u64 = 10_000;

/// Logs the request and reports success
#[derive(Debug, Clone)]
pub struct DryRunHandler {
    action_type: String,
}

impl DryRunHandler {
    pub fn new(action_type: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
        }
    }
}

#[async_trait]
impl ActionHandler for DryRunHandler {
    async fn execute(&self, params: &Params, _cancel: &CancellationToken) -> HandlerOutcome {
        let rendered = serde_json::to_string(params).unwrap_or_default();
        info!(action = %self.action_type, params = %rendered, "dry run");
        HandlerOutcome::success(describe(&self.action_type, params))
    }
}

/// Human-readable rendition of a dry-run action
fn describe(action_type: &str, params: &Params) -> String {
    let get = |key: &str| params.get(key).map(render_value).unwrap_or_default();
    match action_type {
        "launch_app" => format!("Opened {}", get("app")),
        "close_app" => format!("Closed {}", get("app")),
        "whatsapp_send" => format!("Sent '{}' to {}", get("message"), get("contact")),
        "whatsapp_call" => format!("Calling {}", get("contact")),
        "search" => format!("Searched for {}", get("query")),
        "play_song" => format!("Playing {}", get("song")),
        "open_url" => format!("Opened {}", get("url")),
        "timer" => format!("Timer set for {} seconds", get("duration_seconds")),
        _ if params.is_empty() => format!("Done: {}", action_type),
        _ => {
            let pairs: Vec<String> = params
                .iter()
                .map(|(k, v)| format!("{}={}", k, render_value(v)))
                .collect();
            format!("Done: {} ({})", action_type, pairs.join(", "))
        }
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Simulated timed hotkey loop.
///
/// Presses `keys` every `interval_seconds` until `duration_seconds` elapse,
/// `repeat_count` presses are done, or the cancel token fires. The token is
/// checked before every press and during every wait.
#[derive(Debug, Clone, Default)]
pub struct HotkeyLoopHandler;

impl HotkeyLoopHandler {
    fn seconds(params: &Params, key: &str) -> Option<f64> {
        params.get(key).and_then(Value::as_f64).filter(|s| *s >= 0.0)
    }
}

#[async_trait]
impl ActionHandler for HotkeyLoopHandler {
    async fn execute(&self, params: &Params, cancel: &CancellationToken) -> HandlerOutcome {
        let Some(keys) = params.get("keys").and_then(Value::as_str) else {
            return HandlerOutcome::failure("no keys to press");
        };
        let Some(interval) = Self::seconds(params, "interval_seconds") else {
            return HandlerOutcome::failure("no interval given");
        };

        let Ok(interval) = Duration::try_from_secs_f64(interval) else {
            return HandlerOutcome::failure(format!("Interval of {} seconds is too long", interval));
        };
        let deadline = match Self::seconds(params, "duration_seconds") {
            Some(s) => match Duration::try_from_secs_f64(s)
                .ok()
                .and_then(|d| Instant::now().checked_add(d))
            {
                Some(deadline) => Some(deadline),
                None => return HandlerOutcome::failure(format!("Duration of {} seconds is too long", s)),
            },
            None => None,
        };
        let limit = params
            .get("repeat_count")
            .and_then(Value::as_u64)
            .unwrap_or(MAX_UNBOUNDED_ITERATIONS);

        let mut presses = 0u64;
        while presses < limit {
            if cancel.is_cancelled() {
                info!(keys, presses, "hotkey loop cancelled");
                return HandlerOutcome::failure(format!("Stopped pressing {} after {} presses", keys, presses));
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                break;
            }

            presses += 1;
            debug!(keys, presses, "press");

            if presses < limit {
                tokio::select! {
                    _ = cancel.cancelled() => continue,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        }

        HandlerOutcome::success(format!("Pressed {} {} times", keys, presses))
    }
}

/// Handler backed by a closure
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F> ActionHandler for FnHandler<F>
where
    F: Fn(&Params) -> HandlerOutcome + Send + Sync,
{
    async fn execute(&self, params: &Params, _cancel: &CancellationToken) -> HandlerOutcome {
        (self.0)(params)
    }
}

/// Register dry-run handlers for every non-control action type given,
/// with the simulated loop for `hotkey_loop`
pub fn register_dry_run<I, S>(registry: &mut HandlerRegistry, action_types: I)
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    for action_type in action_types {
        let action_type = action_type.into();
        if action::is_control(&action_type) {
            continue;
        }
        let handler: Arc<dyn ActionHandler> = if action_type == "hotkey_loop" {
            Arc::new(HotkeyLoopHandler)
        } else {
            Arc::new(DryRunHandler::new(action_type.clone()))
        };
        registry.register(action_type, handler);
    }
}
