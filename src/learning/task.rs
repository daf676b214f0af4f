//! Learned tasks and recording sessions

use crate::errors::RecordingStateError;
use crate::nlu::anaphora::{placeholder, template_slot};
use crate::types::{action, ActionRequest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use uuid::Uuid;

/// Normalized store key for a task name (case-insensitive)
pub fn task_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// A named, persisted sequence of action templates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedTask {
    pub id: Uuid,

    /// Display name as first spoken
    pub name: String,

    /// Ordered request templates
    pub steps: Vec<ActionRequest>,

    pub created_at: DateTime<Utc>,

    /// Slot names that appear in steps as `{slot}` placeholders
    #[serde(default)]
    pub parameter_slots: BTreeSet<String>,

    #[serde(default)]
    pub usage_count: u64,

    /// Running mean of per-replay success ratios
    #[serde(default = "default_success_rate")]
    pub success_rate: f64,

    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,
}

fn default_success_rate() -> f64 {
    1.0
}

impl LearnedTask {
    /// Build a task from recorded steps, turning the values of
    /// `template_slots` into placeholders
    pub fn from_recording(name: impl Into<String>, steps: Vec<ActionRequest>, template_slots: &[String]) -> Self {
        let templated: Vec<ActionRequest> = steps
            .iter()
            .map(|step| {
                let mut params = step.parameters().clone();
                for slot in template_slots {
                    if let Some(value) = params.get_mut(slot) {
                        *value = placeholder(slot);
                    }
                }
                step.with_parameters(params)
            })
            .collect();

        let parameter_slots = templated
            .iter()
            .flat_map(|step| step.parameters().values())
            .filter_map(|value| match value {
                Value::String(text) => template_slot(text).map(str::to_string),
                _ => None,
            })
            .collect();

        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            steps: templated,
            created_at: Utc::now(),
            parameter_slots,
            usage_count: 0,
            success_rate: 1.0,
            last_used: None,
        }
    }

    pub fn key(&self) -> String {
        task_key(&self.name)
    }

    /// Fold one replay's outcome into the usage statistics
    pub fn record_usage(&mut self, succeeded: usize, total: usize) {
        let ratio = if total == 0 {
            1.0
        } else {
            succeeded as f64 / total as f64
        };
        self.success_rate = (self.success_rate * self.usage_count as f64 + ratio) / (self.usage_count + 1) as f64;
        self.usage_count += 1;
        self.last_used = Some(Utc::now());
    }
}

/// In-progress demonstration; never persisted
#[derive(Debug, Clone)]
pub struct RecordingSession {
    name: String,
    buffer: Vec<ActionRequest>,
    started_at: DateTime<Utc>,
}

impl RecordingSession {
    pub fn start(name: &str) -> Result<Self, RecordingStateError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RecordingStateError::EmptyTaskName);
        }
        Ok(Self {
            name: name.to_string(),
            buffer: Vec::new(),
            started_at: Utc::now(),
        })
    }

    /// Append a dispatched request; control actions are never captured
    pub fn record(&mut self, request: &ActionRequest) -> bool {
        if action::is_control(request.action_type()) {
            return false;
        }
        self.buffer.push(request.clone());
        true
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn buffer(&self) -> &[ActionRequest] {
        &self.buffer
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Close the session into a task
    pub fn finish(self, template_slots: &[String]) -> Result<LearnedTask, RecordingStateError> {
        if self.buffer.is_empty() {
            return Err(RecordingStateError::NothingRecorded { name: self.name });
        }
        Ok(LearnedTask::from_recording(self.name, self.buffer, template_slots))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{params, SourceStage};

    fn send(contact: &str) -> ActionRequest {
        ActionRequest::new(
            "whatsapp_send",
            params([("contact", contact), ("message", "good morning")]),
            1.0,
            SourceStage::Regex,
            "send good morning",
        )
    }

    #[test]
    fn test_task_key_case_insensitive() {
        assert_eq!(task_key("  Open   Excel "), "open excel");
        assert_eq!(task_key("OPEN EXCEL"), task_key("open excel"));
    }

    #[test]
    fn test_session_requires_name() {
        assert_eq!(
            RecordingSession::start("   ").unwrap_err(),
            RecordingStateError::EmptyTaskName
        );
    }

    #[test]
    fn test_session_skips_control_actions() {
        let mut session = RecordingSession::start("greet").unwrap();
        let control = ActionRequest::new(action::STOP_TEACHING, Default::default(), 1.0, SourceStage::Regex, "");
        assert!(!session.record(&control));
        assert!(session.record(&send("Mom")));
        assert_eq!(session.buffer().len(), 1);
    }

    #[test]
    fn test_finish_empty_fails() {
        let session = RecordingSession::start("greet").unwrap();
        assert!(matches!(
            session.finish(&[]),
            Err(RecordingStateError::NothingRecorded { .. })
        ));
    }

    #[test]
    fn test_templating_marks_slots() {
        let mut session = RecordingSession::start("greet").unwrap();
        session.record(&send("Mom"));
        let task = session.finish(&["contact".to_string(), "volume".to_string()]).unwrap();

        assert_eq!(task.steps[0].param_str("contact"), Some("{contact}"));
        assert_eq!(task.steps[0].param_str("message"), Some("good morning"));
        assert_eq!(task.parameter_slots.iter().collect::<Vec<_>>(), vec!["contact"]);
    }

    #[test]
    fn test_literal_recording_unchanged() {
        let task = LearnedTask::from_recording("greet", vec![send("Mom")], &[]);
        assert_eq!(task.steps, vec![send("Mom")]);
        assert!(task.parameter_slots.is_empty());
    }

    #[test]
    fn test_record_usage_running_mean() {
        let mut task = LearnedTask::from_recording("greet", vec![send("Mom")], &[]);
        task.record_usage(1, 1);
        task.record_usage(0, 2);
        assert_eq!(task.usage_count, 2);
        assert!((task.success_rate - 0.5).abs() < 1e-9);
        assert!(task.last_used.is_some());
    }
}
