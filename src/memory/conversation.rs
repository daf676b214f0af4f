//! Bounded conversation memory
//!
//! Maintains a fixed-size ring of completed turns with:
//! - FIFO eviction when full (oldest dropped first)
//! - Optional age limit (turns older than `max_age` are ignored and pruned)
//! - Newest-first slot lookup for anaphora resolution and defaults
//!
//! Turns are stored behind `Arc` and never mutated after `record`, so a
//! snapshot is a cheap clone that readers can hold while a new turn is
//! appended elsewhere.

use crate::nlu::anaphora::is_placeholder;
use crate::types::{ActionRequest, Params};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;

/// Default number of retained turns
pub const DEFAULT_MEMORY_CAPACITY: usize = 40;

/// Parameter keys that describe the request itself rather than a slot
const NON_SLOT_KEYS: &[&str] = &["utterance", "reason", "missing", "intended_action", "raw_text"];

/// Result of dispatching a turn's request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub ok: bool,
    pub message: String,
}

/// One completed turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    utterance: String,
    resolved_requests: Vec<ActionRequest>,
    timestamp: DateTime<Utc>,
    entities_snapshot: Params,
    outcome: Option<TurnOutcome>,
}

impl ConversationTurn {
    /// Build a turn stamped now; slot values are captured from the request parameters
    pub fn new(utterance: impl Into<String>, resolved_requests: Vec<ActionRequest>) -> Self {
        let mut entities_snapshot = Params::new();
        for request in &resolved_requests {
            for (key, value) in request.parameters() {
                if NON_SLOT_KEYS.contains(&key.as_str()) || is_placeholder(value) {
                    continue;
                }
                if matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_)) {
                    entities_snapshot.insert(key.clone(), value.clone());
                }
            }
        }

        Self {
            utterance: utterance.into(),
            resolved_requests,
            timestamp: Utc::now(),
            entities_snapshot,
            outcome: None,
        }
    }

    /// Attach the dispatch outcome
    pub fn with_outcome(mut self, ok: bool, message: impl Into<String>) -> Self {
        self.outcome = Some(TurnOutcome {
            ok,
            message: message.into(),
        });
        self
    }

    /// Override the timestamp
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn utterance(&self) -> &str {
        &self.utterance
    }

    pub fn resolved_requests(&self) -> &[ActionRequest] {
        &self.resolved_requests
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn entities_snapshot(&self) -> &Params {
        &self.entities_snapshot
    }

    pub fn outcome(&self) -> Option<&TurnOutcome> {
        self.outcome.as_ref()
    }
}

/// Memory of recent turns with bounded storage
#[derive(Debug, Clone)]
pub struct ConversationMemory {
    /// Oldest at the front, newest at the back
    turns: VecDeque<Arc<ConversationTurn>>,

    /// Maximum retained turns
    capacity: usize,

    /// Turns older than this are treated as forgotten
    max_age: Option<Duration>,
}

impl ConversationMemory {
    /// Create memory with default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MEMORY_CAPACITY)
    }

    /// Create memory with custom capacity (at least one turn)
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            turns: VecDeque::with_capacity(capacity),
            capacity,
            max_age: None,
        }
    }

    /// Forget turns older than `max_age`
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Append a turn, evicting the oldest if at capacity
    ///
    /// # Complexity
    /// O(1) amortized, plus O(k) for k expired turns
    pub fn record(&mut self, turn: ConversationTurn) {
        self.prune_expired(Utc::now());

        if self.turns.len() >= self.capacity {
            self.turns.pop_front();
        }

        self.turns.push_back(Arc::new(turn));
    }

    /// Up to `n` most recent turns, newest first
    pub fn recent(&self, n: usize) -> Vec<Arc<ConversationTurn>> {
        let now = Utc::now();
        self.turns
            .iter()
            .rev()
            .filter(|turn| self.is_fresh(turn, now))
            .take(n)
            .cloned()
            .collect()
    }

    /// Most recent value recorded for `slot`, scanning newest to oldest
    pub fn find_slot(&self, slot: &str) -> Option<Value> {
        let now = Utc::now();
        self.turns
            .iter()
            .rev()
            .filter(|turn| self.is_fresh(turn, now))
            .find_map(|turn| turn.entities_snapshot.get(slot).cloned())
    }

    /// Most recent turn
    pub fn last(&self) -> Option<Arc<ConversationTurn>> {
        self.recent(1).into_iter().next()
    }

    /// Cheap point-in-time copy for readers
    pub fn snapshot(&self) -> ConversationMemory {
        self.clone()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    fn is_fresh(&self, turn: &ConversationTurn, now: DateTime<Utc>) -> bool {
        match self.max_age {
            Some(max_age) => now - turn.timestamp <= max_age,
            None => true,
        }
    }

    fn prune_expired(&mut self, now: DateTime<Utc>) {
        let Some(max_age) = self.max_age else {
            return;
        };
        while let Some(front) = self.turns.front() {
            if now - front.timestamp > max_age {
                self.turns.pop_front();
            } else {
                break;
            }
        }
    }
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{params, SourceStage};

    fn turn_with(slot: &str, value: &str) -> ConversationTurn {
        let request = ActionRequest::new(
            "whatsapp_send",
            params([(slot, value)]),
            1.0,
            SourceStage::Regex,
            value,
        );
        ConversationTurn::new(format!("utterance {}", value), vec![request])
    }

    #[test]
    fn test_bounded_capacity() {
        let mut memory = ConversationMemory::with_capacity(5);

        for i in 0..10 {
            memory.record(turn_with("contact", &format!("c{}", i)));
        }

        assert_eq!(memory.len(), 5);
        assert_eq!(memory.last().unwrap().utterance(), "utterance c9");
    }

    #[test]
    fn test_fifo_eviction() {
        let mut memory = ConversationMemory::with_capacity(3);

        for i in 1..=4 {
            memory.record(turn_with("contact", &format!("c{}", i)));
        }

        let recent = memory.recent(3);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].utterance(), "utterance c4");
        assert_eq!(recent[2].utterance(), "utterance c2");
        assert!(recent.iter().all(|t| t.utterance() != "utterance c1"));
    }

    #[test]
    fn test_find_slot_newest_first() {
        let mut memory = ConversationMemory::new();
        memory.record(turn_with("contact", "John"));
        memory.record(turn_with("app", "Excel"));
        memory.record(turn_with("contact", "Sarah"));

        assert_eq!(memory.find_slot("contact"), Some(Value::String("Sarah".into())));
        assert_eq!(memory.find_slot("app"), Some(Value::String("Excel".into())));
        assert_eq!(memory.find_slot("song"), None);
    }

    #[test]
    fn test_placeholders_not_captured() {
        let turn = turn_with("contact", "him");
        assert!(turn.entities_snapshot().get("contact").is_none());
    }

    #[test]
    fn test_max_age_ignores_old_turns() {
        let mut memory = ConversationMemory::new().with_max_age(Duration::minutes(5));
        let old = turn_with("contact", "John").at(Utc::now() - Duration::minutes(30));
        memory.turns.push_back(Arc::new(old));

        assert_eq!(memory.find_slot("contact"), None);
        assert!(memory.recent(10).is_empty());

        memory.record(turn_with("contact", "Sarah"));
        assert_eq!(memory.len(), 1);
        assert_eq!(memory.find_slot("contact"), Some(Value::String("Sarah".into())));
    }

    #[test]
    fn test_snapshot_unaffected_by_later_records() {
        let mut memory = ConversationMemory::new();
        memory.record(turn_with("contact", "John"));
        let snapshot = memory.snapshot();
        memory.record(turn_with("contact", "Sarah"));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.find_slot("contact"), Some(Value::String("John".into())));
    }

    #[test]
    fn test_outcome_attached() {
        let turn = turn_with("contact", "John").with_outcome(false, "unknown action");
        assert_eq!(turn.outcome().unwrap().message, "unknown action");
        assert!(!turn.outcome().unwrap().ok);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let mut memory = ConversationMemory::with_capacity(0);
        memory.record(turn_with("contact", "a"));
        memory.record(turn_with("contact", "b"));
        assert_eq!(memory.len(), 1);
        assert_eq!(memory.capacity(), 1);
    }

    #[test]
    fn test_clear() {
        let mut memory = ConversationMemory::new();
        memory.record(turn_with("contact", "a"));
        memory.clear();
        assert!(memory.is_empty());
    }
}
