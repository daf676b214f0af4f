//! Anaphora and template placeholders
//!
//! Parameter values like "him" or "it" stand in for a slot value from an
//! earlier turn. Learned tasks use `{slot}` templates for the same purpose.
//! Both are resolved here against a lookup function, usually
//! `ConversationMemory::find_slot`.

use crate::types::{ActionRequest, Params};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

/// Words that refer back to an earlier slot value
pub const ANAPHORA: &[&str] = &["him", "her", "it", "that", "them", "this", "there", "same"];

static TEMPLATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\{([a-z_][a-z0-9_]*)\}$").expect("template regex"));

/// True if the text is exactly one anaphoric word
pub fn is_anaphoric(text: &str) -> bool {
    let lowered = text.trim().to_lowercase();
    ANAPHORA.contains(&lowered.as_str())
}

/// Slot name of a `{slot}` template, if the text is one
pub fn template_slot(text: &str) -> Option<&str> {
    TEMPLATE
        .captures(text.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Template value for a slot
pub fn placeholder(slot: &str) -> Value {
    Value::String(format!("{{{}}}", slot))
}

/// True if the value must be substituted before dispatch
pub fn is_placeholder(value: &Value) -> bool {
    match value {
        Value::String(text) => is_anaphoric(text) || template_slot(text).is_some(),
        _ => false,
    }
}

/// Result of placeholder substitution
#[derive(Debug, Clone, PartialEq)]
pub enum Substitution {
    /// Every placeholder was replaced (or there were none)
    Resolved(ActionRequest),
    /// Some placeholders had no value; the request keeps them as-is
    Unresolved {
        request: ActionRequest,
        slots: Vec<String>,
    },
}

/// Replace placeholder values using `lookup(slot)`.
///
/// An anaphoric word looks up the slot it sits in; a `{slot}` template looks
/// up the slot it names.
pub fn substitute<F>(request: &ActionRequest, lookup: F) -> Substitution
where
    F: Fn(&str) -> Option<Value>,
{
    if !request.parameters().values().any(is_placeholder) {
        return Substitution::Resolved(request.clone());
    }

    let mut parameters = Params::new();
    let mut unresolved = Vec::new();

    for (key, value) in request.parameters() {
        let slot = match value {
            Value::String(text) if is_anaphoric(text) => Some(key.as_str()),
            Value::String(text) => template_slot(text),
            _ => None,
        };

        let Some(slot) = slot else {
            parameters.insert(key.clone(), value.clone());
            continue;
        };

        match lookup(slot) {
            Some(found) if !is_placeholder(&found) => {
                parameters.insert(key.clone(), found);
            }
            _ => {
                unresolved.push(slot.to_string());
                parameters.insert(key.clone(), value.clone());
            }
        }
    }

    let request = request.with_parameters(parameters);
    if unresolved.is_empty() {
        Substitution::Resolved(request)
    } else {
        Substitution::Unresolved {
            request,
            slots: unresolved,
        }
    }
}
