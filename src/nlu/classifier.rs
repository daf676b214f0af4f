//! Generative intent classification
//!
//! `IntentClassifier` is the seam to an external completion service. The
//! bundled `OllamaClassifier` talks to an Ollama-compatible `/api/generate`
//! endpoint and asks for a JSON object `{action_type, parameters, confidence}`.

use crate::errors::AssistantError;
use crate::memory::ConversationTurn;
use crate::types::Params;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Confidence assumed when the model omits one
const DEFAULT_MODEL_CONFIDENCE: f32 = 0.6;

/// Structured guess from the classifier
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub action_type: String,
    pub parameters: Params,
    pub confidence: f32,
}

/// Classifier failure; transient failures may succeed on a later turn
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifierError {
    #[error("classifier unavailable: {0}")]
    Transient(String),

    #[error("classifier rejected request: {0}")]
    Permanent(String),
}

impl ClassifierError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ClassifierError::Transient(_))
    }
}

impl From<ClassifierError> for AssistantError {
    fn from(err: ClassifierError) -> Self {
        AssistantError::Classifier {
            transient: err.is_transient(),
            message: err.to_string(),
        }
    }
}

/// Opaque classification / completion service
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    /// Guess the action for `text`, given recent turns (newest first)
    async fn classify(
        &self,
        text: &str,
        context: &[Arc<ConversationTurn>],
    ) -> Result<Classification, ClassifierError>;
}

const SYSTEM_PROMPT: &str = "You convert a desktop voice command into JSON. \
Reply with one object: {\"action_type\": string, \"parameters\": object, \"confidence\": number between 0 and 1}. \
Known action types: launch_app{app}, close_app{app}, open_url{url}, search{query,site}, \
whatsapp_send{contact,message}, whatsapp_call{contact}, play_song{song}, spotify_play, stop_music, \
next_song, previous_song, volume{percent|delta|mute}, brightness{level}, wifi{state}, bluetooth{state}, \
power{mode}, timer{duration_seconds}, reminder{text,delay_seconds}, type_text{text}, hotkey{keys}, \
screen_describe. Use action_type \"none\" with confidence 0 if nothing fits.";

/// True for the action types a classifier uses to say nothing fits
pub fn is_no_match(action_type: &str) -> bool {
    matches!(action_type.trim(), "" | "none" | "unknown")
}

/// Classifier backed by an Ollama-compatible HTTP endpoint
pub struct OllamaClassifier {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaClassifier {
    /// Create a classifier
    ///
    /// # Arguments
    /// * `base_url` - Base URL (default: http://127.0.0.1:11434)
    /// * `model` - Model name, e.g. "qwen2.5:7b-instruct"
    pub fn new(base_url: Option<String>, model: impl Into<String>, timeout: Duration) -> crate::errors::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AssistantError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url
                .unwrap_or_else(|| "http://127.0.0.1:11434".to_string())
                .trim_end_matches('/')
                .to_string(),
            model: model.into(),
        })
    }

    fn build_prompt(text: &str, context: &[Arc<ConversationTurn>]) -> String {
        let mut prompt = String::from(SYSTEM_PROMPT);
        if !context.is_empty() {
            prompt.push_str("\n\nRecent turns (newest first):\n");
            for turn in context {
                let actions: Vec<String> = turn
                    .resolved_requests()
                    .iter()
                    .map(|r| r.to_string())
                    .collect();
                prompt.push_str(&format!("- \"{}\" -> {}\n", turn.utterance(), actions.join("; ")));
            }
        }
        prompt.push_str(&format!("\nCommand: {}\nJSON:", text));
        prompt
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[async_trait]
impl IntentClassifier for OllamaClassifier {
    async fn classify(
        &self,
        text: &str,
        context: &[Arc<ConversationTurn>],
    ) -> Result<Classification, ClassifierError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = json!({
            "model": self.model,
            "prompt": Self::build_prompt(text, context),
            "format": "json",
            "stream": false,
            "options": { "temperature": 0.0 },
        });

        let response = self.client.post(&url).json(&body).send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                ClassifierError::Transient(format!("Failed to connect to Ollama: {}", e))
            } else {
                ClassifierError::Permanent(format!("Request failed: {}", e))
            }
        })?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(ClassifierError::Transient(format!("Ollama API error: {}", status)));
        }
        if !status.is_success() {
            return Err(ClassifierError::Permanent(format!("Ollama API error: {}", status)));
        }

        let generated: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ClassifierError::Permanent(format!("Failed to parse response: {}", e)))?;

        parse_classification(&generated.response)
    }
}

/// Parse the model's JSON reply, tolerating code fences and missing fields
pub fn parse_classification(raw: &str) -> Result<Classification, ClassifierError> {
    let trimmed = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let value: Value = serde_json::from_str(trimmed)
        .map_err(|e| ClassifierError::Permanent(format!("Malformed classifier reply: {}", e)))?;

    let action_type = value
        .get("action_type")
        .or_else(|| value.get("type"))
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .unwrap_or_default();

    let parameters: Params = value
        .get("parameters")
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
        .unwrap_or_default();

    let confidence = if is_no_match(&action_type) {
        0.0
    } else {
        value
            .get("confidence")
            .and_then(Value::as_f64)
            .map(|c| c as f32)
            .unwrap_or(DEFAULT_MODEL_CONFIDENCE)
            .clamp(0.0, 1.0)
    };

    Ok(Classification {
        action_type,
        parameters,
        confidence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_plain_reply() {
        let c = parse_classification(
            r#"{"action_type":"launch_app","parameters":{"app":"Excel","extra":null},"confidence":0.82}"#,
        )
        .unwrap();
        assert_eq!(c.action_type, "launch_app");
        assert_eq!(c.parameters.get("app"), Some(&json!("Excel")));
        assert!(!c.parameters.contains_key("extra"));
        assert!((c.confidence - 0.82).abs() < 1e-6);
    }

    #[test]
    fn test_parse_fenced_reply_without_confidence() {
        let c = parse_classification("```json\n{\"type\":\"search\",\"parameters\":{\"query\":\"cats\"}}\n```").unwrap();
        assert_eq!(c.action_type, "search");
        assert_eq!(c.confidence, DEFAULT_MODEL_CONFIDENCE);
    }

    #[test]
    fn test_none_action_has_zero_confidence() {
        let c = parse_classification(r#"{"action_type":"none","confidence":0.9}"#).unwrap();
        assert_eq!(c.confidence, 0.0);
    }

    #[test]
    fn test_malformed_reply_is_permanent() {
        let err = parse_classification("not json at all").unwrap_err();
        assert!(!err.is_transient());
        let converted: AssistantError = err.into();
        assert!(!converted.is_transient());
    }

    #[test]
    fn test_prompt_includes_context() {
        let request = crate::types::ActionRequest::new(
            "whatsapp_call",
            crate::types::params([("contact", "John")]),
            1.0,
            crate::types::SourceStage::Regex,
            "call John",
        );
        let turn = Arc::new(ConversationTurn::new("call John", vec![request]));
        let prompt = OllamaClassifier::build_prompt("message him", &[turn]);
        assert!(prompt.contains("call John"));
        assert!(prompt.ends_with("Command: message him\nJSON:"));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transient() {
        let classifier = OllamaClassifier::new(
            Some("http://127.0.0.1:9".to_string()),
            "test-model",
            Duration::from_millis(500),
        )
        .unwrap();
        let err = classifier.classify("open excel", &[]).await.unwrap_err();
        assert!(err.is_transient());
    }
}
