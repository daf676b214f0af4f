//! Assistant configuration
//!
//! Stored as TOML at `~/.deskpilot/config.toml`; a default file is written
//! on first load.

use crate::errors::{AssistantError, Result};
use crate::learning::default_store_path;
use crate::types::Params;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantConfig {
    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub resolution: ResolutionConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub learning: LearningConfig,

    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// User rules, checked before the built-in table
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Maximum retained turns
    pub capacity: usize,

    /// Turns older than this are ignored
    pub max_age_secs: Option<u64>,
}

impl MemoryConfig {
    /// `max_age_secs` as a duration
    pub fn max_age(&self) -> Result<Option<chrono::Duration>> {
        self.max_age_secs
            .map(|secs| {
                i64::try_from(secs)
                    .ok()
                    .and_then(chrono::Duration::try_seconds)
                    .ok_or_else(|| AssistantError::ConfigError(format!("memory.max_age_secs is out of range: {}", secs)))
            })
            .transpose()
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            capacity: 40,
            max_age_secs: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionConfig {
    /// Below this, the pipeline asks instead of acting
    pub confidence_threshold: f32,

    /// Turns of history sent to the classifier
    pub context_turns: usize,

    pub classifier_timeout_ms: u64,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            context_turns: 4,
            classifier_timeout_ms: 8000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Retries after the first attempt, transient failures only
    pub max_retries: u32,

    pub retry_base_delay_ms: u64,

    /// Per-attempt handler timeout
    pub handler_timeout_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_base_delay_ms: 250,
            handler_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    pub store_path: PathBuf,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub enabled: bool,

    /// Ollama-compatible base URL
    pub url: Option<String>,

    pub model: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: None,
            model: "qwen2.5:7b-instruct".to_string(),
        }
    }
}

/// User rule: phrase → action with fixed parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub trigger: String,
    pub action: String,
    #[serde(default)]
    pub params: Params,
}

impl AssistantConfig {
    /// Load from the default path, creating a default file if missing
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            let config = Self::default();
            config.save_to(&path)?;
            return Ok(config);
        }
        Self::load_from(&path)
    }

    /// Load from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let config: Self = fs::read_to_string(path)
            .context("Failed to read config file")
            .and_then(|contents| toml::from_str(&contents).context("Failed to parse config file"))
            .map_err(|e| AssistantError::ConfigError(format!("{}: {:#}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Write as TOML, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let write = || -> anyhow::Result<()> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).context("Failed to create config directory")?;
            }
            let toml_string = toml::to_string_pretty(self).context("Failed to serialize config")?;
            fs::write(path, toml_string).context("Failed to write config file")?;
            Ok(())
        };
        write().map_err(|e| AssistantError::ConfigError(format!("{:#}", e)))
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| AssistantError::ConfigError("Could not determine home directory".to_string()))?;
        Ok(home.join(".deskpilot").join("config.toml"))
    }

    /// Reject values that make the assistant unusable
    pub fn validate(&self) -> Result<()> {
        if self.memory.capacity == 0 {
            return Err(AssistantError::ConfigError("memory.capacity must be at least 1".to_string()));
        }
        self.memory.max_age()?;
        if !(0.0..=1.0).contains(&self.resolution.confidence_threshold) {
            return Err(AssistantError::ConfigError(format!(
                "resolution.confidence_threshold must be within 0..=1, got {}",
                self.resolution.confidence_threshold
            )));
        }
        if self.dispatch.handler_timeout_ms == 0 || self.resolution.classifier_timeout_ms == 0 {
            return Err(AssistantError::ConfigError("timeouts must be positive".to_string()));
        }
        if let Some(rule) = self
            .rules
            .iter()
            .find(|r| r.trigger.trim().is_empty() || r.action.trim().is_empty())
        {
            return Err(AssistantError::ConfigError(format!(
                "rule needs a trigger and an action (trigger='{}', action='{}')",
                rule.trigger, rule.action
            )));
        }
        Ok(())
    }
}
