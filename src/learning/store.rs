//! Persistent store for learned tasks
//!
//! Keyed by the case-insensitive task name. The engine owns the
//! authoritative map and hands the store a full snapshot on every change;
//! the file is replaced through a temporary sibling and a rename, so a
//! concurrent `load_all` sees either the old or the new contents.

use crate::learning::task::LearnedTask;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Keyed storage capability for learned tasks
pub trait TaskStore: Send + Sync {
    /// Every stored task by key
    fn load_all(&self) -> Result<BTreeMap<String, LearnedTask>>;

    /// Replace the stored contents with `tasks`
    fn save_all(&self, tasks: &BTreeMap<String, LearnedTask>) -> Result<()>;
}

/// Default location of the task file
pub fn default_store_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".deskpilot")
        .join("learned_tasks.json")
}

/// Single JSON document holding every task
#[derive(Debug, Clone)]
pub struct JsonTaskStore {
    path: PathBuf,
}

impl JsonTaskStore {
    /// Create store; the parent directory is created if missing
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).context("Failed to create task storage directory")?;
            }
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TaskStore for JsonTaskStore {
    fn load_all(&self) -> Result<BTreeMap<String, LearnedTask>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let json = fs::read_to_string(&self.path).context("Failed to read learned task file")?;
        if json.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        let tasks = serde_json::from_str(&json).context("Failed to deserialize learned tasks")?;
        Ok(tasks)
    }

    fn save_all(&self, tasks: &BTreeMap<String, LearnedTask>) -> Result<()> {
        let json = serde_json::to_string_pretty(tasks).context("Failed to serialize learned tasks")?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).context("Failed to write learned task file")?;
        fs::rename(&tmp, &self.path).context("Failed to replace learned task file")?;
        Ok(())
    }
}

/// Volatile store for tests and `--no-persist` runs
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    tasks: Mutex<BTreeMap<String, LearnedTask>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, LearnedTask>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TaskStore for MemoryTaskStore {
    fn load_all(&self) -> Result<BTreeMap<String, LearnedTask>> {
        Ok(self.guard().clone())
    }

    fn save_all(&self, tasks: &BTreeMap<String, LearnedTask>) -> Result<()> {
        *self.guard() = tasks.clone();
        Ok(())
    }
}
