//! Utterance acquisition
//!
//! Speech and text input are external; the core only sees a restartable
//! stream of timestamped strings. A timeout or empty read is reported as
//! `NoUtterance`, never as a dispatch failure.

use crate::errors::{AssistantError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

/// One unit of raw input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utterance {
    pub text: String,
    pub received_at: DateTime<Utc>,
}

impl Utterance {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            received_at: Utc::now(),
        }
    }
}

/// Result of one acquisition attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquired {
    Utterance(Utterance),
    /// Nothing usable this time (timeout, silence, blank line)
    NoUtterance,
    /// Source exhausted
    Closed,
}

/// Producer of utterances
///
/// Errors are reserved for the source becoming unusable (device lost,
/// read failure) and are mapped to `AssistantError::Acquisition`.
#[async_trait]
pub trait UtteranceSource: Send {
    async fn next(&mut self) -> Result<Acquired>;
}

/// Fixed list of utterances, optionally spaced out in time
#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    lines: VecDeque<String>,
    delay: Option<Duration>,
}

impl ScriptedSource {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            delay: None,
        }
    }

    /// Wait `delay` before yielding each line
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// One utterance per non-comment line of a script file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| AssistantError::Acquisition(format!("Failed to read script {}: {}", path.display(), e)))?;
        Ok(Self::new(
            contents
                .lines()
                .filter(|line| !line.trim_start().starts_with('#'))
                .map(str::to_string),
        ))
    }

    pub fn remaining(&self) -> usize {
        self.lines.len()
    }
}

#[async_trait]
impl UtteranceSource for ScriptedSource {
    async fn next(&mut self) -> Result<Acquired> {
        let Some(line) = self.lines.pop_front() else {
            return Ok(Acquired::Closed);
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(to_acquired(line))
    }
}

/// Line-oriented text input from stdin
pub struct StdinSource {
    lines: Lines<BufReader<Stdin>>,
}

impl StdinSource {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

impl Default for StdinSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UtteranceSource for StdinSource {
    async fn next(&mut self) -> Result<Acquired> {
        match self.lines.next_line().await {
            Ok(Some(line)) => Ok(to_acquired(line)),
            Ok(None) => Ok(Acquired::Closed),
            Err(e) => Err(AssistantError::Acquisition(format!("stdin read failed: {}", e))),
        }
    }
}

fn to_acquired(line: String) -> Acquired {
    if line.trim().is_empty() {
        Acquired::NoUtterance
    } else {
        Acquired::Utterance(Utterance::new(line.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_scripted_source_order() {
        let mut source = ScriptedSource::new(["open excel", "   ", "close excel"]);
        let first = source.next().await.unwrap();
        assert!(matches!(first, Acquired::Utterance(ref u) if u.text == "open excel"));
        assert_eq!(source.next().await.unwrap(), Acquired::NoUtterance);
        assert!(matches!(source.next().await.unwrap(), Acquired::Utterance(_)));
        assert_eq!(source.next().await.unwrap(), Acquired::Closed);
        assert_eq!(source.next().await.unwrap(), Acquired::Closed);
    }

    #[test]
    fn test_script_file_skips_comments() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "# morning\nopen excel\nmute\n").unwrap();
        let source = ScriptedSource::from_file(file.path()).unwrap();
        assert_eq!(source.remaining(), 2);
    }

    #[test]
    fn test_missing_script_is_acquisition_error() {
        let err = ScriptedSource::from_file(Path::new("/nonexistent/deskpilot.script")).unwrap_err();
        assert!(matches!(err, AssistantError::Acquisition(_)));
    }
}
