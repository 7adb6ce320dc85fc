//! Append-only session outcome log
//!
//! The only on-disk persistence surface this crate owns: one JSON line per
//! terminated session, for post-hoc analysis. No session *state* survives a
//! restart — only this summary record.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

use crate::error::Result;

/// One line of the outcome log, written when a session reaches a terminal
/// event (`final`, `cancel`, or `error`).
#[derive(Debug, Clone, Serialize)]
pub struct SessionOutcome {
    pub session_id: String,
    pub goal: String,
    pub intent: String,
    pub success: bool,
    pub confidence: f64,
    pub total_steps: u32,
    pub strategy_switches: u32,
    pub duration_secs: f64,
    pub terminal_event: String,
    pub timestamp: f64,
}

/// Appends [`SessionOutcome`] records to a line-delimited JSON file.
pub struct OutcomeLog {
    path: PathBuf,
}

impl OutcomeLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        OutcomeLog { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, outcome: &SessionOutcome) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut line = serde_json::to_string(outcome)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> SessionOutcome {
        SessionOutcome {
            session_id: "s1".into(),
            goal: "count files".into(),
            intent: "direct_action".into(),
            success: true,
            confidence: 0.95,
            total_steps: 1,
            strategy_switches: 0,
            duration_secs: 0.5,
            terminal_event: "final".into(),
            timestamp: 0.0,
        }
    }

    #[tokio::test]
    async fn appends_one_line_per_outcome() {
        let dir = tempdir().unwrap();
        let log = OutcomeLog::new(dir.path().join("outcomes.jsonl"));
        log.append(&sample()).await.unwrap();
        log.append(&sample()).await.unwrap();

        let content = tokio::fs::read_to_string(log.path()).await.unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[tokio::test]
    async fn creates_parent_directory_if_missing() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("nested").join("outcomes.jsonl");
        let log = OutcomeLog::new(nested);
        log.append(&sample()).await.unwrap();
        assert!(log.path().exists());
    }
}
