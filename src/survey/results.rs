//! Completed survey results, appended as JSON lines.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::session::Answers;

/// One finished survey.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyResult {
    pub id: Uuid,
    pub user_id: String,
    pub answers: Answers,
    /// Backend active when the survey finished.
    pub backend: String,
    pub completed_at: DateTime<Utc>,
}

impl SurveyResult {
    pub fn new(user_id: impl Into<String>, answers: Answers, backend: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            answers,
            backend: backend.into(),
            completed_at: Utc::now(),
        }
    }
}

/// Append-only result log. With no path configured, results are only traced.
#[derive(Debug, Default)]
pub struct ResultLog {
    path: Option<PathBuf>,
    write_lock: Mutex<()>,
}

impl ResultLog {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Record a result. Write failures are logged and never reach the user.
    pub async fn record(&self, result: &SurveyResult) {
        tracing::info!(
            result_id = %result.id,
            user_id = %result.user_id,
            backend = %result.backend,
            answers = result.answers.len(),
            "Survey completed"
        );

        let Some(path) = &self.path else {
            return;
        };
        if let Err(e) = self.append(path, result).await {
            tracing::warn!(path = %path.display(), result_id = %result.id, "Failed to record survey result: {e}");
        }
    }

    async fn append(&self, path: &Path, result: &SurveyResult) -> std::io::Result<()> {
        let mut line = serde_json::to_string(result)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }

    /// Read every recorded result back. Lines that fail to parse are skipped.
    pub async fn read_all(&self) -> std::io::Result<Vec<SurveyResult>> {
        let Some(path) = &self.path else {
            return Ok(vec![]);
        };
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e),
        };
        Ok(raw
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(result) => Some(result),
                Err(e) => {
                    tracing::warn!(path = %path.display(), "Skipping malformed result line: {e}");
                    None
                }
            })
            .collect())
    }
}
