use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::errors::VigilResult;

/// One dispatched-rule record: which rule fired, what was sent where.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleEvent {
    pub ts: chrono::DateTime<chrono::Utc>,
    pub rule: String,
    pub action: String,
    pub detail: Option<String>,
}

/// Append-only JSONL record of rule firings, one file per engine session.
pub struct RuleEventLog {
    pub session_id: String,
    entries: Vec<RuleEvent>,
    file_path: std::path::PathBuf,
}

impl RuleEventLog {
    pub fn new() -> Self {
        let session_id = uuid::Uuid::new_v4().to_string();
        let file_path = sessions_dir().join(format!("session_{session_id}.jsonl"));
        Self {
            session_id,
            entries: Vec::new(),
            file_path,
        }
    }

    pub fn push(&mut self, rule: &str, action: &str, detail: Option<String>) {
        self.entries.push(RuleEvent {
            ts: chrono::Utc::now(),
            rule: rule.to_string(),
            action: action.to_string(),
            detail,
        });
        if let Err(e) = self.flush() {
            tracing::warn!(error = %e, "rule event flush failed");
        }
    }

    /// Append the latest entry to the JSONL file.
    fn flush(&self) -> VigilResult<()> {
        if let Some(last) = self.entries.last() {
            if let Some(parent) = self.file_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let line = serde_json::to_string(last)?;
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.file_path)?;
            writeln!(file, "{line}")?;
        }
        Ok(())
    }
}

impl Default for RuleEventLog {
    fn default() -> Self {
        Self::new()
    }
}

/// `~/.local/share/vigil/sessions` (platform equivalent), falling back to
/// the working directory.
fn sessions_dir() -> std::path::PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("vigil").join("sessions"))
        .unwrap_or_else(|| std::path::PathBuf::from("."))
}
