use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VisionStatus {
    Success,
    /// The provider refused the prompt or cut the response short.
    Blocked,
    Error,
}

/// Outcome of one vision-model query.
///
/// `structured` is the response text re-parsed as JSON (after stripping
/// Markdown code fences) when that succeeds; conditions that address the
/// response by dot-path consume it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionResponse {
    pub status: VisionStatus,
    pub text: Option<String>,
    pub structured: Option<serde_json::Value>,
    pub error: Option<String>,
    pub model_used: String,
    pub latency_ms: u64,
}

impl VisionResponse {
    pub fn error(model: &str, message: impl Into<String>) -> Self {
        Self {
            status: VisionStatus::Error,
            text: None,
            structured: None,
            error: Some(message.into()),
            model_used: model.to_string(),
            latency_ms: 0,
        }
    }
}

/// Strip a leading/trailing Markdown code fence so `{"found": true}` inside
/// ```json blocks still parses.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open.strip_suffix("```").unwrap_or(without_open).trim()
}

pub fn parse_structured(text: &str) -> Option<serde_json::Value> {
    serde_json::from_str(strip_code_fences(text)).ok()
}
