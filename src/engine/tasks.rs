use std::collections::HashMap;

use async_trait::async_trait;
use image::RgbaImage;
use serde::{Deserialize, Serialize};

/// Parameters forwarded with an AI-composed multi-step task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskParams {
    pub allowed_actions: Vec<String>,
    pub require_confirmation: bool,
    pub max_steps: u32,
    pub pause_before: f64,
}

impl Default for TaskParams {
    fn default() -> Self {
        Self {
            allowed_actions: Vec::new(),
            require_confirmation: true,
            max_steps: 5,
            pause_before: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Success,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub status: TaskStatus,
    pub message: String,
}

/// External decomposer for natural-language multi-step tasks. The engine
/// hands over the substituted command plus the named context-region images
/// and treats the execution as opaque; the runner performs its own
/// sub-actions and reports a single outcome.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn execute(
        &self,
        rule_name: &str,
        command: &str,
        context_images: HashMap<String, RgbaImage>,
        params: TaskParams,
    ) -> TaskOutcome;
}
