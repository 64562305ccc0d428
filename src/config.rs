use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{VigilError, VigilResult};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub vision: VisionConfig,
    #[serde(default)]
    pub input: InputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisionConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Default model for vision queries; a condition may override per query.
    #[serde(default = "default_model")]
    pub model: String,
    /// Optional API key stored in config.toml (falls back to env var VIGIL_GEMINI_API_KEY).
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            model: default_model(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Abort all input simulation when the pointer sits in the top-left corner.
    #[serde(default = "default_true")]
    pub failsafe: bool,
    /// Seconds to pause before any action that does not specify its own pause.
    #[serde(default)]
    pub default_pause_before: f64,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            failsafe: true,
            default_pause_before: 0.0,
        }
    }
}

fn default_api_base() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_model() -> String {
    "gemini-1.5-flash-latest".to_string()
}

fn default_true() -> bool {
    true
}

impl VisionConfig {
    /// Key resolution order: env var VIGIL_GEMINI_API_KEY, then config.toml.
    pub fn resolve_api_key(&self) -> Option<String> {
        std::env::var("VIGIL_GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .or_else(|| self.api_key.clone().filter(|k| !k.is_empty()))
    }
}

fn resolve_config_path() -> VigilResult<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    Err(VigilError::Config(
        "config.toml not found next to executable or in working directory".into(),
    ))
}

pub fn load_config() -> VigilResult<AppConfig> {
    let path = resolve_config_path()?;
    let content = std::fs::read_to_string(&path)?;
    let config: AppConfig = toml::from_str(&content)?;
    tracing::info!(path = %path.display(), model = %config.vision.model, "config loaded");
    Ok(config)
}
