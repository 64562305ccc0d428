use thiserror::Error;

#[derive(Debug, Error)]
pub enum VigilError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Profile error: {0}")]
    Profile(String),

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Analysis error: {0}")]
    Analysis(String),

    #[error("Vision provider error: {0}")]
    Vision(String),

    #[error("Executor error: {0}")]
    Executor(String),

    /// Operator moved the pointer into the abort corner. This is the one
    /// error that terminates the monitoring loop instead of being absorbed.
    #[error("Input fail-safe triggered: {0}")]
    FailSafe(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

pub type VigilResult<T> = Result<T, VigilError>;
