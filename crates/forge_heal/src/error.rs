//! Error types for the healing loop.

use std::path::PathBuf;

use forge_retry::SchedulerError;
use thiserror::Error;

/// Result type alias for heal operations.
pub type HealResult<T> = Result<T, HealError>;

#[derive(Error, Debug)]
pub enum HealError {
    #[error("Repair declined: {0}")]
    RepairDeclined(String),

    #[error("Repair failed for {file}: {message}")]
    RepairFailed { file: String, message: String },

    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}
