//! Engine-level error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::git::GitError;

/// Top-level engine error.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Git error: {0}")]
    Git(#[from] GitError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Watch error: {0}")]
    Watch(String),

    #[error("Repository is already open: {0}")]
    AlreadyOpen(PathBuf),

    #[error("Repository is not open: {0}")]
    NotOpen(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration loading errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
