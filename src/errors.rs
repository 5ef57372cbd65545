// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("Invalid task: {0}")]
    InvalidTask(String),

    #[error("Task already exists: {0}")]
    AlreadyExists(String),

    #[error("Concurrency limit exceeded: {active} active task(s), limit is {limit}")]
    AdmissionLimitExceeded { limit: usize, active: usize },

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Engine already started")]
    AlreadyStarted,

    #[error("Store error: {0:#}")]
    Store(anyhow::Error),

    #[error("Executor error: {0:#}")]
    Executor(anyhow::Error),

    #[error("Sync failed for {} task(s): {}", .0.len(), join_errors(.0))]
    Sync(Vec<SandboxError>),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn join_errors(errors: &[SandboxError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, SandboxError>;
