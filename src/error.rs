//! Error types for tempo.
//!
//! Domain failures are distinct recoverable variants; infrastructure
//! failures wrap their sources. Nothing here is fatal to the process;
//! the bulk-apply path in particular logs-and-skips per-item errors.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for planning operations
#[derive(Error, Debug)]
pub enum Error {
    // Missing referents
    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Epic not found: {0}")]
    EpicNotFound(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Sprint not found: {0}")]
    SprintNotFound(String),

    #[error("Dependency not found: {0}")]
    DependencyNotFound(String),

    #[error("Time entry not found: {0}")]
    TimeEntryNotFound(String),

    // Rejected transitions and edges
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid dependency edge: {0}")]
    InvalidEdge(String),

    // Caller input problems
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Infrastructure failures
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Lock acquisition failed: {0}")]
    LockFailed(PathBuf),
}

/// Result type alias for planning operations
pub type Result<T> = std::result::Result<T, Error>;
