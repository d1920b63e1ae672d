//! Error Handling
//!
//! Unified error types for the service.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-wide error type.
///
/// The variants mirror the failure categories surfaced at the API boundary:
/// `InvalidInput`, `NotFound` and `Conflict` map to 4xx responses, while
/// upstream and deadline failures are recovered inside a turn and only
/// reach the caller when there is no heuristic path left to degrade to.
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed scenario or request body
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unknown session, scenario, or node id
    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate session start or conflicting state change
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A per-turn SLA expired before the stage produced a result
    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// LLM or retrieval backend unreachable or misbehaving
    #[error("Upstream unavailable: {0}")]
    Upstream(String),

    /// Turn superseded by a newer one; silent by design
    #[error("Cancelled")]
    Cancelled,

    /// Configuration errors (process exits with code 2)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Fatal storage errors (process exits with code 3)
    #[error("Storage error: {0}")]
    Storage(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create a deadline exceeded error
    pub fn deadline(msg: impl Into<String>) -> Self {
        Self::DeadlineExceeded(msg.into())
    }

    /// Create an upstream error
    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::Upstream(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Machine-readable error kind, used in API responses and logs
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidInput(_) => "invalid_input",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::DeadlineExceeded(_) => "deadline_exceeded",
            AppError::Upstream(_) => "upstream_unavailable",
            AppError::Cancelled => "cancelled",
            AppError::Config(_) => "invalid_config",
            AppError::Storage(_) => "fatal",
            AppError::Io(_) => "io",
            AppError::Serialization(_) => "serialization",
            AppError::Internal(_) => "internal",
        }
    }
}
