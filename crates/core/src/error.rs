//! Error types for the Agentry domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error type; tool outcomes additionally
//! carry a machine-readable [`ErrorCode`] on the wire.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-readable outcome codes attached to failed tool results.
///
/// These travel on the wire inside a `ToolResult` and are also what the
/// orchestrator feeds back to the model, so their serialized form is stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ToolNotFound,
    ToolUnavailable,
    ValidationError,
    Timeout,
    Panic,
    NilResult,
    Cancelled,
    ExecutionError,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ToolNotFound => "TOOL_NOT_FOUND",
            Self::ToolUnavailable => "TOOL_UNAVAILABLE",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::Panic => "PANIC",
            Self::NilResult => "NIL_RESULT",
            Self::Cancelled => "CANCELLED",
            Self::ExecutionError => "EXECUTION_ERROR",
        };
        write!(f, "{s}")
    }
}

/// A parameter validation failure, scoped to the offending parameter.
#[derive(Debug, Clone, Error)]
#[error("validation error for parameter '{parameter}': {message}")]
pub struct ValidationError {
    /// Which parameter failed validation.
    pub parameter: String,

    /// Human-readable description of the violation.
    pub message: String,

    /// The offending value, if one was supplied.
    pub value: Option<serde_json::Value>,
}

impl ValidationError {
    pub fn new(
        parameter: impl Into<String>,
        message: impl Into<String>,
        value: Option<serde_json::Value>,
    ) -> Self {
        Self {
            parameter: parameter.into(),
            message: message.into(),
            value,
        }
    }
}

/// Errors from tool registry mutation.
///
/// The registry is populated once at startup; these only surface during
/// wiring, never on the request path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("tool name cannot be empty")]
    EmptyToolName,

    #[error("tool already exists: {0}")]
    ToolAlreadyExists(String),
}

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("provider not configured: {0}")]
    NotConfigured(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0} not found")]
    NotFound(String),
}
