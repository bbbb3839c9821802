//! Engine-level errors. These abort the whole turn, unlike tool failures,
//! which are folded back into the conversation as data.

use thiserror::Error;

use agentry_context::ContextError;
use agentry_core::error::{ProviderError, StorageError};

use crate::turn::ToolCallOutcome;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("agent not found: {0}")]
    AgentNotFound(String),

    #[error("unsupported LLM provider: {0}")]
    UnknownProvider(String),

    #[error("LLM provider {0} is not available")]
    ProviderUnavailable(String),

    #[error("LLM request failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("unknown context strategy: {0}")]
    UnknownStrategy(String),

    #[error("failed to build context: {0}")]
    Context(#[from] ContextError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The turn kept requesting tools until the iteration bound was hit.
    /// Carries the per-call results accumulated so far as diagnostics; no
    /// partial answer is fabricated.
    #[error("exceeded maximum tool call iterations ({iterations})")]
    MaxIterationsExceeded {
        iterations: u32,
        tool_calls: Vec<ToolCallOutcome>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_iterations_display() {
        let err = EngineError::MaxIterationsExceeded {
            iterations: 5,
            tool_calls: vec![],
        };
        assert!(err.to_string().contains("5"));
    }

    #[test]
    fn provider_error_converts() {
        let err: EngineError = ProviderError::Network("connection refused".into()).into();
        assert!(err.to_string().contains("connection refused"));
    }
}
