//! Domain-specific error types for ttp-quiz

use thiserror::Error;

use crate::clients::AgentError;

/// Main error type for the question generation pipeline
#[derive(Error, Debug)]
pub enum QuizError {
    /// The supplied record is not a structured value the classifier can work with
    #[error("Input shape error: {message}")]
    InputShape { message: String },

    /// The generation service call did not complete successfully
    #[error("Generation failure: {message}")]
    Generation { message: String },

    /// The service reply could not be reduced to a valid question payload
    #[error("Parse failure: {message}")]
    Parse { message: String },

    #[error("Timeout error: {operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl QuizError {
    pub fn parse(message: impl Into<String>) -> Self {
        QuizError::Parse {
            message: message.into(),
        }
    }

    pub fn input_shape(message: impl Into<String>) -> Self {
        QuizError::InputShape {
            message: message.into(),
        }
    }

    /// True for failures that originate at the generation service boundary
    pub fn is_generation(&self) -> bool {
        matches!(
            self,
            QuizError::Generation { .. } | QuizError::Timeout { .. }
        )
    }
}

impl From<serde_json::Error> for QuizError {
    fn from(err: serde_json::Error) -> Self {
        QuizError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<AgentError> for QuizError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Timeout { timeout_ms } => QuizError::Timeout {
                operation: "completion request".to_string(),
                timeout_ms,
            },
            other => QuizError::Generation {
                message: other.to_string(),
            },
        }
    }
}

/// Result type alias for ttp-quiz operations
pub type Result<T> = std::result::Result<T, QuizError>;
