//! Error types for Tycho.

use thiserror::Error;

/// Primary error type for all Tycho operations.
#[derive(Error, Debug)]
pub enum TychoError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection '{server}' failed: {message}")]
    Connectivity { server: String, message: String },

    #[error("Handshake with '{server}' failed: {message}")]
    Handshake { server: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Tool execution error: {tool_name} — {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool '{tool_name}' not permitted: {reason}")]
    NotPermitted { tool_name: String, reason: String },

    #[error("Message format error: {0}")]
    MessageFormat(String),

    #[error("Model error ({kind}): {message}")]
    Model { kind: ModelErrorKind, message: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),
}

/// Typed classification of model-runner failures.
///
/// The run loop never retries model calls itself; callers use the kind to
/// decide retry vs abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ModelErrorKind {
    RateLimited,
    Auth,
    MalformedRequest,
    Other,
}

/// Coarse error category, used for logging and failure-path decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Connectivity,
    ToolExecution,
    Confirmation,
    Format,
    Model,
    Timeout,
    State,
    Other,
}

impl TychoError {
    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Connectivity { .. } | Self::Handshake { .. } | Self::Io(_) => {
                ErrorCategory::Connectivity
            }
            Self::ToolExecution { .. } | Self::ToolNotFound(_) => ErrorCategory::ToolExecution,
            Self::NotPermitted { .. } => ErrorCategory::Confirmation,
            Self::MessageFormat(_) | Self::Serialization(_) => ErrorCategory::Format,
            Self::Model { .. } => ErrorCategory::Model,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::InvalidState(_) | Self::SessionNotFound(_) => ErrorCategory::State,
            _ => ErrorCategory::Other,
        }
    }

    /// Whether this failure should surface to the model as a tool-result
    /// error payload instead of ending the run.
    pub fn is_tool_result_error(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::ToolExecution
                | ErrorCategory::Confirmation
                | ErrorCategory::Timeout
                | ErrorCategory::Connectivity
        )
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, TychoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_cover_the_taxonomy() {
        let err = TychoError::Connectivity {
            server: "calc".into(),
            message: "spawn failed".into(),
        };
        assert_eq!(err.category(), ErrorCategory::Connectivity);

        let err = TychoError::NotPermitted {
            tool_name: "add".into(),
            reason: "denied".into(),
        };
        assert_eq!(err.category(), ErrorCategory::Confirmation);

        let err = TychoError::MessageFormat("bad arguments".into());
        assert_eq!(err.category(), ErrorCategory::Format);

        let err = TychoError::Timeout(250);
        assert_eq!(err.category(), ErrorCategory::Timeout);
    }

    #[test]
    fn tool_result_errors_continue_the_loop() {
        assert!(TychoError::Timeout(10).is_tool_result_error());
        assert!(TychoError::ToolExecution {
            tool_name: "add".into(),
            message: "boom".into(),
        }
        .is_tool_result_error());
        assert!(!TychoError::MessageFormat("nope".into()).is_tool_result_error());
        assert!(!TychoError::InvalidState("busy".into()).is_tool_result_error());
    }

    #[test]
    fn model_error_kind_display_is_snake_case() {
        assert_eq!(ModelErrorKind::RateLimited.to_string(), "rate_limited");
        assert_eq!(
            ModelErrorKind::MalformedRequest.to_string(),
            "malformed_request"
        );
    }
}
