//! Error Types

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Classification of an LLM transport failure.
///
/// Decided by the transport when the request fails; the agent loop only
/// inspects the tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Provider throttled the request
    RateLimited,
    /// The request did not fit the model's context window
    ContextTooLong,
    /// The provider rejected the message list itself (e.g. a dangling tool-call id)
    MalformedHistory,
    /// Anything else (network, 5xx, auth, unparseable body)
    Other,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimited => write!(f, "rate limited"),
            Self::ContextTooLong => write!(f, "context too long"),
            Self::MalformedHistory => write!(f, "malformed history"),
            Self::Other => write!(f, "transport failure"),
        }
    }
}

/// Agent error types
#[derive(Error, Debug)]
pub enum AgentError {
    /// LLM transport failure, classified at the transport boundary
    #[error("LLM transport error ({kind}): {message}")]
    Transport {
        kind: TransportErrorKind,
        message: String,
    },

    /// Provider unavailable or not responding
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Tool not found in registry or on the tool server
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Tool validation failed
    #[error("Tool validation error: {0}")]
    ToolValidation(String),

    /// Tool execution failed
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// Parse error (e.g., tool call arguments)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl AgentError {
    /// Shorthand for a classified transport failure
    pub fn transport(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self::Transport {
            kind,
            message: message.into(),
        }
    }

    /// Transport classification, if this is a transport failure
    pub const fn transport_kind(&self) -> Option<TransportErrorKind> {
        match self {
            Self::Transport { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Whether the conversation history itself caused the failure.
    ///
    /// These are the errors that trigger a history reset and one retry.
    pub const fn is_history_fault(&self) -> bool {
        matches!(
            self.transport_kind(),
            Some(TransportErrorKind::ContextTooLong | TransportErrorKind::MalformedHistory)
        )
    }

    /// Check if error is retryable
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ProviderUnavailable(_)
                | Self::Transport {
                    kind: TransportErrorKind::RateLimited,
                    ..
                }
        )
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Transport { kind, .. } => match kind {
                TransportErrorKind::RateLimited => {
                    "The AI service is busy right now. Please wait a moment and try again.".into()
                }
                TransportErrorKind::ContextTooLong | TransportErrorKind::MalformedHistory => {
                    "The conversation could not be processed, even after resetting it. Please rephrase your request.".into()
                }
                TransportErrorKind::Other => "The AI service encountered an error. Please try again.".into(),
            },
            Self::ProviderUnavailable(_) => "The AI service is currently unavailable. Please try again.".into(),
            Self::ToolNotFound(name) => format!("The tool '{name}' is not available."),
            Self::ToolValidation(msg) => format!("Invalid tool input: {msg}"),
            Self::ToolExecution(msg) => format!("Tool error: {msg}"),
            Self::Config(_) => "The assistant is misconfigured. Please contact an administrator.".into(),
            _ => "An unexpected error occurred.".into(),
        }
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_faults() {
        assert!(AgentError::transport(TransportErrorKind::ContextTooLong, "x").is_history_fault());
        assert!(AgentError::transport(TransportErrorKind::MalformedHistory, "x").is_history_fault());
        assert!(!AgentError::transport(TransportErrorKind::RateLimited, "x").is_history_fault());
        assert!(!AgentError::ToolExecution("boom".into()).is_history_fault());
    }

    #[test]
    fn test_user_message_hides_details() {
        let err = AgentError::transport(TransportErrorKind::Other, "stack trace at line 42");
        assert!(!err.user_message().contains("line 42"));
        assert!(AgentError::transport(TransportErrorKind::RateLimited, "429").is_retryable());
    }
}
