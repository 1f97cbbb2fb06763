//! Error types for the conversation layer.
//!
//! User input problems are not errors here: they become re-prompt replies.
//! These variants cover the collaborator failures the flow must react to.

use thiserror::Error;

/// Conversation-layer error types.
#[derive(Debug, Clone, Error)]
pub enum ChatError {
    /// Metadata or price data is unavailable; the step can be retried later.
    #[error("{0}")]
    Stale(String),

    /// The exchange rejected an order; the current trade attempt ends.
    #[error("{0}")]
    Rejection(String),

    /// A required draft field was missing at a step that assumes it was set
    /// earlier. Defensive backstop: clears the flow.
    #[error("internal state error: {0}")]
    Internal(String),
}

/// Result type alias for conversation operations.
pub type ChatResult<T> = std::result::Result<T, ChatError>;
