//! Error types for spotbot-executor.

use thiserror::Error;

/// Executor error types.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("exchange error: {0}")]
    Exchange(#[from] spotbot_exchange::ExchangeError),

    #[error("invalid order quantity: {0}")]
    InvalidQuantity(String),
}

/// Result type alias for executor operations.
pub type ExecutorResult<T> = std::result::Result<T, ExecutorError>;
