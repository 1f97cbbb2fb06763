//! Error types for spotbot-exchange.

use thiserror::Error;

/// Exchange error code for insufficient balance or a restricted pair.
pub const CODE_BALANCE_OR_RESTRICTION: i64 = -2010;
/// Exchange error code for a price/quantity filter violation.
pub const CODE_FILTER_VIOLATION: i64 = -1013;
/// Exchange error code for an invalid symbol.
pub const CODE_INVALID_SYMBOL: i64 = -1121;
/// Exchange error code for invalid or under-privileged API credentials.
pub const CODE_INVALID_CREDENTIALS: i64 = -2015;

/// Exchange error types.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("exchange rejected the request: {message} (code {code})")]
    Api { code: i64, message: String },

    #[error("failed to parse exchange response: {0}")]
    Parse(String),

    #[error("exchange data unavailable: {0}")]
    Unavailable(String),
}

impl ExchangeError {
    /// User-facing explanation for a known subset of exchange error codes;
    /// unmapped codes fall back to the raw message.
    pub fn user_facing_reason(&self) -> String {
        match self {
            Self::Api { code, message } => match *code {
                CODE_BALANCE_OR_RESTRICTION => {
                    "insufficient balance or the pair is restricted for trading".to_string()
                }
                CODE_FILTER_VIOLATION => {
                    "order violates the symbol's price/quantity limits".to_string()
                }
                CODE_INVALID_SYMBOL => "the trading pair is not valid".to_string(),
                CODE_INVALID_CREDENTIALS => {
                    "API credentials are invalid or lack trading permission".to_string()
                }
                _ => format!("{message} (code {code})"),
            },
            other => other.to_string(),
        }
    }

    /// Whether this error came back from the exchange as an order rejection
    /// rather than a transport or parsing failure.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Api { .. })
    }
}

/// Result type alias for exchange operations.
pub type ExchangeResult<T> = std::result::Result<T, ExchangeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes_are_mapped() {
        let err = ExchangeError::Api {
            code: CODE_BALANCE_OR_RESTRICTION,
            message: "Account has insufficient balance".to_string(),
        };
        assert!(err.user_facing_reason().contains("insufficient balance"));

        let err = ExchangeError::Api {
            code: CODE_INVALID_SYMBOL,
            message: "Invalid symbol.".to_string(),
        };
        assert!(err.user_facing_reason().contains("not valid"));
    }

    #[test]
    fn test_unknown_code_falls_back_to_message() {
        let err = ExchangeError::Api {
            code: -9999,
            message: "Something else".to_string(),
        };
        assert!(err.user_facing_reason().contains("Something else"));
        assert!(err.user_facing_reason().contains("-9999"));
    }
}
