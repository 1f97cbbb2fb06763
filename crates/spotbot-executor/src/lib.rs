//! Order execution and protection attachment for spotbot.
//!
//! Places the primary market order and, only when it filled with a nonzero
//! executed quantity, attaches protective stop-loss/take-profit orders.
//! Protection failures are non-fatal: the primary fill is never rolled back.

pub mod error;
pub mod executor;

pub use error::{ExecutorError, ExecutorResult};
pub use executor::{ProtectionKind, ProtectionOutcome, TradeExecutor};
