//! Collaborator seams for the conversation state machine.
//!
//! The machine never talks to the exchange directly; it sees market data
//! and order execution through these traits, which keeps every flow
//! testable without a live transport or REST endpoint.

use crate::error::ChatResult;
use async_trait::async_trait;
use rust_decimal::Decimal;
use spotbot_core::{ExecutionReport, OrderSide, Price, Quantity, SymbolFilters};

/// One held asset offered in the sell flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Holding {
    pub asset: String,
    /// Free (unlocked) quantity.
    pub free: Quantity,
    /// Current price of the asset's valuation pair, zero when unknown.
    pub price: Price,
    /// Estimated quote value of the free quantity.
    pub quote_value: Decimal,
}

/// Market data and account lookups the flows depend on.
#[async_trait]
pub trait MarketService: Send + Sync {
    /// Refresh exchange metadata when stale. Failing with no usable
    /// snapshot surfaces as `ChatError::Stale`.
    async fn ensure_metadata(&self) -> ChatResult<()>;

    /// Whether the symbol is currently open for trading. An empty metadata
    /// cache validates nothing.
    fn is_tradable(&self, symbol: &str) -> bool;

    /// Trading constraints for the symbol.
    fn filters(&self, symbol: &str) -> Option<SymbolFilters>;

    /// Quote asset of the symbol.
    fn quote_asset(&self, symbol: &str) -> Option<String>;

    /// Current reference price.
    async fn price(&self, symbol: &str) -> ChatResult<Price>;

    /// Sellable holdings (non-stable, positive free balance), by value.
    async fn holdings(&self) -> ChatResult<Vec<Holding>>;

    /// Free balance of one asset.
    async fn free_balance(&self, asset: &str) -> ChatResult<Decimal>;
}

/// Order execution behind the confirmation step.
#[async_trait]
pub trait OrderService: Send + Sync {
    /// Submit the primary market order. A rejection surfaces as
    /// `ChatError::Rejection` carrying the user-facing explanation.
    async fn execute_market(
        &self,
        side: OrderSide,
        pair: &str,
        quantity: Quantity,
        filters: &SymbolFilters,
    ) -> ChatResult<ExecutionReport>;

    /// Attach protective order(s) for a filled primary order. Never fails:
    /// returns a status line to append to the success message, empty when
    /// no protection was requested.
    async fn attach_protection(
        &self,
        pair: &str,
        primary_side: OrderSide,
        executed_quantity: Quantity,
        stop_loss: Option<Price>,
        take_profit: Option<Price>,
        filters: &SymbolFilters,
    ) -> String;
}
