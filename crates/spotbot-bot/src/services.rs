//! Live implementations of the conversation collaborator traits.
//!
//! Binds the chat engine's `MarketService`/`OrderService` seams to the
//! exchange caches and the trade executor. Exchange failures are folded
//! into the conversation error taxonomy here: data lookups become
//! retryable stale-data errors, order failures end the trade attempt.

use async_trait::async_trait;
use rust_decimal::Decimal;
use spotbot_chat::{ChatError, ChatResult, Holding, MarketService, OrderService};
use spotbot_core::{ExecutionReport, OrderSide, Price, Quantity, SymbolFilters};
use spotbot_exchange::{account::VALUATION_QUOTE, AccountService, MetadataCache, TickerCache};
use spotbot_executor::{ExecutorError, TradeExecutor};
use std::sync::Arc;

/// Market data and account lookups backed by the shared caches.
pub struct LiveMarket {
    metadata: Arc<MetadataCache>,
    tickers: Arc<TickerCache>,
    account: Arc<AccountService>,
}

impl LiveMarket {
    pub fn new(
        metadata: Arc<MetadataCache>,
        tickers: Arc<TickerCache>,
        account: Arc<AccountService>,
    ) -> Self {
        Self {
            metadata,
            tickers,
            account,
        }
    }
}

#[async_trait]
impl MarketService for LiveMarket {
    async fn ensure_metadata(&self) -> ChatResult<()> {
        self.metadata
            .ensure_fresh()
            .await
            .map_err(|e| ChatError::Stale(e.to_string()))
    }

    fn is_tradable(&self, symbol: &str) -> bool {
        self.metadata.is_tradable(symbol)
    }

    fn filters(&self, symbol: &str) -> Option<SymbolFilters> {
        self.metadata.filters(symbol)
    }

    fn quote_asset(&self, symbol: &str) -> Option<String> {
        self.metadata.quote_asset(symbol)
    }

    async fn price(&self, symbol: &str) -> ChatResult<Price> {
        self.tickers
            .price(symbol)
            .await
            .map_err(|e| ChatError::Stale(e.to_string()))
    }

    async fn holdings(&self) -> ChatResult<Vec<Holding>> {
        let balances = self
            .account
            .sellable_balances()
            .await
            .map_err(|e| ChatError::Stale(e.to_string()))?;
        Ok(balances
            .into_iter()
            .map(|b| {
                let price = self
                    .tickers
                    .cached_price(&format!("{}{VALUATION_QUOTE}", b.asset))
                    .unwrap_or(Price::ZERO);
                Holding {
                    asset: b.asset,
                    free: Quantity::new(b.free),
                    price,
                    quote_value: b.quote_value,
                }
            })
            .collect())
    }

    async fn free_balance(&self, asset: &str) -> ChatResult<Decimal> {
        self.account
            .free_balance(asset)
            .await
            .map_err(|e| ChatError::Stale(e.to_string()))
    }
}

/// Order execution backed by the trade executor.
pub struct LiveOrders {
    executor: TradeExecutor,
}

impl LiveOrders {
    pub fn new(executor: TradeExecutor) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl OrderService for LiveOrders {
    async fn execute_market(
        &self,
        side: OrderSide,
        pair: &str,
        quantity: Quantity,
        filters: &SymbolFilters,
    ) -> ChatResult<ExecutionReport> {
        self.executor
            .execute_market_order(side, pair, quantity, filters)
            .await
            .map_err(|e| match e {
                ExecutorError::Exchange(ex) if ex.is_rejection() => {
                    ChatError::Rejection(ex.user_facing_reason())
                }
                ExecutorError::Exchange(ex) => {
                    ChatError::Rejection(format!("submission failed: {ex}"))
                }
                ExecutorError::InvalidQuantity(msg) => ChatError::Internal(msg),
            })
    }

    async fn attach_protection(
        &self,
        pair: &str,
        primary_side: OrderSide,
        executed_quantity: Quantity,
        stop_loss: Option<Price>,
        take_profit: Option<Price>,
        filters: &SymbolFilters,
    ) -> String {
        self.executor
            .attach_protection(
                pair,
                primary_side,
                executed_quantity,
                stop_loss,
                take_profit,
                filters,
            )
            .await
            .summary()
    }
}
