//! Exchange REST access for the spotbot trading assistant.
//!
//! Provides the signed HTTP client, response models, the process-wide
//! exchange metadata cache (symbol filters + tradable set) and the
//! short-TTL ticker price cache shared by all conversations.

pub mod account;
pub mod client;
pub mod error;
pub mod metadata;
pub mod models;
pub mod ticker;

pub use account::{enrich_balances, AccountService, BalanceView};
pub use client::{OcoRequest, OrderRequest, RestClient};
pub use error::{ExchangeError, ExchangeResult};
pub use metadata::{MetadataCache, MetadataSnapshot};
pub use models::{
    AccountInfo, ApiErrorBody, ExchangeInfoResponse, OcoAck, OpenOrder, OrderAck, RawBalance,
    RawSymbolFilter, SymbolInfo, Ticker24h, TickerPrice, TradeRecord,
};
pub use ticker::TickerCache;
