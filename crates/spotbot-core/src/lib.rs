//! Core domain types for the spotbot trading assistant.
//!
//! This crate provides fundamental types used throughout the system:
//! - `Price`, `Quantity`: Precision-safe numeric types
//! - `SymbolFilters`: Per-symbol trading constraints (tick/step/notional)
//! - `adjust_price`, `adjust_quantity`: the constraint adjustment engine
//! - `TradeDraft`: the accumulating state of one in-progress order
//! - `OrderSide`, `OrderType`, `OrderStatus`: trading enums

pub mod decimal;
pub mod draft;
pub mod error;
pub mod filters;
pub mod order;

pub use decimal::{Price, Quantity};
pub use draft::{tp_beats_sl, TradeDraft};
pub use error::{CoreError, Result};
pub use filters::{
    adjust_price, adjust_quantity, format_price_for_wire, format_quantity_for_wire, quote_to_base,
    wire_precision, SymbolFilters,
};
pub use order::{ClientOrderId, ExecutionReport, OrderSide, OrderStatus, OrderType, TimeInForce};
