//! Per-symbol trading constraints and the constraint adjustment engine.
//!
//! Exchanges reject orders whose price or quantity do not lie exactly on the
//! tick/step grid or violate min/max bounds. `adjust_price` and
//! `adjust_quantity` are the single choke point producing wire-legal values.
//! Both round toward zero and clamp down, never up: an adjusted order must
//! not ask for more than the user requested.

use crate::decimal::{Price, Quantity};
use crate::error::{CoreError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Trading constraints for one symbol.
///
/// A `tick_size`/`step_size` of zero means "no grid constraint, only bounds
/// apply". A zero `max_price`/`max_qty` means unbounded. `min_price = 0` is a
/// real lower bound, not "absent".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolFilters {
    /// Price grid quantum.
    pub tick_size: Price,
    /// Lowest acceptable order price.
    pub min_price: Price,
    /// Highest acceptable order price (zero = unbounded).
    pub max_price: Price,
    /// Quantity grid quantum.
    pub step_size: Quantity,
    /// Smallest acceptable order quantity.
    pub min_qty: Quantity,
    /// Largest acceptable order quantity (zero = unbounded).
    pub max_qty: Quantity,
    /// Minimum price*quantity for an order to be accepted.
    pub min_notional: Decimal,
    /// Whether `min_notional` is enforced for market orders.
    pub apply_min_notional_to_market: bool,
}

impl Default for SymbolFilters {
    fn default() -> Self {
        Self {
            tick_size: Price::ZERO,
            min_price: Price::ZERO,
            max_price: Price::ZERO,
            step_size: Quantity::ZERO,
            min_qty: Quantity::ZERO,
            max_qty: Quantity::ZERO,
            min_notional: Decimal::ZERO,
            apply_min_notional_to_market: true,
        }
    }
}

impl SymbolFilters {
    /// Whether the minimum-notional check applies to a market order.
    pub fn min_notional_applies(&self) -> bool {
        self.apply_min_notional_to_market && self.min_notional > Decimal::ZERO
    }
}

/// Snap a price onto the symbol's legal grid and clamp it into bounds.
///
/// Floors to the tick grid (never rounds up, so a limit never overshoots the
/// intended level), then clamps into `[min_price, max_price]`. A strictly
/// positive input that flooring/clamping drove to zero or below comes back as
/// `min_price` when the symbol has a positive floor.
///
/// Pure function: same input and filters always produce the same output.
pub fn adjust_price(price: Price, filters: &SymbolFilters) -> Price {
    let mut adjusted = price.floor_to_tick(filters.tick_size);

    if adjusted < filters.min_price {
        adjusted = filters.min_price;
    }
    if filters.max_price.is_positive() && adjusted > filters.max_price {
        adjusted = filters.max_price;
    }

    // Floor must never annihilate a valid positive price.
    if price.is_positive() && !adjusted.is_positive() && filters.min_price.is_positive() {
        adjusted = filters.min_price;
    }

    adjusted
}

/// Snap a quantity onto the symbol's legal grid and clamp it into bounds.
///
/// Floors to the step grid. A result below `min_qty` returns **zero** rather
/// than being bumped up to the minimum: forcing the quantity up would spend
/// more than the user authorized, so "cannot satisfy minimum" is surfaced as
/// zero and handled by the caller. A result above `max_qty` clamps down.
///
/// Pure function: same input and filters always produce the same output.
pub fn adjust_quantity(quantity: Quantity, filters: &SymbolFilters) -> Quantity {
    let mut adjusted = quantity.floor_to_step(filters.step_size);

    if adjusted < filters.min_qty {
        return Quantity::ZERO;
    }
    if filters.max_qty.is_positive() && adjusted > filters.max_qty {
        adjusted = filters.max_qty;
    }

    adjusted
}

/// Convert a quote-currency amount into a raw base-asset quantity at the
/// given reference price.
///
/// The result has not been grid-snapped; callers pass it through
/// `adjust_quantity` before use. A zero post-adjustment quantity is a
/// user-facing validation failure, not a silent retry.
pub fn quote_to_base(quote_amount: Decimal, reference_price: Price) -> Result<Quantity> {
    if quote_amount <= Decimal::ZERO {
        return Err(CoreError::InvalidAmount(format!(
            "quote amount must be positive, got {quote_amount}"
        )));
    }
    if !reference_price.is_positive() {
        return Err(CoreError::InvalidPrice(format!(
            "reference price must be positive, got {reference_price}"
        )));
    }
    Ok(Quantity::new(quote_amount / reference_price.inner()))
}

/// Decimal precision implied by a grid quantum.
///
/// Counts the significant fractional digits of the quantum after stripping
/// trailing zeros: `0.010` has 2, `0.001` has 3, `1` has 0. A zero quantum
/// (no grid) defaults to 8.
pub fn wire_precision(grid: Decimal) -> u32 {
    if grid.is_zero() {
        return 8;
    }
    grid.normalize().scale()
}

/// Render a price for order submission at the symbol's tick precision.
pub fn format_price_for_wire(price: Price, filters: &SymbolFilters) -> String {
    format_at_precision(price.inner(), wire_precision(filters.tick_size.inner()))
}

/// Render a quantity for order submission at the symbol's step precision.
pub fn format_quantity_for_wire(quantity: Quantity, filters: &SymbolFilters) -> String {
    format_at_precision(
        quantity.inner(),
        wire_precision(filters.step_size.inner()),
    )
}

/// Fixed-point rendering, falling back to a normalized plain string if the
/// formatter ever produced exponential notation.
fn format_at_precision(value: Decimal, precision: u32) -> String {
    let fixed = format!("{value:.prec$}", prec = precision as usize);
    if fixed.contains(['e', 'E']) {
        return value.normalize().to_string();
    }
    fixed
}
