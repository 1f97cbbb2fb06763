//! The in-progress, not-yet-submitted representation of a trade intent.

use crate::decimal::{Price, Quantity};
use crate::error::{CoreError, Result};
use crate::filters::SymbolFilters;
use crate::order::OrderSide;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The accumulating state of one in-progress order.
///
/// Created when the user initiates a buy or sell, mutated exclusively by
/// conversation-step handlers, and cleared on confirmation, cancellation,
/// restart, or any unhandled error during execution. Exactly one draft is
/// live per user and flow at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeDraft {
    pub side: OrderSide,
    pub pair: String,
    /// Quote-currency amount the user typed, when the flow started from one.
    pub requested_quote_amount: Option<Decimal>,
    /// Base quantity after constraint adjustment. Must be positive before
    /// the draft reaches confirmation.
    pub adjusted_base_quantity: Quantity,
    /// Stop-loss price, post-adjustment.
    pub stop_loss_price: Option<Price>,
    /// Take-profit price, post-adjustment.
    pub take_profit_price: Option<Price>,
    /// Price used for quote->base conversion and percentage calculations.
    pub reference_price_at_entry: Price,
}

impl TradeDraft {
    pub fn new(side: OrderSide, pair: impl Into<String>, reference_price: Price) -> Self {
        Self {
            side,
            pair: pair.into(),
            requested_quote_amount: None,
            adjusted_base_quantity: Quantity::ZERO,
            stop_loss_price: None,
            take_profit_price: None,
            reference_price_at_entry: reference_price,
        }
    }

    pub fn has_protection(&self) -> bool {
        self.stop_loss_price.is_some() || self.take_profit_price.is_some()
    }

    /// Estimated notional at the entry reference price.
    pub fn estimated_notional(&self) -> Decimal {
        self.adjusted_base_quantity
            .notional(self.reference_price_at_entry)
    }

    /// Whether the estimated notional satisfies the symbol's minimum, when
    /// that filter applies to market orders.
    pub fn meets_min_notional(&self, filters: &SymbolFilters) -> bool {
        if !filters.min_notional_applies() {
            return true;
        }
        self.estimated_notional() >= filters.min_notional
    }

    /// TP must be strictly better than SL in the trade's favorable
    /// direction: above it for a BUY, below it for a SELL. Holds trivially
    /// when either side is unset.
    pub fn protection_ordering_ok(&self) -> bool {
        match (self.stop_loss_price, self.take_profit_price) {
            (Some(sl), Some(tp)) => tp_beats_sl(self.side, tp, sl),
            _ => true,
        }
    }

    /// Invariants that must hold before the draft may be confirmed.
    pub fn ready_for_confirmation(&self) -> Result<()> {
        if !self.adjusted_base_quantity.is_positive() {
            return Err(CoreError::IncompleteDraft(
                "adjusted quantity is not positive".to_string(),
            ));
        }
        if !self.reference_price_at_entry.is_positive() {
            return Err(CoreError::IncompleteDraft(
                "reference price is not set".to_string(),
            ));
        }
        if !self.protection_ordering_ok() {
            return Err(CoreError::IncompleteDraft(
                "take-profit does not beat stop-loss".to_string(),
            ));
        }
        Ok(())
    }
}

/// Whether a take-profit candidate is strictly better than the stop-loss in
/// the trade's favorable direction.
pub fn tp_beats_sl(side: OrderSide, tp: Price, sl: Price) -> bool {
    match side {
        OrderSide::Buy => tp > sl,
        OrderSide::Sell => tp < sl,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn draft(side: OrderSide) -> TradeDraft {
        let mut d = TradeDraft::new(side, "BTCUSDT", Price::new(dec!(100)));
        d.adjusted_base_quantity = Quantity::new(dec!(1));
        d
    }

    #[test]
    fn test_buy_ordering() {
        let mut d = draft(OrderSide::Buy);
        d.stop_loss_price = Some(Price::new(dec!(95)));
        d.take_profit_price = Some(Price::new(dec!(103)));
        assert!(d.protection_ordering_ok());

        d.take_profit_price = Some(Price::new(dec!(94)));
        assert!(!d.protection_ordering_ok());
    }

    #[test]
    fn test_sell_ordering() {
        let mut d = draft(OrderSide::Sell);
        d.stop_loss_price = Some(Price::new(dec!(105)));
        d.take_profit_price = Some(Price::new(dec!(97)));
        assert!(d.protection_ordering_ok());

        d.take_profit_price = Some(Price::new(dec!(106)));
        assert!(!d.protection_ordering_ok());
    }

    #[test]
    fn test_one_sided_protection_is_ok() {
        let mut d = draft(OrderSide::Buy);
        d.stop_loss_price = Some(Price::new(dec!(95)));
        assert!(d.protection_ordering_ok());
        assert!(d.has_protection());
    }

    #[test]
    fn test_min_notional() {
        // $50 at 25000, stepSize 0.0001: qty 0.002 -> notional 50
        let mut d = TradeDraft::new(OrderSide::Buy, "BTCUSDT", Price::new(dec!(25000)));
        d.adjusted_base_quantity = Quantity::new(dec!(0.002));

        let mut f = SymbolFilters {
            min_notional: dec!(10),
            ..Default::default()
        };
        assert!(d.meets_min_notional(&f));

        f.min_notional = dec!(60);
        assert!(!d.meets_min_notional(&f));

        // The filter is ignored when it does not apply to market orders.
        f.apply_min_notional_to_market = false;
        assert!(d.meets_min_notional(&f));
    }

    #[test]
    fn test_ready_for_confirmation() {
        let mut d = TradeDraft::new(OrderSide::Buy, "BTCUSDT", Price::new(dec!(100)));
        assert!(d.ready_for_confirmation().is_err());

        d.adjusted_base_quantity = Quantity::new(dec!(0.5));
        assert!(d.ready_for_confirmation().is_ok());

        d.stop_loss_price = Some(Price::new(dec!(103)));
        d.take_profit_price = Some(Price::new(dec!(95)));
        assert!(d.ready_for_confirmation().is_err());
    }
}
