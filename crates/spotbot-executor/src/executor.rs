//! Trade execution pipeline.
//!
//! Side-effect ordering is strict: the market order must fill before any
//! protective order is placed, and the protective quantity is re-snapped
//! from the *executed* quantity, which can differ from the requested one on
//! partial fills.

use crate::error::{ExecutorError, ExecutorResult};
use rust_decimal::Decimal;
use spotbot_core::{
    adjust_quantity, format_price_for_wire, format_quantity_for_wire, ClientOrderId,
    ExecutionReport, OrderSide, OrderType, Price, Quantity, SymbolFilters, TimeInForce,
};
use spotbot_exchange::{OcoRequest, OrderRequest, RestClient};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Which protective shape was attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectionKind {
    /// Combined conditional order: SL and TP legs, one cancels the other.
    Combined,
    /// Stop-loss limit only.
    StopLoss,
    /// Take-profit limit only.
    TakeProfit,
}

/// Outcome of the protection-attachment step.
///
/// Attachment never fails the trade: every branch, including exchange
/// rejections, is reported as a status appended to the primary order's
/// success message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtectionOutcome {
    /// Neither SL nor TP was requested.
    NotRequested,
    /// The primary order executed nothing, so there is nothing to protect.
    NothingExecuted,
    /// The executed quantity fell below the symbol minimum after
    /// re-adjustment; no protective order was placed.
    BelowMinimum {
        executed: Quantity,
        min_qty: Quantity,
    },
    /// Protective order accepted by the exchange.
    Placed(ProtectionKind),
    /// The exchange rejected the protective order. Non-fatal.
    Failed { kind: ProtectionKind, reason: String },
}

impl ProtectionOutcome {
    /// Human-readable status line appended to the execution summary.
    /// Empty when no protection was requested.
    pub fn summary(&self) -> String {
        match self {
            Self::NotRequested => String::new(),
            Self::NothingExecuted => "no quantity executed, protection skipped".to_string(),
            Self::BelowMinimum { executed, min_qty } => format!(
                "executed quantity {executed} is below the symbol minimum {min_qty}, protection skipped"
            ),
            Self::Placed(ProtectionKind::Combined) => {
                "combined SL/TP order placed".to_string()
            }
            Self::Placed(ProtectionKind::StopLoss) => "stop-loss order placed".to_string(),
            Self::Placed(ProtectionKind::TakeProfit) => "take-profit order placed".to_string(),
            Self::Failed { kind, reason } => {
                let what = match kind {
                    ProtectionKind::Combined => "combined SL/TP order",
                    ProtectionKind::StopLoss => "stop-loss order",
                    ProtectionKind::TakeProfit => "take-profit order",
                };
                format!("{what} failed: {reason}")
            }
        }
    }
}

/// Executes confirmed drafts against the exchange.
pub struct TradeExecutor {
    client: Arc<RestClient>,
}

impl TradeExecutor {
    pub fn new(client: Arc<RestClient>) -> Self {
        Self { client }
    }

    /// Submit the primary market order for an exact wire-formatted quantity.
    ///
    /// The quantity is re-validated in its formatted form immediately before
    /// submission, guarding against drift between adjustment and formatting.
    /// Submitted at most once; a rejection surfaces as an error.
    pub async fn execute_market_order(
        &self,
        side: OrderSide,
        pair: &str,
        quantity: Quantity,
        filters: &SymbolFilters,
    ) -> ExecutorResult<ExecutionReport> {
        let wire_quantity = format_quantity_for_wire(quantity, filters);
        let parsed: Decimal = wire_quantity
            .parse()
            .map_err(|e| ExecutorError::InvalidQuantity(format!("{wire_quantity}: {e}")))?;
        if parsed <= Decimal::ZERO {
            return Err(ExecutorError::InvalidQuantity(format!(
                "formatted quantity {wire_quantity} is not positive"
            )));
        }

        let mut request = OrderRequest::market(pair, side, wire_quantity);
        request.client_order_id = Some(ClientOrderId::new().to_string());

        let ack = self.client.place_order(&request).await?;
        let report = ack.to_report();
        info!(
            pair,
            order_id = report.order_id,
            status = %report.status,
            executed = %report.executed_quantity,
            avg_price = %report.average_fill_price(),
            "market order submitted"
        );
        Ok(report)
    }

    /// Attach protective order(s) for a filled primary order.
    ///
    /// No-op when no protection was requested or nothing executed. The
    /// executed quantity is re-adjusted through the symbol filters before
    /// use. Every failure mode is folded into the returned outcome; the
    /// caller's primary fill stands regardless.
    pub async fn attach_protection(
        &self,
        pair: &str,
        primary_side: OrderSide,
        executed_quantity: Quantity,
        stop_loss: Option<Price>,
        take_profit: Option<Price>,
        filters: &SymbolFilters,
    ) -> ProtectionOutcome {
        if stop_loss.is_none() && take_profit.is_none() {
            return ProtectionOutcome::NotRequested;
        }
        if !executed_quantity.is_positive() {
            return ProtectionOutcome::NothingExecuted;
        }

        let adjusted = adjust_quantity(executed_quantity, filters);
        if !adjusted.is_positive() {
            warn!(
                pair,
                executed = %executed_quantity,
                min_qty = %filters.min_qty,
                "executed quantity below minimum after re-adjustment, skipping protection"
            );
            return ProtectionOutcome::BelowMinimum {
                executed: executed_quantity,
                min_qty: filters.min_qty,
            };
        }

        let side = primary_side.opposite();
        let quantity = format_quantity_for_wire(adjusted, filters);

        let (kind, result) = match (stop_loss, take_profit) {
            (Some(sl), Some(tp)) => {
                let request = OcoRequest {
                    symbol: pair.to_string(),
                    side,
                    quantity,
                    price: format_price_for_wire(tp, filters),
                    stop_price: format_price_for_wire(sl, filters),
                    stop_limit_price: format_price_for_wire(sl, filters),
                    stop_limit_time_in_force: TimeInForce::GoodTilCancelled,
                };
                (
                    ProtectionKind::Combined,
                    self.client.place_oco_order(&request).await.map(|_| ()),
                )
            }
            (Some(sl), None) => {
                let request = OrderRequest {
                    symbol: pair.to_string(),
                    side,
                    order_type: OrderType::StopLossLimit,
                    quantity,
                    price: Some(format_price_for_wire(sl, filters)),
                    stop_price: Some(format_price_for_wire(sl, filters)),
                    time_in_force: Some(TimeInForce::GoodTilCancelled),
                    client_order_id: Some(ClientOrderId::new().to_string()),
                };
                (
                    ProtectionKind::StopLoss,
                    self.client.place_order(&request).await.map(|_| ()),
                )
            }
            (None, Some(tp)) => {
                let request = OrderRequest {
                    symbol: pair.to_string(),
                    side,
                    order_type: OrderType::TakeProfitLimit,
                    quantity,
                    price: Some(format_price_for_wire(tp, filters)),
                    stop_price: Some(format_price_for_wire(tp, filters)),
                    time_in_force: Some(TimeInForce::GoodTilCancelled),
                    client_order_id: Some(ClientOrderId::new().to_string()),
                };
                (
                    ProtectionKind::TakeProfit,
                    self.client.place_order(&request).await.map(|_| ()),
                )
            }
            (None, None) => unreachable!("checked above"),
        };

        match result {
            Ok(()) => {
                info!(pair, ?kind, "protective order placed");
                ProtectionOutcome::Placed(kind)
            }
            Err(err) => {
                error!(pair, ?kind, error = %err, "protective order rejected");
                ProtectionOutcome::Failed {
                    kind,
                    reason: err.user_facing_reason(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn executor() -> TradeExecutor {
        let client = Arc::new(RestClient::new("https://api.example.com", "k", "s").unwrap());
        TradeExecutor::new(client)
    }

    fn filters() -> SymbolFilters {
        SymbolFilters {
            step_size: Quantity::new(dec!(0.001)),
            min_qty: Quantity::new(dec!(0.01)),
            tick_size: Price::new(dec!(0.01)),
            ..Default::default()
        }
    }

    #[test]
    fn test_zero_quantity_rejected_before_submission() {
        let exec = executor();
        let err = tokio_test::block_on(exec.execute_market_order(
            OrderSide::Buy,
            "BTCUSDT",
            Quantity::ZERO,
            &filters(),
        ))
        .unwrap_err();
        assert!(matches!(err, ExecutorError::InvalidQuantity(_)));
    }

    #[test]
    fn test_attach_without_protection_is_noop() {
        let exec = executor();
        let outcome = tokio_test::block_on(exec.attach_protection(
            "BTCUSDT",
            OrderSide::Buy,
            Quantity::new(dec!(1)),
            None,
            None,
            &filters(),
        ));
        assert_eq!(outcome, ProtectionOutcome::NotRequested);
        assert!(outcome.summary().is_empty());
    }

    #[test]
    fn test_attach_with_nothing_executed_is_noop() {
        let exec = executor();
        let outcome = tokio_test::block_on(exec.attach_protection(
            "BTCUSDT",
            OrderSide::Buy,
            Quantity::ZERO,
            Some(Price::new(dec!(95))),
            None,
            &filters(),
        ));
        assert_eq!(outcome, ProtectionOutcome::NothingExecuted);
    }

    #[test]
    fn test_partial_fill_below_minimum_skips_protection() {
        // Partially filled at 0.0075: floors to 0.007 < minQty 0.01.
        let exec = executor();
        let outcome = tokio_test::block_on(exec.attach_protection(
            "BTCUSDT",
            OrderSide::Buy,
            Quantity::new(dec!(0.0075)),
            Some(Price::new(dec!(95))),
            Some(Price::new(dec!(103))),
            &filters(),
        ));
        assert!(matches!(outcome, ProtectionOutcome::BelowMinimum { .. }));
        assert!(outcome.summary().contains("below the symbol minimum"));
    }

    #[test]
    fn test_summaries() {
        assert!(ProtectionOutcome::Placed(ProtectionKind::Combined)
            .summary()
            .contains("combined"));
        let failed = ProtectionOutcome::Failed {
            kind: ProtectionKind::StopLoss,
            reason: "insufficient balance".to_string(),
        };
        assert!(failed.summary().contains("stop-loss order failed"));
    }
}
