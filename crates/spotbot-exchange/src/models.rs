//! Wire models for the exchange REST API.
//!
//! Field names follow the exchange's camelCase JSON; numeric fields arrive
//! as strings and are deserialized straight into `Decimal`.

use rust_decimal::Decimal;
use serde::Deserialize;
use spotbot_core::{ExecutionReport, OrderStatus, Price, Quantity, SymbolFilters};

/// Error body returned alongside non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub code: i64,
    pub msg: String,
}

/// Top-level exchange info response.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeInfoResponse {
    pub symbols: Vec<SymbolInfo>,
}

/// Per-symbol metadata from exchange info.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfo {
    pub symbol: String,
    pub status: String,
    pub base_asset: String,
    pub quote_asset: String,
    #[serde(default)]
    pub filters: Vec<RawSymbolFilter>,
}

impl SymbolInfo {
    /// Whether the symbol is currently open for trading.
    pub fn is_trading(&self) -> bool {
        self.status == "TRADING"
    }

    /// Collapse the filter list into the constraint set used by the
    /// adjustment engine. Unknown filter types are ignored.
    pub fn to_filters(&self) -> SymbolFilters {
        let mut filters = SymbolFilters::default();
        for f in &self.filters {
            match f {
                RawSymbolFilter::PriceFilter {
                    min_price,
                    max_price,
                    tick_size,
                } => {
                    filters.min_price = Price::new(*min_price);
                    filters.max_price = Price::new(*max_price);
                    filters.tick_size = Price::new(*tick_size);
                }
                RawSymbolFilter::LotSize {
                    min_qty,
                    max_qty,
                    step_size,
                } => {
                    filters.min_qty = Quantity::new(*min_qty);
                    filters.max_qty = Quantity::new(*max_qty);
                    filters.step_size = Quantity::new(*step_size);
                }
                RawSymbolFilter::MinNotional {
                    min_notional,
                    apply_to_market,
                } => {
                    filters.min_notional = *min_notional;
                    filters.apply_min_notional_to_market = *apply_to_market;
                }
                RawSymbolFilter::Notional {
                    min_notional,
                    apply_min_to_market,
                } => {
                    filters.min_notional = *min_notional;
                    filters.apply_min_notional_to_market = *apply_min_to_market;
                }
                RawSymbolFilter::Other => {}
            }
        }
        filters
    }
}

/// One entry of a symbol's `filters` array, tagged by `filterType`.
///
/// The exchange has shipped the minimum-notional constraint under two
/// names (`MIN_NOTIONAL` and `NOTIONAL`); both are accepted.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "filterType")]
pub enum RawSymbolFilter {
    #[serde(rename = "PRICE_FILTER", rename_all = "camelCase")]
    PriceFilter {
        min_price: Decimal,
        max_price: Decimal,
        tick_size: Decimal,
    },
    #[serde(rename = "LOT_SIZE", rename_all = "camelCase")]
    LotSize {
        min_qty: Decimal,
        max_qty: Decimal,
        step_size: Decimal,
    },
    #[serde(rename = "MIN_NOTIONAL", rename_all = "camelCase")]
    MinNotional {
        min_notional: Decimal,
        #[serde(default = "default_apply_to_market")]
        apply_to_market: bool,
    },
    #[serde(rename = "NOTIONAL", rename_all = "camelCase")]
    Notional {
        min_notional: Decimal,
        #[serde(default = "default_apply_to_market")]
        apply_min_to_market: bool,
    },
    #[serde(other)]
    Other,
}

fn default_apply_to_market() -> bool {
    true
}

/// Current ticker price, single symbol or one element of the bulk list.
#[derive(Debug, Clone, Deserialize)]
pub struct TickerPrice {
    pub symbol: String,
    pub price: Decimal,
}

/// 24-hour rolling statistics for a symbol.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticker24h {
    pub symbol: String,
    pub price_change_percent: Decimal,
    pub last_price: Decimal,
}

/// Account snapshot.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountInfo {
    #[serde(default)]
    pub balances: Vec<RawBalance>,
}

/// One asset balance as reported by the exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct RawBalance {
    pub asset: String,
    pub free: Decimal,
    pub locked: Decimal,
}

/// Acknowledgement of a newly placed or cancelled order.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderAck {
    pub symbol: String,
    pub order_id: u64,
    #[serde(default)]
    pub client_order_id: Option<String>,
    pub status: OrderStatus,
    #[serde(default)]
    pub executed_qty: Decimal,
    #[serde(default)]
    pub cummulative_quote_qty: Decimal,
    #[serde(default)]
    pub transact_time: Option<i64>,
}

impl OrderAck {
    /// Convert to the execution report consumed by protection attachment.
    pub fn to_report(&self) -> ExecutionReport {
        ExecutionReport {
            order_id: self.order_id,
            status: self.status,
            executed_quantity: Quantity::new(self.executed_qty),
            cumulative_quote: self.cummulative_quote_qty,
        }
    }
}

/// Acknowledgement of a combined conditional (one-cancels-other) order.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcoAck {
    pub order_list_id: i64,
    #[serde(default)]
    pub list_order_status: Option<String>,
}

/// One open order from the open-orders listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenOrder {
    pub symbol: String,
    pub order_id: u64,
    pub side: String,
    #[serde(rename = "type")]
    pub order_type: String,
    pub price: Decimal,
    pub orig_qty: Decimal,
    #[serde(default)]
    pub executed_qty: Decimal,
    pub status: OrderStatus,
    #[serde(default)]
    pub stop_price: Option<Decimal>,
    #[serde(default)]
    pub time: Option<i64>,
}

/// One fill from the my-trades history.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRecord {
    pub id: u64,
    pub symbol: String,
    pub price: Decimal,
    pub qty: Decimal,
    pub quote_qty: Decimal,
    pub commission: Decimal,
    pub commission_asset: String,
    pub time: i64,
    pub is_buyer: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_symbol_info_to_filters() {
        let json = r#"{
            "symbol": "BTCUSDT",
            "status": "TRADING",
            "baseAsset": "BTC",
            "quoteAsset": "USDT",
            "filters": [
                {"filterType": "PRICE_FILTER", "minPrice": "0.01", "maxPrice": "1000000.00", "tickSize": "0.01"},
                {"filterType": "LOT_SIZE", "minQty": "0.00001", "maxQty": "9000.0", "stepSize": "0.00001"},
                {"filterType": "MIN_NOTIONAL", "minNotional": "10.0", "applyToMarket": true},
                {"filterType": "PERCENT_PRICE", "multiplierUp": "5", "multiplierDown": "0.2"}
            ]
        }"#;
        let info: SymbolInfo = serde_json::from_str(json).unwrap();
        assert!(info.is_trading());
        assert_eq!(info.quote_asset, "USDT");

        let filters = info.to_filters();
        assert_eq!(filters.tick_size.inner(), dec!(0.01));
        assert_eq!(filters.step_size.inner(), dec!(0.00001));
        assert_eq!(filters.min_notional, dec!(10.0));
        assert!(filters.apply_min_notional_to_market);
    }

    #[test]
    fn test_notional_filter_variant() {
        let json = r#"{
            "symbol": "ETHUSDT",
            "status": "TRADING",
            "baseAsset": "ETH",
            "quoteAsset": "USDT",
            "filters": [
                {"filterType": "NOTIONAL", "minNotional": "5.0", "applyMinToMarket": false}
            ]
        }"#;
        let info: SymbolInfo = serde_json::from_str(json).unwrap();
        let filters = info.to_filters();
        assert_eq!(filters.min_notional, dec!(5.0));
        assert!(!filters.apply_min_notional_to_market);
    }

    #[test]
    fn test_order_ack_to_report() {
        let json = r#"{
            "symbol": "BTCUSDT",
            "orderId": 123456,
            "clientOrderId": "spot_1_abc",
            "status": "FILLED",
            "executedQty": "0.002",
            "cummulativeQuoteQty": "50.0",
            "transactTime": 1700000000000
        }"#;
        let ack: OrderAck = serde_json::from_str(json).unwrap();
        let report = ack.to_report();
        assert!(report.status.is_filled());
        assert_eq!(report.executed_quantity.inner(), dec!(0.002));
        assert_eq!(report.average_fill_price().inner(), dec!(25000));
    }

    #[test]
    fn test_api_error_body() {
        let body: ApiErrorBody =
            serde_json::from_str(r#"{"code": -1013, "msg": "Filter failure: LOT_SIZE"}"#).unwrap();
        assert_eq!(body.code, -1013);
    }
}
