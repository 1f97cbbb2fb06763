//! Account balance views.
//!
//! Raw balances are enriched with an estimated quote value via the ticker
//! cache so the sell flow and balance browsing can rank holdings and the
//! buy flow can show available spending power.

use crate::client::RestClient;
use crate::error::ExchangeResult;
use crate::models::RawBalance;
use crate::ticker::TickerCache;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use spotbot_core::Price;
use std::sync::Arc;

/// Quote currency used for valuation.
pub const VALUATION_QUOTE: &str = "USDT";

/// Stablecoins excluded from the sellable-asset listing.
pub const STABLE_ASSETS: [&str; 5] = ["USDT", "BUSD", "USDC", "DAI", "TUSD"];

/// Assets always shown even below the significance threshold.
const MAJOR_ASSETS: [&str; 5] = ["USDT", "BUSD", "BTC", "ETH", "BNB"];

/// Minimum estimated value (in quote units) for a balance to be listed.
const MIN_SIGNIFICANT_VALUE: Decimal = dec!(1);

/// One asset balance with an estimated quote value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceView {
    pub asset: String,
    pub free: Decimal,
    pub locked: Decimal,
    /// Estimated value of free+locked in the valuation quote; zero when no
    /// price was available.
    pub quote_value: Decimal,
}

impl BalanceView {
    pub fn total(&self) -> Decimal {
        self.free + self.locked
    }
}

/// Enrich raw balances with estimated values and keep the significant ones,
/// sorted by value descending.
///
/// `price_of` looks a symbol price up (typically from the ticker snapshot);
/// assets with no price keep a zero value and survive only if they are
/// majors.
pub fn enrich_balances(
    raw: &[RawBalance],
    price_of: impl Fn(&str) -> Option<Price>,
) -> Vec<BalanceView> {
    let mut views = Vec::new();

    for balance in raw {
        let total = balance.free + balance.locked;
        if total <= Decimal::ZERO {
            continue;
        }

        let quote_value = if balance.asset == VALUATION_QUOTE {
            total
        } else {
            price_of(&format!("{}{VALUATION_QUOTE}", balance.asset))
                .map(|p| total * p.inner())
                .unwrap_or(Decimal::ZERO)
        };

        let is_major = MAJOR_ASSETS.contains(&balance.asset.as_str());
        if quote_value >= MIN_SIGNIFICANT_VALUE || is_major {
            views.push(BalanceView {
                asset: balance.asset.clone(),
                free: balance.free,
                locked: balance.locked,
                quote_value,
            });
        }
    }

    views.sort_by(|a, b| b.quote_value.cmp(&a.quote_value));
    views
}

/// Account lookups combining the REST client with the ticker cache.
pub struct AccountService {
    client: Arc<RestClient>,
    tickers: Arc<TickerCache>,
}

impl AccountService {
    pub fn new(client: Arc<RestClient>, tickers: Arc<TickerCache>) -> Self {
        Self { client, tickers }
    }

    /// Significant balances with estimated values, sorted by value.
    pub async fn significant_balances(&self) -> ExchangeResult<Vec<BalanceView>> {
        // Warm the price snapshot first so valuation is one pass over memory.
        let _ = self.tickers.refresh().await;
        let account = self.client.account().await?;
        Ok(enrich_balances(&account.balances, |symbol| {
            self.tickers.cached_price(symbol)
        }))
    }

    /// Free balance of one asset, zero when the asset is not held.
    pub async fn free_balance(&self, asset: &str) -> ExchangeResult<Decimal> {
        let account = self.client.account().await?;
        Ok(account
            .balances
            .iter()
            .find(|b| b.asset == asset)
            .map(|b| b.free)
            .unwrap_or(Decimal::ZERO))
    }

    /// Non-stable holdings with a positive free balance, for the sell flow.
    /// May be empty; the conversation layer decides what to tell the user.
    pub async fn sellable_balances(&self) -> ExchangeResult<Vec<BalanceView>> {
        let balances = self.significant_balances().await?;
        Ok(balances
            .into_iter()
            .filter(|b| !STABLE_ASSETS.contains(&b.asset.as_str()) && b.free > Decimal::ZERO)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(asset: &str, free: Decimal, locked: Decimal) -> RawBalance {
        serde_json::from_str(&format!(
            r#"{{"asset": "{asset}", "free": "{free}", "locked": "{locked}"}}"#
        ))
        .unwrap()
    }

    #[test]
    fn test_enrich_sorts_by_value_and_drops_dust() {
        let balances = vec![
            raw("BTC", dec!(0.5), dec!(0)),
            raw("USDT", dec!(100), dec!(0)),
            raw("DUST", dec!(0.0001), dec!(0)),
            raw("ZERO", dec!(0), dec!(0)),
        ];

        let views = enrich_balances(&balances, |symbol| match symbol {
            "BTCUSDT" => Some(Price::new(dec!(25000))),
            "DUSTUSDT" => Some(Price::new(dec!(0.01))),
            _ => None,
        });

        let assets: Vec<&str> = views.iter().map(|v| v.asset.as_str()).collect();
        assert_eq!(assets, vec!["BTC", "USDT"]);
        assert_eq!(views[0].quote_value, dec!(12500.0));
    }

    #[test]
    fn test_majors_survive_without_price() {
        let balances = vec![raw("BNB", dec!(0.001), dec!(0))];
        let views = enrich_balances(&balances, |_| None);
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].quote_value, Decimal::ZERO);
    }

    #[test]
    fn test_locked_counts_toward_value() {
        let balances = vec![raw("ETH", dec!(1), dec!(1))];
        let views = enrich_balances(&balances, |symbol| {
            (symbol == "ETHUSDT").then(|| Price::new(dec!(1800)))
        });
        assert_eq!(views[0].total(), dec!(2));
        assert_eq!(views[0].quote_value, dec!(3600));
    }
}
