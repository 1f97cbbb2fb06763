//! Short-TTL ticker price cache.
//!
//! Conversations look prices up constantly (reference prices, balance
//! valuation, alert checks); a bulk snapshot with a ~60 second TTL keeps
//! that off the wire. Refreshes are single-flight and a failed refresh
//! serves the previous snapshot rather than erroring every caller.

use crate::client::RestClient;
use crate::error::{ExchangeError, ExchangeResult};
use crate::models::TickerPrice;
use parking_lot::RwLock;
use spotbot_core::Price;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Default time-to-live for the bulk price snapshot.
const DEFAULT_TTL: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct TickerSnapshot {
    prices: HashMap<String, Price>,
    fetched_at: Instant,
}

/// Shared cache of current ticker prices.
pub struct TickerCache {
    client: Arc<RestClient>,
    snapshot: RwLock<Option<Arc<TickerSnapshot>>>,
    refresh_gate: tokio::sync::Mutex<()>,
    ttl: Duration,
}

impl TickerCache {
    pub fn new(client: Arc<RestClient>) -> Self {
        Self::with_ttl(client, DEFAULT_TTL)
    }

    pub fn with_ttl(client: Arc<RestClient>, ttl: Duration) -> Self {
        Self {
            client,
            snapshot: RwLock::new(None),
            refresh_gate: tokio::sync::Mutex::new(()),
            ttl,
        }
    }

    fn fresh_snapshot(&self) -> Option<Arc<TickerSnapshot>> {
        let snapshot = self.snapshot.read().clone()?;
        (snapshot.fetched_at.elapsed() < self.ttl).then_some(snapshot)
    }

    /// Install prices from a bulk ticker response, replacing the snapshot.
    pub fn install(&self, tickers: &[TickerPrice]) {
        let prices = tickers
            .iter()
            .map(|t| (t.symbol.clone(), Price::new(t.price)))
            .collect::<HashMap<_, _>>();
        debug!(count = prices.len(), "ticker prices cached");
        *self.snapshot.write() = Some(Arc::new(TickerSnapshot {
            prices,
            fetched_at: Instant::now(),
        }));
    }

    /// Refresh the bulk snapshot. Single-flight; a caller arriving during a
    /// refresh waits and reuses the result. On failure the old snapshot (if
    /// any) keeps serving.
    pub async fn refresh(&self) -> ExchangeResult<()> {
        let _gate = self.refresh_gate.lock().await;

        if self.fresh_snapshot().is_some() {
            return Ok(());
        }

        match self.client.all_ticker_prices().await {
            Ok(tickers) => {
                self.install(&tickers);
                Ok(())
            }
            Err(err) if self.snapshot.read().is_some() => {
                warn!(error = %err, "ticker refresh failed, serving stale prices");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Current price for a symbol.
    ///
    /// Served from the fresh snapshot when possible; a symbol missing from
    /// the snapshot falls back to a direct single-symbol fetch.
    pub async fn price(&self, symbol: &str) -> ExchangeResult<Price> {
        if self.fresh_snapshot().is_none() {
            self.refresh().await?;
        }

        if let Some(snapshot) = self.snapshot.read().clone() {
            if let Some(price) = snapshot.prices.get(symbol) {
                return Ok(*price);
            }
        }

        debug!(symbol, "price not in snapshot, fetching directly");
        let ticker = self.client.ticker_price(symbol).await.map_err(|e| match e {
            ExchangeError::Api { code, message } => ExchangeError::Api { code, message },
            other => ExchangeError::Unavailable(format!("price for {symbol}: {other}")),
        })?;
        Ok(Price::new(ticker.price))
    }

    /// Price from the cached snapshot only; no network fallback.
    pub fn cached_price(&self, symbol: &str) -> Option<Price> {
        self.snapshot
            .read()
            .clone()
            .and_then(|s| s.prices.get(symbol).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn cache_with_ttl(ttl: Duration) -> TickerCache {
        let client = Arc::new(RestClient::new("https://api.example.com", "k", "s").unwrap());
        TickerCache::with_ttl(client, ttl)
    }

    fn sample_tickers() -> Vec<TickerPrice> {
        serde_json::from_str(
            r#"[
                {"symbol": "BTCUSDT", "price": "25000.00"},
                {"symbol": "ETHUSDT", "price": "1800.50"}
            ]"#,
        )
        .unwrap()
    }

    #[test]
    fn test_install_and_cached_lookup() {
        let cache = cache_with_ttl(Duration::from_secs(60));
        assert!(cache.cached_price("BTCUSDT").is_none());

        cache.install(&sample_tickers());
        assert_eq!(
            cache.cached_price("BTCUSDT").unwrap().inner(),
            dec!(25000.00)
        );
        assert!(cache.cached_price("NOPEUSDT").is_none());
    }

    #[test]
    fn test_snapshot_expires() {
        let cache = cache_with_ttl(Duration::from_millis(0));
        cache.install(&sample_tickers());
        // TTL of zero: the snapshot is immediately stale for `price()`,
        // but still readable via cached_price.
        assert!(cache.fresh_snapshot().is_none());
        assert!(cache.cached_price("BTCUSDT").is_some());
    }
}
