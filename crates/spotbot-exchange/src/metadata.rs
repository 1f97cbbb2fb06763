//! Process-wide exchange metadata cache.
//!
//! Holds per-symbol trading filters and the set of currently tradable
//! symbols. Many conversations read it concurrently while a refresh is in
//! flight: a refresh builds a complete snapshot and swaps it in one store,
//! so readers see either the old set or the new set, never a half-written
//! one. Concurrent refreshes collapse onto a single outstanding fetch.

use crate::client::RestClient;
use crate::error::{ExchangeError, ExchangeResult};
use crate::models::ExchangeInfoResponse;
use parking_lot::RwLock;
use spotbot_core::SymbolFilters;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Default staleness horizon for cached metadata.
const DEFAULT_MAX_AGE: Duration = Duration::from_secs(300);

/// Immutable view of the exchange metadata at one fetch.
#[derive(Debug, Clone)]
pub struct MetadataSnapshot {
    filters: HashMap<String, SymbolFilters>,
    quote_assets: HashMap<String, String>,
    tradable: HashSet<String>,
    fetched_at: Instant,
}

impl MetadataSnapshot {
    /// Build a snapshot from an exchange info response. Symbols not in
    /// TRADING status keep their filters (useful for history display) but
    /// are excluded from the tradable set.
    pub fn from_exchange_info(info: &ExchangeInfoResponse) -> Self {
        let mut filters = HashMap::with_capacity(info.symbols.len());
        let mut quote_assets = HashMap::with_capacity(info.symbols.len());
        let mut tradable = HashSet::new();

        for symbol in &info.symbols {
            filters.insert(symbol.symbol.clone(), symbol.to_filters());
            quote_assets.insert(symbol.symbol.clone(), symbol.quote_asset.clone());
            if symbol.is_trading() {
                tradable.insert(symbol.symbol.clone());
            }
        }

        Self {
            filters,
            quote_assets,
            tradable,
            fetched_at: Instant::now(),
        }
    }

    pub fn filters(&self, symbol: &str) -> Option<&SymbolFilters> {
        self.filters.get(symbol)
    }

    pub fn is_tradable(&self, symbol: &str) -> bool {
        self.tradable.contains(symbol)
    }

    pub fn quote_asset(&self, symbol: &str) -> Option<&str> {
        self.quote_assets.get(symbol).map(String::as_str)
    }

    pub fn tradable_count(&self) -> usize {
        self.tradable.len()
    }

    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }
}

/// Shared cache of per-symbol trading constraints.
pub struct MetadataCache {
    client: Arc<RestClient>,
    snapshot: RwLock<Option<Arc<MetadataSnapshot>>>,
    /// Held across the fetch so concurrent refreshes collapse to one.
    refresh_gate: tokio::sync::Mutex<()>,
    max_age: Duration,
}

impl MetadataCache {
    pub fn new(client: Arc<RestClient>) -> Self {
        Self::with_max_age(client, DEFAULT_MAX_AGE)
    }

    pub fn with_max_age(client: Arc<RestClient>, max_age: Duration) -> Self {
        Self {
            client,
            snapshot: RwLock::new(None),
            refresh_gate: tokio::sync::Mutex::new(()),
            max_age,
        }
    }

    /// Current snapshot, if one has ever been installed. Stale reads during
    /// an in-flight refresh are acceptable.
    pub fn get(&self) -> Option<Arc<MetadataSnapshot>> {
        self.snapshot.read().clone()
    }

    /// Filters for a symbol from the current snapshot.
    pub fn filters(&self, symbol: &str) -> Option<SymbolFilters> {
        self.get().and_then(|s| s.filters(symbol).cloned())
    }

    /// Whether the symbol is currently tradable. An empty cache validates
    /// nothing.
    pub fn is_tradable(&self, symbol: &str) -> bool {
        self.get().map(|s| s.is_tradable(symbol)).unwrap_or(false)
    }

    /// Quote asset of a symbol from the current snapshot.
    pub fn quote_asset(&self, symbol: &str) -> Option<String> {
        self.get()
            .and_then(|s| s.quote_asset(symbol).map(str::to_string))
    }

    pub fn is_stale(&self) -> bool {
        match self.get() {
            Some(snapshot) => snapshot.age() > self.max_age,
            None => true,
        }
    }

    /// Install a freshly built snapshot, replacing the previous one.
    pub fn install(&self, info: &ExchangeInfoResponse) {
        let snapshot = MetadataSnapshot::from_exchange_info(info);
        info!(tradable = snapshot.tradable_count(), "exchange metadata cached");
        *self.snapshot.write() = Some(Arc::new(snapshot));
    }

    /// Fetch exchange info and swap in the new snapshot.
    ///
    /// Single-flight: a caller that arrives while another refresh is in
    /// progress waits for it and then returns without fetching again.
    pub async fn refresh(&self) -> ExchangeResult<()> {
        let _gate = self.refresh_gate.lock().await;

        // A refresh that completed while this caller waited counts.
        if let Some(snapshot) = self.get() {
            if snapshot.age() < self.max_age {
                return Ok(());
            }
        }

        let info = self.client.exchange_info().await?;
        self.install(&info);
        Ok(())
    }

    /// Refresh when stale; a failed refresh keeps serving the previous
    /// snapshot if there is one.
    pub async fn ensure_fresh(&self) -> ExchangeResult<()> {
        if !self.is_stale() {
            return Ok(());
        }
        match self.refresh().await {
            Ok(()) => Ok(()),
            Err(err) if self.get().is_some() => {
                warn!(error = %err, "metadata refresh failed, serving stale snapshot");
                Ok(())
            }
            Err(err) => Err(ExchangeError::Unavailable(format!(
                "exchange metadata unavailable: {err}"
            ))),
        }
    }
}
