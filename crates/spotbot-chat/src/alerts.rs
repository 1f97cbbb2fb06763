//! Percentage-move alert evaluation.
//!
//! Watched symbols are checked against a per-user threshold using 24h
//! change percentages; a per-symbol suppression window keeps a volatile
//! pair from firing on every check. Evaluation is pure over the supplied
//! data and clock; the scheduling loop lives in the binary.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;

/// Per-user alert preferences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertConfig {
    pub enabled: bool,
    /// Absolute 24h move (in percent) that triggers an alert.
    pub threshold_pct: Decimal,
    /// How often the watch list is checked.
    pub check_interval_mins: i64,
    /// Minimum gap between two alerts for the same symbol.
    pub spam_delay_mins: i64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold_pct: dec!(5.0),
            check_interval_mins: 5,
            spam_delay_mins: 60,
        }
    }
}

/// One triggered alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertEvent {
    pub symbol: String,
    pub change_pct: Decimal,
}

/// Per-user alert state: config plus last-fired bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct AlertState {
    pub config: AlertConfig,
    /// Watched symbols beyond the user's favorites.
    pub watched: Vec<String>,
    last_alert_at: HashMap<String, DateTime<Utc>>,
}

impl AlertState {
    /// Evaluate the watch list against 24h change percentages.
    ///
    /// `changes` maps symbol to its 24h move in percent. Fired symbols are
    /// recorded so they stay quiet for the spam-delay window.
    pub fn evaluate(
        &mut self,
        changes: &HashMap<String, Decimal>,
        now: DateTime<Utc>,
    ) -> Vec<AlertEvent> {
        if !self.config.enabled {
            return Vec::new();
        }

        let spam_delay = Duration::minutes(self.config.spam_delay_mins);
        let mut events = Vec::new();

        for symbol in &self.watched {
            let Some(change) = changes.get(symbol) else {
                continue;
            };
            if change.abs() < self.config.threshold_pct {
                continue;
            }
            if let Some(last) = self.last_alert_at.get(symbol) {
                if now - *last < spam_delay {
                    continue;
                }
            }
            self.last_alert_at.insert(symbol.clone(), now);
            events.push(AlertEvent {
                symbol: symbol.clone(),
                change_pct: *change,
            });
        }

        events
    }

    /// Add a symbol to the watch list; returns false when already present.
    pub fn watch(&mut self, symbol: &str) -> bool {
        if self.watched.iter().any(|s| s == symbol) {
            return false;
        }
        self.watched.push(symbol.to_string());
        true
    }

    /// Remove a symbol from the watch list; returns whether it was present.
    pub fn unwatch(&mut self, symbol: &str) -> bool {
        let before = self.watched.len();
        self.watched.retain(|s| s != symbol);
        self.last_alert_at.remove(symbol);
        self.watched.len() != before
    }
}
