//! Per-user session state.
//!
//! Flow state is keyed by (user, flow kind): the trading, quick-buy and
//! quick-sell conversations are independent machines, and starting a new
//! instance of a flow discards that flow's previous draft. Each user's
//! state is logically private scratch data; there is no cross-user locking.

use crate::alerts::AlertState;
use dashmap::DashMap;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use spotbot_core::{OrderSide, Price, Quantity, TradeDraft};

/// Chat user identifier.
pub type UserId = u64;

/// Which conversation a piece of state belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowKind {
    /// Full buy/sell flow with a confirmation screen.
    Trade,
    /// Quantity-first buy flow that executes right after protection choice.
    QuickBuy,
    /// Protected full-balance exit flow.
    QuickSell,
}

/// Position in the trade state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeState {
    ChoosePair,
    ChooseAsset,
    ChooseSellAmountMode,
    ChooseAmount,
    ChooseProtectionMethod,
    ChooseSlPercent,
    ChooseTpPercent,
    EnterSlPrice,
    EnterTpPrice,
    Confirm,
}

/// Mutable state of one in-progress conversation.
#[derive(Debug, Clone)]
pub struct FlowState {
    pub state: TradeState,
    pub side: OrderSide,
    pub draft: Option<TradeDraft>,
    /// Sell flow: the chosen asset and its free quantity.
    pub sell_asset: Option<String>,
    pub sell_available_qty: Option<Quantity>,
    /// Wrong-side manual prices already warned about; resubmitting the
    /// identical value is taken as confirmation.
    pub warned_sl: Option<Price>,
    pub warned_tp: Option<Price>,
}

impl FlowState {
    pub fn new(state: TradeState, side: OrderSide) -> Self {
        Self {
            state,
            side,
            draft: None,
            sell_asset: None,
            sell_available_qty: None,
            warned_sl: None,
            warned_tp: None,
        }
    }
}

/// Default per-trade spending ceiling in quote units.
pub const DEFAULT_MAX_BUY_QUOTE: Decimal = dec!(1000);

/// Cap on stored favorite pairs.
pub const MAX_FAVORITES: usize = 15;

/// Per-user preferences and alert state.
#[derive(Debug, Clone)]
pub struct UserSettings {
    /// Maximum quote value of a single BUY.
    pub max_buy_quote: Decimal,
    pub favorite_pairs: Vec<String>,
    pub alerts: AlertState,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            max_buy_quote: DEFAULT_MAX_BUY_QUOTE,
            favorite_pairs: ["BTCUSDT", "ETHUSDT", "BNBUSDT", "SOLUSDT", "XRPUSDT", "ADAUSDT"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            alerts: AlertState::default(),
        }
    }
}

/// Process-wide store of conversation state and user settings.
#[derive(Default)]
pub struct SessionStore {
    flows: DashMap<(UserId, FlowKind), FlowState>,
    settings: DashMap<UserId, UserSettings>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a fresh flow state, discarding any previous instance of the
    /// same flow for this user.
    pub fn begin(&self, user: UserId, kind: FlowKind, state: FlowState) {
        self.flows.insert((user, kind), state);
    }

    /// Snapshot of the current flow state, if one is active.
    pub fn flow(&self, user: UserId, kind: FlowKind) -> Option<FlowState> {
        self.flows.get(&(user, kind)).map(|s| s.clone())
    }

    /// Store an updated flow state.
    pub fn store(&self, user: UserId, kind: FlowKind, state: FlowState) {
        self.flows.insert((user, kind), state);
    }

    /// Remove the flow. Returns whether anything was live; removing a flow
    /// that does not exist is a no-op.
    pub fn clear(&self, user: UserId, kind: FlowKind) -> bool {
        self.flows.remove(&(user, kind)).is_some()
    }

    /// Snapshot of the user's settings (created on first touch).
    pub fn settings(&self, user: UserId) -> UserSettings {
        self.settings.entry(user).or_default().clone()
    }

    /// Mutate the user's settings in place.
    pub fn with_settings_mut<R>(&self, user: UserId, f: impl FnOnce(&mut UserSettings) -> R) -> R {
        let mut entry = self.settings.entry(user).or_default();
        f(entry.value_mut())
    }

    /// Add a favorite pair; returns false when the cap is reached or the
    /// pair is already present.
    pub fn add_favorite(&self, user: UserId, pair: &str) -> bool {
        self.with_settings_mut(user, |s| {
            if s.favorite_pairs.len() >= MAX_FAVORITES
                || s.favorite_pairs.iter().any(|p| p == pair)
            {
                return false;
            }
            s.favorite_pairs.push(pair.to_string());
            true
        })
    }

    /// Remove a favorite pair; returns whether it was present.
    pub fn remove_favorite(&self, user: UserId, pair: &str) -> bool {
        self.with_settings_mut(user, |s| {
            let before = s.favorite_pairs.len();
            s.favorite_pairs.retain(|p| p != pair);
            s.favorite_pairs.len() != before
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_discards_previous_flow() {
        let store = SessionStore::new();
        let mut first = FlowState::new(TradeState::ChoosePair, OrderSide::Buy);
        first.draft = Some(TradeDraft::new(OrderSide::Buy, "BTCUSDT", Price::ZERO));
        store.begin(1, FlowKind::Trade, first);

        store.begin(
            1,
            FlowKind::Trade,
            FlowState::new(TradeState::ChoosePair, OrderSide::Sell),
        );
        let current = store.flow(1, FlowKind::Trade).unwrap();
        assert_eq!(current.side, OrderSide::Sell);
        assert!(current.draft.is_none());
    }

    #[test]
    fn test_flows_are_independent_per_kind() {
        let store = SessionStore::new();
        store.begin(
            1,
            FlowKind::Trade,
            FlowState::new(TradeState::ChooseAmount, OrderSide::Buy),
        );
        store.begin(
            1,
            FlowKind::QuickBuy,
            FlowState::new(TradeState::ChoosePair, OrderSide::Buy),
        );

        assert_eq!(
            store.flow(1, FlowKind::Trade).unwrap().state,
            TradeState::ChooseAmount
        );
        assert_eq!(
            store.flow(1, FlowKind::QuickBuy).unwrap().state,
            TradeState::ChoosePair
        );
        assert!(store.flow(2, FlowKind::Trade).is_none());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let store = SessionStore::new();
        store.begin(
            1,
            FlowKind::Trade,
            FlowState::new(TradeState::ChoosePair, OrderSide::Buy),
        );
        assert!(store.clear(1, FlowKind::Trade));
        assert!(!store.clear(1, FlowKind::Trade));
    }

    #[test]
    fn test_favorites_cap_and_dedup() {
        let store = SessionStore::new();
        assert!(!store.add_favorite(1, "BTCUSDT")); // already a default
        assert!(store.add_favorite(1, "DOGEUSDT"));
        assert!(store.remove_favorite(1, "DOGEUSDT"));
        assert!(!store.remove_favorite(1, "DOGEUSDT"));

        for i in 0..MAX_FAVORITES {
            store.add_favorite(1, &format!("PAIR{i}USDT"));
        }
        assert!(!store.add_favorite(1, "ONEMOREUSDT"));
    }
}
