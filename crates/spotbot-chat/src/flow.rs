//! The trade conversation engine.
//!
//! One dispatch function per state; one action produces one transition.
//! Every validation failure re-prompts the same step with a specific
//! reason. Cancellation works from every state and is idempotent. The
//! draft is cleared on confirmation, cancellation, restart, and any
//! internal error.

use crate::action::{ChatAction, ProtectionChoice};
use crate::error::{ChatError, ChatResult};
use crate::reply::{ReplyOption, StepOutcome, StepReply};
use crate::services::{MarketService, OrderService};
use crate::session::{FlowKind, FlowState, SessionStore, TradeState, UserId};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use spotbot_core::{
    adjust_price, adjust_quantity, format_price_for_wire, format_quantity_for_wire, quote_to_base,
    tp_beats_sl, OrderSide, Price, Quantity, SymbolFilters, TradeDraft,
};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Stop-loss percentage presets offered as buttons.
const SL_PERCENT_PRESETS: [Decimal; 4] = [dec!(1), dec!(2), dec!(3), dec!(5)];

/// Take-profit percentage presets offered as buttons.
const TP_PERCENT_PRESETS: [Decimal; 4] = [dec!(2), dec!(3), dec!(5), dec!(10)];

/// Quote asset used for balance hints and quick-sell pairing.
const DISPLAY_QUOTE: &str = "USDT";

/// The per-user trade conversation state machine.
///
/// Generic over the market-data and order-execution collaborators so flows
/// run the same against the live exchange and against test stubs.
pub struct ChatEngine<M, O> {
    sessions: SessionStore,
    market: Arc<M>,
    orders: Arc<O>,
}

impl<M: MarketService, O: OrderService> ChatEngine<M, O> {
    pub fn new(market: Arc<M>, orders: Arc<O>) -> Self {
        Self {
            sessions: SessionStore::new(),
            market,
            orders,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Advance one flow by one action.
    pub async fn handle(&self, user: UserId, flow: FlowKind, action: ChatAction) -> StepReply {
        if action == ChatAction::Cancel {
            return self.cancel(user, flow);
        }
        if let ChatAction::Begin(side) = &action {
            return self.begin(user, flow, *side).await;
        }

        let Some(mut fs) = self.sessions.flow(user, flow) else {
            return StepReply::ended("No active operation here. Start one from the menu.");
        };

        let reply = match self.dispatch(user, flow, &mut fs, action).await {
            Ok(reply) => reply,
            Err(err) => self.reply_for_error(err),
        };

        match reply.outcome {
            StepOutcome::Continue => self.sessions.store(user, flow, fs),
            StepOutcome::Ended => {
                self.sessions.clear(user, flow);
            }
        }
        reply
    }

    /// Cancel the flow. Safe to invoke with no live draft and after
    /// execution already started or completed.
    fn cancel(&self, user: UserId, flow: FlowKind) -> StepReply {
        if self.sessions.clear(user, flow) {
            debug!(user, ?flow, "conversation cancelled, draft cleared");
        }
        StepReply::ended("Operation cancelled. Back to the main menu.")
    }

    fn reply_for_error(&self, err: ChatError) -> StepReply {
        match err {
            ChatError::Stale(msg) => StepReply::ended(format!(
                "Market data is unavailable right now ({msg}). Please try again later."
            )),
            ChatError::Rejection(msg) => {
                StepReply::ended(format!("The exchange rejected the order: {msg}"))
            }
            ChatError::Internal(msg) => {
                warn!(error = %msg, "conversation aborted on internal state error");
                StepReply::ended(
                    "Something went wrong on our side; the operation was cancelled. \
                     Back to the main menu.",
                )
            }
        }
    }

    /// Start (or restart) a flow. A previous draft for the same flow is
    /// discarded, never merged.
    async fn begin(&self, user: UserId, flow: FlowKind, side: OrderSide) -> StepReply {
        self.sessions.clear(user, flow);
        match (flow, side) {
            (FlowKind::Trade | FlowKind::QuickBuy, OrderSide::Buy) => {
                self.begin_buy(user, flow).await
            }
            (FlowKind::Trade | FlowKind::QuickSell, OrderSide::Sell) => {
                self.begin_sell(user, flow).await
            }
            _ => StepReply::ended("That operation does not support this side."),
        }
    }

    async fn begin_buy(&self, user: UserId, flow: FlowKind) -> StepReply {
        let favorites = self.sessions.settings(user).favorite_pairs;
        let mut options: Vec<ReplyOption> = favorites
            .iter()
            .map(|p| ReplyOption::new(p.clone(), ChatAction::SelectPair(p.clone())))
            .collect();
        options.push(cancel_option());

        let mut text = String::from(
            "Buying. Pick a favorite pair or type another symbol (e.g. BTCUSDT).",
        );
        if let Ok(free) = self.market.free_balance(DISPLAY_QUOTE).await {
            text.push_str(&format!("\nAvailable balance: {free} {DISPLAY_QUOTE}"));
        }

        self.sessions
            .begin(user, flow, FlowState::new(TradeState::ChoosePair, OrderSide::Buy));
        StepReply::prompt(text, options)
    }

    async fn begin_sell(&self, user: UserId, flow: FlowKind) -> StepReply {
        let holdings = match self.market.holdings().await {
            Ok(h) if !h.is_empty() => h,
            Ok(_) => {
                return StepReply::ended(
                    "You have no non-stable asset balances available to sell.",
                )
            }
            Err(err) => return self.reply_for_error(err),
        };

        let mut text = String::from("Selling. Pick the asset to sell:\n");
        let mut options = Vec::new();
        for h in holdings.iter().take(10) {
            text.push_str(&format!(
                "\n{}: {} (price {}, ≈ {:.2} {DISPLAY_QUOTE})",
                h.asset, h.free, h.price, h.quote_value
            ));
            options.push(ReplyOption::new(
                h.asset.clone(),
                ChatAction::SelectAsset(h.asset.clone()),
            ));
        }
        options.push(cancel_option());

        self.sessions
            .begin(user, flow, FlowState::new(TradeState::ChooseAsset, OrderSide::Sell));
        StepReply::prompt(text, options)
    }

    async fn dispatch(
        &self,
        user: UserId,
        flow: FlowKind,
        fs: &mut FlowState,
        action: ChatAction,
    ) -> ChatResult<StepReply> {
        match fs.state {
            TradeState::ChoosePair => self.on_choose_pair(flow, fs, action).await,
            TradeState::ChooseAsset => self.on_choose_asset(flow, fs, action).await,
            TradeState::ChooseSellAmountMode => self.on_sell_amount_mode(fs, action).await,
            TradeState::ChooseAmount => self.on_amount(user, flow, fs, action).await,
            TradeState::ChooseProtectionMethod => self.on_protection_choice(fs, action).await,
            TradeState::ChooseSlPercent => self.on_sl_percent(fs, action),
            TradeState::ChooseTpPercent => self.on_tp_percent(flow, fs, action).await,
            TradeState::EnterSlPrice => self.on_manual_sl(fs, action).await,
            TradeState::EnterTpPrice => self.on_manual_tp(fs, action).await,
            TradeState::Confirm => self.on_confirm(fs, action).await,
        }
    }

    // === Pair selection ===

    async fn on_choose_pair(
        &self,
        flow: FlowKind,
        fs: &mut FlowState,
        action: ChatAction,
    ) -> ChatResult<StepReply> {
        let pair = match action {
            ChatAction::SelectPair(p) => p,
            ChatAction::Text(t) => t.trim().to_uppercase(),
            _ => {
                return Ok(StepReply::prompt(
                    "Pick a pair from the buttons or type a symbol.",
                    vec![cancel_option()],
                ))
            }
        };

        if let Err(err) = self.market.ensure_metadata().await {
            return Ok(StepReply::prompt(
                format!("Trading rules are unavailable right now ({err}). Send the pair again in a moment."),
                vec![cancel_option()],
            ));
        }
        if !self.market.is_tradable(&pair) {
            return Ok(StepReply::prompt(
                format!("'{pair}' is not a valid tradable symbol. Enter another pair:"),
                vec![cancel_option()],
            ));
        }

        let price = match self.market.price(&pair).await {
            Ok(p) => p,
            Err(err) => {
                return Ok(StepReply::prompt(
                    format!("Could not fetch the current price ({err}). Send the pair again:"),
                    vec![cancel_option()],
                ))
            }
        };

        let mut text = format!("Pair: {pair}\nCurrent price: {price}");
        if let Some(quote) = self.market.quote_asset(&pair) {
            if let Ok(free) = self.market.free_balance(&quote).await {
                text.push_str(&format!("\nAvailable {quote}: {free}"));
            }
        }
        text.push_str(match flow {
            FlowKind::QuickBuy => "\n\nEnter the quantity to buy (in base units):",
            _ => "\n\nEnter the amount to spend (in quote currency):",
        });

        fs.draft = Some(TradeDraft::new(fs.side, pair, price));
        fs.state = TradeState::ChooseAmount;
        Ok(StepReply::prompt(text, vec![cancel_option()]))
    }

    // === Sell entry ===

    async fn on_choose_asset(
        &self,
        flow: FlowKind,
        fs: &mut FlowState,
        action: ChatAction,
    ) -> ChatResult<StepReply> {
        let asset = match action {
            ChatAction::SelectAsset(a) => a,
            _ => {
                return Ok(StepReply::prompt(
                    "Pick one of the listed assets.",
                    vec![cancel_option()],
                ))
            }
        };

        let free = self
            .market
            .free_balance(&asset)
            .await
            .map_err(|_| ChatError::Stale(format!("balance for {asset} unavailable")))?;
        if free <= Decimal::ZERO {
            return Ok(StepReply::ended(format!(
                "No free {asset} balance available to sell."
            )));
        }

        fs.sell_asset = Some(asset.clone());
        fs.sell_available_qty = Some(Quantity::new(free));

        match flow {
            FlowKind::QuickSell => self.quick_sell_prepare(fs, &asset).await,
            _ => {
                fs.state = TradeState::ChooseSellAmountMode;
                Ok(StepReply::prompt(
                    format!("Asset: {asset}\nAvailable: {free}\n\nSell everything or only part of it?"),
                    vec![
                        ReplyOption::new("Sell all", ChatAction::SellAll),
                        ReplyOption::new("Sell part", ChatAction::SellPartial),
                        cancel_option(),
                    ],
                ))
            }
        }
    }

    /// Quick-sell: snap the full free balance and go straight to the
    /// stop-loss percentage choice.
    async fn quick_sell_prepare(&self, fs: &mut FlowState, asset: &str) -> ChatResult<StepReply> {
        let pair = self.resolve_sell_pair(asset).await?;
        let filters = self.filters_for(&pair)?;
        let available = fs
            .sell_available_qty
            .ok_or_else(|| ChatError::Internal("available quantity missing".to_string()))?;

        let adjusted = adjust_quantity(available, &filters);
        if !adjusted.is_positive() {
            return Ok(StepReply::ended(format!(
                "Your {asset} balance ({available}) is below the minimum sellable quantity ({}).",
                filters.min_qty
            )));
        }

        let price = self
            .market
            .price(&pair)
            .await
            .map_err(|_| ChatError::Stale(format!("price for {pair} unavailable")))?;

        // The holding being protected is long, so the percentage math and
        // the TP/SL ordering follow the buy conventions: stop below the
        // market, target above it, exit legs on the sell side.
        let mut draft = TradeDraft::new(OrderSide::Buy, pair, price);
        draft.adjusted_base_quantity = adjusted;
        fs.draft = Some(draft);
        fs.state = TradeState::ChooseSlPercent;

        Ok(StepReply::prompt(
            format!(
                "Protecting {} {asset} (current price {price}).\nPick a stop-loss percentage:",
                format_quantity_for_wire(adjusted, &filters)
            ),
            sl_percent_options(),
        ))
    }

    async fn on_sell_amount_mode(
        &self,
        fs: &mut FlowState,
        action: ChatAction,
    ) -> ChatResult<StepReply> {
        let asset = fs
            .sell_asset
            .clone()
            .ok_or_else(|| ChatError::Internal("sell asset missing".to_string()))?;
        let available = fs
            .sell_available_qty
            .ok_or_else(|| ChatError::Internal("available quantity missing".to_string()))?;

        match action {
            ChatAction::SellAll => {
                let pair = self.resolve_sell_pair(&asset).await?;
                let filters = self.filters_for(&pair)?;
                let adjusted = adjust_quantity(available, &filters);
                if !adjusted.is_positive() {
                    return Ok(StepReply::ended(format!(
                        "The available {asset} ({available}) is below the minimum sellable \
                         quantity ({}) after adjustment.",
                        filters.min_qty
                    )));
                }

                let price = self
                    .market
                    .price(&pair)
                    .await
                    .map_err(|_| ChatError::Stale(format!("price for {pair} unavailable")))?;

                let mut draft = TradeDraft::new(OrderSide::Sell, pair, price);
                draft.adjusted_base_quantity = adjusted;
                fs.draft = Some(draft);
                fs.state = TradeState::ChooseProtectionMethod;
                info!(%asset, quantity = %adjusted, "selling full balance");

                Ok(StepReply::prompt(
                    format!(
                        "Selling {} {asset} (all available, adjusted) as a market order.\n\n\
                         Add stop-loss/take-profit protection?",
                        format_quantity_for_wire(adjusted, &filters)
                    ),
                    protection_options(),
                ))
            }
            ChatAction::SellPartial => {
                let pair = self.resolve_sell_pair(&asset).await?;
                let price = self
                    .market
                    .price(&pair)
                    .await
                    .map_err(|_| ChatError::Stale(format!("price for {pair} unavailable")))?;
                let available_value = available.notional(price);

                fs.draft = Some(TradeDraft::new(OrderSide::Sell, pair, price));
                fs.state = TradeState::ChooseAmount;

                Ok(StepReply::prompt(
                    format!(
                        "Asset: {asset}\nAvailable: {available} (≈ {available_value:.2} {DISPLAY_QUOTE})\n\
                         Current price: {price}\n\nEnter the value to sell (in {DISPLAY_QUOTE}):"
                    ),
                    vec![cancel_option()],
                ))
            }
            _ => Ok(StepReply::prompt(
                "Choose whether to sell all or part of the balance.",
                vec![
                    ReplyOption::new("Sell all", ChatAction::SellAll),
                    ReplyOption::new("Sell part", ChatAction::SellPartial),
                    cancel_option(),
                ],
            )),
        }
    }

    /// Sell flows pair the asset against the display quote, falling back to
    /// BUSD when no such pair trades.
    async fn resolve_sell_pair(&self, asset: &str) -> ChatResult<String> {
        if let Err(err) = self.market.ensure_metadata().await {
            return Err(ChatError::Stale(err.to_string()));
        }
        let primary = format!("{asset}{DISPLAY_QUOTE}");
        if self.market.is_tradable(&primary) {
            return Ok(primary);
        }
        let fallback = format!("{asset}BUSD");
        if self.market.is_tradable(&fallback) {
            return Ok(fallback);
        }
        Err(ChatError::Stale(format!(
            "no common trading pair found for {asset}"
        )))
    }

    // === Amount entry ===

    async fn on_amount(
        &self,
        user: UserId,
        flow: FlowKind,
        fs: &mut FlowState,
        action: ChatAction,
    ) -> ChatResult<StepReply> {
        let text = match action {
            ChatAction::Text(t) => t,
            _ => {
                return Ok(StepReply::prompt(
                    "Type the amount as a number.",
                    vec![cancel_option()],
                ))
            }
        };

        let (side, reference, pair) = match fs.draft.as_ref() {
            Some(draft) => (
                draft.side,
                draft.reference_price_at_entry,
                draft.pair.clone(),
            ),
            None => {
                return Err(ChatError::Internal(
                    "draft missing at amount step".to_string(),
                ))
            }
        };
        let filters = match self.market.filters(&pair) {
            Some(f) => f,
            None => {
                return Ok(StepReply::prompt(
                    format!(
                        "Could not load the trading constraints for {pair}. Send the amount again in a moment."
                    ),
                    vec![cancel_option()],
                ))
            }
        };

        let Ok(amount) = Decimal::from_str(text.trim()) else {
            return Ok(StepReply::prompt(
                format!("'{}' is not a number. Enter the amount again:", text.trim()),
                vec![cancel_option()],
            ));
        };
        if amount <= Decimal::ZERO {
            return Ok(StepReply::prompt(
                "The amount must be greater than zero. Enter it again:",
                vec![cancel_option()],
            ));
        }

        if flow == FlowKind::QuickBuy {
            return self.on_quick_buy_quantity(user, fs, amount, &filters);
        }

        // Per-trade spending ceiling applies to buys only.
        if side == OrderSide::Buy {
            let ceiling = self.sessions.settings(user).max_buy_quote;
            if amount > ceiling {
                return Ok(StepReply::prompt(
                    format!(
                        "The amount ({amount:.2}) exceeds your per-trade buy limit ({ceiling:.2}). \
                         Enter a smaller amount:"
                    ),
                    vec![cancel_option()],
                ));
            }
        }

        let raw_quantity = match quote_to_base(amount, reference) {
            Ok(q) => q,
            Err(err) => {
                return Ok(StepReply::prompt(
                    format!("{err}. Enter the amount again:"),
                    vec![cancel_option()],
                ))
            }
        };

        if raw_quantity < filters.min_qty {
            let min_value = filters.min_qty.notional(reference);
            return Ok(StepReply::prompt(
                format!(
                    "Too small: the minimum quantity is {} (≈ {min_value:.2} in quote). \
                     Enter a larger amount:",
                    filters.min_qty
                ),
                vec![cancel_option()],
            ));
        }
        if filters.max_qty.is_positive() && raw_quantity > filters.max_qty {
            let max_value = filters.max_qty.notional(reference);
            return Ok(StepReply::prompt(
                format!(
                    "Too large: the maximum quantity is {} (≈ {max_value:.2} in quote). \
                     Enter a smaller amount:",
                    filters.max_qty
                ),
                vec![cancel_option()],
            ));
        }

        let adjusted = adjust_quantity(raw_quantity, &filters);
        if !adjusted.is_positive() {
            return Ok(StepReply::prompt(
                "The amount is too small once adjusted to the exchange constraints. \
                 Enter a larger amount:",
                vec![cancel_option()],
            ));
        }

        if side == OrderSide::Sell {
            let available = fs
                .sell_available_qty
                .ok_or_else(|| ChatError::Internal("available quantity missing".to_string()))?;
            let available_value = available.notional(reference);
            if amount > available_value || adjusted > available {
                return Ok(StepReply::prompt(
                    format!(
                        "The requested value ({amount:.2}) exceeds the available balance \
                         (≈ {available_value:.2}). Enter a smaller amount:"
                    ),
                    vec![cancel_option()],
                ));
            }
        }

        if let Some(draft) = fs.draft.as_mut() {
            draft.requested_quote_amount = Some(amount);
            draft.adjusted_base_quantity = adjusted;
        }
        fs.state = TradeState::ChooseProtectionMethod;

        let adjusted_value = adjusted.notional(reference);
        Ok(StepReply::prompt(
            format!(
                "Value: {amount:.2}\nQuantity after adjustment: {} (≈ {adjusted_value:.2})\n\
                 Current price: {}\n\nAdd stop-loss/take-profit protection?",
                format_quantity_for_wire(adjusted, &filters),
                format_price_for_wire(reference, &filters),
            ),
            protection_options(),
        ))
    }

    /// Quick-buy takes a base-asset quantity directly; a ceiling breach is
    /// only warned about, and the flow continues straight into the
    /// percentage stop-loss choice.
    fn on_quick_buy_quantity(
        &self,
        user: UserId,
        fs: &mut FlowState,
        quantity: Decimal,
        filters: &SymbolFilters,
    ) -> ChatResult<StepReply> {
        let draft = fs
            .draft
            .as_mut()
            .ok_or_else(|| ChatError::Internal("draft missing at amount step".to_string()))?;

        let raw = Quantity::new(quantity);
        if raw < filters.min_qty {
            return Ok(StepReply::prompt(
                format!(
                    "The quantity ({raw}) is below the minimum ({}). Enter it again:",
                    filters.min_qty
                ),
                vec![cancel_option()],
            ));
        }
        if filters.max_qty.is_positive() && raw > filters.max_qty {
            return Ok(StepReply::prompt(
                format!(
                    "The quantity ({raw}) is above the maximum ({}). Enter it again:",
                    filters.max_qty
                ),
                vec![cancel_option()],
            ));
        }
        let adjusted = adjust_quantity(raw, filters);
        if !adjusted.is_positive() {
            return Ok(StepReply::prompt(
                "The quantity is too small after adjustment. Enter a larger one:",
                vec![cancel_option()],
            ));
        }

        draft.adjusted_base_quantity = adjusted;

        let mut text = format!(
            "Quantity set: {}",
            format_quantity_for_wire(adjusted, filters)
        );
        let estimated = adjusted.notional(draft.reference_price_at_entry);
        let ceiling = self.sessions.settings(user).max_buy_quote;
        if estimated > ceiling {
            text.push_str(&format!(
                "\nWarning: the estimated value ({estimated:.2}) exceeds your buy limit ({ceiling:.2})."
            ));
        }
        text.push_str("\n\nPick a stop-loss percentage:");

        fs.state = TradeState::ChooseSlPercent;
        Ok(StepReply::prompt(text, sl_percent_options()))
    }

    // === Protection ===

    async fn on_protection_choice(
        &self,
        fs: &mut FlowState,
        action: ChatAction,
    ) -> ChatResult<StepReply> {
        let draft = fs
            .draft
            .as_mut()
            .ok_or_else(|| ChatError::Internal("draft missing at protection step".to_string()))?;

        match action {
            ChatAction::Protection(ProtectionChoice::Manual) => {
                fs.state = TradeState::EnterSlPrice;
                Ok(StepReply::prompt(
                    "Enter the stop-loss price. Send 0 or /skip to go without one.",
                    vec![cancel_option()],
                ))
            }
            ChatAction::Protection(ProtectionChoice::Percent) => {
                if !draft.reference_price_at_entry.is_positive() {
                    // Percentage entry needs a reference price; offer the
                    // manual path instead of failing the flow.
                    return Ok(StepReply::prompt(
                        "The current price is unavailable, so percentages cannot be \
                         computed. Enter prices manually instead?",
                        vec![
                            ReplyOption::new(
                                "Enter manually",
                                ChatAction::Protection(ProtectionChoice::Manual),
                            ),
                            ReplyOption::new(
                                "No protection",
                                ChatAction::Protection(ProtectionChoice::Skip),
                            ),
                            cancel_option(),
                        ],
                    ));
                }
                fs.state = TradeState::ChooseSlPercent;
                Ok(StepReply::prompt(
                    format!(
                        "Current price: {}\n\nPick a stop-loss percentage:",
                        draft.reference_price_at_entry
                    ),
                    sl_percent_options(),
                ))
            }
            ChatAction::Protection(ProtectionChoice::Skip) => {
                draft.stop_loss_price = None;
                draft.take_profit_price = None;
                self.build_confirmation(fs).await
            }
            _ => Ok(StepReply::prompt(
                "Choose one of the protection options.",
                protection_options(),
            )),
        }
    }

    fn on_sl_percent(&self, fs: &mut FlowState, action: ChatAction) -> ChatResult<StepReply> {
        let ChatAction::StopLossPercent(pct) = action else {
            return Ok(StepReply::prompt(
                "Pick a stop-loss percentage.",
                sl_percent_options(),
            ));
        };

        let draft = fs
            .draft
            .as_mut()
            .ok_or_else(|| ChatError::Internal("draft missing at SL step".to_string()))?;
        let filters = self.filters_for(&draft.pair)?;

        let reference = draft.reference_price_at_entry;
        // A stop for a BUY sits below the entry, for a SELL above it.
        let raw = match draft.side {
            OrderSide::Buy => reference.down_pct(pct),
            OrderSide::Sell => reference.up_pct(pct),
        };
        let adjusted = adjust_price(raw, &filters);

        if !price_in_filter_bounds(adjusted, &filters) {
            fs.state = TradeState::ChooseProtectionMethod;
            return Ok(StepReply::prompt(
                format!(
                    "The computed stop-loss ({adjusted}) is outside the allowed price range. \
                     Pick another protection method:"
                ),
                protection_options(),
            ));
        }

        draft.stop_loss_price = Some(adjusted);
        debug!(pct = %pct, raw = %raw, adjusted = %adjusted, "stop-loss set from percentage");
        fs.state = TradeState::ChooseTpPercent;
        Ok(StepReply::prompt(
            format!(
                "Stop-loss set at {pct}% ({}).\n\nPick a take-profit percentage (or skip):",
                format_price_for_wire(adjusted, &filters)
            ),
            tp_percent_options(),
        ))
    }

    async fn on_tp_percent(
        &self,
        flow: FlowKind,
        fs: &mut FlowState,
        action: ChatAction,
    ) -> ChatResult<StepReply> {
        match action {
            ChatAction::SkipTakeProfit => {
                let draft = fs
                    .draft
                    .as_mut()
                    .ok_or_else(|| ChatError::Internal("draft missing at TP step".to_string()))?;
                draft.take_profit_price = None;
                self.finish_protection(flow, fs).await
            }
            ChatAction::TakeProfitPercent(pct) => {
                let draft = fs
                    .draft
                    .as_mut()
                    .ok_or_else(|| ChatError::Internal("draft missing at TP step".to_string()))?;
                let filters = self.filters_for(&draft.pair)?;

                let reference = draft.reference_price_at_entry;
                // Opposite sign convention from the stop-loss.
                let raw = match draft.side {
                    OrderSide::Buy => reference.up_pct(pct),
                    OrderSide::Sell => reference.down_pct(pct),
                };
                let adjusted = adjust_price(raw, &filters);

                if !price_in_filter_bounds(adjusted, &filters) {
                    return Ok(StepReply::prompt(
                        format!(
                            "The computed take-profit ({adjusted}) is outside the allowed \
                             price range. Pick another percentage (or skip):"
                        ),
                        tp_percent_options(),
                    ));
                }

                // The target must beat the stop in the trade's favorable
                // direction; never swap the two silently.
                if let Some(sl) = draft.stop_loss_price {
                    if !tp_beats_sl(draft.side, adjusted, sl) {
                        return Ok(StepReply::prompt(
                            format!(
                                "The computed take-profit ({adjusted}) does not beat the \
                                 stop-loss ({sl}) for this trade direction. Pick another \
                                 percentage (or skip):"
                            ),
                            tp_percent_options(),
                        ));
                    }
                }

                draft.take_profit_price = Some(adjusted);
                debug!(pct = %pct, adjusted = %adjusted, "take-profit set from percentage");
                self.finish_protection(flow, fs).await
            }
            _ => Ok(StepReply::prompt(
                "Pick a take-profit percentage or skip it.",
                tp_percent_options(),
            )),
        }
    }

    /// After the protection step, quick flows execute immediately while the
    /// full trade flow shows the confirmation screen.
    async fn finish_protection(&self, flow: FlowKind, fs: &mut FlowState) -> ChatResult<StepReply> {
        match flow {
            FlowKind::QuickBuy => self.execute(fs).await,
            FlowKind::QuickSell => self.execute_quick_sell(fs).await,
            FlowKind::Trade => self.build_confirmation(fs).await,
        }
    }

    // === Manual SL/TP entry ===

    async fn on_manual_sl(&self, fs: &mut FlowState, action: ChatAction) -> ChatResult<StepReply> {
        let text = match action {
            ChatAction::Text(t) => t,
            _ => {
                return Ok(StepReply::prompt(
                    "Type the stop-loss price (or 0 / /skip).",
                    vec![cancel_option()],
                ))
            }
        };

        let draft = fs
            .draft
            .as_mut()
            .ok_or_else(|| ChatError::Internal("draft missing at manual SL step".to_string()))?;
        let filters = self.filters_for(&draft.pair)?;

        if ChatAction::is_skip_token(&text) {
            draft.stop_loss_price = None;
            fs.warned_sl = None;
            fs.state = TradeState::EnterTpPrice;
            return Ok(StepReply::prompt(
                "Stop-loss skipped.\n\nEnter the take-profit price. Send 0 or /skip to go without one.",
                vec![cancel_option()],
            ));
        }

        let input = match parse_positive_price(&text) {
            Ok(p) => p,
            Err(reason) => {
                return Ok(StepReply::prompt(
                    format!("{reason} Enter the stop-loss price again (or 0 / /skip):"),
                    vec![cancel_option()],
                ))
            }
        };
        if let Err(reason) = check_price_bounds(input, &filters) {
            return Ok(StepReply::prompt(
                format!("{reason} Enter the stop-loss price again (or 0 / /skip):"),
                vec![cancel_option()],
            ));
        }

        // Soft wrong-side check against the live market price: warn once,
        // accept the identical value on resubmission.
        if let Ok(market_price) = self.market.price(&draft.pair).await {
            let wrong_side = match draft.side {
                OrderSide::Buy => input >= market_price,
                OrderSide::Sell => input <= market_price,
            };
            if wrong_side && fs.warned_sl != Some(input) {
                fs.warned_sl = Some(input);
                let relation = match draft.side {
                    OrderSide::Buy => "at or above",
                    OrderSide::Sell => "at or below",
                };
                return Ok(StepReply::prompt(
                    format!(
                        "Warning: a stop-loss of {input} is {relation} the current price \
                         ({market_price}) for a {} order. Send the same value again to keep \
                         it anyway, or a different price / /skip.",
                        draft.side
                    ),
                    vec![cancel_option()],
                ));
            }
        } else {
            warn!(pair = %draft.pair, "no market price for stop-loss sanity check");
        }

        let adjusted = adjust_price(input, &filters);
        draft.stop_loss_price = Some(adjusted);
        fs.warned_sl = None;
        fs.state = TradeState::EnterTpPrice;
        Ok(StepReply::prompt(
            format!(
                "Stop-loss set: {}\n\nEnter the take-profit price. Send 0 or /skip to go without one.",
                format_price_for_wire(adjusted, &filters)
            ),
            vec![cancel_option()],
        ))
    }

    async fn on_manual_tp(&self, fs: &mut FlowState, action: ChatAction) -> ChatResult<StepReply> {
        let text = match action {
            ChatAction::Text(t) => t,
            _ => {
                return Ok(StepReply::prompt(
                    "Type the take-profit price (or 0 / /skip).",
                    vec![cancel_option()],
                ))
            }
        };

        let draft = fs
            .draft
            .as_mut()
            .ok_or_else(|| ChatError::Internal("draft missing at manual TP step".to_string()))?;
        let filters = self.filters_for(&draft.pair)?;

        if ChatAction::is_skip_token(&text) {
            draft.take_profit_price = None;
            fs.warned_tp = None;
            return self.build_confirmation(fs).await;
        }

        let input = match parse_positive_price(&text) {
            Ok(p) => p,
            Err(reason) => {
                return Ok(StepReply::prompt(
                    format!("{reason} Enter the take-profit price again (or 0 / /skip):"),
                    vec![cancel_option()],
                ))
            }
        };
        if let Err(reason) = check_price_bounds(input, &filters) {
            return Ok(StepReply::prompt(
                format!("{reason} Enter the take-profit price again (or 0 / /skip):"),
                vec![cancel_option()],
            ));
        }

        // Soft checks: wrong side of the market, and wrong side of the
        // already-chosen stop-loss. Identical resubmission proceeds.
        let mut warning: Option<String> = None;
        if let Ok(market_price) = self.market.price(&draft.pair).await {
            let wrong_side = match draft.side {
                OrderSide::Buy => input <= market_price,
                OrderSide::Sell => input >= market_price,
            };
            if wrong_side {
                let relation = match draft.side {
                    OrderSide::Buy => "at or below",
                    OrderSide::Sell => "at or above",
                };
                warning = Some(format!(
                    "a take-profit of {input} is {relation} the current price ({market_price}) \
                     for a {} order",
                    draft.side
                ));
            }
        } else {
            warn!(pair = %draft.pair, "no market price for take-profit sanity check");
        }
        if warning.is_none() {
            if let Some(sl) = draft.stop_loss_price {
                if !tp_beats_sl(draft.side, input, sl) {
                    warning = Some(format!(
                        "a take-profit of {input} does not beat the stop-loss ({sl}) for this \
                         trade direction"
                    ));
                }
            }
        }
        if let Some(reason) = warning {
            if fs.warned_tp != Some(input) {
                fs.warned_tp = Some(input);
                return Ok(StepReply::prompt(
                    format!(
                        "Warning: {reason}. Send the same value again to keep it anyway, or a \
                         different price / /skip."
                    ),
                    vec![cancel_option()],
                ));
            }
        }

        let adjusted = adjust_price(input, &filters);
        draft.take_profit_price = Some(adjusted);
        fs.warned_tp = None;
        self.build_confirmation(fs).await
    }

    // === Confirmation & execution ===

    async fn build_confirmation(&self, fs: &mut FlowState) -> ChatResult<StepReply> {
        let draft = fs
            .draft
            .as_ref()
            .ok_or_else(|| ChatError::Internal("draft missing at confirmation".to_string()))?;
        draft
            .ready_for_confirmation()
            .map_err(|e| ChatError::Internal(e.to_string()))?;

        let filters = self.filters_for(&draft.pair)?;

        // The estimated notional is recomputed against a live price; an
        // undersized order ends the conversation rather than re-prompting.
        if filters.min_notional_applies() {
            let price = self.market.price(&draft.pair).await.map_err(|_| {
                ChatError::Stale(format!(
                    "could not verify the minimum order value for {}",
                    draft.pair
                ))
            })?;
            let estimated = draft.adjusted_base_quantity.notional(price);
            if estimated < filters.min_notional {
                return Ok(StepReply::ended(format!(
                    "Order value too small: the minimum for {} is {} and this order is worth \
                     ≈ {estimated:.4}. The operation was cancelled; start again with a larger amount.",
                    draft.pair, filters.min_notional
                )));
            }
        }

        let action_word = match draft.side {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        };
        let mut text = format!(
            "Confirm {action_word} (market order):\n\nPair: {}\nQuantity: {}\nType: Market",
            draft.pair,
            format_quantity_for_wire(draft.adjusted_base_quantity, &filters),
        );
        if let Some(sl) = draft.stop_loss_price {
            text.push_str(&format!(
                "\nStop-loss: {}",
                format_price_for_wire(sl, &filters)
            ));
        }
        if let Some(tp) = draft.take_profit_price {
            text.push_str(&format!(
                "\nTake-profit: {}",
                format_price_for_wire(tp, &filters)
            ));
        }
        text.push_str("\n\nProceed? (Values were adjusted to the exchange constraints.)");

        fs.state = TradeState::Confirm;
        Ok(StepReply::prompt(
            text,
            vec![
                ReplyOption::new("✅ Confirm", ChatAction::Confirm),
                cancel_option(),
            ],
        ))
    }

    async fn on_confirm(&self, fs: &mut FlowState, action: ChatAction) -> ChatResult<StepReply> {
        match action {
            ChatAction::Confirm => self.execute(fs).await,
            _ => Ok(StepReply::prompt(
                "Please confirm or cancel the order.",
                vec![
                    ReplyOption::new("✅ Confirm", ChatAction::Confirm),
                    cancel_option(),
                ],
            )),
        }
    }

    /// Place the market order, then attach protection only if it filled
    /// with a nonzero executed quantity. The conversation ends here no
    /// matter what protection attachment reports.
    async fn execute(&self, fs: &mut FlowState) -> ChatResult<StepReply> {
        let draft = fs
            .draft
            .clone()
            .ok_or_else(|| ChatError::Internal("draft missing at execution".to_string()))?;
        let filters = self.filters_for(&draft.pair)?;

        let report = self
            .orders
            .execute_market(draft.side, &draft.pair, draft.adjusted_base_quantity, &filters)
            .await?;

        let action_word = match draft.side {
            OrderSide::Buy => "Buy",
            OrderSide::Sell => "Sell",
        };
        let mut text = format!(
            "{action_word} executed.\n\nPair: {}\nExecuted quantity: {}\nStatus: {}\nOrder id: {}",
            draft.pair,
            format_quantity_for_wire(report.executed_quantity, &filters),
            report.status,
            report.order_id,
        );
        let avg = report.average_fill_price();
        if avg.is_positive() {
            text.push_str(&format!(
                "\nAverage price: {}",
                format_price_for_wire(avg, &filters)
            ));
        }

        if report.status.is_filled() && report.executed_quantity.is_positive() {
            let status = self
                .orders
                .attach_protection(
                    &draft.pair,
                    draft.side,
                    report.executed_quantity,
                    draft.stop_loss_price,
                    draft.take_profit_price,
                    &filters,
                )
                .await;
            if !status.is_empty() {
                text.push_str(&format!("\n\n{status}"));
            }
        } else if draft.has_protection() {
            text.push_str("\n\nThe market order did not fully fill; protection was skipped.");
        }

        info!(
            pair = %draft.pair,
            side = %draft.side,
            order_id = report.order_id,
            "trade conversation completed"
        );
        Ok(StepReply::ended(text))
    }

    /// Quick-sell places protective exit orders for an existing holding;
    /// there is no primary market order. The draft models the long
    /// position, so attachment's opposite-side legs come out as sells.
    async fn execute_quick_sell(&self, fs: &mut FlowState) -> ChatResult<StepReply> {
        let draft = fs
            .draft
            .clone()
            .ok_or_else(|| ChatError::Internal("draft missing at quick-sell".to_string()))?;
        let filters = self.filters_for(&draft.pair)?;

        if draft.stop_loss_price.is_none() && draft.take_profit_price.is_none() {
            return Ok(StepReply::ended(
                "No stop-loss or take-profit selected; nothing to place.",
            ));
        }

        let status = self
            .orders
            .attach_protection(
                &draft.pair,
                draft.side,
                draft.adjusted_base_quantity,
                draft.stop_loss_price,
                draft.take_profit_price,
                &filters,
            )
            .await;

        Ok(StepReply::ended(format!(
            "Protective exit for {} {}:\n{status}",
            format_quantity_for_wire(draft.adjusted_base_quantity, &filters),
            draft.pair,
        )))
    }

    fn filters_for(&self, pair: &str) -> ChatResult<SymbolFilters> {
        self.market
            .filters(pair)
            .ok_or_else(|| ChatError::Stale(format!("trading constraints for {pair} unavailable")))
    }
}

fn cancel_option() -> ReplyOption {
    ReplyOption::new("❌ Cancel", ChatAction::Cancel)
}

fn protection_options() -> Vec<ReplyOption> {
    vec![
        ReplyOption::new(
            "Enter prices",
            ChatAction::Protection(ProtectionChoice::Manual),
        ),
        ReplyOption::new(
            "By percentage",
            ChatAction::Protection(ProtectionChoice::Percent),
        ),
        ReplyOption::new("No protection", ChatAction::Protection(ProtectionChoice::Skip)),
        cancel_option(),
    ]
}

fn sl_percent_options() -> Vec<ReplyOption> {
    let mut options: Vec<ReplyOption> = SL_PERCENT_PRESETS
        .iter()
        .map(|p| ReplyOption::new(format!("{p}%"), ChatAction::StopLossPercent(*p)))
        .collect();
    options.push(cancel_option());
    options
}

fn tp_percent_options() -> Vec<ReplyOption> {
    let mut options: Vec<ReplyOption> = TP_PERCENT_PRESETS
        .iter()
        .map(|p| ReplyOption::new(format!("{p}%"), ChatAction::TakeProfitPercent(*p)))
        .collect();
    options.push(ReplyOption::new("Skip TP", ChatAction::SkipTakeProfit));
    options.push(cancel_option());
    options
}

fn parse_positive_price(text: &str) -> Result<Price, String> {
    let value = Decimal::from_str(text.trim())
        .map_err(|_| format!("'{}' is not a number.", text.trim()))?;
    if value <= Decimal::ZERO {
        return Err("The price must be positive.".to_string());
    }
    Ok(Price::new(value))
}

fn check_price_bounds(price: Price, filters: &SymbolFilters) -> Result<(), String> {
    if price < filters.min_price {
        return Err(format!(
            "The price ({price}) is below the minimum ({}).",
            filters.min_price
        ));
    }
    if filters.max_price.is_positive() && price > filters.max_price {
        return Err(format!(
            "The price ({price}) is above the maximum ({}).",
            filters.max_price
        ));
    }
    Ok(())
}

fn price_in_filter_bounds(price: Price, filters: &SymbolFilters) -> bool {
    if price < filters.min_price {
        return false;
    }
    if filters.max_price.is_positive() && price > filters.max_price {
        return false;
    }
    if !price.is_positive() && filters.min_price.is_positive() {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::Holding;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use spotbot_core::{ExecutionReport, OrderStatus};
    use std::collections::HashMap;

    struct StubMarket {
        tradable: Vec<String>,
        filters: SymbolFilters,
        prices: HashMap<String, Decimal>,
        holdings: Vec<Holding>,
        free: HashMap<String, Decimal>,
        metadata_down: bool,
    }

    impl Default for StubMarket {
        fn default() -> Self {
            Self {
                tradable: vec!["BTCUSDT".to_string()],
                filters: SymbolFilters {
                    tick_size: Price::new(dec!(0.01)),
                    min_price: Price::new(dec!(0.01)),
                    max_price: Price::new(dec!(1000000)),
                    step_size: Quantity::new(dec!(0.0001)),
                    min_qty: Quantity::new(dec!(0.0001)),
                    max_qty: Quantity::new(dec!(9000)),
                    min_notional: dec!(10),
                    apply_min_notional_to_market: true,
                },
                prices: HashMap::from([("BTCUSDT".to_string(), dec!(25000))]),
                holdings: Vec::new(),
                free: HashMap::from([("USDT".to_string(), dec!(5000))]),
                metadata_down: false,
            }
        }
    }

    #[async_trait]
    impl MarketService for StubMarket {
        async fn ensure_metadata(&self) -> ChatResult<()> {
            if self.metadata_down {
                Err(ChatError::Stale("metadata offline".to_string()))
            } else {
                Ok(())
            }
        }

        fn is_tradable(&self, symbol: &str) -> bool {
            !self.metadata_down && self.tradable.iter().any(|s| s == symbol)
        }

        fn filters(&self, _symbol: &str) -> Option<SymbolFilters> {
            Some(self.filters.clone())
        }

        fn quote_asset(&self, symbol: &str) -> Option<String> {
            symbol.ends_with("USDT").then(|| "USDT".to_string())
        }

        async fn price(&self, symbol: &str) -> ChatResult<Price> {
            self.prices
                .get(symbol)
                .map(|p| Price::new(*p))
                .ok_or_else(|| ChatError::Stale(format!("no price for {symbol}")))
        }

        async fn holdings(&self) -> ChatResult<Vec<Holding>> {
            Ok(self.holdings.clone())
        }

        async fn free_balance(&self, asset: &str) -> ChatResult<Decimal> {
            Ok(self.free.get(asset).copied().unwrap_or(Decimal::ZERO))
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct ProtectionCall {
        pair: String,
        primary_side: OrderSide,
        executed: Quantity,
        sl: Option<Price>,
        tp: Option<Price>,
    }

    struct StubOrders {
        status: OrderStatus,
        fill_ratio: Decimal,
        reject: Option<String>,
        executions: Mutex<Vec<(OrderSide, String, Quantity)>>,
        protections: Mutex<Vec<ProtectionCall>>,
    }

    impl Default for StubOrders {
        fn default() -> Self {
            Self {
                status: OrderStatus::Filled,
                fill_ratio: dec!(1),
                reject: None,
                executions: Mutex::new(Vec::new()),
                protections: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl OrderService for StubOrders {
        async fn execute_market(
            &self,
            side: OrderSide,
            pair: &str,
            quantity: Quantity,
            _filters: &SymbolFilters,
        ) -> ChatResult<ExecutionReport> {
            if let Some(msg) = &self.reject {
                return Err(ChatError::Rejection(msg.clone()));
            }
            self.executions
                .lock()
                .push((side, pair.to_string(), quantity));
            let executed = Quantity::new(quantity.inner() * self.fill_ratio);
            Ok(ExecutionReport {
                order_id: 7,
                status: self.status,
                executed_quantity: executed,
                cumulative_quote: executed.inner() * dec!(25000),
            })
        }

        async fn attach_protection(
            &self,
            pair: &str,
            primary_side: OrderSide,
            executed_quantity: Quantity,
            stop_loss: Option<Price>,
            take_profit: Option<Price>,
            _filters: &SymbolFilters,
        ) -> String {
            if stop_loss.is_none() && take_profit.is_none() {
                return String::new();
            }
            self.protections.lock().push(ProtectionCall {
                pair: pair.to_string(),
                primary_side,
                executed: executed_quantity,
                sl: stop_loss,
                tp: take_profit,
            });
            "combined SL/TP order placed".to_string()
        }
    }

    fn engine(
        market: StubMarket,
        orders: StubOrders,
    ) -> ChatEngine<StubMarket, StubOrders> {
        ChatEngine::new(Arc::new(market), Arc::new(orders))
    }

    fn btc_holding() -> Holding {
        Holding {
            asset: "BTC".to_string(),
            free: Quantity::new(dec!(0.5)),
            price: Price::new(dec!(25000)),
            quote_value: dec!(12500),
        }
    }

    #[tokio::test]
    async fn test_buy_happy_path_with_percent_protection() {
        let eng = engine(StubMarket::default(), StubOrders::default());
        let user = 1;

        let reply = eng.handle(user, FlowKind::Trade, ChatAction::Begin(OrderSide::Buy)).await;
        assert!(!reply.is_ended());
        // Favorites are offered as pair buttons.
        assert!(reply
            .options
            .iter()
            .any(|o| o.action == ChatAction::SelectPair("BTCUSDT".to_string())));

        eng.handle(user, FlowKind::Trade, ChatAction::SelectPair("BTCUSDT".to_string()))
            .await;
        eng.handle(user, FlowKind::Trade, ChatAction::Text("100".to_string()))
            .await;
        eng.handle(
            user,
            FlowKind::Trade,
            ChatAction::Protection(ProtectionChoice::Percent),
        )
        .await;
        eng.handle(user, FlowKind::Trade, ChatAction::StopLossPercent(dec!(5)))
            .await;
        let confirm = eng
            .handle(
                user,
                FlowKind::Trade,
                ChatAction::TakeProfitPercent(dec!(3)),
            )
            .await;
        assert!(!confirm.is_ended());
        assert!(confirm.text.contains("Confirm buy"));
        assert!(confirm
            .options
            .iter()
            .any(|o| o.action == ChatAction::Confirm));

        let done = eng.handle(user, FlowKind::Trade, ChatAction::Confirm).await;
        assert!(done.is_ended());
        assert!(done.text.contains("Buy executed"));
        assert!(done.text.contains("combined SL/TP order placed"));

        // $100 at 25000 converts to 0.004, already on the 0.0001 grid.
        let calls = eng.orders.protections.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].executed, Quantity::new(dec!(0.004)));
        assert_eq!(calls[0].sl, Some(Price::new(dec!(23750))));
        assert_eq!(calls[0].tp, Some(Price::new(dec!(25750))));
        assert_eq!(calls[0].primary_side, OrderSide::Buy);

        // The draft is gone once the conversation ends.
        assert!(eng.sessions().flow(user, FlowKind::Trade).is_none());
    }

    #[tokio::test]
    async fn test_invalid_pair_reprompts_in_place() {
        let eng = engine(StubMarket::default(), StubOrders::default());
        eng.handle(1, FlowKind::Trade, ChatAction::Begin(OrderSide::Buy)).await;

        let reply = eng
            .handle(1, FlowKind::Trade, ChatAction::Text("nopeusdt".to_string()))
            .await;
        assert!(!reply.is_ended());
        assert!(reply.text.contains("not a valid tradable symbol"));
        assert_eq!(
            eng.sessions().flow(1, FlowKind::Trade).unwrap().state,
            TradeState::ChoosePair
        );
    }

    #[tokio::test]
    async fn test_stale_metadata_reprompts_pair_step() {
        let market = StubMarket {
            metadata_down: true,
            ..Default::default()
        };
        let eng = engine(market, StubOrders::default());
        eng.handle(1, FlowKind::Trade, ChatAction::Begin(OrderSide::Buy)).await;

        let reply = eng
            .handle(1, FlowKind::Trade, ChatAction::Text("BTCUSDT".to_string()))
            .await;
        assert!(!reply.is_ended());
        assert!(reply.text.contains("unavailable"));
    }

    #[tokio::test]
    async fn test_amount_over_ceiling_reprompts() {
        let eng = engine(StubMarket::default(), StubOrders::default());
        eng.handle(1, FlowKind::Trade, ChatAction::Begin(OrderSide::Buy)).await;
        eng.handle(1, FlowKind::Trade, ChatAction::SelectPair("BTCUSDT".to_string()))
            .await;

        let reply = eng
            .handle(1, FlowKind::Trade, ChatAction::Text("5000".to_string()))
            .await;
        assert!(reply.text.contains("per-trade buy limit"));
        assert_eq!(
            eng.sessions().flow(1, FlowKind::Trade).unwrap().state,
            TradeState::ChooseAmount
        );
    }

    #[tokio::test]
    async fn test_amount_below_minimum_quantity_reprompts() {
        let mut market = StubMarket::default();
        market.filters.min_qty = Quantity::new(dec!(0.01));
        let eng = engine(market, StubOrders::default());
        eng.handle(1, FlowKind::Trade, ChatAction::Begin(OrderSide::Buy)).await;
        eng.handle(1, FlowKind::Trade, ChatAction::SelectPair("BTCUSDT".to_string()))
            .await;

        // $50 at 25000 is 0.002, below the 0.01 minimum.
        let reply = eng
            .handle(1, FlowKind::Trade, ChatAction::Text("50".to_string()))
            .await;
        assert!(reply.text.contains("minimum quantity"));
        assert_eq!(
            eng.sessions().flow(1, FlowKind::Trade).unwrap().state,
            TradeState::ChooseAmount
        );
    }

    #[tokio::test]
    async fn test_non_numeric_amount_reprompts() {
        let eng = engine(StubMarket::default(), StubOrders::default());
        eng.handle(1, FlowKind::Trade, ChatAction::Begin(OrderSide::Buy)).await;
        eng.handle(1, FlowKind::Trade, ChatAction::SelectPair("BTCUSDT".to_string()))
            .await;

        let reply = eng
            .handle(1, FlowKind::Trade, ChatAction::Text("a lot".to_string()))
            .await;
        assert!(reply.text.contains("is not a number"));
    }

    #[tokio::test]
    async fn test_tp_percent_must_beat_sl_after_adjustment() {
        // A low max-price clamps both SL and TP onto the same cap, so the
        // computed TP cannot beat the SL and must be re-prompted.
        let mut market = StubMarket::default();
        market.filters.max_price = Price::new(dec!(24700));
        let eng = engine(market, StubOrders::default());
        eng.handle(1, FlowKind::Trade, ChatAction::Begin(OrderSide::Buy)).await;
        eng.handle(1, FlowKind::Trade, ChatAction::SelectPair("BTCUSDT".to_string()))
            .await;
        eng.handle(1, FlowKind::Trade, ChatAction::Text("100".to_string()))
            .await;
        eng.handle(
            1,
            FlowKind::Trade,
            ChatAction::Protection(ProtectionChoice::Percent),
        )
        .await;
        eng.handle(1, FlowKind::Trade, ChatAction::StopLossPercent(dec!(1)))
            .await;

        let reply = eng
            .handle(1, FlowKind::Trade, ChatAction::TakeProfitPercent(dec!(3)))
            .await;
        assert!(!reply.is_ended());
        assert!(reply.text.contains("does not beat the stop-loss"));
        assert_eq!(
            eng.sessions().flow(1, FlowKind::Trade).unwrap().state,
            TradeState::ChooseTpPercent
        );

        // Skipping the TP still works from the re-prompted state.
        let confirm = eng
            .handle(1, FlowKind::Trade, ChatAction::SkipTakeProfit)
            .await;
        assert!(confirm.text.contains("Confirm buy"));
    }

    #[tokio::test]
    async fn test_manual_sl_wrong_side_warns_then_accepts_resubmission() {
        let eng = engine(StubMarket::default(), StubOrders::default());
        eng.handle(1, FlowKind::Trade, ChatAction::Begin(OrderSide::Buy)).await;
        eng.handle(1, FlowKind::Trade, ChatAction::SelectPair("BTCUSDT".to_string()))
            .await;
        eng.handle(1, FlowKind::Trade, ChatAction::Text("100".to_string()))
            .await;
        eng.handle(
            1,
            FlowKind::Trade,
            ChatAction::Protection(ProtectionChoice::Manual),
        )
        .await;

        // 26000 is above the market for a BUY stop: warned, state held.
        let warned = eng
            .handle(1, FlowKind::Trade, ChatAction::Text("26000".to_string()))
            .await;
        assert!(warned.text.contains("Warning"));
        assert_eq!(
            eng.sessions().flow(1, FlowKind::Trade).unwrap().state,
            TradeState::EnterSlPrice
        );

        // The identical value resubmitted is taken as confirmation.
        let accepted = eng
            .handle(1, FlowKind::Trade, ChatAction::Text("26000".to_string()))
            .await;
        assert!(accepted.text.contains("Stop-loss set"));
        assert_eq!(
            eng.sessions().flow(1, FlowKind::Trade).unwrap().state,
            TradeState::EnterTpPrice
        );

        // A well-placed TP proceeds to confirmation.
        let confirm = eng
            .handle(1, FlowKind::Trade, ChatAction::Text("27000".to_string()))
            .await;
        assert!(confirm.text.contains("Confirm buy"));
    }

    #[tokio::test]
    async fn test_manual_sl_skip_tokens() {
        let eng = engine(StubMarket::default(), StubOrders::default());
        eng.handle(1, FlowKind::Trade, ChatAction::Begin(OrderSide::Buy)).await;
        eng.handle(1, FlowKind::Trade, ChatAction::SelectPair("BTCUSDT".to_string()))
            .await;
        eng.handle(1, FlowKind::Trade, ChatAction::Text("100".to_string()))
            .await;
        eng.handle(
            1,
            FlowKind::Trade,
            ChatAction::Protection(ProtectionChoice::Manual),
        )
        .await;

        let reply = eng
            .handle(1, FlowKind::Trade, ChatAction::Text("0".to_string()))
            .await;
        assert!(reply.text.contains("Stop-loss skipped"));

        let confirm = eng
            .handle(1, FlowKind::Trade, ChatAction::Text("/skip".to_string()))
            .await;
        assert!(confirm.text.contains("Confirm buy"));
        assert!(!confirm.text.contains("Stop-loss:"));
    }

    #[tokio::test]
    async fn test_min_notional_rejection_ends_conversation() {
        let mut market = StubMarket::default();
        market.filters.min_notional = dec!(60);
        let eng = engine(market, StubOrders::default());
        eng.handle(1, FlowKind::Trade, ChatAction::Begin(OrderSide::Buy)).await;
        eng.handle(1, FlowKind::Trade, ChatAction::SelectPair("BTCUSDT".to_string()))
            .await;
        eng.handle(1, FlowKind::Trade, ChatAction::Text("50".to_string()))
            .await;

        // $50 estimated notional is below the 60 minimum: conversation ends.
        let reply = eng
            .handle(
                1,
                FlowKind::Trade,
                ChatAction::Protection(ProtectionChoice::Skip),
            )
            .await;
        assert!(reply.is_ended());
        assert!(reply.text.contains("Order value too small"));
        assert!(eng.sessions().flow(1, FlowKind::Trade).is_none());
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let eng = engine(StubMarket::default(), StubOrders::default());

        let first = eng.handle(1, FlowKind::Trade, ChatAction::Cancel).await;
        assert!(first.is_ended());
        let second = eng.handle(1, FlowKind::Trade, ChatAction::Cancel).await;
        assert!(second.is_ended());

        // Cancelling mid-flow clears the draft.
        eng.handle(1, FlowKind::Trade, ChatAction::Begin(OrderSide::Buy)).await;
        eng.handle(1, FlowKind::Trade, ChatAction::SelectPair("BTCUSDT".to_string()))
            .await;
        eng.handle(1, FlowKind::Trade, ChatAction::Cancel).await;
        assert!(eng.sessions().flow(1, FlowKind::Trade).is_none());
    }

    #[tokio::test]
    async fn test_restart_discards_previous_draft() {
        let eng = engine(StubMarket::default(), StubOrders::default());
        eng.handle(1, FlowKind::Trade, ChatAction::Begin(OrderSide::Buy)).await;
        eng.handle(1, FlowKind::Trade, ChatAction::SelectPair("BTCUSDT".to_string()))
            .await;
        eng.handle(1, FlowKind::Trade, ChatAction::Text("100".to_string()))
            .await;

        eng.handle(1, FlowKind::Trade, ChatAction::Begin(OrderSide::Buy)).await;
        let fs = eng.sessions().flow(1, FlowKind::Trade).unwrap();
        assert_eq!(fs.state, TradeState::ChoosePair);
        assert!(fs.draft.is_none());
    }

    #[tokio::test]
    async fn test_failed_restart_still_discards_previous_draft() {
        let eng = engine(StubMarket::default(), StubOrders::default());
        eng.handle(1, FlowKind::Trade, ChatAction::Begin(OrderSide::Buy)).await;
        eng.handle(1, FlowKind::Trade, ChatAction::SelectPair("BTCUSDT".to_string()))
            .await;

        // Restarting as a sell ends immediately (no holdings), and the
        // stale buy draft must not survive the restart.
        let reply = eng
            .handle(1, FlowKind::Trade, ChatAction::Begin(OrderSide::Sell))
            .await;
        assert!(reply.is_ended());
        assert!(eng.sessions().flow(1, FlowKind::Trade).is_none());
    }

    #[tokio::test]
    async fn test_partial_fill_skips_protection() {
        let orders = StubOrders {
            status: OrderStatus::PartiallyFilled,
            fill_ratio: dec!(0.5),
            ..Default::default()
        };
        let eng = engine(StubMarket::default(), orders);
        eng.handle(1, FlowKind::Trade, ChatAction::Begin(OrderSide::Buy)).await;
        eng.handle(1, FlowKind::Trade, ChatAction::SelectPair("BTCUSDT".to_string()))
            .await;
        eng.handle(1, FlowKind::Trade, ChatAction::Text("100".to_string()))
            .await;
        eng.handle(
            1,
            FlowKind::Trade,
            ChatAction::Protection(ProtectionChoice::Percent),
        )
        .await;
        eng.handle(1, FlowKind::Trade, ChatAction::StopLossPercent(dec!(5)))
            .await;
        eng.handle(1, FlowKind::Trade, ChatAction::TakeProfitPercent(dec!(3)))
            .await;

        let done = eng.handle(1, FlowKind::Trade, ChatAction::Confirm).await;
        assert!(done.is_ended());
        assert!(done.text.contains("protection was skipped"));
        assert!(eng.orders.protections.lock().is_empty());
    }

    #[tokio::test]
    async fn test_exchange_rejection_ends_and_clears() {
        let orders = StubOrders {
            reject: Some("insufficient balance or the pair is restricted for trading".to_string()),
            ..Default::default()
        };
        let eng = engine(StubMarket::default(), orders);
        eng.handle(1, FlowKind::Trade, ChatAction::Begin(OrderSide::Buy)).await;
        eng.handle(1, FlowKind::Trade, ChatAction::SelectPair("BTCUSDT".to_string()))
            .await;
        eng.handle(1, FlowKind::Trade, ChatAction::Text("100".to_string()))
            .await;
        eng.handle(
            1,
            FlowKind::Trade,
            ChatAction::Protection(ProtectionChoice::Skip),
        )
        .await;

        let done = eng.handle(1, FlowKind::Trade, ChatAction::Confirm).await;
        assert!(done.is_ended());
        assert!(done.text.contains("rejected"));
        assert!(done.text.contains("insufficient balance"));
        assert!(eng.sessions().flow(1, FlowKind::Trade).is_none());
    }

    #[tokio::test]
    async fn test_quick_buy_executes_without_confirmation() {
        let eng = engine(StubMarket::default(), StubOrders::default());
        eng.handle(1, FlowKind::QuickBuy, ChatAction::Begin(OrderSide::Buy)).await;
        eng.handle(
            1,
            FlowKind::QuickBuy,
            ChatAction::SelectPair("BTCUSDT".to_string()),
        )
        .await;
        // Quick buy takes a base quantity, not a quote amount.
        eng.handle(1, FlowKind::QuickBuy, ChatAction::Text("0.5".to_string()))
            .await;
        eng.handle(1, FlowKind::QuickBuy, ChatAction::StopLossPercent(dec!(2)))
            .await;

        let done = eng
            .handle(
                1,
                FlowKind::QuickBuy,
                ChatAction::TakeProfitPercent(dec!(5)),
            )
            .await;
        assert!(done.is_ended());
        assert!(done.text.contains("Buy executed"));

        let executions = eng.orders.executions.lock();
        assert_eq!(executions.len(), 1);
        assert_eq!(executions[0].2, Quantity::new(dec!(0.5)));
    }

    #[tokio::test]
    async fn test_sell_all_flow() {
        let market = StubMarket {
            holdings: vec![btc_holding()],
            free: HashMap::from([
                ("USDT".to_string(), dec!(5000)),
                ("BTC".to_string(), dec!(0.5)),
            ]),
            ..Default::default()
        };
        let eng = engine(market, StubOrders::default());

        let listing = eng
            .handle(1, FlowKind::Trade, ChatAction::Begin(OrderSide::Sell))
            .await;
        assert!(listing
            .options
            .iter()
            .any(|o| o.action == ChatAction::SelectAsset("BTC".to_string())));

        eng.handle(1, FlowKind::Trade, ChatAction::SelectAsset("BTC".to_string()))
            .await;
        eng.handle(1, FlowKind::Trade, ChatAction::SellAll).await;
        eng.handle(
            1,
            FlowKind::Trade,
            ChatAction::Protection(ProtectionChoice::Skip),
        )
        .await;

        let done = eng.handle(1, FlowKind::Trade, ChatAction::Confirm).await;
        assert!(done.is_ended());
        assert!(done.text.contains("Sell executed"));

        let executions = eng.orders.executions.lock();
        assert_eq!(executions[0].0, OrderSide::Sell);
        assert_eq!(executions[0].1, "BTCUSDT");
        assert_eq!(executions[0].2, Quantity::new(dec!(0.5)));
    }

    #[tokio::test]
    async fn test_sell_partial_rejects_over_balance_value() {
        let market = StubMarket {
            holdings: vec![btc_holding()],
            free: HashMap::from([
                ("USDT".to_string(), dec!(5000)),
                ("BTC".to_string(), dec!(0.5)),
            ]),
            ..Default::default()
        };
        let eng = engine(market, StubOrders::default());
        eng.handle(1, FlowKind::Trade, ChatAction::Begin(OrderSide::Sell)).await;
        eng.handle(1, FlowKind::Trade, ChatAction::SelectAsset("BTC".to_string()))
            .await;
        eng.handle(1, FlowKind::Trade, ChatAction::SellPartial).await;

        // 0.5 BTC at 25000 is worth 12500; asking for 20000 must re-prompt.
        let reply = eng
            .handle(1, FlowKind::Trade, ChatAction::Text("20000".to_string()))
            .await;
        assert!(reply.text.contains("exceeds the available balance"));
        assert_eq!(
            eng.sessions().flow(1, FlowKind::Trade).unwrap().state,
            TradeState::ChooseAmount
        );
    }

    #[tokio::test]
    async fn test_quick_sell_places_protective_exit() {
        let market = StubMarket {
            holdings: vec![btc_holding()],
            free: HashMap::from([("BTC".to_string(), dec!(0.5))]),
            ..Default::default()
        };
        let eng = engine(market, StubOrders::default());

        eng.handle(1, FlowKind::QuickSell, ChatAction::Begin(OrderSide::Sell)).await;
        eng.handle(
            1,
            FlowKind::QuickSell,
            ChatAction::SelectAsset("BTC".to_string()),
        )
        .await;
        eng.handle(1, FlowKind::QuickSell, ChatAction::StopLossPercent(dec!(2)))
            .await;

        let done = eng
            .handle(
                1,
                FlowKind::QuickSell,
                ChatAction::TakeProfitPercent(dec!(5)),
            )
            .await;
        assert!(done.is_ended());
        assert!(done.text.contains("Protective exit"));

        // No market order; the draft models the long holding, so the legs
        // come out as sells with the stop below the market and the target
        // above it: 25000 * 0.98 and 25000 * 1.05.
        assert!(eng.orders.executions.lock().is_empty());
        let calls = eng.orders.protections.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].primary_side, OrderSide::Buy);
        assert_eq!(calls[0].sl, Some(Price::new(dec!(24500))));
        assert_eq!(calls[0].tp, Some(Price::new(dec!(26250))));
    }

    #[tokio::test]
    async fn test_action_without_active_flow() {
        let eng = engine(StubMarket::default(), StubOrders::default());
        let reply = eng
            .handle(1, FlowKind::Trade, ChatAction::Text("100".to_string()))
            .await;
        assert!(reply.is_ended());
        assert!(reply.text.contains("No active operation"));
    }
}

