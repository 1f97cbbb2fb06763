//! Application wiring and the console event loop.
//!
//! Assembles the REST client, the shared metadata and ticker caches, the
//! trade executor and the conversation engine, then multiplexes console
//! input against the periodic price-move alert check. Each line of input
//! is one interaction: a slash command, a numbered option pick, or free
//! text for the step the focused conversation is waiting on.

use crate::config::AppConfig;
use crate::error::AppResult;
use crate::services::{LiveMarket, LiveOrders};
use crate::transport::{self, ConsoleCommand};
use rust_decimal::Decimal;
use spotbot_chat::{ChatAction, ChatEngine, FlowKind, ReplyOption, UserId};
use spotbot_core::OrderSide;
use spotbot_exchange::{AccountService, MetadataCache, RestClient, TickerCache};
use spotbot_executor::TradeExecutor;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

/// The single user behind the console transport.
const CONSOLE_USER: UserId = 1;

/// Main application.
pub struct Application {
    config: AppConfig,
    client: Arc<RestClient>,
    metadata: Arc<MetadataCache>,
    account: Arc<AccountService>,
    engine: ChatEngine<LiveMarket, LiveOrders>,
    /// The flow free-text input is routed to, if any.
    focused: Option<FlowKind>,
    /// Options of the last prompt, for numbered selection.
    last_options: Vec<ReplyOption>,
}

impl Application {
    /// Wire up all components from the configuration.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let (api_key, api_secret) = config.exchange.credentials()?;
        let client = Arc::new(RestClient::new(
            &config.exchange.base_url,
            api_key,
            api_secret,
        )?);

        let metadata = Arc::new(MetadataCache::with_max_age(
            client.clone(),
            config.cache.metadata_max_age(),
        ));
        let tickers = Arc::new(TickerCache::with_ttl(
            client.clone(),
            config.cache.ticker_ttl(),
        ));
        let account = Arc::new(AccountService::new(client.clone(), tickers.clone()));

        let market = Arc::new(LiveMarket::new(
            metadata.clone(),
            tickers,
            account.clone(),
        ));
        let orders = Arc::new(LiveOrders::new(TradeExecutor::new(client.clone())));
        let engine = ChatEngine::new(market, orders);

        Ok(Self {
            config,
            client,
            metadata,
            account,
            engine,
            focused: None,
            last_options: Vec::new(),
        })
    }

    /// Run until the user quits or stdin closes.
    pub async fn run(mut self) -> AppResult<()> {
        if let Err(err) = self.metadata.ensure_fresh().await {
            warn!(error = %err, "initial metadata refresh failed, will retry on demand");
        }

        println!("{}", transport::HELP_TEXT);

        let stdin = BufReader::new(tokio::io::stdin());
        let mut lines = stdin.lines();
        let mut alert_timer = tokio::time::interval(self.config.alerts.check_interval());
        alert_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    match line? {
                        Some(line) => {
                            if !self.handle_line(line.trim()).await {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = alert_timer.tick() => self.check_alerts().await,
            }
        }

        info!("console transport closed");
        Ok(())
    }

    /// Handle one input line. Returns false when the user quits.
    async fn handle_line(&mut self, line: &str) -> bool {
        if line.is_empty() {
            return true;
        }

        if let Some(command) = transport::parse_command(line) {
            return self.handle_command(command).await;
        }

        match self.focused {
            Some(kind) => {
                let action = transport::select_action(line, &self.last_options);
                self.step(kind, action).await;
            }
            None => println!("No operation in progress. Type /help for commands."),
        }
        true
    }

    async fn handle_command(&mut self, command: ConsoleCommand) -> bool {
        match command {
            ConsoleCommand::Buy => {
                self.step(FlowKind::Trade, ChatAction::Begin(OrderSide::Buy))
                    .await
            }
            ConsoleCommand::Sell => {
                self.step(FlowKind::Trade, ChatAction::Begin(OrderSide::Sell))
                    .await
            }
            ConsoleCommand::QuickBuy => {
                self.step(FlowKind::QuickBuy, ChatAction::Begin(OrderSide::Buy))
                    .await
            }
            ConsoleCommand::QuickSell => {
                self.step(FlowKind::QuickSell, ChatAction::Begin(OrderSide::Sell))
                    .await
            }
            ConsoleCommand::Cancel => {
                let kind = self.focused.unwrap_or(FlowKind::Trade);
                self.step(kind, ChatAction::Cancel).await;
            }
            ConsoleCommand::Balances => self.show_balances().await,
            ConsoleCommand::History(symbol) => self.show_history(&symbol).await,
            ConsoleCommand::OpenOrders => self.show_open_orders().await,
            ConsoleCommand::Watch(symbol) => {
                let added = self
                    .engine
                    .sessions()
                    .with_settings_mut(CONSOLE_USER, |s| s.alerts.watch(&symbol));
                if added {
                    println!("Watching {symbol} for price moves.");
                } else {
                    println!("{symbol} is already on the watch list.");
                }
            }
            ConsoleCommand::Unwatch(symbol) => {
                let removed = self
                    .engine
                    .sessions()
                    .with_settings_mut(CONSOLE_USER, |s| s.alerts.unwatch(&symbol));
                if removed {
                    println!("Stopped watching {symbol}.");
                } else {
                    println!("{symbol} was not on the watch list.");
                }
            }
            ConsoleCommand::AlertsOn => {
                self.engine
                    .sessions()
                    .with_settings_mut(CONSOLE_USER, |s| s.alerts.config.enabled = true);
                println!("Price-move alerts enabled.");
            }
            ConsoleCommand::AlertsOff => {
                self.engine
                    .sessions()
                    .with_settings_mut(CONSOLE_USER, |s| s.alerts.config.enabled = false);
                println!("Price-move alerts disabled.");
            }
            ConsoleCommand::Help => println!("{}", transport::HELP_TEXT),
            ConsoleCommand::Quit => return false,
        }
        true
    }

    /// Advance one flow by one action and show the result.
    async fn step(&mut self, kind: FlowKind, action: ChatAction) {
        let reply = self.engine.handle(CONSOLE_USER, kind, action).await;
        println!("{}", transport::render_reply(&reply));
        if reply.is_ended() {
            self.focused = None;
            self.last_options.clear();
        } else {
            self.focused = Some(kind);
            self.last_options = reply.options;
        }
    }

    async fn show_balances(&self) {
        match self.account.significant_balances().await {
            Ok(views) if views.is_empty() => println!("No significant balances."),
            Ok(views) => {
                println!("Balances (values estimated in USDT):");
                for v in views {
                    println!(
                        "  {:<8} free {:<18} locked {:<18} ≈ {:.2}",
                        v.asset, v.free, v.locked, v.quote_value
                    );
                }
            }
            Err(err) => println!("Could not fetch balances: {err}"),
        }
    }

    async fn show_history(&self, symbol: &str) {
        match self.client.all_my_trades(symbol).await {
            Ok(trades) if trades.is_empty() => println!("No trades recorded for {symbol}."),
            Ok(trades) => {
                println!("{} trades for {symbol}, most recent last:", trades.len());
                for t in trades.iter().rev().take(10).rev() {
                    let when = chrono::DateTime::from_timestamp_millis(t.time)
                        .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_else(|| t.time.to_string());
                    let side = if t.is_buyer { "BUY" } else { "SELL" };
                    println!(
                        "  {when}  {side:<4} {} @ {} (value {})",
                        t.qty, t.price, t.quote_qty
                    );
                }
            }
            Err(err) => println!("Could not fetch trade history: {err}"),
        }
    }

    async fn show_open_orders(&self) {
        match self.client.open_orders(None).await {
            Ok(orders) if orders.is_empty() => println!("No open orders."),
            Ok(orders) => {
                for o in orders {
                    println!(
                        "  #{} {} {} {} {} @ {} (status {})",
                        o.order_id, o.symbol, o.side, o.order_type, o.orig_qty, o.price, o.status
                    );
                }
            }
            Err(err) => println!("Could not fetch open orders: {err}"),
        }
    }

    /// Evaluate the watch list against 24h changes and print fired alerts.
    async fn check_alerts(&self) {
        let armed = {
            let settings = self.engine.sessions().settings(CONSOLE_USER);
            settings.alerts.config.enabled && !settings.alerts.watched.is_empty()
        };
        if !armed {
            return;
        }

        let tickers = match self.client.all_tickers_24h().await {
            Ok(t) => t,
            Err(err) => {
                warn!(error = %err, "alert check skipped, 24h tickers unavailable");
                return;
            }
        };
        let changes: HashMap<String, Decimal> = tickers
            .into_iter()
            .map(|t| (t.symbol, t.price_change_percent))
            .collect();

        let events = self
            .engine
            .sessions()
            .with_settings_mut(CONSOLE_USER, |s| {
                s.alerts.evaluate(&changes, chrono::Utc::now())
            });
        for event in events {
            println!(
                "Price alert: {} moved {}% over the last 24h.",
                event.symbol, event.change_pct
            );
        }
    }
}
