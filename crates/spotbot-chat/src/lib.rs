//! Trade conversation state machine for spotbot.
//!
//! A per-user, per-flow sequence of steps that accumulates a `TradeDraft`
//! and validates at every step, decoupled from any chat transport: the
//! machine consumes typed `ChatAction`s and produces typed `StepReply`s,
//! while the menu/keyboard layer and the exchange live behind traits.

pub mod action;
pub mod alerts;
pub mod error;
pub mod flow;
pub mod reply;
pub mod services;
pub mod session;

pub use action::{ChatAction, ProtectionChoice};
pub use alerts::{AlertConfig, AlertEvent, AlertState};
pub use error::{ChatError, ChatResult};
pub use flow::ChatEngine;
pub use reply::{ReplyOption, StepOutcome, StepReply};
pub use services::{Holding, MarketService, OrderService};
pub use session::{FlowKind, FlowState, SessionStore, TradeState, UserId, UserSettings};
