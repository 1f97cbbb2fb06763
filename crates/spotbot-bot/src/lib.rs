//! spotbot application: configuration, wiring, and the console transport.
//!
//! Assembles the exchange client, caches, executor and conversation engine,
//! then drives them from a line-based console transport. The conversation
//! engine itself is transport-agnostic; this crate is the only place that
//! knows about stdin/stdout.

pub mod app;
pub mod config;
pub mod error;
pub mod services;
pub mod transport;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
