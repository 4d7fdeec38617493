//! Synthetic Market Simulation Engine
//!
//! Bounded random-walk daily prices, a rolling two-week history window,
//! and buy/sell execution with a per-member point ledger kept consistent
//! under concurrent access.

pub mod error;
pub mod history;
pub mod ledger;
pub mod position;
pub mod price_gen;
pub mod scheduler;

pub use error::MarketError;
pub use history::PriceHistoryStore;
pub use ledger::TradeLedger;
