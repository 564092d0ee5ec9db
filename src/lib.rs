//! # MA Cross Trader
//!
//! A moving-average crossover trading core: per-instrument signal state
//! machine, open-order reconciliation, durable transaction ledger, and an
//! offline window-pair optimizer.
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `exchange`: Venue capability trait plus the in-tree mock venue
//! - `strategy`: Crossover signals, order sizing, reconciliation
//! - `optimizer`: Grid search over averaging-window pairs
//! - `persistence`: SQLite-backed instruments, price history and ledger
//! - `trader`: Cycle driver tying the pieces together
//! - `utils`: Shared decimal arithmetic

pub mod config;
pub mod exchange;
pub mod optimizer;
pub mod persistence;
pub mod strategy;
pub mod trader;
pub mod utils;

pub use config::Config;
