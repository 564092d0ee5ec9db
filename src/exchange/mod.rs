//! Exchange capability layer.
//!
//! The trading core never talks HTTP; it consumes a venue through the
//! [`ExchangeClient`] trait. Real clients (authentication, signing, JSON
//! decoding) live outside this crate; [`MockExchange`] is the in-tree
//! implementation used by tests and paper runs.

pub mod mock;
mod traits;
mod types;

pub use mock::MockExchange;
pub use traits::{ExchangeClient, ExchangeError, QuoteStyle, Venue};
pub use types::{OpenOrder, OrderSide, PlacedOrder};
