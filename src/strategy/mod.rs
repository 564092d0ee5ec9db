//! Trading strategy: crossover signals, order sizing and reconciliation.

pub mod reconcile;
pub mod signal;
pub mod sizing;

pub use reconcile::{ReconcileOutcome, Reconciler};
pub use signal::{SignalEngine, SignalOutcome};
pub use sizing::{normalize, SizeRejection};
