//! Cycle driver: reconciliation pass, then one paced signal pass per
//! instrument. Both entry points are idempotent and safe to re-invoke.

use crate::exchange::{ExchangeClient, ExchangeError};
use crate::optimizer::Optimizer;
use crate::persistence::TradeStore;
use crate::strategy::{Reconciler, SignalEngine, SignalOutcome};
use anyhow::Result;
use std::time::Duration;
use tracing::{error, info, warn};

/// Transient venue errors are retried by the next cycle and only warrant a
/// warning; anything else is a real fault.
fn is_transient(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<ExchangeError>()
        .is_some_and(ExchangeError::is_transient)
}

/// Counters from one trading cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub instruments: usize,
    pub reconciled: usize,
    pub entered: usize,
    pub exited: usize,
    pub failed: usize,
}

/// Owns the venue client and store, drives one market's instruments.
pub struct Trader<E: ExchangeClient> {
    exchange: E,
    store: TradeStore,
    /// Delay between instruments inside a cycle, for venue rate limits.
    pace: Duration,
}

impl<E: ExchangeClient> Trader<E> {
    pub fn new(exchange: E, store: TradeStore, pace: Duration) -> Self {
        Self {
            exchange,
            store,
            pace,
        }
    }

    pub fn store(&self) -> &TradeStore {
        &self.store
    }

    pub fn exchange(&self) -> &E {
        &self.exchange
    }

    /// One full cycle for a market: repair resting orders, then evaluate
    /// each active instrument in seeding order.
    ///
    /// Per-instrument failures are logged and counted, never propagated;
    /// only store access for the instrument list itself aborts the cycle.
    pub async fn run_trading_cycle(&self, market: &str) -> Result<CycleReport> {
        let instruments = self.store.active_instruments(market)?;
        let mut report = CycleReport {
            instruments: instruments.len(),
            ..Default::default()
        };
        if instruments.is_empty() {
            warn!(market, "No active instruments configured");
            return Ok(report);
        }

        let reconciler = Reconciler::new(&self.exchange, &self.store);
        for instrument in &instruments {
            match reconciler.reconcile(instrument).await {
                Ok(outcomes) => report.reconciled += outcomes.len(),
                Err(e) => {
                    report.failed += 1;
                    if is_transient(&e) {
                        warn!(symbol = %instrument.symbol, error = %e, "Reconciliation skipped on transient venue error");
                    } else {
                        error!(symbol = %instrument.symbol, error = %e, "Reconciliation pass failed");
                    }
                }
            }
        }

        let engine = SignalEngine::new(&self.exchange, &self.store);
        for (i, instrument) in instruments.iter().enumerate() {
            if i > 0 && !self.pace.is_zero() {
                tokio::time::sleep(self.pace).await;
            }
            match engine.evaluate(instrument).await {
                Ok(SignalOutcome::Entered { .. }) => report.entered += 1,
                Ok(SignalOutcome::Exited { .. }) | Ok(SignalOutcome::ExitedFlat) => {
                    report.exited += 1
                }
                Ok(_) => {}
                Err(e) => {
                    report.failed += 1;
                    if is_transient(&e) {
                        warn!(symbol = %instrument.symbol, error = %e, "Signal step skipped on transient venue error");
                    } else {
                        error!(symbol = %instrument.symbol, error = %e, "Signal evaluation failed");
                    }
                }
            }
        }

        info!(
            market,
            venue = %self.exchange.venue(),
            instruments = report.instruments,
            reconciled = report.reconciled,
            entered = report.entered,
            exited = report.exited,
            failed = report.failed,
            "Trading cycle complete"
        );
        Ok(report)
    }

    /// Re-fit every active instrument's window pair from stored history.
    /// Returns how many instruments were updated.
    pub async fn run_parameter_optimization(&self, market: &str) -> Result<usize> {
        let instruments = self.store.active_instruments(market)?;
        let optimizer = Optimizer::new(&self.store);
        let mut updated = 0;
        for instrument in &instruments {
            match optimizer.optimize_instrument(instrument) {
                Ok(Some(_)) => updated += 1,
                Ok(None) => {}
                Err(e) => {
                    warn!(symbol = %instrument.symbol, error = %e, "Window optimization failed");
                }
            }
        }
        info!(market, updated, total = instruments.len(), "Parameter optimization complete");
        Ok(updated)
    }
}
