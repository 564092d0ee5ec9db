//! Offline grid search for moving-average window pairs.
//!
//! For every candidate (short, long) pair the full price history is replayed
//! through the same crossover state machine the live engine runs, trading
//! all-in/all-out from a fixed starting balance. The pair with the highest
//! terminal mark-to-market balance becomes the instrument's new windows.
//!
//! O(pairs x series length) batch work; runs on demand, never on the
//! per-cycle hot path.

use crate::persistence::{CrossState, Instrument, TradeStore};
use anyhow::Result;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::ops::RangeInclusive;
use tracing::{debug, info};

/// Notional cash every simulation starts from.
pub const SIM_STARTING_CASH: Decimal = dec!(1000000);

/// Candidate window ranges. Long windows are stepped coarsely; the fine
/// granularity buys nothing at that horizon.
#[derive(Debug, Clone)]
pub struct WindowGrid {
    pub short: RangeInclusive<u32>,
    pub long: RangeInclusive<u32>,
    pub long_step: u32,
}

impl Default for WindowGrid {
    fn default() -> Self {
        Self {
            short: 1..=40,
            long: 30..=250,
            long_step: 5,
        }
    }
}

/// Winning pair and the simulated terminal balance that selected it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimalWindows {
    pub short_term: u32,
    pub long_term: u32,
    pub score: Decimal,
}

/// Rolling simple moving average, oldest-first input. The first
/// `window - 1` slots are `None`.
fn moving_averages(prices: &[Decimal], window: usize) -> Vec<Option<Decimal>> {
    let mut out = vec![None; prices.len()];
    if window == 0 || prices.len() < window {
        return out;
    }
    let divisor = Decimal::from(window as u64);
    let mut sum: Decimal = prices[..window].iter().copied().sum();
    out[window - 1] = Some(sum / divisor);
    for i in window..prices.len() {
        sum += prices[i] - prices[i - window];
        out[i] = Some(sum / divisor);
    }
    out
}

/// Replay the series through the crossover state machine, all-in on golden
/// cross, all-out on dead cross. Returns the terminal balance with any open
/// position marked to the final price.
pub fn simulate(prices: &[Decimal], short: usize, long: usize) -> Decimal {
    let short_ma = moving_averages(prices, short);
    let long_ma = moving_averages(prices, long);

    let mut cash = SIM_STARTING_CASH;
    let mut holdings = Decimal::ZERO;
    let mut state: Option<CrossState> = None;

    for i in 2..prices.len() {
        let (Some(s), Some(l)) = (short_ma[i], long_ma[i]) else {
            continue;
        };
        let price = prices[i];
        let upward_run = prices[i] > prices[i - 1] && prices[i - 1] > prices[i - 2];

        if s > l && price >= s && upward_run && state != Some(CrossState::Golden) {
            if cash > Decimal::ZERO && price > Decimal::ZERO {
                holdings += cash / price;
                cash = Decimal::ZERO;
            }
            state = Some(CrossState::Golden);
        } else if s < l && price <= s && state != Some(CrossState::Dead) {
            if holdings > Decimal::ZERO {
                cash += holdings * price;
                holdings = Decimal::ZERO;
            }
            state = Some(CrossState::Dead);
        }
    }

    let last = prices.last().copied().unwrap_or_default();
    cash + holdings * last
}

/// Grid-search the best window pair for a price series.
///
/// Pairs whose long window does not leave at least one sample of headroom
/// are skipped; ties keep the first (smallest) pair found.
pub fn best_windows(prices: &[Decimal], grid: &WindowGrid) -> Option<OptimalWindows> {
    let mut best: Option<OptimalWindows> = None;

    let mut long = *grid.long.start();
    while long <= *grid.long.end() {
        if (prices.len() as u32) > long {
            for short in grid.short.clone() {
                if short >= long {
                    break;
                }
                let score = simulate(prices, short as usize, long as usize);
                if best.as_ref().map_or(true, |b| score > b.score) {
                    best = Some(OptimalWindows {
                        short_term: short,
                        long_term: long,
                        score,
                    });
                }
            }
        }
        long += grid.long_step.max(1);
    }

    best
}

/// Runs the grid search over stored history and persists the winners.
pub struct Optimizer<'a> {
    store: &'a TradeStore,
    grid: WindowGrid,
}

impl<'a> Optimizer<'a> {
    pub fn new(store: &'a TradeStore) -> Self {
        Self {
            store,
            grid: WindowGrid::default(),
        }
    }

    pub fn with_grid(store: &'a TradeStore, grid: WindowGrid) -> Self {
        Self { store, grid }
    }

    /// Optimize one instrument's windows from its full stored history.
    /// Returns `None` (and leaves the instrument untouched) when the history
    /// is too short for even the smallest long window.
    pub fn optimize_instrument(&self, instrument: &Instrument) -> Result<Option<OptimalWindows>> {
        let prices = self
            .store
            .all_prices(&instrument.market, &instrument.symbol)?;

        let Some(result) = best_windows(&prices, &self.grid) else {
            debug!(
                symbol = %instrument.symbol,
                samples = prices.len(),
                "Not enough history to optimize windows"
            );
            return Ok(None);
        };

        self.store.set_instrument_windows(
            &instrument.market,
            &instrument.symbol,
            result.short_term,
            result.long_term,
        )?;
        info!(
            symbol = %instrument.symbol,
            short = result.short_term,
            long = result.long_term,
            score = %result.score,
            "Window pair updated from grid search"
        );
        Ok(Some(result))
    }
}
