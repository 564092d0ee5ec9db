//! Moving-average crossover signal engine.
//!
//! One engine serves every venue: venue differences are the
//! [`ExchangeClient`] capability and the instrument's [`QuoteStyle`].
//! Per cycle and instrument the engine ingests one price sample, computes
//! the short/long moving averages over the most recent samples, and acts on
//! golden/dead crossovers. The stored cross state makes regime detection
//! idempotent: re-observing the same regime is a no-op.

use crate::exchange::{ExchangeClient, OrderSide};
use crate::persistence::{CrossState, Instrument, TradeStore, Transaction};
use crate::strategy::sizing::{normalize, SizeRejection};
use crate::utils::decimal::{mean_of_latest, safe_div};
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, info, warn};

/// What the engine did for one instrument this cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalOutcome {
    /// Fewer than `long_term + 1` samples; no evaluation took place.
    InsufficientHistory,
    /// Averages computed, no regime transition.
    NoCross,
    /// Golden cross detected but an order is already resting on the venue.
    OpenOrderGuard,
    /// Golden cross detected but the sized quantity was not exchange-legal.
    BuyRejected(SizeRejection),
    /// Buy submitted and recorded.
    Entered { order_id: String },
    /// Dead cross with nothing to liquidate; state advanced without an order.
    ExitedFlat,
    /// Sell submitted and recorded.
    Exited { order_id: String },
}

/// Crossover state machine over one exchange and the trade store.
pub struct SignalEngine<'a, E: ExchangeClient> {
    exchange: &'a E,
    store: &'a TradeStore,
}

impl<'a, E: ExchangeClient> SignalEngine<'a, E> {
    pub fn new(exchange: &'a E, store: &'a TradeStore) -> Self {
        Self { exchange, store }
    }

    /// Run one evaluation step for an instrument.
    ///
    /// Venue calls always precede ledger writes, so a persistence failure
    /// after a successful venue call is the only inconsistency window and
    /// the next reconciliation pass repairs it.
    pub async fn evaluate(&self, instrument: &Instrument) -> Result<SignalOutcome> {
        let market = &instrument.market;
        let symbol = &instrument.symbol;

        let quoted = self.exchange.current_price(symbol).await?;
        // Crossover math runs in the internal orientation so the comparison
        // is identical for direct and inverted quoting.
        let internal = instrument.quote_style.to_internal(quoted);

        self.store
            .append_price(market, symbol, internal)
            .context("recording price sample")?;

        // Floor of three samples keeps the upward-run lookback in bounds
        // even for degenerate window configurations.
        let needed = (instrument.long_term as usize + 1).max(3);
        let prices = self
            .store
            .recent_prices(market, symbol, needed as u32)
            .context("loading recent prices")?;
        if prices.len() < needed {
            debug!(
                %symbol,
                have = prices.len(),
                need = needed,
                "Insufficient history, skipping evaluation"
            );
            return Ok(SignalOutcome::InsufficientHistory);
        }

        let short_ma = mean_of_latest(&prices, instrument.short_term as usize)
            .context("short window exceeds history")?;
        let long_ma = mean_of_latest(&prices, instrument.long_term as usize)
            .context("long window exceeds history")?;

        // Re-read: reconciliation may have reset the state earlier this cycle.
        let cross_state = self.store.cross_state(market, symbol)?;

        let upward_run = prices[0] > prices[1] && prices[1] > prices[2];
        let golden = short_ma > long_ma
            && internal >= short_ma
            && upward_run
            && cross_state != Some(CrossState::Golden);
        let dead = short_ma < long_ma
            && internal <= short_ma
            && cross_state != Some(CrossState::Dead);

        if golden {
            self.enter_long(instrument, quoted).await
        } else if dead {
            self.exit_long(instrument, quoted).await
        } else {
            debug!(
                %symbol,
                %short_ma,
                %long_ma,
                price = %internal,
                state = ?cross_state,
                "No crossover"
            );
            Ok(SignalOutcome::NoCross)
        }
    }

    /// Golden cross: size a buy from the quote balance and submit it.
    async fn enter_long(&self, instrument: &Instrument, quoted: Decimal) -> Result<SignalOutcome> {
        let symbol = &instrument.symbol;

        // Never stack a second order while one is still resting.
        let open = self.exchange.open_orders(Some(symbol)).await?;
        if open.iter().any(|o| o.side == OrderSide::Buy) {
            info!(%symbol, "Golden cross but a buy order is already open, skipping");
            return Ok(SignalOutcome::OpenOrderGuard);
        }

        let quote_balance = self.exchange.balance(&instrument.quote_asset).await?;
        let spend = quote_balance * instrument.risk_percent / dec!(100);
        let desired = safe_div(spend, quoted);

        let quantity = match normalize(
            desired,
            instrument.step_size,
            instrument.min_qty,
            instrument.min_notional,
            quoted,
        ) {
            Ok(qty) => qty,
            Err(rejection) => {
                info!(%symbol, %desired, %rejection, "Buy quantity not exchange-legal, skipping");
                return Ok(SignalOutcome::BuyRejected(rejection));
            }
        };

        let order_id = self
            .exchange
            .create_order(symbol, OrderSide::Buy, quantity, quoted)
            .await?;
        info!(%symbol, %quantity, price = %quoted, order_id, "Golden cross: buy submitted");

        self.store.insert_transaction(&Transaction {
            market: instrument.market.clone(),
            symbol: symbol.clone(),
            side: OrderSide::Buy,
            quantity,
            price_per_unit: quoted,
            total_amount: quantity * quoted,
            order_id: order_id.clone(),
            active: true,
        })?;
        self.store
            .set_cross_state(&instrument.market, symbol, Some(CrossState::Golden))?;

        Ok(SignalOutcome::Entered { order_id })
    }

    /// Dead cross: cancel anything resting, then liquidate the held balance.
    async fn exit_long(&self, instrument: &Instrument, quoted: Decimal) -> Result<SignalOutcome> {
        let symbol = &instrument.symbol;

        for order in self.exchange.open_orders(Some(symbol)).await? {
            match self.exchange.cancel_order(symbol, &order.order_id).await {
                Ok(()) => {
                    if let Err(e) = self.store.deactivate_transaction(&order.order_id) {
                        debug!(order_id = %order.order_id, error = %e, "No ledger row for cancelled order");
                    }
                }
                Err(e) => {
                    warn!(%symbol, order_id = %order.order_id, error = %e, "Cancel failed during exit");
                }
            }
        }

        let held = self.exchange.balance(&instrument.base_asset).await?;
        let quantity = match normalize(
            held,
            instrument.step_size,
            instrument.min_qty,
            instrument.min_notional,
            quoted,
        ) {
            Ok(qty) => qty,
            Err(rejection) => {
                // Nothing sellable, but the regime transition must still be
                // recorded or the dead cross re-fires every cycle.
                info!(%symbol, %held, %rejection, "Dead cross with no sellable balance");
                self.store
                    .set_cross_state(&instrument.market, symbol, Some(CrossState::Dead))?;
                return Ok(SignalOutcome::ExitedFlat);
            }
        };

        let order_id = self
            .exchange
            .create_order(symbol, OrderSide::Sell, quantity, quoted)
            .await?;
        info!(%symbol, %quantity, price = %quoted, order_id, "Dead cross: sell submitted");

        self.store.insert_transaction(&Transaction {
            market: instrument.market.clone(),
            symbol: symbol.clone(),
            side: OrderSide::Sell,
            quantity,
            price_per_unit: quoted,
            total_amount: quantity * quoted,
            order_id: order_id.clone(),
            active: true,
        })?;
        self.store
            .set_cross_state(&instrument.market, symbol, Some(CrossState::Dead))?;

        Ok(SignalOutcome::Exited { order_id })
    }
}
