//! Open-order reconciliation.
//!
//! Limit orders drift away from the market between cycles. Before the
//! signal pass, every resting order is checked against the current price:
//! still-correct orders are left alone, stale ones are cancelled, their
//! ledger rows corrected to the observed fill, and the unfilled remainder
//! resubmitted at the new price. Remainders too small to resubmit are
//! abandoned and the crossover state is cleared so the next signal pass can
//! re-enter from scratch.

use crate::exchange::{ExchangeClient, OpenOrder, OrderSide};
use crate::persistence::{Instrument, TradeStore, Transaction};
use crate::strategy::sizing::normalize;
use crate::utils::decimal::safe_div;
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

/// What happened to one resting order during reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Order is already priced at the market; left resting.
    PriceMatch,
    /// Venue refused the cancel; the order is left for the next pass.
    CancelFailed,
    /// Remainder too small to resubmit; crossover state cleared.
    Abandoned,
    /// Remainder resubmitted at the current price under a new order id.
    Resubmitted { order_id: String },
}

/// Repairs the resting orders of one instrument against the live market.
pub struct Reconciler<'a, E: ExchangeClient> {
    exchange: &'a E,
    store: &'a TradeStore,
}

impl<'a, E: ExchangeClient> Reconciler<'a, E> {
    pub fn new(exchange: &'a E, store: &'a TradeStore) -> Self {
        Self { exchange, store }
    }

    /// Reconcile every resting order of `instrument`. Failures on one order
    /// never block the others.
    pub async fn reconcile(&self, instrument: &Instrument) -> Result<Vec<ReconcileOutcome>> {
        let symbol = &instrument.symbol;
        let open = self.exchange.open_orders(Some(symbol)).await?;
        if open.is_empty() {
            return Ok(Vec::new());
        }

        let current_price = self.exchange.current_price(symbol).await?;
        let mut outcomes = Vec::with_capacity(open.len());
        for order in open {
            match self.reconcile_order(instrument, &order, current_price).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    warn!(%symbol, order_id = %order.order_id, error = %e, "Reconciliation failed for order");
                }
            }
        }
        Ok(outcomes)
    }

    async fn reconcile_order(
        &self,
        instrument: &Instrument,
        order: &OpenOrder,
        current_price: Decimal,
    ) -> Result<ReconcileOutcome> {
        let symbol = &instrument.symbol;

        if order.price == current_price {
            debug!(%symbol, order_id = %order.order_id, "Order already at market price");
            return Ok(ReconcileOutcome::PriceMatch);
        }

        if let Err(e) = self.exchange.cancel_order(symbol, &order.order_id).await {
            warn!(%symbol, order_id = %order.order_id, error = %e, "Cancel rejected, leaving order for next pass");
            return Ok(ReconcileOutcome::CancelFailed);
        }

        // The ledger row tracks what actually traded: the observed fill if
        // partial, gone if nothing filled.
        if order.executed_qty > Decimal::ZERO {
            self.store
                .update_transaction_quantity(&order.order_id, order.executed_qty)
                .context("recording partial fill")?;
        } else if let Err(e) = self.store.deactivate_transaction(&order.order_id) {
            debug!(order_id = %order.order_id, error = %e, "No ledger row for cancelled order");
        }

        // The remainder can never exceed what the account can still afford.
        let affordable = match order.side {
            OrderSide::Buy => {
                let quote = self.exchange.balance(&instrument.quote_asset).await?;
                safe_div(quote, current_price)
            }
            OrderSide::Sell => self.exchange.balance(&instrument.base_asset).await?,
        };
        let remaining = order.remaining_qty().min(affordable);

        let quantity = match normalize(
            remaining,
            instrument.step_size,
            instrument.min_qty,
            instrument.min_notional,
            current_price,
        ) {
            Ok(qty) => qty,
            Err(rejection) => {
                info!(%symbol, %remaining, %rejection, "Remainder not resubmittable, abandoning");
                self.store
                    .set_cross_state(&instrument.market, symbol, None)?;
                return Ok(ReconcileOutcome::Abandoned);
            }
        };

        let order_id = self
            .exchange
            .create_order(symbol, order.side, quantity, current_price)
            .await?;
        info!(
            %symbol,
            old_order_id = %order.order_id,
            order_id,
            %quantity,
            price = %current_price,
            "Stale order resubmitted at market"
        );

        self.store.insert_transaction(&Transaction {
            market: instrument.market.clone(),
            symbol: symbol.clone(),
            side: order.side,
            quantity,
            price_per_unit: current_price,
            total_amount: quantity * current_price,
            order_id: order_id.clone(),
            active: true,
        })?;

        Ok(ReconcileOutcome::Resubmitted { order_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{MockExchange, QuoteStyle};
    use crate::persistence::CrossState;
    use rust_decimal_macros::dec;

    fn instrument() -> Instrument {
        Instrument {
            market: "mock".into(),
            symbol: "ETHJPY".into(),
            base_asset: "ETH".into(),
            quote_asset: "JPY".into(),
            quote_style: QuoteStyle::Direct,
            step_size: dec!(0.01),
            min_qty: dec!(0.01),
            min_notional: dec!(0),
            risk_percent: dec!(20),
            short_term: 2,
            long_term: 3,
            cross_state: None,
            active: true,
        }
    }

    fn store_with(inst: &Instrument) -> TradeStore {
        let store = TradeStore::in_memory().unwrap();
        store.upsert_instrument(inst).unwrap();
        store
    }

    fn ledger_row(order_id: &str, qty: Decimal, price: Decimal) -> Transaction {
        Transaction {
            market: "mock".into(),
            symbol: "ETHJPY".into(),
            side: OrderSide::Buy,
            quantity: qty,
            price_per_unit: price,
            total_amount: qty * price,
            order_id: order_id.into(),
            active: true,
        }
    }

    fn resting(order_id: &str, side: OrderSide, price: Decimal, orig: Decimal, executed: Decimal) -> OpenOrder {
        OpenOrder {
            order_id: order_id.into(),
            symbol: "ETHJPY".into(),
            side,
            price,
            orig_qty: orig,
            executed_qty: executed,
        }
    }

    #[tokio::test]
    async fn test_price_match_leaves_order_alone() {
        let inst = instrument();
        let store = store_with(&inst);
        let exchange = MockExchange::new();
        exchange.set_price("ETHJPY", dec!(350000)).await;
        exchange
            .push_open_order(resting("stale", OrderSide::Buy, dec!(350000), dec!(1), dec!(0)))
            .await;

        let outcomes = Reconciler::new(&exchange, &store).reconcile(&inst).await.unwrap();
        assert_eq!(outcomes, vec![ReconcileOutcome::PriceMatch]);
        assert!(exchange.cancelled_orders().await.is_empty());
        assert!(exchange.placed_orders().await.is_empty());
    }

    #[tokio::test]
    async fn test_partial_fill_records_exact_executed_quantity() {
        let inst = instrument();
        let store = store_with(&inst);
        store.insert_transaction(&ledger_row("stale", dec!(1), dec!(350000))).unwrap();

        let exchange = MockExchange::new();
        exchange.set_price("ETHJPY", dec!(340000)).await;
        exchange.set_balance("JPY", dec!(10000000)).await;
        exchange
            .push_open_order(resting("stale", OrderSide::Buy, dec!(350000), dec!(1), dec!(0.4)))
            .await;

        let outcomes = Reconciler::new(&exchange, &store).reconcile(&inst).await.unwrap();
        assert!(matches!(outcomes[0], ReconcileOutcome::Resubmitted { .. }));

        // Old row carries the venue-reported fill, nothing rounded.
        let old = store.transaction("stale").unwrap().unwrap();
        assert_eq!(old.quantity, dec!(0.4));
        assert!(old.active);

        // Remainder resubmitted at the new price.
        let placed = exchange.placed_orders().await;
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].quantity, dec!(0.6));
        assert_eq!(placed[0].price, dec!(340000));
        let new = store.transaction(&placed[0].order_id).unwrap().unwrap();
        assert_eq!(new.price_per_unit, dec!(340000));
        assert!(new.active);
    }

    #[tokio::test]
    async fn test_unfilled_order_deactivates_old_row() {
        let inst = instrument();
        let store = store_with(&inst);
        store.insert_transaction(&ledger_row("stale", dec!(0.5), dec!(350000))).unwrap();

        let exchange = MockExchange::new();
        exchange.set_price("ETHJPY", dec!(360000)).await;
        exchange.set_balance("JPY", dec!(10000000)).await;
        exchange
            .push_open_order(resting("stale", OrderSide::Buy, dec!(350000), dec!(0.5), dec!(0)))
            .await;

        let outcomes = Reconciler::new(&exchange, &store).reconcile(&inst).await.unwrap();
        assert!(matches!(outcomes[0], ReconcileOutcome::Resubmitted { .. }));

        assert!(!store.transaction("stale").unwrap().unwrap().active);
        let placed = exchange.placed_orders().await;
        assert_eq!(placed[0].quantity, dec!(0.5));
    }

    #[tokio::test]
    async fn test_resubmit_failure_leaves_ledger_deactivated() {
        let inst = instrument();
        let store = store_with(&inst);
        store.insert_transaction(&ledger_row("stale", dec!(0.5), dec!(350000))).unwrap();

        let exchange = MockExchange::new();
        exchange.set_price("ETHJPY", dec!(340000)).await;
        exchange.set_balance("JPY", dec!(10000000)).await;
        exchange
            .push_open_order(resting("stale", OrderSide::Buy, dec!(350000), dec!(0.5), dec!(0)))
            .await;
        exchange.fail_create("order endpoint down").await;

        // The failure stays at the per-order boundary; the pass itself
        // completes.
        let outcomes = Reconciler::new(&exchange, &store).reconcile(&inst).await.unwrap();
        assert!(outcomes.is_empty());

        // Cancel went through and the ledger already reflects it: no open
        // order, row inactive, nothing placed. The next cycle finds nothing
        // to repair.
        assert_eq!(exchange.cancelled_orders().await, vec!["stale".to_string()]);
        assert!(!store.transaction("stale").unwrap().unwrap().active);
        assert!(exchange.placed_orders().await.is_empty());
        assert!(exchange.open_orders(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_failure_skips_order() {
        let inst = instrument();
        let store = store_with(&inst);
        store.insert_transaction(&ledger_row("stale", dec!(1), dec!(350000))).unwrap();

        let exchange = MockExchange::new();
        exchange.set_price("ETHJPY", dec!(340000)).await;
        exchange
            .push_open_order(resting("stale", OrderSide::Buy, dec!(350000), dec!(1), dec!(0)))
            .await;
        exchange.fail_cancel("stale").await;

        let outcomes = Reconciler::new(&exchange, &store).reconcile(&inst).await.unwrap();
        assert_eq!(outcomes, vec![ReconcileOutcome::CancelFailed]);
        // Ledger untouched, order still resting.
        assert!(store.transaction("stale").unwrap().unwrap().active);
        assert_eq!(exchange.open_orders(None).await.unwrap().len(), 1);
        assert!(exchange.placed_orders().await.is_empty());
    }

    #[tokio::test]
    async fn test_dust_remainder_abandons_and_clears_state() {
        let inst = instrument();
        let store = store_with(&inst);
        store.set_cross_state("mock", "ETHJPY", Some(CrossState::Golden)).unwrap();
        store.insert_transaction(&ledger_row("stale", dec!(1), dec!(350000))).unwrap();

        let exchange = MockExchange::new();
        exchange.set_price("ETHJPY", dec!(340000)).await;
        exchange.set_balance("JPY", dec!(10000000)).await;
        // 0.995 filled; the 0.005 remainder is below the 0.01 minimum.
        exchange
            .push_open_order(resting("stale", OrderSide::Buy, dec!(350000), dec!(1), dec!(0.995)))
            .await;

        let outcomes = Reconciler::new(&exchange, &store).reconcile(&inst).await.unwrap();
        assert_eq!(outcomes, vec![ReconcileOutcome::Abandoned]);

        // Fill recorded, nothing resubmitted, state reset for re-entry.
        assert_eq!(store.transaction("stale").unwrap().unwrap().quantity, dec!(0.995));
        assert!(exchange.placed_orders().await.is_empty());
        assert_eq!(store.cross_state("mock", "ETHJPY").unwrap(), None);
    }

    #[tokio::test]
    async fn test_buy_remainder_clamped_to_quote_balance() {
        let inst = instrument();
        let store = store_with(&inst);
        store.insert_transaction(&ledger_row("stale", dec!(1), dec!(350000))).unwrap();

        let exchange = MockExchange::new();
        exchange.set_price("ETHJPY", dec!(340000)).await;
        // Only enough quote for 0.35 base at the new price.
        exchange.set_balance("JPY", dec!(119000)).await;
        exchange
            .push_open_order(resting("stale", OrderSide::Buy, dec!(350000), dec!(1), dec!(0)))
            .await;

        let outcomes = Reconciler::new(&exchange, &store).reconcile(&inst).await.unwrap();
        assert!(matches!(outcomes[0], ReconcileOutcome::Resubmitted { .. }));
        let placed = exchange.placed_orders().await;
        assert_eq!(placed[0].quantity, dec!(0.35));
    }

    #[tokio::test]
    async fn test_sell_remainder_clamped_to_base_balance() {
        let inst = instrument();
        let store = store_with(&inst);
        store.insert_transaction(&ledger_row("stale", dec!(2), dec!(350000))).unwrap();

        let exchange = MockExchange::new();
        exchange.set_price("ETHJPY", dec!(360000)).await;
        exchange.set_balance("ETH", dec!(1.25)).await;
        exchange
            .push_open_order(resting("stale", OrderSide::Sell, dec!(350000), dec!(2), dec!(0)))
            .await;

        let outcomes = Reconciler::new(&exchange, &store).reconcile(&inst).await.unwrap();
        assert!(matches!(outcomes[0], ReconcileOutcome::Resubmitted { .. }));
        let placed = exchange.placed_orders().await;
        assert_eq!(placed[0].side, OrderSide::Sell);
        assert_eq!(placed[0].quantity, dec!(1.25));
    }
}
