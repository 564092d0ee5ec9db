//! SQLite persistence for the trading core.
//!
//! Durable state that must survive restarts:
//! - Per-instrument trading configuration (lot sizing, windows, risk)
//! - Append-only price history per (market, symbol)
//! - Crossover state per (market, symbol)
//! - The transaction ledger the reconciliation pass repairs
//!
//! Decimals are stored as TEXT to keep exact precision.

use crate::exchange::{OrderSide, QuoteStyle};
use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// Crossover regime for an instrument. Absent (`None` in the store) means
/// insufficient history or a freshly reset instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossState {
    Golden,
    Dead,
}

impl CrossState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrossState::Golden => "golden",
            CrossState::Dead => "dead",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "golden" => Some(CrossState::Golden),
            "dead" => Some(CrossState::Dead),
            _ => None,
        }
    }
}

/// Static per-instrument trading parameters plus the mutable crossover state.
#[derive(Debug, Clone)]
pub struct Instrument {
    pub market: String,
    /// Venue symbol, e.g. "ETHJPY".
    pub symbol: String,
    /// Asset bought/sold by the strategy.
    pub base_asset: String,
    /// Asset spent on buys.
    pub quote_asset: String,
    pub quote_style: QuoteStyle,
    pub step_size: Decimal,
    pub min_qty: Decimal,
    pub min_notional: Decimal,
    /// Fraction of the quote balance (percent) deployed per buy signal.
    pub risk_percent: Decimal,
    pub short_term: u32,
    pub long_term: u32,
    pub cross_state: Option<CrossState>,
    pub active: bool,
}

/// A ledger row: one submitted order and its observed fill state.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub market: String,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub price_per_unit: Decimal,
    pub total_amount: Decimal,
    pub order_id: String,
    pub active: bool,
}

/// SQLite-backed store. One connection; the cycle driver is the single
/// writer, so no further locking is needed.
pub struct TradeStore {
    conn: Connection,
}

impl TradeStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;
        let store = Self { conn };
        store.init_schema()?;
        info!("Trade store initialized at {:?}", db_path.as_ref());
        Ok(store)
    }

    /// In-memory store for tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            -- Per-instrument trading configuration
            CREATE TABLE IF NOT EXISTS instruments (
                market TEXT NOT NULL,
                symbol TEXT NOT NULL,
                base_asset TEXT NOT NULL,
                quote_asset TEXT NOT NULL,
                quote_style TEXT NOT NULL,
                step_size TEXT NOT NULL,
                min_qty TEXT NOT NULL,
                min_notional TEXT NOT NULL,
                risk_percent TEXT NOT NULL,
                short_term INTEGER NOT NULL,
                long_term INTEGER NOT NULL,
                cross_state TEXT,
                active INTEGER NOT NULL DEFAULT 1,
                PRIMARY KEY (market, symbol)
            );

            -- Append-only price history; recency is insertion order
            CREATE TABLE IF NOT EXISTS price_samples (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                market TEXT NOT NULL,
                symbol TEXT NOT NULL,
                price TEXT NOT NULL,
                observed_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_prices_market_symbol
                ON price_samples(market, symbol, id);

            -- Transaction ledger
            CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                market TEXT NOT NULL,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                quantity TEXT NOT NULL,
                price_per_unit TEXT NOT NULL,
                total_amount TEXT NOT NULL,
                order_id TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            );
            -- One ledger row per venue order id
            CREATE UNIQUE INDEX IF NOT EXISTS idx_transactions_order ON transactions(order_id);
            CREATE INDEX IF NOT EXISTS idx_transactions_market ON transactions(market, symbol);
            "#,
        )?;
        debug!("Database schema initialized");
        Ok(())
    }

    // ==================== Instruments ====================

    /// Insert or update an instrument's static configuration.
    ///
    /// Cross state and window lengths already in the store win over the
    /// seeded values, so re-seeding at startup never clobbers learned state.
    pub fn upsert_instrument(&self, instrument: &Instrument) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO instruments (market, symbol, base_asset, quote_asset, quote_style,
                                     step_size, min_qty, min_notional, risk_percent,
                                     short_term, long_term, cross_state, active)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ON CONFLICT(market, symbol) DO UPDATE SET
                base_asset = ?3,
                quote_asset = ?4,
                quote_style = ?5,
                step_size = ?6,
                min_qty = ?7,
                min_notional = ?8,
                risk_percent = ?9,
                active = ?13
            "#,
            params![
                instrument.market,
                instrument.symbol,
                instrument.base_asset,
                instrument.quote_asset,
                match instrument.quote_style {
                    QuoteStyle::Direct => "direct",
                    QuoteStyle::Inverted => "inverted",
                },
                instrument.step_size.to_string(),
                instrument.min_qty.to_string(),
                instrument.min_notional.to_string(),
                instrument.risk_percent.to_string(),
                instrument.short_term,
                instrument.long_term,
                instrument.cross_state.map(|s| s.as_str()),
                instrument.active as i32,
            ],
        )?;
        Ok(())
    }

    pub fn instrument(&self, market: &str, symbol: &str) -> Result<Option<Instrument>> {
        let row = self
            .conn
            .query_row(
                r#"
                SELECT market, symbol, base_asset, quote_asset, quote_style, step_size,
                       min_qty, min_notional, risk_percent, short_term, long_term,
                       cross_state, active
                FROM instruments WHERE market = ?1 AND symbol = ?2
                "#,
                params![market, symbol],
                Self::map_instrument,
            )
            .optional()?;
        Ok(row)
    }

    /// Active instruments for a market, in seeding order.
    pub fn active_instruments(&self, market: &str) -> Result<Vec<Instrument>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT market, symbol, base_asset, quote_asset, quote_style, step_size,
                   min_qty, min_notional, risk_percent, short_term, long_term,
                   cross_state, active
            FROM instruments WHERE market = ?1 AND active = 1
            ORDER BY rowid
            "#,
        )?;
        let instruments = stmt
            .query_map(params![market], Self::map_instrument)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(instruments)
    }

    fn map_instrument(row: &rusqlite::Row<'_>) -> rusqlite::Result<Instrument> {
        let quote_style: String = row.get(4)?;
        let cross_state: Option<String> = row.get(11)?;
        Ok(Instrument {
            market: row.get(0)?,
            symbol: row.get(1)?,
            base_asset: row.get(2)?,
            quote_asset: row.get(3)?,
            quote_style: if quote_style == "inverted" {
                QuoteStyle::Inverted
            } else {
                QuoteStyle::Direct
            },
            step_size: Decimal::from_str(&row.get::<_, String>(5)?).unwrap_or_default(),
            min_qty: Decimal::from_str(&row.get::<_, String>(6)?).unwrap_or_default(),
            min_notional: Decimal::from_str(&row.get::<_, String>(7)?).unwrap_or_default(),
            risk_percent: Decimal::from_str(&row.get::<_, String>(8)?).unwrap_or_default(),
            short_term: row.get(9)?,
            long_term: row.get(10)?,
            cross_state: cross_state.as_deref().and_then(CrossState::parse),
            active: row.get::<_, i32>(12)? != 0,
        })
    }

    pub fn set_instrument_windows(
        &self,
        market: &str,
        symbol: &str,
        short_term: u32,
        long_term: u32,
    ) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE instruments SET short_term = ?3, long_term = ?4
             WHERE market = ?1 AND symbol = ?2",
            params![market, symbol, short_term, long_term],
        )?;
        anyhow::ensure!(updated == 1, "no instrument {market}/{symbol} to update");
        Ok(())
    }

    // ==================== Cross state ====================

    pub fn cross_state(&self, market: &str, symbol: &str) -> Result<Option<CrossState>> {
        let state: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT cross_state FROM instruments WHERE market = ?1 AND symbol = ?2",
                params![market, symbol],
                |row| row.get(0),
            )
            .optional()?;
        Ok(state.flatten().as_deref().and_then(CrossState::parse))
    }

    pub fn set_cross_state(
        &self,
        market: &str,
        symbol: &str,
        state: Option<CrossState>,
    ) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE instruments SET cross_state = ?3 WHERE market = ?1 AND symbol = ?2",
            params![market, symbol, state.map(|s| s.as_str())],
        )?;
        anyhow::ensure!(updated == 1, "no instrument {market}/{symbol} to update");
        Ok(())
    }

    // ==================== Price history ====================

    pub fn append_price(&self, market: &str, symbol: &str, price: Decimal) -> Result<()> {
        self.conn.execute(
            "INSERT INTO price_samples (market, symbol, price, observed_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![market, symbol, price.to_string(), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Most recent `limit` prices, newest first (insertion order, not
    /// timestamp, is the source of truth for recency).
    pub fn recent_prices(&self, market: &str, symbol: &str, limit: u32) -> Result<Vec<Decimal>> {
        let mut stmt = self.conn.prepare(
            "SELECT price FROM price_samples
             WHERE market = ?1 AND symbol = ?2
             ORDER BY id DESC LIMIT ?3",
        )?;
        let prices = stmt
            .query_map(params![market, symbol, limit], |row| {
                row.get::<_, String>(0)
            })?
            .filter_map(|r| r.ok())
            .map(|s| Decimal::from_str(&s).unwrap_or_default())
            .collect();
        Ok(prices)
    }

    /// Full price series, oldest first. Optimizer input.
    pub fn all_prices(&self, market: &str, symbol: &str) -> Result<Vec<Decimal>> {
        let mut stmt = self.conn.prepare(
            "SELECT price FROM price_samples
             WHERE market = ?1 AND symbol = ?2
             ORDER BY id ASC",
        )?;
        let prices = stmt
            .query_map(params![market, symbol], |row| row.get::<_, String>(0))?
            .filter_map(|r| r.ok())
            .map(|s| Decimal::from_str(&s).unwrap_or_default())
            .collect();
        Ok(prices)
    }

    // ==================== Transaction ledger ====================

    pub fn insert_transaction(&self, tx: &Transaction) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO transactions (market, symbol, side, quantity, price_per_unit,
                                      total_amount, order_id, active, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                tx.market,
                tx.symbol,
                tx.side.as_str(),
                tx.quantity.to_string(),
                tx.price_per_unit.to_string(),
                tx.total_amount.to_string(),
                tx.order_id,
                tx.active as i32,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Overwrite a ledger row's quantity with the venue-reported fill amount.
    pub fn update_transaction_quantity(&self, order_id: &str, quantity: Decimal) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE transactions SET quantity = ?2 WHERE order_id = ?1",
            params![order_id, quantity.to_string()],
        )?;
        anyhow::ensure!(updated == 1, "no transaction for order {order_id}");
        Ok(())
    }

    /// Soft-delete: the order no longer exists on the venue.
    pub fn deactivate_transaction(&self, order_id: &str) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE transactions SET active = 0 WHERE order_id = ?1",
            params![order_id],
        )?;
        anyhow::ensure!(updated == 1, "no transaction for order {order_id}");
        Ok(())
    }

    pub fn transaction(&self, order_id: &str) -> Result<Option<Transaction>> {
        let row = self
            .conn
            .query_row(
                r#"
                SELECT market, symbol, side, quantity, price_per_unit, total_amount,
                       order_id, active
                FROM transactions WHERE order_id = ?1
                "#,
                params![order_id],
                |row| {
                    let side: String = row.get(2)?;
                    Ok(Transaction {
                        market: row.get(0)?,
                        symbol: row.get(1)?,
                        side: side.parse().unwrap_or(OrderSide::Buy),
                        quantity: Decimal::from_str(&row.get::<_, String>(3)?)
                            .unwrap_or_default(),
                        price_per_unit: Decimal::from_str(&row.get::<_, String>(4)?)
                            .unwrap_or_default(),
                        total_amount: Decimal::from_str(&row.get::<_, String>(5)?)
                            .unwrap_or_default(),
                        order_id: row.get(6)?,
                        active: row.get::<_, i32>(7)? != 0,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Count of ledger rows still marked active for a market.
    pub fn active_transaction_count(&self, market: &str) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM transactions WHERE market = ?1 AND active = 1",
            params![market],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
