//! Configuration management for the crossover trader.
//!
//! Loads settings from environment variables and config files.

use crate::exchange::QuoteStyle;
use crate::persistence::Instrument;
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Trade store location
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Cycle scheduling and market selection
    #[serde(default)]
    pub trading: TradingConfig,
    /// Instruments seeded into the store at startup
    #[serde(default)]
    pub instruments: Vec<InstrumentConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database file path
    #[serde(default = "default_db_path")]
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Market identifier all instruments trade under
    #[serde(default = "default_market")]
    pub market: String,
    /// Seconds between consecutive trading cycles
    #[serde(default = "default_cycle_interval")]
    pub cycle_interval_secs: u64,
    /// Pause between instruments within a cycle, for venue rate limits
    #[serde(default = "default_pace")]
    pub pace_secs: u64,
}

/// Static trading parameters for one tradable pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// Venue symbol, e.g. "ETHJPY"
    pub symbol: String,
    /// Asset bought and sold by the strategy
    pub base_asset: String,
    /// Asset spent on buys
    pub quote_asset: String,
    /// True when the venue quotes the pair in the opposite orientation
    #[serde(default)]
    pub inverted: bool,
    /// Order quantity granularity
    #[serde(default = "default_step_size")]
    pub step_size: Decimal,
    /// Smallest accepted order quantity
    #[serde(default = "default_min_qty")]
    pub min_qty: Decimal,
    /// Smallest accepted order value in quote units
    #[serde(default)]
    pub min_notional: Decimal,
    /// Percentage of the quote balance deployed per buy signal (0-100)
    #[serde(default = "default_risk_percent")]
    pub risk_percent: Decimal,
    /// Short averaging window in samples
    #[serde(default = "default_short_term")]
    pub short_term: u32,
    /// Long averaging window in samples
    #[serde(default = "default_long_term")]
    pub long_term: u32,
}

// Default value functions
fn default_db_path() -> String {
    "trader.db".to_string()
}

fn default_market() -> String {
    "mock".to_string()
}

fn default_cycle_interval() -> u64 {
    60
}

fn default_pace() -> u64 {
    1
}

fn default_step_size() -> Decimal {
    Decimal::new(1, 4) // 0.0001
}

fn default_min_qty() -> Decimal {
    Decimal::new(1, 3) // 0.001
}

fn default_risk_percent() -> Decimal {
    Decimal::new(20, 0) // 20% of the quote balance per entry
}

fn default_short_term() -> u32 {
    25
}

fn default_long_term() -> u32 {
    125
}

impl Config {
    /// Load configuration from environment variables and config files.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::default().separator("__").prefix("MCT"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.trading.cycle_interval_secs >= 1,
            "cycle_interval_secs must be at least 1"
        );

        for instrument in &self.instruments {
            anyhow::ensure!(
                !instrument.symbol.is_empty(),
                "instrument symbol must not be empty"
            );
            anyhow::ensure!(
                instrument.step_size > Decimal::ZERO,
                "step_size must be positive for {}",
                instrument.symbol
            );
            anyhow::ensure!(
                instrument.risk_percent > Decimal::ZERO
                    && instrument.risk_percent <= Decimal::new(100, 0),
                "risk_percent must be between 0 and 100 for {}",
                instrument.symbol
            );
            anyhow::ensure!(
                instrument.short_term >= 1 && instrument.short_term < instrument.long_term,
                "short_term must be >= 1 and < long_term for {}",
                instrument.symbol
            );
        }

        Ok(())
    }
}

impl InstrumentConfig {
    /// Materialize this entry for seeding into the trade store.
    pub fn to_instrument(&self, market: &str) -> Instrument {
        Instrument {
            market: market.to_string(),
            symbol: self.symbol.clone(),
            base_asset: self.base_asset.clone(),
            quote_asset: self.quote_asset.clone(),
            quote_style: if self.inverted {
                QuoteStyle::Inverted
            } else {
                QuoteStyle::Direct
            },
            step_size: self.step_size,
            min_qty: self.min_qty,
            min_notional: self.min_notional,
            risk_percent: self.risk_percent,
            short_term: self.short_term,
            long_term: self.long_term,
            cross_state: None,
            active: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            trading: TradingConfig::default(),
            instruments: Vec::new(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            market: default_market(),
            cycle_interval_secs: default_cycle_interval(),
            pace_secs: default_pace(),
        }
    }
}
