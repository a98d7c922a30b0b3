//! TOML configuration loading and validation.

use std::path::{Path, PathBuf};

use bondbook::RebalanceConfig;
use bondbook::market::MockMarket;
use bondbook::pricing::{BPS, WAD};
use serde::Deserialize;

use crate::error::{Error, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub guards: GuardConfig,
    pub market: MarketConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfig {
    #[serde(default)]
    pub target_idle_liquidity: u64,
    #[serde(default = "default_buffer")]
    pub partial_closure_buffer_bps: u32,
    #[serde(default = "default_max_closures")]
    pub max_positions_closed_per_call: usize,
}

fn default_buffer() -> u32 {
    10
}
fn default_max_closures() -> usize {
    16
}

/// Caller-side bounds applied to every rebalance the keeper submits.
#[derive(Debug, Clone, Deserialize)]
pub struct GuardConfig {
    #[serde(default = "default_slippage")]
    pub close_slippage_bps: u32,
    #[serde(default = "default_slippage")]
    pub open_slippage_bps: u32,
    #[serde(default)]
    pub min_vault_share_price: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            close_slippage_bps: default_slippage(),
            open_slippage_bps: default_slippage(),
            min_vault_share_price: 0,
        }
    }
}

fn default_slippage() -> u32 {
    50
}

/// Parameters of the simulated bond market.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
    #[serde(default = "default_duration_days")]
    pub position_duration_days: u64,
    #[serde(default = "default_checkpoint_hours")]
    pub checkpoint_hours: u64,
    #[serde(default = "default_discount")]
    pub discount_bps: u32,
    pub min_transaction_amount: u64,
    #[serde(default)]
    pub close_fee: u64,
    #[serde(default = "default_share_price")]
    pub vault_share_price: u64,
    /// Market clock at the start of a run (unix seconds)
    #[serde(default)]
    pub start_time: u64,
}

fn default_duration_days() -> u64 {
    182
}
fn default_checkpoint_hours() -> u64 {
    24
}
fn default_discount() -> u32 {
    250
}
fn default_share_price() -> u64 {
    WAD as u64
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub dir: String,
    #[serde(default = "default_audit_file")]
    pub audit_file: String,
    #[serde(default = "default_snapshot_file")]
    pub snapshot_file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            audit_file: default_audit_file(),
            snapshot_file: default_snapshot_file(),
        }
    }
}

fn default_log_dir() -> String {
    "./logs".into()
}
fn default_audit_file() -> String {
    "audit.jsonl".into()
}
fn default_snapshot_file() -> String {
    "portfolio.json".into()
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&contents)
    }

    /// Parse and validate a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate config invariants.
    fn validate(&self) -> Result<()> {
        if self.strategy.partial_closure_buffer_bps > BPS {
            return Err(Error::Config(
                "partial_closure_buffer_bps must be <= 10000".into(),
            ));
        }
        if self.strategy.max_positions_closed_per_call == 0 {
            return Err(Error::Config(
                "max_positions_closed_per_call must be > 0".into(),
            ));
        }
        if self.guards.close_slippage_bps > BPS || self.guards.open_slippage_bps > BPS {
            return Err(Error::Config("slippage bps must be <= 10000".into()));
        }
        if self.market.position_duration_days == 0 {
            return Err(Error::Config("position_duration_days must be > 0".into()));
        }
        if self.market.checkpoint_hours == 0 {
            return Err(Error::Config("checkpoint_hours must be > 0".into()));
        }
        if self.market.checkpoint_hours > self.market.position_duration_days.saturating_mul(24) {
            return Err(Error::Config(
                "checkpoint_hours must not exceed the position duration".into(),
            ));
        }
        if self.market.discount_bps >= BPS {
            return Err(Error::Config("discount_bps must be < 10000".into()));
        }
        if self.market.min_transaction_amount == 0 {
            return Err(Error::Config("min_transaction_amount must be > 0".into()));
        }
        Ok(())
    }

    /// Policy parameters for the rebalancer.
    pub fn rebalance_config(&self) -> RebalanceConfig {
        RebalanceConfig {
            target_idle_liquidity: u128::from(self.strategy.target_idle_liquidity),
            partial_closure_buffer_bps: self.strategy.partial_closure_buffer_bps,
            max_positions_closed_per_call: self.strategy.max_positions_closed_per_call,
        }
    }

    /// Build the simulated market described by `[market]`.
    pub fn build_market(&self) -> MockMarket {
        MockMarket::builder()
            .start_time(u128::from(self.market.start_time))
            .position_duration(u128::from(self.market.position_duration_days) * 86_400)
            .checkpoint_duration(u128::from(self.market.checkpoint_hours) * 3_600)
            .discount_bps(self.market.discount_bps)
            .min_transaction_amount(u128::from(self.market.min_transaction_amount))
            .close_fee(u128::from(self.market.close_fee))
            .vault_share_price(u128::from(self.market.vault_share_price))
            .build()
    }

    /// Full path to the audit log file.
    pub fn audit_path(&self) -> PathBuf {
        Path::new(&self.logging.dir).join(&self.logging.audit_file)
    }

    /// Where `run` saves the final portfolio snapshot.
    pub fn snapshot_path(&self) -> PathBuf {
        Path::new(&self.logging.dir).join(&self.logging.snapshot_file)
    }
}
