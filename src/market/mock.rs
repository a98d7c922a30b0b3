//! Mock bond market for testing: implements [`BondMarket`] with a simple,
//! deterministic pricing curve and configurable failure behavior.
//!
//! Pricing: a bond is worth face value at maturity and is discounted
//! linearly with time remaining, `discount_bps` for a full term. A flat
//! `close_fee` is charged per close, so small closes fetch a worse per-bond
//! price than large ones. Per-maturity discount overrides can simulate a
//! mispriced maturity.
//!
//! ```
//! use bondbook::market::{BondMarket, MockMarket};
//!
//! let mut market = MockMarket::builder()
//!     .start_time(1_000)
//!     .position_duration(365 * 86_400)
//!     .checkpoint_duration(86_400)
//!     .discount_bps(500)
//!     .min_transaction_amount(10)
//!     .build();
//!
//! let (maturity, bonds) = market.open_position(1_000_000, 0, 0).unwrap();
//! assert!(bonds > 1_000_000);
//! market.advance(365 * 86_400);
//! assert_eq!(market.close_position(maturity, bonds, 0).unwrap(), bonds);
//! ```

use rustc_hash::FxHashMap;

use super::{BondMarket, MarketError, MarketResult};
use crate::pricing::{BPS, Rounding, WAD, mul_div, sub_bps};
use crate::types::{Amount, BondAmount, MaturityTime};

/// Which calls the mock rejects.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailMode {
    /// Every call behaves normally.
    #[default]
    None,
    /// Opens are rejected.
    RejectOpens,
    /// Closes are rejected.
    RejectCloses,
    /// Everything, previews included, is rejected.
    RejectAll,
}

/// A recorded mutating call for assertion in tests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MarketCall {
    Open {
        amount: Amount,
        maturity_time: MaturityTime,
        bond_amount: BondAmount,
    },
    Close {
        maturity_time: MaturityTime,
        bond_amount: BondAmount,
        proceeds: Amount,
    },
}

/// Builder for `MockMarket`.
pub struct MockMarketBuilder {
    now: MaturityTime,
    position_duration: u128,
    checkpoint_duration: u128,
    discount_bps: u32,
    min_transaction_amount: Amount,
    vault_share_price: u128,
    close_fee: Amount,
    execution_slippage_bps: u32,
    fail_mode: FailMode,
    overrides: FxHashMap<MaturityTime, u32>,
    outstanding: FxHashMap<MaturityTime, BondAmount>,
}

impl MockMarketBuilder {
    pub fn start_time(mut self, now: MaturityTime) -> Self {
        self.now = now;
        self
    }

    /// Term of newly opened positions (seconds).
    pub fn position_duration(mut self, secs: u128) -> Self {
        self.position_duration = secs;
        self
    }

    /// Maturities are aligned to multiples of this (seconds).
    pub fn checkpoint_duration(mut self, secs: u128) -> Self {
        self.checkpoint_duration = secs;
        self
    }

    /// Discount of a full-term bond below face value.
    pub fn discount_bps(mut self, bps: u32) -> Self {
        self.discount_bps = bps;
        self
    }

    pub fn min_transaction_amount(mut self, amount: Amount) -> Self {
        self.min_transaction_amount = amount;
        self
    }

    /// Vault share price in `WAD` units.
    pub fn vault_share_price(mut self, price: u128) -> Self {
        self.vault_share_price = price;
        self
    }

    /// Flat amount deducted from every close.
    pub fn close_fee(mut self, fee: Amount) -> Self {
        self.close_fee = fee;
        self
    }

    /// Executed closes pay this much less than their preview.
    pub fn execution_slippage_bps(mut self, bps: u32) -> Self {
        self.execution_slippage_bps = bps;
        self
    }

    pub fn fail_mode(mut self, mode: FailMode) -> Self {
        self.fail_mode = mode;
        self
    }

    /// Price one maturity with its own full-term discount.
    pub fn with_discount_override(mut self, maturity_time: MaturityTime, bps: u32) -> Self {
        self.overrides.insert(maturity_time, bps);
        self
    }

    /// Register bonds held outside this mock's own opens (e.g. restored state).
    pub fn with_outstanding(mut self, maturity_time: MaturityTime, bonds: BondAmount) -> Self {
        *self.outstanding.entry(maturity_time).or_default() += bonds;
        self
    }

    pub fn build(self) -> MockMarket {
        MockMarket {
            now: self.now,
            position_duration: self.position_duration.max(1),
            checkpoint_duration: self.checkpoint_duration.max(1),
            discount_bps: self.discount_bps.min(BPS),
            min_transaction_amount: self.min_transaction_amount,
            vault_share_price: self.vault_share_price,
            close_fee: self.close_fee,
            execution_slippage_bps: self.execution_slippage_bps,
            fail_mode: self.fail_mode,
            overrides: self.overrides,
            outstanding: self.outstanding,
            calls: Vec::new(),
        }
    }
}

/// A deterministic in-memory bond market.
#[derive(Clone, Debug)]
pub struct MockMarket {
    now: MaturityTime,
    position_duration: u128,
    checkpoint_duration: u128,
    discount_bps: u32,
    min_transaction_amount: Amount,
    vault_share_price: u128,
    close_fee: Amount,
    execution_slippage_bps: u32,
    fail_mode: FailMode,
    overrides: FxHashMap<MaturityTime, u32>,
    outstanding: FxHashMap<MaturityTime, BondAmount>,
    calls: Vec<MarketCall>,
}

impl Default for MockMarket {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl MockMarket {
    pub fn builder() -> MockMarketBuilder {
        MockMarketBuilder {
            now: 0,
            position_duration: 7 * 86_400,
            checkpoint_duration: 86_400,
            discount_bps: 100,
            min_transaction_amount: 1,
            vault_share_price: WAD,
            close_fee: 0,
            execution_slippage_bps: 0,
            fail_mode: FailMode::None,
            overrides: FxHashMap::default(),
            outstanding: FxHashMap::default(),
        }
    }

    // === Simulation controls ===

    /// Move the clock forward.
    pub fn advance(&mut self, secs: u128) {
        self.now = self.now.saturating_add(secs);
    }

    pub fn set_now(&mut self, now: MaturityTime) {
        self.now = now;
    }

    pub fn set_fail_mode(&mut self, mode: FailMode) {
        self.fail_mode = mode;
    }

    pub fn set_vault_share_price(&mut self, price: u128) {
        self.vault_share_price = price;
    }

    pub fn set_execution_slippage_bps(&mut self, bps: u32) {
        self.execution_slippage_bps = bps;
    }

    // === Inspection ===

    /// Mutating calls that succeeded, in order.
    pub fn calls(&self) -> &[MarketCall] {
        &self.calls
    }

    /// Bonds this market considers outstanding at `maturity_time`.
    pub fn outstanding(&self, maturity_time: MaturityTime) -> BondAmount {
        self.outstanding.get(&maturity_time).copied().unwrap_or(0)
    }

    /// Maturity a new open would receive now.
    pub fn next_maturity(&self) -> MaturityTime {
        let checkpoint = self.now - self.now % self.checkpoint_duration;
        checkpoint.saturating_add(self.position_duration)
    }

    // === Pricing ===

    fn discount_for(&self, maturity_time: MaturityTime) -> u32 {
        self.overrides
            .get(&maturity_time)
            .copied()
            .unwrap_or(self.discount_bps)
            .min(BPS)
    }

    /// Fair value of `bonds` at `maturity_time`, before fees.
    fn fair_value(&self, maturity_time: MaturityTime, bonds: BondAmount) -> MarketResult<Amount> {
        if maturity_time <= self.now {
            return Ok(bonds);
        }
        let remaining = (maturity_time - self.now).min(self.position_duration);
        // discount = bonds * bps * remaining / (BPS * duration)
        let scaled_bps = mul_div(
            u128::from(self.discount_for(maturity_time)),
            remaining,
            self.position_duration,
            Rounding::Up,
        )
        .map_err(|e| MarketError::Rejected(e.to_string()))?;
        mul_div(bonds, u128::from(BPS) - scaled_bps, u128::from(BPS), Rounding::Down)
            .map_err(|e| MarketError::Rejected(e.to_string()))
    }

    fn check_min_transaction(&self, amount: u128) -> MarketResult<()> {
        if amount < self.min_transaction_amount {
            return Err(MarketError::BelowMinimumTransaction {
                amount,
                minimum: self.min_transaction_amount,
            });
        }
        Ok(())
    }
}

impl BondMarket for MockMarket {
    fn now(&self) -> MaturityTime {
        self.now
    }

    fn min_transaction_amount(&self) -> Amount {
        self.min_transaction_amount
    }

    fn vault_share_price(&self) -> u128 {
        self.vault_share_price
    }

    fn open_position(
        &mut self,
        amount: Amount,
        min_output: BondAmount,
        min_vault_share_price: u128,
    ) -> MarketResult<(MaturityTime, BondAmount)> {
        if matches!(self.fail_mode, FailMode::RejectOpens | FailMode::RejectAll) {
            return Err(MarketError::Rejected("opens disabled".into()));
        }
        if self.vault_share_price < min_vault_share_price {
            return Err(MarketError::SharePriceBelowMinimum {
                price: self.vault_share_price,
                minimum: min_vault_share_price,
            });
        }
        let (maturity_time, bond_amount) = self.preview_open_position(amount)?;
        if bond_amount < min_output {
            return Err(MarketError::OutputBelowMinimum {
                output: bond_amount,
                minimum: min_output,
            });
        }

        *self.outstanding.entry(maturity_time).or_default() += bond_amount;
        self.calls.push(MarketCall::Open {
            amount,
            maturity_time,
            bond_amount,
        });
        Ok((maturity_time, bond_amount))
    }

    fn close_position(
        &mut self,
        maturity_time: MaturityTime,
        bond_amount: BondAmount,
        min_output: Amount,
    ) -> MarketResult<Amount> {
        if matches!(self.fail_mode, FailMode::RejectCloses | FailMode::RejectAll) {
            return Err(MarketError::Rejected("closes disabled".into()));
        }
        if self.outstanding(maturity_time) < bond_amount {
            return Err(MarketError::UnknownMaturity(maturity_time));
        }
        let preview = self.preview_close_position(maturity_time, bond_amount)?;
        let proceeds = sub_bps(preview, self.execution_slippage_bps);
        if proceeds < min_output {
            return Err(MarketError::OutputBelowMinimum {
                output: proceeds,
                minimum: min_output,
            });
        }

        let remaining = self.outstanding(maturity_time) - bond_amount;
        if remaining == 0 {
            self.outstanding.remove(&maturity_time);
        } else {
            self.outstanding.insert(maturity_time, remaining);
        }
        self.calls.push(MarketCall::Close {
            maturity_time,
            bond_amount,
            proceeds,
        });
        Ok(proceeds)
    }

    fn preview_close_position(
        &self,
        maturity_time: MaturityTime,
        bond_amount: BondAmount,
    ) -> MarketResult<Amount> {
        if self.fail_mode == FailMode::RejectAll {
            return Err(MarketError::Rejected("market unavailable".into()));
        }
        self.check_min_transaction(bond_amount)?;
        let value = self.fair_value(maturity_time, bond_amount)?;
        Ok(value.saturating_sub(self.close_fee))
    }

    fn preview_open_position(&self, amount: Amount) -> MarketResult<(MaturityTime, BondAmount)> {
        if self.fail_mode == FailMode::RejectAll {
            return Err(MarketError::Rejected("market unavailable".into()));
        }
        self.check_min_transaction(amount)?;
        let maturity_time = self.next_maturity();
        // Invert fair_value: bonds such that their value today equals `amount`.
        let face = self.fair_value(maturity_time, WAD)?;
        if face == 0 {
            return Err(MarketError::Rejected("bonds are worthless".into()));
        }
        let bond_amount = mul_div(amount, WAD, face, Rounding::Down)
            .map_err(|e| MarketError::Rejected(e.to_string()))?;
        Ok((maturity_time, bond_amount))
    }
}
