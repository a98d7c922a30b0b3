//! Bond market adapter: the external venue positions are bought from and
//! sold back to.
//!
//! The rebalancer only ever talks to the market through [`BondMarket`], so
//! its pricing/AMM math stays outside this crate. A deterministic
//! [`MockMarket`] is provided for tests and simulations.

pub mod mock;

pub use mock::{FailMode, MarketCall, MockMarket, MockMarketBuilder};

use crate::types::{Amount, BondAmount, MaturityTime};

/// Errors a bond market can return for open/close/preview calls.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum MarketError {
    #[error("amount {amount} below minimum transaction amount {minimum}")]
    BelowMinimumTransaction { amount: u128, minimum: u128 },

    #[error("output {output} below minimum {minimum}")]
    OutputBelowMinimum { output: u128, minimum: u128 },

    #[error("vault share price {price} below minimum {minimum}")]
    SharePriceBelowMinimum { price: u128, minimum: u128 },

    #[error("no bonds outstanding at maturity {0}")]
    UnknownMaturity(MaturityTime),

    #[error("market rejected call: {0}")]
    Rejected(String),
}

pub type MarketResult<T> = std::result::Result<T, MarketError>;

/// Minimal market API needed by the rebalancer.
///
/// Mutating calls must be all-or-nothing: an `Err` means the market did not
/// change.
pub trait BondMarket {
    /// Current market time (seconds). Positions with `maturity_time <= now`
    /// are matured.
    fn now(&self) -> MaturityTime;

    /// Floor below which the market rejects trades.
    fn min_transaction_amount(&self) -> Amount;

    /// Current vault share price (`WAD` scaled), guarded on opens.
    fn vault_share_price(&self) -> u128;

    /// Spend `amount` on bonds at the next available maturity.
    ///
    /// Fails if fewer than `min_output` bonds would be received or the vault
    /// share price is below `min_vault_share_price`.
    fn open_position(
        &mut self,
        amount: Amount,
        min_output: BondAmount,
        min_vault_share_price: u128,
    ) -> MarketResult<(MaturityTime, BondAmount)>;

    /// Sell `bond_amount` bonds of `maturity_time` back to the market.
    ///
    /// Fails if proceeds would be below `min_output`.
    fn close_position(
        &mut self,
        maturity_time: MaturityTime,
        bond_amount: BondAmount,
        min_output: Amount,
    ) -> MarketResult<Amount>;

    /// Quote the proceeds of closing `bond_amount` bonds of `maturity_time`
    /// right now. Quotes are per position: callers must not average them
    /// across maturities.
    fn preview_close_position(
        &self,
        maturity_time: MaturityTime,
        bond_amount: BondAmount,
    ) -> MarketResult<Amount>;

    /// Quote the maturity and bond output of spending `amount` right now.
    fn preview_open_position(&self, amount: Amount) -> MarketResult<(MaturityTime, BondAmount)>;
}
