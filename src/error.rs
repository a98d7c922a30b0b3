//! Errors for ledger, accounting and rebalance operations.
//!
//! Every error aborts the whole enclosing operation: the portfolio is never
//! left in a partially mutated state.

use crate::market::MarketError;
use crate::types::{Amount, BondAmount, MaturityTime};

/// Errors returned by ledger reads, accounting mutations and the rebalancer.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PortfolioError {
    /// Indexed read past the end of the ledger.
    #[error("index {index} out of range for ledger of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// Open with a maturity earlier than the latest held position.
    #[error("maturity {maturity_time} is earlier than latest held maturity {latest}")]
    OutOfOrderMaturity {
        maturity_time: MaturityTime,
        latest: MaturityTime,
    },

    /// Close amount exceeds the front position.
    #[error("cannot close {requested} bonds, front position holds {available}")]
    InsufficientBonds {
        requested: BondAmount,
        available: BondAmount,
    },

    /// Close on an empty ledger.
    #[error("no positions to close")]
    NoPositionsToClose,

    /// Open or partial close with a zero bond amount.
    #[error("bond amount must be greater than zero")]
    ZeroBondAmount,

    /// An accumulator would overflow `u128`.
    #[error("arithmetic overflow")]
    ArithmeticOverflow,

    /// Quoted price diverged from the reference by more than the allowed buffer.
    #[error("slippage exceeded: quoted {quoted}, reference {reference}, buffer {buffer_bps} bps")]
    SlippageExceeded {
        quoted: Amount,
        reference: Amount,
        buffer_bps: u32,
    },

    /// A per-call closure limit of zero would leave matured positions in
    /// place forever.
    #[error("position closure limit must be greater than zero")]
    ZeroClosureLimit,

    /// Not enough assets could be raised to cover a withdrawal.
    #[error("insufficient liquidity: requested {requested}, available {available}")]
    InsufficientLiquidity { requested: Amount, available: Amount },

    /// The bond market adapter failed the call.
    #[error("bond market call failed: {0}")]
    ExternalCallFailure(#[from] MarketError),
}

impl PortfolioError {
    /// True for failures caused by price movement, which the caller may retry
    /// with adjusted bounds.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            PortfolioError::SlippageExceeded { .. }
                | PortfolioError::ExternalCallFailure(
                    MarketError::OutputBelowMinimum { .. }
                        | MarketError::SharePriceBelowMinimum { .. }
                )
        )
    }
}

pub type Result<T> = std::result::Result<T, PortfolioError>;
