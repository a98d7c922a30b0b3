//! Structured change events emitted by the portfolio.
//!
//! Events describe outputs (what changed), in the order they happened.
//! They are recorded on the [`Portfolio`](crate::Portfolio) when the
//! `event-log` feature is enabled and can be persisted as JSON Lines.

use std::fmt;

use crate::types::{BondAmount, MaturityTime};

/// A change to the position ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PortfolioEvent {
    /// A new maturity was appended at the back.
    PositionOpened {
        maturity_time: MaturityTime,
        bond_amount: BondAmount,
        index: usize,
    },
    /// An existing position changed size (merge at the back or partial close
    /// at the front). `bond_amount` is the new size.
    PositionUpdated {
        maturity_time: MaturityTime,
        bond_amount: BondAmount,
        index: usize,
    },
    /// The front position was fully closed.
    PositionClosed { maturity_time: MaturityTime },
    /// A rebalance call completed and changed something.
    Rebalanced,
}

impl PortfolioEvent {
    /// Maturity the event refers to, if any.
    pub fn maturity_time(&self) -> Option<MaturityTime> {
        match self {
            PortfolioEvent::PositionOpened { maturity_time, .. }
            | PortfolioEvent::PositionUpdated { maturity_time, .. }
            | PortfolioEvent::PositionClosed { maturity_time } => Some(*maturity_time),
            PortfolioEvent::Rebalanced => None,
        }
    }
}

impl fmt::Display for PortfolioEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortfolioEvent::PositionOpened {
                maturity_time,
                bond_amount,
                index,
            } => write!(f, "OPENED   #{index} t={maturity_time} bonds={bond_amount}"),
            PortfolioEvent::PositionUpdated {
                maturity_time,
                bond_amount,
                index,
            } => write!(f, "UPDATED  #{index} t={maturity_time} bonds={bond_amount}"),
            PortfolioEvent::PositionClosed { maturity_time } => {
                write!(f, "CLOSED   t={maturity_time}")
            }
            PortfolioEvent::Rebalanced => write!(f, "REBALANCED"),
        }
    }
}
