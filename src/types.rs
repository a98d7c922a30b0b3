//! Core types: MaturityTime, BondAmount, Position

use std::fmt;

/// Maturity timestamp in seconds. Bonds are redeemable at face value from
/// this instant onward.
pub type MaturityTime = u128;

/// Quantity of bonds (face value units) held at a single maturity.
pub type BondAmount = u128;

/// Amount of the base asset (idle liquidity, proceeds, spend).
pub type Amount = u128;

/// A block of bonds sharing one maturity time.
///
/// This is the decoded form of a ledger entry. The ledger itself stores
/// [`PackedPosition`](crate::PackedPosition) words.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Position {
    /// When the bonds mature
    pub maturity_time: MaturityTime,
    /// How many bonds are held at that maturity
    pub bond_amount: BondAmount,
}

impl Position {
    /// Create a position record.
    #[inline]
    pub const fn new(maturity_time: MaturityTime, bond_amount: BondAmount) -> Self {
        Self {
            maturity_time,
            bond_amount,
        }
    }

    /// Returns true if the bonds are redeemable at `now`.
    #[inline]
    pub fn is_mature(&self, now: MaturityTime) -> bool {
        self.maturity_time <= now
    }
}

impl From<(MaturityTime, BondAmount)> for Position {
    fn from((maturity_time, bond_amount): (MaturityTime, BondAmount)) -> Self {
        Self::new(maturity_time, bond_amount)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bonds @ t={}", self.bond_amount, self.maturity_time)
    }
}
