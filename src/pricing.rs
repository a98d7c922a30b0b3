//! Pricing helpers: full-width multiply-divide, basis-point buffers, and
//! per-position price deviation checks.
//!
//! All amounts are `u128`. Intermediate products are computed in 256 bits,
//! so `a * b / d` is exact whenever the final quotient fits in `u128`.

use ethnum::U256;

use crate::error::{PortfolioError, Result};
use crate::types::{Amount, BondAmount};

/// Basis points in 100%.
pub const BPS: u32 = 10_000;

/// Fixed-point scale for per-bond prices (1.0 = `WAD`).
pub const WAD: u128 = 1_000_000_000_000_000_000;

/// Rounding direction for [`mul_div`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rounding {
    Down,
    Up,
}

/// Compute `a * b / denominator` with a 256-bit intermediate.
///
/// Fails with `ArithmeticOverflow` on a zero denominator or a quotient that
/// does not fit in `u128`.
pub fn mul_div(a: u128, b: u128, denominator: u128, rounding: Rounding) -> Result<u128> {
    if denominator == 0 {
        return Err(PortfolioError::ArithmeticOverflow);
    }
    let product = U256::from(a) * U256::from(b);
    let denominator = U256::from(denominator);
    let mut quotient = product / denominator;
    if rounding == Rounding::Up && product % denominator != U256::ZERO {
        quotient += U256::ONE;
    }
    let (hi, lo) = quotient.into_words();
    if hi != 0 {
        return Err(PortfolioError::ArithmeticOverflow);
    }
    Ok(lo)
}

/// `amount` increased by `bps`, rounded up.
pub fn add_bps(amount: u128, bps: u32) -> Result<u128> {
    mul_div(amount, u128::from(BPS) + u128::from(bps), u128::from(BPS), Rounding::Up)
}

/// `amount` reduced by `bps`, rounded down. Saturates at zero for
/// `bps >= 10_000`.
pub fn sub_bps(amount: u128, bps: u32) -> u128 {
    let keep = BPS.saturating_sub(bps);
    // keep <= BPS, so the quotient never exceeds `amount`
    mul_div(amount, u128::from(keep), u128::from(BPS), Rounding::Down).unwrap_or(0)
}

/// Price of one bond in `WAD` units, given the proceeds quoted for `bonds`.
pub fn price_per_bond(proceeds: Amount, bonds: BondAmount) -> Result<u128> {
    mul_div(proceeds, WAD, bonds, Rounding::Down)
}

/// Fail with `SlippageExceeded` if `quoted` sits below `reference` by more
/// than `buffer_bps`. Quotes above the reference always pass.
pub fn check_deviation(quoted: u128, reference: u128, buffer_bps: u32) -> Result<()> {
    if quoted < sub_bps(reference, buffer_bps) {
        return Err(PortfolioError::SlippageExceeded {
            quoted,
            reference,
            buffer_bps,
        });
    }
    Ok(())
}

/// Bonds to close from a position so that its proceeds cover `needed`.
///
/// Sized from this position's own quote (`position_value` for all
/// `position_bonds`), padded by `buffer_bps` and capped at the position size.
pub fn bonds_to_cover(
    needed: Amount,
    position_value: Amount,
    position_bonds: BondAmount,
    buffer_bps: u32,
) -> Result<BondAmount> {
    if needed >= position_value || position_value == 0 {
        return Ok(position_bonds);
    }
    let bonds = mul_div(needed, position_bonds, position_value, Rounding::Up)?;
    let padded = add_bps(bonds, buffer_bps)?;
    Ok(padded.min(position_bonds))
}
