//! Packed 256-bit position words.
//!
//! Layout: `maturity_time` in the high 128 bits, `bond_amount` in the low
//! 128 bits. The codec is total over `u128 x u128` and round-trips exactly,
//! so stored words stay byte-compatible across versions.

use std::fmt;

use ethnum::U256;

use crate::types::{BondAmount, MaturityTime, Position};

/// One ledger entry in its stored form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PackedPosition(pub U256);

/// Pack a maturity time and bond amount into one word.
#[inline]
pub const fn encode(maturity_time: MaturityTime, bond_amount: BondAmount) -> PackedPosition {
    PackedPosition(U256::from_words(maturity_time, bond_amount))
}

/// Unpack a word into its position fields.
#[inline]
pub const fn decode(word: PackedPosition) -> Position {
    let (maturity_time, bond_amount) = word.0.into_words();
    Position::new(maturity_time, bond_amount)
}

impl PackedPosition {
    /// Raw 256-bit value.
    #[inline]
    pub const fn word(&self) -> U256 {
        self.0
    }

    /// Big-endian bytes, the layout used by external consumers.
    pub fn to_be_bytes(&self) -> [u8; 32] {
        self.0.to_be_bytes()
    }

    /// Rebuild from big-endian bytes.
    pub fn from_be_bytes(bytes: [u8; 32]) -> Self {
        PackedPosition(U256::from_be_bytes(bytes))
    }

    /// Fixed-width lowercase hex, `0x`-prefixed (66 chars).
    pub fn to_hex(&self) -> String {
        let (hi, lo) = self.0.into_words();
        format!("0x{hi:032x}{lo:032x}")
    }

    /// Parse the output of [`to_hex`](Self::to_hex). The `0x` prefix is optional.
    pub fn from_hex(s: &str) -> Option<Self> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        if digits.len() != 64 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let hi = u128::from_str_radix(&digits[..32], 16).ok()?;
        let lo = u128::from_str_radix(&digits[32..], 16).ok()?;
        Some(PackedPosition(U256::from_words(hi, lo)))
    }
}

impl From<Position> for PackedPosition {
    fn from(pos: Position) -> Self {
        encode(pos.maturity_time, pos.bond_amount)
    }
}

impl From<PackedPosition> for Position {
    fn from(word: PackedPosition) -> Self {
        decode(word)
    }
}

impl fmt::Display for PackedPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
