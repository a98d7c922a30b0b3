//! PositionLedger: a double-ended queue of packed positions.
//!
//! The ledger is a plain container. It does not enforce ordering or
//! positivity; those rules live in [`Portfolio`](crate::Portfolio), which is
//! the only mutator in normal use.

use std::collections::VecDeque;

use crate::error::{PortfolioError, Result};
use crate::packed::{PackedPosition, decode};
use crate::types::Position;

/// Positions in ascending maturity order, stored as packed words.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PositionLedger {
    words: VecDeque<PackedPosition>,
}

impl PositionLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self {
            words: VecDeque::new(),
        }
    }

    /// Number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Decoded entry at `index` (0 = earliest maturity).
    pub fn at(&self, index: usize) -> Result<Position> {
        self.words
            .get(index)
            .copied()
            .map(decode)
            .ok_or(PortfolioError::IndexOutOfRange {
                index,
                len: self.words.len(),
            })
    }

    /// Earliest-maturing entry.
    #[inline]
    pub fn front(&self) -> Option<Position> {
        self.words.front().copied().map(decode)
    }

    /// Latest-maturing entry.
    #[inline]
    pub fn back(&self) -> Option<Position> {
        self.words.back().copied().map(decode)
    }

    #[inline]
    pub fn push_back(&mut self, word: PackedPosition) {
        self.words.push_back(word);
    }

    #[inline]
    pub fn pop_back(&mut self) -> Option<PackedPosition> {
        self.words.pop_back()
    }

    #[inline]
    pub fn push_front(&mut self, word: PackedPosition) {
        self.words.push_front(word);
    }

    #[inline]
    pub fn pop_front(&mut self) -> Option<PackedPosition> {
        self.words.pop_front()
    }

    /// Iterate decoded entries front to back.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = Position> + ExactSizeIterator + '_ {
        self.words.iter().copied().map(decode)
    }

    /// Raw stored words front to back.
    pub fn words(&self) -> impl Iterator<Item = &PackedPosition> {
        self.words.iter()
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.words.clear();
    }
}

impl FromIterator<PackedPosition> for PositionLedger {
    fn from_iter<I: IntoIterator<Item = PackedPosition>>(iter: I) -> Self {
        Self {
            words: iter.into_iter().collect(),
        }
    }
}
