//! Portfolio accounting: open/close rules over the position ledger.
//!
//! The portfolio is the only mutator of a [`PositionLedger`]. It keeps the
//! ledger ordered by strictly ascending maturity, merges opens at an existing
//! back maturity, closes strictly from the front, never stores a zero-amount
//! entry, and maintains `total_bonds` as the sum of all entries.
//!
//! Every operation validates before it mutates, so a failed call leaves the
//! portfolio exactly as it was.
//!
//! # Example
//!
//! ```
//! use bondbook::{Portfolio, Position};
//!
//! let mut portfolio = Portfolio::new();
//! portfolio.handle_open_position(100, 10).unwrap();
//! portfolio.handle_open_position(100, 5).unwrap(); // merged
//! portfolio.handle_open_position(200, 5).unwrap();
//!
//! portfolio.close_partial(4).unwrap();
//! assert_eq!(portfolio.position(0).unwrap(), Position::new(100, 11));
//! assert_eq!(portfolio.total_bonds(), 16);
//! ```

use crate::error::{PortfolioError, Result};
use crate::event::PortfolioEvent;
use crate::ledger::PositionLedger;
use crate::packed::{decode, encode};
use crate::types::{BondAmount, MaturityTime, Position};

/// Ledger state saved by [`Portfolio::checkpoint`].
#[derive(Clone, Debug)]
pub(crate) struct Checkpoint {
    ledger: PositionLedger,
    total_bonds: BondAmount,
    #[cfg(feature = "event-log")]
    events_len: usize,
}

/// Open bond positions plus derived totals and the event log.
#[derive(Clone, Debug, Default)]
pub struct Portfolio {
    /// Positions, ascending by maturity
    ledger: PositionLedger,
    /// Sum of bond amounts across the ledger
    total_bonds: BondAmount,
    /// Change events (only with "event-log" feature)
    #[cfg(feature = "event-log")]
    events: Vec<PortfolioEvent>,
}

impl Portfolio {
    /// Create an empty portfolio.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a portfolio from stored positions, checking every invariant.
    ///
    /// No events are emitted.
    pub fn from_positions<I>(positions: I) -> Result<Self>
    where
        I: IntoIterator<Item = Position>,
    {
        let mut ledger = PositionLedger::new();
        let mut total_bonds: BondAmount = 0;
        let mut latest: Option<MaturityTime> = None;

        for pos in positions {
            if pos.bond_amount == 0 {
                return Err(PortfolioError::ZeroBondAmount);
            }
            if let Some(latest) = latest {
                if pos.maturity_time <= latest {
                    return Err(PortfolioError::OutOfOrderMaturity {
                        maturity_time: pos.maturity_time,
                        latest,
                    });
                }
            }
            total_bonds = total_bonds
                .checked_add(pos.bond_amount)
                .ok_or(PortfolioError::ArithmeticOverflow)?;
            latest = Some(pos.maturity_time);
            ledger.push_back(pos.into());
        }

        Ok(Self {
            ledger,
            total_bonds,
            #[cfg(feature = "event-log")]
            events: Vec::new(),
        })
    }

    // === Queries ===

    /// Number of open positions.
    #[inline]
    pub fn position_count(&self) -> usize {
        self.ledger.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ledger.is_empty()
    }

    /// Position at `index` (0 = earliest maturity).
    pub fn position(&self, index: usize) -> Result<Position> {
        self.ledger.at(index)
    }

    /// Iterator over positions, earliest maturity first.
    pub fn positions(&self) -> impl DoubleEndedIterator<Item = Position> + ExactSizeIterator + '_ {
        self.ledger.iter()
    }

    /// The underlying ledger (read-only).
    #[inline]
    pub fn ledger(&self) -> &PositionLedger {
        &self.ledger
    }

    /// Total bonds held across all maturities.
    #[inline]
    pub fn total_bonds(&self) -> BondAmount {
        self.total_bonds
    }

    /// Earliest-maturing position, the next one any close will target.
    #[inline]
    pub fn front(&self) -> Option<Position> {
        self.ledger.front()
    }

    /// Latest-maturing position.
    #[inline]
    pub fn back(&self) -> Option<Position> {
        self.ledger.back()
    }

    /// True if the earliest position has matured at `now`.
    ///
    /// O(1): positions are ordered, so only the front needs checking.
    #[inline]
    pub fn has_matured_positions(&self, now: MaturityTime) -> bool {
        self.ledger.front().is_some_and(|p| p.is_mature(now))
    }

    /// Number of matured positions at `now`.
    pub fn matured_count(&self, now: MaturityTime) -> usize {
        self.ledger.iter().take_while(|p| p.is_mature(now)).count()
    }

    /// Check every ledger invariant. Cheap enough for tests and debug asserts.
    pub fn invariants_hold(&self) -> bool {
        let mut sum: BondAmount = 0;
        let mut prev: Option<MaturityTime> = None;
        for pos in self.ledger.iter() {
            if pos.bond_amount == 0 {
                return false;
            }
            if prev.is_some_and(|m| m >= pos.maturity_time) {
                return false;
            }
            prev = Some(pos.maturity_time);
            sum = match sum.checked_add(pos.bond_amount) {
                Some(s) => s,
                None => return false,
            };
        }
        sum == self.total_bonds
    }

    // === Mutations ===

    /// Record bonds bought at `maturity_time`.
    ///
    /// Appends a new position, or merges into the back position when the
    /// maturity matches it. Fails if the maturity is earlier than the back.
    pub fn handle_open_position(
        &mut self,
        maturity_time: MaturityTime,
        bond_amount: BondAmount,
    ) -> Result<PortfolioEvent> {
        if bond_amount == 0 {
            return Err(PortfolioError::ZeroBondAmount);
        }
        let back = self.ledger.back();
        if let Some(back) = back {
            if maturity_time < back.maturity_time {
                return Err(PortfolioError::OutOfOrderMaturity {
                    maturity_time,
                    latest: back.maturity_time,
                });
            }
        }
        let total_bonds = self
            .total_bonds
            .checked_add(bond_amount)
            .ok_or(PortfolioError::ArithmeticOverflow)?;

        let event = match back {
            Some(back) if back.maturity_time == maturity_time => {
                let merged = back
                    .bond_amount
                    .checked_add(bond_amount)
                    .ok_or(PortfolioError::ArithmeticOverflow)?;
                self.ledger.pop_back();
                self.ledger.push_back(encode(maturity_time, merged));
                PortfolioEvent::PositionUpdated {
                    maturity_time,
                    bond_amount: merged,
                    index: self.ledger.len() - 1,
                }
            }
            _ => {
                self.ledger.push_back(encode(maturity_time, bond_amount));
                PortfolioEvent::PositionOpened {
                    maturity_time,
                    bond_amount,
                    index: self.ledger.len() - 1,
                }
            }
        };

        self.total_bonds = total_bonds;
        self.emit(event);
        debug_assert!(self.invariants_hold());
        Ok(event)
    }

    /// Close `bond_amount_closed` bonds from the earliest position.
    ///
    /// Closing the whole front amount removes the entry; anything less
    /// shrinks it in place.
    pub fn close_partial(&mut self, bond_amount_closed: BondAmount) -> Result<PortfolioEvent> {
        if bond_amount_closed == 0 {
            return Err(PortfolioError::ZeroBondAmount);
        }
        let front = self.ledger.front().ok_or(PortfolioError::NoPositionsToClose)?;
        if bond_amount_closed > front.bond_amount {
            return Err(PortfolioError::InsufficientBonds {
                requested: bond_amount_closed,
                available: front.bond_amount,
            });
        }

        // Validated above: the pop cannot fail and the subtraction cannot wrap.
        let popped = self.ledger.pop_front().map(decode).unwrap_or(front);
        let remaining = popped.bond_amount - bond_amount_closed;

        let event = if remaining == 0 {
            PortfolioEvent::PositionClosed {
                maturity_time: popped.maturity_time,
            }
        } else {
            self.ledger.push_front(encode(popped.maturity_time, remaining));
            PortfolioEvent::PositionUpdated {
                maturity_time: popped.maturity_time,
                bond_amount: remaining,
                index: 0,
            }
        };

        self.total_bonds -= bond_amount_closed;
        self.emit(event);
        debug_assert!(self.invariants_hold());
        Ok(event)
    }

    /// Close 100% of the earliest position. Returns the closed position.
    pub fn close_full(&mut self) -> Result<Position> {
        let front = self.ledger.front().ok_or(PortfolioError::NoPositionsToClose)?;
        self.close_partial(front.bond_amount)?;
        Ok(front)
    }

    // === Rollback ===

    /// Capture enough state to undo every mutation made after this point.
    pub(crate) fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            ledger: self.ledger.clone(),
            total_bonds: self.total_bonds,
            #[cfg(feature = "event-log")]
            events_len: self.events.len(),
        }
    }

    /// Undo every mutation made since `checkpoint` was taken.
    pub(crate) fn restore(&mut self, checkpoint: Checkpoint) {
        self.ledger = checkpoint.ledger;
        self.total_bonds = checkpoint.total_bonds;
        #[cfg(feature = "event-log")]
        self.events.truncate(checkpoint.events_len);
    }

    // === Events ===

    /// Events emitted so far, oldest first.
    #[cfg(feature = "event-log")]
    pub fn events(&self) -> &[PortfolioEvent] {
        &self.events
    }

    /// Drain the event log.
    #[cfg(feature = "event-log")]
    pub fn take_events(&mut self) -> Vec<PortfolioEvent> {
        std::mem::take(&mut self.events)
    }

    #[cfg(feature = "event-log")]
    pub(crate) fn emit(&mut self, event: PortfolioEvent) {
        self.events.push(event);
    }

    #[cfg(not(feature = "event-log"))]
    #[inline]
    pub(crate) fn emit(&mut self, _event: PortfolioEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn positions(p: &Portfolio) -> Vec<(u128, u128)> {
        p.positions().map(|p| (p.maturity_time, p.bond_amount)).collect()
    }

    #[test]
    fn open_on_empty() {
        let mut p = Portfolio::new();
        let event = p.handle_open_position(100, 10).unwrap();
        assert_eq!(positions(&p), vec![(100, 10)]);
        assert_eq!(p.total_bonds(), 10);
        assert_eq!(
            event,
            PortfolioEvent::PositionOpened {
                maturity_time: 100,
                bond_amount: 10,
                index: 0
            }
        );
    }

    #[test]
    fn open_same_maturity_merges() {
        let mut p = Portfolio::new();
        p.handle_open_position(100, 10).unwrap();
        let event = p.handle_open_position(100, 5).unwrap();
        assert_eq!(positions(&p), vec![(100, 15)]);
        assert_eq!(
            event,
            PortfolioEvent::PositionUpdated {
                maturity_time: 100,
                bond_amount: 15,
                index: 0
            }
        );
    }

    #[test]
    fn merge_reports_back_index() {
        let mut p = Portfolio::new();
        p.handle_open_position(100, 10).unwrap();
        p.handle_open_position(200, 1).unwrap();
        let event = p.handle_open_position(200, 1).unwrap();
        assert_eq!(
            event,
            PortfolioEvent::PositionUpdated {
                maturity_time: 200,
                bond_amount: 2,
                index: 1
            }
        );
    }

    #[test]
    fn open_out_of_order_fails_without_mutation() {
        let mut p = Portfolio::new();
        p.handle_open_position(100, 10).unwrap();
        let err = p.handle_open_position(50, 5).unwrap_err();
        assert_eq!(
            err,
            PortfolioError::OutOfOrderMaturity {
                maturity_time: 50,
                latest: 100
            }
        );
        assert_eq!(positions(&p), vec![(100, 10)]);
        assert_eq!(p.total_bonds(), 10);
    }

    #[test]
    fn open_zero_rejected() {
        let mut p = Portfolio::new();
        assert_eq!(
            p.handle_open_position(100, 0),
            Err(PortfolioError::ZeroBondAmount)
        );
        assert!(p.is_empty());
    }

    #[test]
    fn open_overflow_rejected() {
        let mut p = Portfolio::new();
        p.handle_open_position(100, u128::MAX).unwrap();
        assert_eq!(
            p.handle_open_position(200, 1),
            Err(PortfolioError::ArithmeticOverflow)
        );
        assert_eq!(p.position_count(), 1);
    }

    #[test]
    fn partial_close_shrinks_front() {
        let mut p = Portfolio::new();
        p.handle_open_position(100, 10).unwrap();
        p.handle_open_position(200, 5).unwrap();
        let event = p.close_partial(4).unwrap();
        assert_eq!(positions(&p), vec![(100, 6), (200, 5)]);
        assert_eq!(p.total_bonds(), 11);
        assert_eq!(
            event,
            PortfolioEvent::PositionUpdated {
                maturity_time: 100,
                bond_amount: 6,
                index: 0
            }
        );
    }

    #[test]
    fn exact_close_removes_front() {
        let mut p = Portfolio::new();
        p.handle_open_position(100, 10).unwrap();
        let event = p.close_partial(10).unwrap();
        assert!(p.is_empty());
        assert_eq!(p.total_bonds(), 0);
        assert_eq!(event, PortfolioEvent::PositionClosed { maturity_time: 100 });
    }

    #[test]
    fn over_close_fails_without_mutation() {
        let mut p = Portfolio::new();
        p.handle_open_position(100, 10).unwrap();
        assert_eq!(
            p.close_partial(11),
            Err(PortfolioError::InsufficientBonds {
                requested: 11,
                available: 10
            })
        );
        assert_eq!(positions(&p), vec![(100, 10)]);
        assert_eq!(p.total_bonds(), 10);
    }

    #[test]
    fn close_on_empty_fails() {
        let mut p = Portfolio::new();
        assert_eq!(p.close_partial(1), Err(PortfolioError::NoPositionsToClose));
        assert_eq!(p.close_full(), Err(PortfolioError::NoPositionsToClose));
    }

    #[test]
    fn close_full_targets_front() {
        let mut p = Portfolio::new();
        p.handle_open_position(100, 10).unwrap();
        p.handle_open_position(200, 5).unwrap();
        assert_eq!(p.close_full().unwrap(), Position::new(100, 10));
        assert_eq!(positions(&p), vec![(200, 5)]);
        assert_eq!(p.total_bonds(), 5);
    }

    #[test]
    fn matured_detection() {
        let mut p = Portfolio::new();
        assert!(!p.has_matured_positions(u128::MAX));
        p.handle_open_position(100, 10).unwrap();
        p.handle_open_position(200, 10).unwrap();
        assert!(!p.has_matured_positions(99));
        assert!(p.has_matured_positions(100));
        assert_eq!(p.matured_count(150), 1);
        assert_eq!(p.matured_count(200), 2);
    }

    #[test]
    fn from_positions_validates() {
        let ok = Portfolio::from_positions([Position::new(1, 2), Position::new(3, 4)]).unwrap();
        assert_eq!(ok.total_bonds(), 6);
        assert!(ok.invariants_hold());

        assert!(matches!(
            Portfolio::from_positions([Position::new(3, 2), Position::new(3, 4)]),
            Err(PortfolioError::OutOfOrderMaturity { .. })
        ));
        assert_eq!(
            Portfolio::from_positions([Position::new(3, 0)]).unwrap_err(),
            PortfolioError::ZeroBondAmount
        );
    }

    #[cfg(feature = "event-log")]
    #[test]
    fn events_recorded_in_order() {
        let mut p = Portfolio::new();
        p.handle_open_position(100, 10).unwrap();
        p.handle_open_position(100, 5).unwrap();
        p.close_full().unwrap();
        let _ = p.close_full(); // fails, emits nothing

        assert_eq!(p.events().len(), 3);
        assert!(matches!(p.events()[0], PortfolioEvent::PositionOpened { .. }));
        assert!(matches!(p.events()[1], PortfolioEvent::PositionUpdated { .. }));
        assert_eq!(
            p.events()[2],
            PortfolioEvent::PositionClosed { maturity_time: 100 }
        );
        assert_eq!(p.take_events().len(), 3);
        assert!(p.events().is_empty());
    }
}
