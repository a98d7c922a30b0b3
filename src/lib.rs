//! # bondbook
//!
//! A maturity-ordered bond position ledger and the rebalancing policy that
//! drives it, for vault strategies that hold fixed-maturity bonds.
//!
//! ## Features
//!
//! - **Packed ledger**: positions stored as 256-bit words
//!   (`maturity_time << 128 | bond_amount`) in a double-ended queue
//! - **Strict accounting**: ascending maturities, merge on equal maturity,
//!   FIFO closes, no zero-amount entries, exact `total_bonds`
//! - **Rebalancing**: close matured positions, raise liquidity for
//!   withdrawals with per-position pricing, deploy excess idle capital
//! - **All-or-nothing calls**: a failed rebalance leaves no trace
//! - **Event log**: every ledger change recorded for audit and replay
//!
//! ## Quick Start
//!
//! ```
//! use bondbook::{Portfolio, PortfolioEvent, Position};
//!
//! let mut portfolio = Portfolio::new();
//!
//! // Bonds bought at the same maturity merge into one position
//! portfolio.handle_open_position(100, 10).unwrap();
//! let event = portfolio.handle_open_position(100, 5).unwrap();
//! assert!(matches!(event, PortfolioEvent::PositionUpdated { bond_amount: 15, .. }));
//!
//! // Later maturities append at the back
//! portfolio.handle_open_position(200, 5).unwrap();
//! assert_eq!(portfolio.position_count(), 2);
//!
//! // Closes always hit the earliest maturity first
//! portfolio.close_partial(15).unwrap();
//! assert_eq!(portfolio.position(0).unwrap(), Position::new(200, 5));
//! assert_eq!(portfolio.total_bonds(), 5);
//! ```
//!
//! ## Packed Positions
//!
//! ```
//! use bondbook::{decode, encode, Position};
//!
//! let word = encode(1_700_000_000, 42);
//! assert_eq!(decode(word), Position::new(1_700_000_000, 42));
//! assert_eq!(word.to_hex().len(), 66);
//! ```
//!
//! ## Rebalancing
//!
//! ```
//! use bondbook::market::{BondMarket, MockMarket};
//! use bondbook::{RebalanceConfig, RebalanceOptions, Rebalancer};
//!
//! let mut market = MockMarket::builder()
//!     .position_duration(30 * 86_400)
//!     .min_transaction_amount(10)
//!     .build();
//! let mut strategy = Rebalancer::new(RebalanceConfig::default());
//!
//! strategy.deposit(1_000).unwrap();
//! strategy.rebalance(&mut market, &RebalanceOptions::default()).unwrap();
//! assert_eq!(strategy.idle(), 0);
//!
//! // After maturity the position is closed and the proceeds reinvested
//! market.advance(31 * 86_400);
//! assert!(strategy.can_rebalance(&market, 0));
//! let report = strategy.rebalance(&mut market, &RebalanceOptions::default()).unwrap();
//! assert_eq!(report.matured_closed, 1);
//! assert!(report.opened.is_some());
//! ```

pub mod error;
mod event;
pub mod ledger;
pub mod market;
pub mod packed;
#[cfg(feature = "persistence")]
pub mod persistence;
mod portfolio;
pub mod pricing;
mod rebalancer;
mod types;

// Re-export public API
pub use error::{PortfolioError, Result};
pub use event::PortfolioEvent;
pub use ledger::PositionLedger;
pub use market::{BondMarket, MarketError};
pub use packed::{PackedPosition, decode, encode};
pub use portfolio::Portfolio;
pub use rebalancer::{RebalanceConfig, RebalanceOptions, RebalanceReport, Rebalancer};
pub use types::{Amount, BondAmount, MaturityTime, Position};
