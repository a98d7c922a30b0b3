//! bondbook-keeper: drives a bondbook strategy through scripted vault activity.
//!
//! Reads a scenario of deposits, withdrawals and clock advances from a JSON
//! file, replays it against a simulated bond market, rebalances whenever the
//! strategy reports work, and records the result in an audit trail and a
//! portfolio snapshot.

pub mod audit;
pub mod config;
pub mod error;
pub mod execution;
pub mod scenario;
