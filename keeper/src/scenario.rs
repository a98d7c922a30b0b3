//! Scenario files (scenario.json): a timestamped list of vault actions
//! replayed against the simulated market.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{Error, Result};

/// A replayable sequence of vault actions.
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub steps: Vec<Step>,
}

/// One vault action. Amounts are in base units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Add idle liquidity.
    Deposit { amount: u64 },
    /// Pay out to a withdrawing user, closing positions if needed.
    Withdraw { amount: u64 },
    /// Move the market clock forward.
    Advance {
        #[serde(default)]
        days: u64,
        #[serde(default)]
        seconds: u64,
    },
    /// Rebalance, keeping `withdrawal` in reserve and spending at most `spend`.
    Rebalance {
        #[serde(default)]
        withdrawal: u64,
        #[serde(default)]
        spend: Option<u64>,
    },
}

impl Step {
    /// Short action name, for logs and errors.
    pub fn action(&self) -> &'static str {
        match self {
            Step::Deposit { .. } => "deposit",
            Step::Withdraw { .. } => "withdraw",
            Step::Advance { .. } => "advance",
            Step::Rebalance { .. } => "rebalance",
        }
    }

    /// Clock advance of an `Advance` step, in seconds.
    pub fn advance_secs(&self) -> Option<u128> {
        match *self {
            Step::Advance { days, seconds } => {
                Some(u128::from(days) * 86_400 + u128::from(seconds))
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Step::Deposit { amount } => write!(f, "deposit {amount}"),
            Step::Withdraw { amount } => write!(f, "withdraw {amount}"),
            Step::Advance { days, seconds } => write!(f, "advance {days}d {seconds}s"),
            Step::Rebalance {
                withdrawal,
                spend: Some(spend),
            } => write!(f, "rebalance (reserve {withdrawal}, spend <= {spend})"),
            Step::Rebalance { withdrawal, .. } => write!(f, "rebalance (reserve {withdrawal})"),
        }
    }
}

impl Scenario {
    /// Load and validate a scenario file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::ScenarioRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json(&contents)
    }

    /// Parse from a JSON string (useful for testing).
    pub fn from_json(json: &str) -> Result<Self> {
        let scenario: Scenario = serde_json::from_str(json)?;
        scenario.validate()?;
        Ok(scenario)
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Scenario("scenario name is empty".into()));
        }
        if self.steps.is_empty() {
            return Err(Error::Scenario("steps list is empty".into()));
        }

        for (i, step) in self.steps.iter().enumerate() {
            let bad = match *step {
                Step::Deposit { amount } | Step::Withdraw { amount } => amount == 0,
                Step::Advance { days, seconds } => days == 0 && seconds == 0,
                Step::Rebalance { spend, .. } => spend == Some(0),
            };
            if bad {
                return Err(Error::Scenario(format!(
                    "step {} ({}) has a zero amount",
                    i + 1,
                    step.action()
                )));
            }
        }
        Ok(())
    }

    /// Number of rebalance steps.
    pub fn rebalance_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s, Step::Rebalance { .. }))
            .count()
    }
}
