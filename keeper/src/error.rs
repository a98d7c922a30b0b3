//! Error types for the keeper.

use std::path::PathBuf;

use bondbook::PortfolioError;

/// All errors that can occur during keeper operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("scenario error: {0}")]
    Scenario(String),

    #[error("failed to read scenario file {path}: {source}")]
    ScenarioRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse scenario JSON: {0}")]
    ScenarioParse(#[from] serde_json::Error),

    #[error("step {step} ({action}) failed: {source}")]
    Step {
        step: usize,
        action: &'static str,
        source: PortfolioError,
    },

    #[error("execution aborted: {0}")]
    Aborted(String),

    #[error("audit log error: {0}")]
    Audit(#[from] std::io::Error),
}

impl Error {
    /// True if a step failed on a price guard; resubmitting with wider
    /// bounds may succeed.
    pub fn is_guard_failure(&self) -> bool {
        matches!(self, Error::Step { source, .. } if source.is_retriable())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
