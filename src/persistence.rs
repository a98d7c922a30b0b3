//! File-based persistence: portfolio snapshots and JSON Lines event logs.
//!
//! Snapshots store each position as its packed 256-bit word in hex, so a
//! snapshot is byte-compatible with any other consumer of the packed layout.
//! Loading re-checks every ledger invariant.
//!
//! # Usage
//!
//! ```ignore
//! use bondbook::Portfolio;
//! use std::path::Path;
//!
//! portfolio.save(Path::new("portfolio.json")).unwrap();
//! let restored = Portfolio::load(Path::new("portfolio.json")).unwrap();
//! ```

use std::io::{self, BufRead, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::event::PortfolioEvent;
use crate::packed::{PackedPosition, decode};
use crate::portfolio::Portfolio;
use crate::types::BondAmount;

/// Serialized form of a portfolio's ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    /// Packed position words, front to back, `0x`-prefixed hex
    pub positions: Vec<String>,
    /// Recorded for verification on load
    pub total_bonds: BondAmount,
}

impl PortfolioSnapshot {
    /// Capture the ledger of `portfolio`.
    pub fn capture(portfolio: &Portfolio) -> Self {
        Self {
            positions: portfolio.ledger().words().map(PackedPosition::to_hex).collect(),
            total_bonds: portfolio.total_bonds(),
        }
    }

    /// Rebuild a portfolio, validating words, ordering and the recorded total.
    pub fn restore(&self) -> io::Result<Portfolio> {
        let mut positions = Vec::with_capacity(self.positions.len());
        for (i, hex) in self.positions.iter().enumerate() {
            let word = PackedPosition::from_hex(hex).ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("position {i}: invalid packed word {hex:?}"),
                )
            })?;
            positions.push(decode(word));
        }
        let portfolio = Portfolio::from_positions(positions)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        if portfolio.total_bonds() != self.total_bonds {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "total_bonds mismatch: recorded {}, positions sum to {}",
                    self.total_bonds,
                    portfolio.total_bonds()
                ),
            ));
        }
        Ok(portfolio)
    }
}

/// Save events to a file in JSON Lines format.
pub fn save_events(events: &[PortfolioEvent], path: &Path) -> io::Result<()> {
    let file = std::fs::File::create(path)?;
    let mut writer = io::BufWriter::new(file);

    for event in events {
        let json = serde_json::to_string(event).map_err(io::Error::other)?;
        writeln!(writer, "{json}")?;
    }

    writer.flush()?;
    Ok(())
}

/// Load events from a JSON Lines file. Empty lines are skipped.
pub fn load_events(path: &Path) -> io::Result<Vec<PortfolioEvent>> {
    let file = std::fs::File::open(path)?;
    let reader = io::BufReader::new(file);
    let mut events = Vec::new();

    for (line_num, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let event: PortfolioEvent = serde_json::from_str(line).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("line {}: {}", line_num + 1, e),
            )
        })?;
        events.push(event);
    }

    Ok(events)
}

impl Portfolio {
    /// Save a ledger snapshot as pretty JSON.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let snapshot = PortfolioSnapshot::capture(self);
        let json = serde_json::to_string_pretty(&snapshot).map_err(io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Load a ledger snapshot written by [`save`](Self::save).
    ///
    /// The event log of the returned portfolio starts empty.
    pub fn load(path: &Path) -> io::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let snapshot: PortfolioSnapshot = serde_json::from_str(&contents)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        snapshot.restore()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Portfolio {
        let mut p = Portfolio::new();
        p.handle_open_position(100, 10).unwrap();
        p.handle_open_position(200, 5).unwrap();
        p.close_partial(4).unwrap();
        p
    }

    #[test]
    fn snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portfolio.json");

        let p = sample();
        p.save(&path).unwrap();
        let restored = Portfolio::load(&path).unwrap();

        assert_eq!(
            restored.positions().collect::<Vec<_>>(),
            p.positions().collect::<Vec<_>>()
        );
        assert_eq!(restored.total_bonds(), 11);
        assert!(restored.events().is_empty());
    }

    #[test]
    fn snapshot_rejects_unordered_words() {
        let snapshot = PortfolioSnapshot {
            positions: vec![
                crate::packed::encode(200, 1).to_hex(),
                crate::packed::encode(100, 1).to_hex(),
            ],
            total_bonds: 2,
        };
        assert!(snapshot.restore().is_err());
    }

    #[test]
    fn snapshot_rejects_wrong_total() {
        let mut snapshot = PortfolioSnapshot::capture(&sample());
        snapshot.total_bonds += 1;
        let err = snapshot.restore().unwrap_err();
        assert!(err.to_string().contains("total_bonds mismatch"));
    }

    #[test]
    fn events_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");

        let p = sample();
        save_events(p.events(), &path).unwrap();
        let loaded = load_events(&path).unwrap();
        assert_eq!(loaded, p.events());
    }
}
