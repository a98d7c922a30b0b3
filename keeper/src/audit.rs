//! JSONL audit trail logging.
//!
//! Each keeper run appends entries to an audit.jsonl file,
//! one JSON object per line (following the library's event-log format).

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use bondbook::{PortfolioEvent, RebalanceReport};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::scenario::Step;

/// An audit entry written to the JSONL trail.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub event: &'static str,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub data: serde_json::Value,
}

/// Append-only audit logger.
pub struct AuditLog {
    writer: BufWriter<std::fs::File>,
}

impl AuditLog {
    /// Open (or create) the audit log file for appending.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    /// Log an event with arbitrary JSON data.
    pub fn log(&mut self, event: &'static str, data: serde_json::Value) -> Result<()> {
        let entry = AuditEvent {
            event,
            ts: Utc::now(),
            data,
        };
        let json = serde_json::to_string(&entry)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        writeln!(self.writer, "{json}")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Log a simple event with no additional data.
    pub fn log_simple(&mut self, event: &'static str) -> Result<()> {
        self.log(event, serde_json::json!({}))
    }
}

// Amounts are u128; JSON numbers above 2^53 lose precision in most readers,
// so they go into the trail as decimal strings.
fn amount(value: u128) -> serde_json::Value {
    serde_json::Value::String(value.to_string())
}

/// Convenience: log a run start event.
pub fn log_run_started(audit: &mut AuditLog, scenario: &str, steps: usize) -> Result<()> {
    audit.log(
        "run_started",
        serde_json::json!({
            "scenario": scenario,
            "steps": steps,
        }),
    )
}

/// Convenience: log a deposit, withdrawal or clock advance.
pub fn log_step(audit: &mut AuditLog, index: usize, step: &Step, now: u128, idle: u128) -> Result<()> {
    audit.log(
        "step_applied",
        serde_json::json!({
            "step": index + 1,
            "action": step.action(),
            "detail": step.to_string(),
            "now": amount(now),
            "idle": amount(idle),
        }),
    )
}

/// Convenience: log a rebalance outcome.
pub fn log_rebalance(audit: &mut AuditLog, index: usize, report: &RebalanceReport) -> Result<()> {
    audit.log(
        "rebalanced",
        serde_json::json!({
            "step": index + 1,
            "matured_closed": report.matured_closed,
            "immature_closed": report.immature_closed,
            "bonds_closed": amount(report.bonds_closed),
            "proceeds": amount(report.proceeds),
            "opened": report.opened.map(|p| serde_json::json!({
                "maturity_time": amount(p.maturity_time),
                "bond_amount": amount(p.bond_amount),
            })),
            "spent": amount(report.spent),
            "idle": amount(report.idle_after),
        }),
    )
}

/// Convenience: log a rebalance step that was skipped.
pub fn log_skipped(audit: &mut AuditLog, index: usize) -> Result<()> {
    audit.log("rebalance_skipped", serde_json::json!({ "step": index + 1 }))
}

/// Convenience: log the ledger events produced by a run.
pub fn log_events(audit: &mut AuditLog, events: &[PortfolioEvent]) -> Result<()> {
    let data: Vec<_> = events.iter().map(ToString::to_string).collect();
    audit.log("ledger_events", serde_json::json!({ "events": data }))
}

/// Convenience: log run completion.
pub fn log_run_completed(
    audit: &mut AuditLog,
    rebalances: usize,
    skipped: usize,
    positions: usize,
    total_bonds: u128,
    idle: u128,
) -> Result<()> {
    audit.log(
        "run_completed",
        serde_json::json!({
            "rebalances": rebalances,
            "skipped": skipped,
            "positions": positions,
            "total_bonds": amount(total_bonds),
            "idle": amount(idle),
        }),
    )
}

/// Convenience: log a failed run.
pub fn log_run_failed(audit: &mut AuditLog, error: &str) -> Result<()> {
    audit.log("run_failed", serde_json::json!({ "error": error }))
}
