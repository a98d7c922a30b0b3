//! Execution orchestrator: replay → confirm → audit → save.
//!
//! This is the main workflow that ties together all components.

use bondbook::market::MockMarket;
use bondbook::pricing::sub_bps;
use bondbook::{
    Amount, BondMarket, Portfolio, PortfolioError, RebalanceOptions, RebalanceReport,
    Rebalancer,
};
use log::{debug, info, warn};

use crate::audit::{self, AuditLog};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::scenario::{Scenario, Step};

/// Options for a keeper run.
pub struct RunOptions {
    pub dry_run: bool,
    pub force: bool,
    pub scenario_file: String,
}

/// How rebalance steps are treated during a replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Rebalance whenever `can_rebalance` says there is work.
    Execute,
    /// Only record what `can_rebalance` reports.
    Plan,
}

/// What a single step did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Deposited,
    Withdrawn,
    Advanced,
    Rebalanced(RebalanceReport),
    /// Nothing to do at this step
    Skipped,
    /// Plan mode: whether a rebalance would have acted
    Planned { would_act: bool },
}

/// State after one step.
#[derive(Debug, Clone)]
pub struct StepRecord {
    pub step: Step,
    pub now: u128,
    pub idle: Amount,
    pub outcome: StepOutcome,
}

/// Final state of a replay.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub strategy: Rebalancer,
    pub market: MockMarket,
    pub records: Vec<StepRecord>,
}

impl RunOutcome {
    pub fn rebalances(&self) -> usize {
        self.records
            .iter()
            .filter(|r| matches!(r.outcome, StepOutcome::Rebalanced(_)))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.outcome == StepOutcome::Skipped)
            .count()
    }

    pub fn portfolio(&self) -> &Portfolio {
        self.strategy.portfolio()
    }
}

/// Caller bounds for one rebalance, derived from `[guards]`.
///
/// `min_output` is the projected open's quoted bond output less the open
/// slippage allowance. The projection assumes matured positions close at
/// their previews, up to the per-call limit.
pub fn rebalance_options<M: BondMarket>(
    config: &Config,
    strategy: &Rebalancer,
    market: &M,
    withdrawal: Amount,
    spend: Option<Amount>,
) -> RebalanceOptions {
    let guards = &config.guards;
    let min_output = projected_spend(strategy, market, withdrawal, spend)
        .and_then(|amount| market.preview_open_position(amount).ok())
        .map(|(_, bonds)| sub_bps(bonds, guards.open_slippage_bps))
        .unwrap_or(0);

    RebalanceOptions {
        spend_amount: spend,
        min_output,
        min_vault_share_price: u128::from(guards.min_vault_share_price),
        close_slippage_bps: guards.close_slippage_bps,
        position_closure_limit: None,
        withdrawal,
    }
}

fn projected_spend<M: BondMarket>(
    strategy: &Rebalancer,
    market: &M,
    withdrawal: Amount,
    spend: Option<Amount>,
) -> Option<Amount> {
    let now = market.now();
    let limit = strategy.config().max_positions_closed_per_call;
    let mut idle = strategy.idle();
    for pos in strategy
        .portfolio()
        .positions()
        .take_while(|p| p.is_mature(now))
        .take(limit)
    {
        let proceeds = market
            .preview_close_position(pos.maturity_time, pos.bond_amount)
            .ok()?;
        idle = idle.saturating_add(proceeds);
    }

    let reserved = strategy
        .config()
        .target_idle_liquidity
        .saturating_add(withdrawal);
    let mut excess = idle.checked_sub(reserved)?;
    if let Some(cap) = spend {
        excess = excess.min(cap);
    }
    (excess > market.min_transaction_amount()).then_some(excess)
}

/// Replay `scenario` against a fresh strategy and the configured market.
///
/// Stops at the first failing step; the strategy state at that point is
/// discarded with the error.
pub fn execute_steps(config: &Config, scenario: &Scenario, mode: Mode) -> Result<RunOutcome> {
    let mut strategy = Rebalancer::new(config.rebalance_config());
    let mut market = config.build_market();
    let mut records = Vec::with_capacity(scenario.steps.len());

    for (i, step) in scenario.steps.iter().enumerate() {
        let fail = |source: PortfolioError| Error::Step {
            step: i + 1,
            action: step.action(),
            source,
        };

        let outcome = match *step {
            Step::Deposit { amount } => {
                strategy.deposit(u128::from(amount)).map_err(fail)?;
                StepOutcome::Deposited
            }
            Step::Withdraw { amount } => {
                let options = rebalance_options(config, &strategy, &market, 0, None);
                strategy
                    .free_funds(&mut market, u128::from(amount), &options)
                    .map_err(fail)?;
                StepOutcome::Withdrawn
            }
            Step::Advance { .. } => {
                market.advance(step.advance_secs().unwrap_or_default());
                StepOutcome::Advanced
            }
            Step::Rebalance { withdrawal, spend } => {
                let withdrawal = u128::from(withdrawal);
                let would_act = strategy.can_rebalance(&market, withdrawal);
                match (mode, would_act) {
                    (Mode::Plan, _) => StepOutcome::Planned { would_act },
                    (Mode::Execute, false) => {
                        debug!("step {}: nothing to rebalance", i + 1);
                        StepOutcome::Skipped
                    }
                    (Mode::Execute, true) => {
                        let options = rebalance_options(
                            config,
                            &strategy,
                            &market,
                            withdrawal,
                            spend.map(u128::from),
                        );
                        let report = strategy.rebalance(&mut market, &options).map_err(fail)?;
                        StepOutcome::Rebalanced(report)
                    }
                }
            }
        };

        records.push(StepRecord {
            step: *step,
            now: market.now(),
            idle: strategy.idle(),
            outcome,
        });
    }

    Ok(RunOutcome {
        strategy,
        market,
        records,
    })
}

/// Replay a scenario, confirm, then write the audit trail and snapshot.
pub fn run(config: &Config, scenario: &Scenario, opts: &RunOptions) -> Result<()> {
    println!(
        "Scenario '{}' ({} steps, {} rebalances) from {}",
        scenario.name,
        scenario.steps.len(),
        scenario.rebalance_count(),
        scenario.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
    );

    // 1. Replay
    let outcome = match execute_steps(config, scenario, Mode::Execute) {
        Ok(outcome) => outcome,
        Err(e) => {
            if !opts.dry_run {
                let mut audit = AuditLog::open(&config.audit_path())?;
                audit::log_run_started(&mut audit, &opts.scenario_file, scenario.steps.len())?;
                audit::log_run_failed(&mut audit, &e.to_string())?;
            }
            return Err(e);
        }
    };

    // 2. Display
    display_records(&outcome.records);
    println!();
    display_portfolio(outcome.portfolio(), outcome.strategy.idle());

    // 3. Dry run stops here
    if opts.dry_run {
        println!("\n[DRY RUN] Nothing written.");
        return Ok(());
    }

    // 4. Confirm
    let mut audit = AuditLog::open(&config.audit_path())?;
    audit::log_run_started(&mut audit, &opts.scenario_file, scenario.steps.len())?;

    if !opts.force {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt("Save snapshot and audit trail?")
            .default(false)
            .interact()
            .map_err(|e| Error::Aborted(format!("confirmation prompt failed: {e}")))?;

        if !confirmed {
            println!("Aborted.");
            audit.log("user_confirmed", serde_json::json!({"approved": false}))?;
            return Ok(());
        }

        audit.log("user_confirmed", serde_json::json!({"approved": true}))?;
    }

    // 5. Audit trail
    write_audit(&mut audit, &outcome)?;

    // 6. Snapshot and event log
    let snapshot = config.snapshot_path();
    outcome.portfolio().save(&snapshot)?;
    let events = snapshot.with_extension("events.jsonl");
    bondbook::persistence::save_events(outcome.portfolio().events(), &events)?;

    info!(
        "saved {} positions to {} ({} events)",
        outcome.portfolio().position_count(),
        snapshot.display(),
        outcome.portfolio().events().len()
    );
    println!(
        "\n{} rebalanced, {} skipped. Audit logged to {}",
        outcome.rebalances(),
        outcome.skipped(),
        config.audit_path().display()
    );

    Ok(())
}

/// Write every step record plus the run summary to the audit trail.
pub fn write_audit(audit: &mut AuditLog, outcome: &RunOutcome) -> Result<()> {
    for (i, record) in outcome.records.iter().enumerate() {
        match &record.outcome {
            StepOutcome::Rebalanced(report) => audit::log_rebalance(audit, i, report)?,
            StepOutcome::Skipped => audit::log_skipped(audit, i)?,
            _ => audit::log_step(audit, i, &record.step, record.now, record.idle)?,
        }
    }

    let portfolio = outcome.portfolio();
    audit::log_events(audit, portfolio.events())?;
    audit::log_run_completed(
        audit,
        outcome.rebalances(),
        outcome.skipped(),
        portfolio.position_count(),
        portfolio.total_bonds(),
        outcome.strategy.idle(),
    )
}

/// Replay without rebalancing and print what each rebalance step would do.
pub fn plan(config: &Config, scenario: &Scenario) -> Result<()> {
    let outcome = execute_steps(config, scenario, Mode::Plan)?;

    println!("PLAN for '{}':", scenario.name);
    for (i, record) in outcome.records.iter().enumerate() {
        if let StepOutcome::Planned { would_act } = record.outcome {
            println!(
                "  {:>3}  t={:<12} idle={:<14} {}",
                i + 1,
                record.now,
                record.idle,
                if would_act { "REBALANCE" } else { "no-op" },
            );
        }
    }

    let acting = outcome
        .records
        .iter()
        .filter(|r| r.outcome == StepOutcome::Planned { would_act: true })
        .count();
    if acting == 0 {
        warn!("no rebalance step in '{}' would act", scenario.name);
    } else if !share_price_clears_guard(config, &outcome.market) {
        warn!("share price is below the open guard; planned opens would fail");
    }
    Ok(())
}

/// True if the market's vault share price clears the configured open guard.
pub fn share_price_clears_guard<M: BondMarket>(config: &Config, market: &M) -> bool {
    market.vault_share_price() >= u128::from(config.guards.min_vault_share_price)
}

/// Print the validated config.
pub fn check(config: &Config) -> Result<()> {
    let market = config.build_market();
    println!("Config OK");
    println!(
        "  strategy: target idle {}, buffer {} bps, max {} closes/call",
        config.strategy.target_idle_liquidity,
        config.strategy.partial_closure_buffer_bps,
        config.strategy.max_positions_closed_per_call,
    );
    println!(
        "  guards:   close {} bps, open {} bps, min share price {}",
        config.guards.close_slippage_bps,
        config.guards.open_slippage_bps,
        config.guards.min_vault_share_price,
    );
    println!(
        "  market:   {}d term, {}h checkpoints, {} bps discount, min tx {}, next maturity t={}",
        config.market.position_duration_days,
        config.market.checkpoint_hours,
        config.market.discount_bps,
        market.min_transaction_amount(),
        market.next_maturity(),
    );
    println!("  share price: {}", market.vault_share_price());
    if !share_price_clears_guard(config, &market) {
        warn!(
            "share price {} below guard {}: every open will fail",
            market.vault_share_price(),
            config.guards.min_vault_share_price
        );
    }
    println!("  audit:    {}", config.audit_path().display());
    Ok(())
}

// === Helpers ===

fn display_records(records: &[StepRecord]) {
    println!("\nSTEPS:");
    for (i, record) in records.iter().enumerate() {
        let detail = match &record.outcome {
            StepOutcome::Rebalanced(report) => format!(
                "closed {}+{} ({} bonds -> {}), spent {}",
                report.matured_closed,
                report.immature_closed,
                report.bonds_closed,
                report.proceeds,
                report.spent
            ),
            StepOutcome::Skipped => "nothing to do".to_string(),
            _ => String::new(),
        };
        println!(
            "  {:>3}  {:32} idle={:<14} {}",
            i + 1,
            record.step.to_string(),
            record.idle,
            detail
        );
    }
}

fn display_portfolio(portfolio: &Portfolio, idle: Amount) {
    if portfolio.is_empty() {
        println!("No positions. Idle: {idle}");
        return;
    }

    println!("PORTFOLIO:");
    for (i, pos) in portfolio.positions().enumerate() {
        println!("  {:>3}  {pos}", i);
    }
    println!("Total bonds: {}. Idle: {idle}", portfolio.total_bonds());
}
