//! Integration tests for keeper scenario replay.

use bondbook::pricing::WAD;
use bondbook::{BondMarket, Portfolio, PortfolioEvent, Position};
use bondbook_keeper::config::Config;
use bondbook_keeper::error::Error;
use bondbook_keeper::execution::{
    Mode, RunOptions, StepOutcome, execute_steps, rebalance_options, run,
    share_price_clears_guard, write_audit,
};
use bondbook_keeper::scenario::Scenario;

const DAY: u128 = 86_400;

fn config_toml(dir: &str) -> String {
    format!(
        r#"
[strategy]
target_idle_liquidity = 100
partial_closure_buffer_bps = 10
max_positions_closed_per_call = 4

[guards]
close_slippage_bps = 50
open_slippage_bps = 50

[market]
position_duration_days = 100
checkpoint_hours = 24
discount_bps = 1000
min_transaction_amount = 10

[logging]
dir = "{dir}"
"#
    )
}

fn config() -> Config {
    Config::from_toml(&config_toml("./logs")).unwrap()
}

fn ladder_json() -> &'static str {
    r#"{
        "name": "ladder",
        "timestamp": "2026-02-08T15:30:00Z",
        "steps": [
            { "action": "deposit", "amount": 1000 },
            { "action": "rebalance" },
            { "action": "advance", "days": 101 },
            { "action": "rebalance" },
            { "action": "withdraw", "amount": 50 },
            { "action": "rebalance" }
        ]
    }"#
}

// ============================================================================
// execute_steps
// ============================================================================

#[test]
fn ladder_replay() {
    let scenario = Scenario::from_json(ladder_json()).unwrap();
    let outcome = execute_steps(&config(), &scenario, Mode::Execute).unwrap();

    assert_eq!(outcome.records.len(), 6);
    assert_eq!(outcome.rebalances(), 2);
    assert_eq!(outcome.skipped(), 1);

    // First rebalance: 900 above target buys 1000 bonds at a 10% discount
    let StepOutcome::Rebalanced(first) = &outcome.records[1].outcome else {
        panic!("expected a rebalance");
    };
    assert_eq!(first.opened, Some(Position::new(100 * DAY, 1_000)));
    assert_eq!(outcome.records[1].idle, 100);

    // Second: the matured position is closed at face and rolled
    let StepOutcome::Rebalanced(second) = &outcome.records[3].outcome else {
        panic!("expected a rebalance");
    };
    assert_eq!(second.matured_closed, 1);
    assert_eq!(second.proceeds, 1_000);
    assert_eq!(second.spent, 1_000);
    assert_eq!(second.opened, Some(Position::new(201 * DAY, 1_111)));

    // Withdrawal is covered from idle, leaving nothing to deploy
    assert_eq!(outcome.records[4].idle, 50);
    assert_eq!(outcome.records[5].outcome, StepOutcome::Skipped);

    let portfolio = outcome.portfolio();
    assert_eq!(portfolio.position_count(), 1);
    assert_eq!(portfolio.total_bonds(), 1_111);
    assert_eq!(outcome.strategy.idle(), 50);
    assert_eq!(portfolio.events().last(), Some(&PortfolioEvent::Rebalanced));
}

#[test]
fn plan_mode_never_rebalances() {
    let scenario = Scenario::from_json(ladder_json()).unwrap();
    let outcome = execute_steps(&config(), &scenario, Mode::Plan).unwrap();

    assert_eq!(outcome.rebalances(), 0);
    assert!(outcome.portfolio().is_empty());
    assert_eq!(
        outcome.records[1].outcome,
        StepOutcome::Planned { would_act: true }
    );
    assert_eq!(outcome.strategy.idle(), 950);
}

#[test]
fn withdrawal_closes_immature_positions() {
    let json = r#"{
        "name": "exit",
        "timestamp": "2026-02-08T15:30:00Z",
        "steps": [
            { "action": "deposit", "amount": 1000 },
            { "action": "rebalance" },
            { "action": "advance", "days": 10 },
            { "action": "withdraw", "amount": 500 }
        ]
    }"#;
    let scenario = Scenario::from_json(json).unwrap();
    let outcome = execute_steps(&config(), &scenario, Mode::Execute).unwrap();

    let portfolio = outcome.portfolio();
    assert!(portfolio.total_bonds() < 1_000);
    assert!(portfolio.invariants_hold());
    assert!(outcome.market.outstanding(100 * DAY) == portfolio.total_bonds());
}

#[test]
fn failing_step_reports_index_and_action() {
    let json = r#"{
        "name": "overdraw",
        "timestamp": "2026-02-08T15:30:00Z",
        "steps": [
            { "action": "deposit", "amount": 100 },
            { "action": "withdraw", "amount": 500 }
        ]
    }"#;
    let scenario = Scenario::from_json(json).unwrap();
    let err = execute_steps(&config(), &scenario, Mode::Execute).unwrap_err();

    match err {
        Error::Step { step, action, .. } => {
            assert_eq!(step, 2);
            assert_eq!(action, "withdraw");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn share_price_guard_is_a_guard_failure() {
    let toml = config_toml("./logs").replace(
        "open_slippage_bps = 50",
        "open_slippage_bps = 50\nmin_vault_share_price = 2000000000000000000",
    );
    let config = Config::from_toml(&toml).unwrap();
    let scenario = Scenario::from_json(ladder_json()).unwrap();

    let err = execute_steps(&config, &scenario, Mode::Execute).unwrap_err();
    assert!(err.is_guard_failure());
}

#[test]
fn share_price_guard_reads_market_price() {
    let config = config();
    let mut market = config.build_market();
    assert!(share_price_clears_guard(&config, &market));

    let toml = config_toml("./logs").replace(
        "open_slippage_bps = 50",
        "open_slippage_bps = 50\nmin_vault_share_price = 2000000000000000000",
    );
    let strict = Config::from_toml(&toml).unwrap();
    assert!(!share_price_clears_guard(&strict, &market));
    market.set_vault_share_price(2 * WAD);
    assert!(share_price_clears_guard(&strict, &market));
}

// ============================================================================
// rebalance_options
// ============================================================================

#[test]
fn options_bound_open_output_by_slippage() {
    let config = config();
    let market = config.build_market();
    let mut strategy = bondbook::Rebalancer::new(config.rebalance_config());
    strategy.deposit(1_000).unwrap();

    let options = rebalance_options(&config, &strategy, &market, 0, None);
    // 900 buys 1000 bonds; 50 bps allowance
    assert_eq!(options.min_output, 995);
    assert_eq!(options.close_slippage_bps, 50);
    assert_eq!(options.withdrawal, 0);

    // Reserved withdrawal shrinks the projected open
    let options = rebalance_options(&config, &strategy, &market, 450, None);
    assert_eq!(options.min_output, 497);

    // Spend cap applies before quoting
    let options = rebalance_options(&config, &strategy, &market, 0, Some(90));
    assert_eq!(options.spend_amount, Some(90));
    assert_eq!(options.min_output, 99);
    assert!(market.min_transaction_amount() < 90);
}

#[test]
fn options_without_excess_have_no_output_floor() {
    let config = config();
    let market = config.build_market();
    let mut strategy = bondbook::Rebalancer::new(config.rebalance_config());
    strategy.deposit(105).unwrap();

    let options = rebalance_options(&config, &strategy, &market, 0, None);
    assert_eq!(options.min_output, 0);
}

// ============================================================================
// run / audit
// ============================================================================

#[test]
fn forced_run_writes_audit_and_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::from_toml(&config_toml(&dir.path().display().to_string())).unwrap();
    let scenario = Scenario::from_json(ladder_json()).unwrap();
    let opts = RunOptions {
        dry_run: false,
        force: true,
        scenario_file: "ladder.json".into(),
    };

    run(&config, &scenario, &opts).unwrap();

    let audit = std::fs::read_to_string(config.audit_path()).unwrap();
    let lines: Vec<serde_json::Value> = audit
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.first().unwrap()["event"], "run_started");
    assert_eq!(lines.last().unwrap()["event"], "run_completed");
    assert_eq!(lines.last().unwrap()["rebalances"], 2);
    assert_eq!(lines.last().unwrap()["total_bonds"], "1111");

    let restored = Portfolio::load(&config.snapshot_path()).unwrap();
    assert_eq!(restored.total_bonds(), 1_111);
    assert_eq!(restored.position(0).unwrap(), Position::new(201 * DAY, 1_111));

    let events = bondbook::persistence::load_events(
        &config.snapshot_path().with_extension("events.jsonl"),
    )
    .unwrap();
    assert_eq!(events.last(), Some(&PortfolioEvent::Rebalanced));
}

#[test]
fn dry_run_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::from_toml(&config_toml(&dir.path().display().to_string())).unwrap();
    let scenario = Scenario::from_json(ladder_json()).unwrap();
    let opts = RunOptions {
        dry_run: true,
        force: true,
        scenario_file: "ladder.json".into(),
    };

    run(&config, &scenario, &opts).unwrap();

    assert!(!config.audit_path().exists());
    assert!(!config.snapshot_path().exists());
}

#[test]
fn write_audit_logs_each_step() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.jsonl");
    let scenario = Scenario::from_json(ladder_json()).unwrap();
    let outcome = execute_steps(&config(), &scenario, Mode::Execute).unwrap();

    let mut audit = bondbook_keeper::audit::AuditLog::open(&path).unwrap();
    write_audit(&mut audit, &outcome).unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    // 6 steps + ledger events + completion
    assert_eq!(contents.lines().count(), 8);
    assert!(contents.contains("\"event\":\"rebalance_skipped\""));
}
