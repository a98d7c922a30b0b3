//! CLI entry point for the bondbook keeper.

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};

use bondbook_keeper::config::Config;
use bondbook_keeper::error::Error;
use bondbook_keeper::execution::{self, RunOptions};
use bondbook_keeper::scenario::Scenario;

#[derive(Parser)]
#[command(name = "keeper")]
#[command(about = "Bond strategy keeper: replay vault activity and rebalance")]
#[command(version)]
struct Cli {
    /// Path to config.toml
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a scenario, rebalancing as needed, and save the result
    Run {
        /// Path to scenario.json
        scenario: PathBuf,

        /// Show the outcome without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Skip confirmation prompt (for automation/cron)
        #[arg(long)]
        force: bool,
    },

    /// Show which rebalance steps of a scenario would act
    Plan {
        /// Path to scenario.json
        scenario: PathBuf,
    },

    /// Validate and print the config
    Check,
}

fn load_scenario(path: &Path) -> Scenario {
    match Scenario::load(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading scenario: {e}");
            process::exit(1);
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {e}");
            process::exit(1);
        }
    };

    let result = match cli.command {
        Command::Run {
            scenario,
            dry_run,
            force,
        } => {
            let loaded = load_scenario(&scenario);
            let opts = RunOptions {
                dry_run,
                force,
                scenario_file: scenario.display().to_string(),
            };
            execution::run(&config, &loaded, &opts)
        }
        Command::Plan { scenario } => execution::plan(&config, &load_scenario(&scenario)),
        Command::Check => execution::check(&config),
    };

    if let Err(e) = result {
        if e.is_guard_failure() {
            eprintln!("\nAborted by price guard: {e}");
            process::exit(2);
        }
        match &e {
            Error::Aborted(msg) => {
                eprintln!("{msg}");
                process::exit(0);
            }
            _ => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        }
    }
}
