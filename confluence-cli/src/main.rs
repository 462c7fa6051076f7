//! Confluence CLI: run the trading loop against the paper terminal, check configs.
//!
//! Commands:
//! - `run`: assemble the scheduler from a TOML config and run cycles until
//!   Ctrl-C or `--cycles`
//! - `check-config`: load and validate a config, print its fingerprint

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use confluence_core::clock::SystemClock;
use confluence_core::config::BotConfig;
use confluence_core::signals::ProviderSet;
use confluence_runner::{
    shutdown_channel, CsvJournal, HeuristicAdvisor, HeuristicProvider, PaperConfig, PaperTerminal, Scheduler,
};

#[derive(Parser)]
#[command(name = "confluence", about = "Confluence: multi-instrument confluence trading bot")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the trading loop against the paper terminal.
    Run {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,

        /// Stop after this many cycles. Runs until Ctrl-C when omitted.
        #[arg(long)]
        cycles: Option<u64>,

        /// Paper terminal RNG seed.
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Paper account starting balance.
        #[arg(long, default_value_t = 10_000.0)]
        balance: f64,

        /// Trade journal (CSV, appended).
        #[arg(long, default_value = "journal/trades.csv")]
        journal: PathBuf,

        /// Run with no signal providers: model probability and AI vote stay neutral.
        #[arg(long, default_value_t = false)]
        no_providers: bool,
    },
    /// Load and validate a config; print its fingerprint and instruments.
    CheckConfig {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            config,
            cycles,
            seed,
            balance,
            journal,
            no_providers,
        } => run_paper(&config, cycles, seed, balance, &journal, no_providers).await,
        Commands::CheckConfig { config } => check_config(&config),
    }
}

fn load(path: &Path) -> Result<BotConfig> {
    BotConfig::load(path).with_context(|| format!("loading config {}", path.display()))
}

async fn run_paper(
    config_path: &Path,
    cycles: Option<u64>,
    seed: u64,
    balance: f64,
    journal_path: &Path,
    no_providers: bool,
) -> Result<()> {
    let config = load(config_path)?;
    let paper = PaperConfig { seed, initial_balance: balance, ..PaperConfig::default() };
    let terminal = Arc::new(PaperTerminal::new(&config.instruments, paper, Arc::new(SystemClock)));
    let journal = Arc::new(
        CsvJournal::open(journal_path).with_context(|| format!("opening journal {}", journal_path.display()))?,
    );

    let providers = ProviderSet::default();
    if no_providers {
        warn!("running without signal providers");
    } else {
        providers.ensemble.swap(Arc::new(HeuristicProvider::default()));
        providers.advisor.swap(Arc::new(HeuristicAdvisor::default()));
    }

    let mut scheduler = Scheduler::builder(config)
        .terminal(terminal.clone())
        .journal(journal)
        .providers(Arc::new(providers))
        .build()
        .context("assembling scheduler")?;

    let (handle, signal) = shutdown_channel();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown requested, finishing current cycle"),
            Err(e) => warn!(error = %e, "Ctrl-C handler unavailable, shutting down"),
        }
        handle.trigger();
    });

    let completed = scheduler.run(signal, cycles).await?;

    let risk = scheduler.risk().snapshot();
    println!();
    println!("=== Session Summary ===");
    println!("Config:         {}", scheduler.fingerprint().short());
    println!("Cycles:         {completed}");
    println!("Orders today:   {}", risk.daily_count);
    println!("Realized P&L:   {:.2}", risk.realized_pnl);
    println!("Paper balance:  {:.2}", terminal.balance());
    if let Some(trip) = &risk.breaker {
        println!("Breaker:        {}", trip.reason);
    }
    println!("Journal:        {}", journal_path.display());
    Ok(())
}

fn check_config(path: &Path) -> Result<()> {
    let config = load(path)?;
    let sched = &config.scheduler;
    println!("Config OK: {}", path.display());
    println!("Fingerprint:    {}", config.fingerprint());
    println!(
        "Cycle:          every {}s, {} workers, provider timeout {}ms",
        sched.cycle_interval_secs, sched.max_workers, sched.provider_timeout_ms
    );
    println!(
        "Timeframes:     {} / {} / {}",
        sched.entry_timeframe, sched.intermediate_timeframe, sched.higher_timeframe
    );
    println!(
        "Scoring:        base threshold {}, probability >= {}, daily cap {}",
        config.scoring.base_threshold, config.scoring.probability_threshold, config.risk.daily_trade_cap
    );
    println!("Instruments:    {}", config.instruments.len());
    for inst in &config.instruments {
        println!("  {:<8} {:?}  pip {}", inst.symbol, inst.asset_class, inst.pip_size);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn shipped_paper_config_is_valid() {
        let config = BotConfig::from_toml_str(include_str!("../../config/paper.toml")).unwrap();
        assert_eq!(config.instruments.len(), 5);
        assert!(config.instrument("XAUUSD").is_some());
    }

    #[test]
    fn run_parses_flags() {
        let cli = Cli::try_parse_from(["confluence", "run", "--config", "c.toml", "--cycles", "3", "--no-providers"])
            .unwrap();
        match cli.command {
            Commands::Run { cycles, no_providers, seed, .. } => {
                assert_eq!(cycles, Some(3));
                assert!(no_providers);
                assert_eq!(seed, 42);
            }
            Commands::CheckConfig { .. } => panic!("expected run"),
        }
    }
}
