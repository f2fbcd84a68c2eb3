//! PROPEDGE: projection-vs-market prop wagering pipeline
//!
//! Entry point. Loads `.env` and the TOML config, initialises structured
//! logging, opens the bankroll ledger, and dispatches one subcommand.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use propedge::config::AppConfig;
use propedge::engine::ledger::BankrollLedger;
use propedge::engine::orders::FillSignal;
use propedge::engine::pipeline::{
    reconcile_orders, settle_orders, OutcomeSignal, Pipeline, ReconcileReport, RunReport,
    SettleReport,
};
use propedge::storage::{self, RunStore};

const BANNER: &str = r#"
 ___ ___  ___  ___ ___ ___   ___ ___
| _ \ _ \/ _ \| _ \ __|   \ / __| __|
|  _/   / (_) |  _/ _|| |) | (_ | _|
|_| |_|_\\___/|_| |___|___/ \___|___|

  Projection-vs-market edge, sized and tracked
  v0.1.0
"#;

#[derive(Parser, Debug)]
#[command(name = "propedge", version, about = "Projection-vs-market prop wagering pipeline")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(short, long, env = "PROPEDGE_CONFIG", default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate, size and place today's (or the given date's) wagers.
    Run {
        /// Run date, YYYY-MM-DD. Defaults to today (UTC).
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Apply fill signals and expire stale resting orders.
    Reconcile {
        #[arg(long)]
        date: Option<NaiveDate>,
        /// JSON array of `{ "order_id": ... }` fill signals.
        #[arg(long)]
        fills: Option<PathBuf>,
    },
    /// Apply graded outcomes for filled orders to the ledger.
    Settle {
        #[arg(long)]
        date: NaiveDate,
        /// JSON array of `{ "order_id": ..., "outcome": "win|loss|push" }`.
        #[arg(long)]
        outcomes: PathBuf,
    },
    /// Print the current bankroll and unit value.
    Ledger,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cli = Cli::parse();
    init_logging();

    let cfg = AppConfig::load(&cli.config.to_string_lossy())?;
    cfg.validate()?;

    println!("{BANNER}");
    info!(
        name = %cfg.engine.name,
        artifact_root = %cfg.engine.artifact_root,
        sources = cfg.enabled_sources().count(),
        "PROPEDGE starting up"
    );

    let ledger = Arc::new(
        BankrollLedger::open(&cfg.bankroll.ledger_path, cfg.bankroll.starting_bankroll)
            .context("Failed to open bankroll ledger")?,
    );
    let today = Utc::now().date_naive();

    match cli.command {
        Command::Run { date } => {
            let pipeline = Pipeline::from_config(cfg, Arc::clone(&ledger))?;
            let report = pipeline.run(date.unwrap_or(today), Utc::now()).await?;
            log_run_report(&report);
        }
        Command::Reconcile { date, fills } => {
            let fills: Vec<FillSignal> = match fills {
                Some(path) => storage::read_json(&path)?
                    .with_context(|| format!("Fill file not found: {}", path.display()))?,
                None => Vec::new(),
            };
            let store = RunStore::new(&cfg.engine.artifact_root);
            let report = reconcile_orders(&store, date.unwrap_or(today), &fills, Utc::now()).await?;
            log_reconcile_report(&report);
        }
        Command::Settle { date, outcomes } => {
            let outcomes: Vec<OutcomeSignal> = storage::read_json(&outcomes)?
                .with_context(|| format!("Outcome file not found: {}", outcomes.display()))?;
            let store = RunStore::new(&cfg.engine.artifact_root);
            let report = settle_orders(&store, &ledger, date, &outcomes, cfg.bankroll.fee_per_order)?;
            log_settle_report(&report);
        }
        Command::Ledger => {
            let export = ledger.export();
            info!(
                bankroll = format!("${:.2}", export.bankroll),
                unit = format!("${:.2}", export.unit_value),
                starting = format!("${:.2}", export.starting_bankroll),
                pnl = format!("${:.2}", export.total_pnl),
                settlements = export.history.len(),
                "Ledger"
            );
        }
    }

    Ok(())
}

/// Log a human-readable run summary.
fn log_run_report(report: &RunReport) {
    for (source, count) in &report.quotes {
        info!(source = %source, quotes = count, "Source coverage");
    }
    info!(
        date = %report.date,
        estimates = report.estimates,
        candidates = report.candidates,
        wagers = report.wagers,
        kelly_rejected = report.kelly_rejected,
        capped = report.capped,
        filled = report.filled,
        open = report.open,
        pending = report.pending,
        committed = format!("${:.2}", report.committed),
        bankroll = format!("${:.2}", report.bankroll),
        unit = format!("${:.2}", report.unit_value),
        "Run complete"
    );
}

fn log_reconcile_report(report: &ReconcileReport) {
    info!(
        date = %report.date,
        fills = report.fills,
        expired = report.expired.len(),
        orders = report.orders,
        "Reconcile complete"
    );
}

fn log_settle_report(report: &SettleReport) {
    info!(
        date = %report.date,
        settled = report.settled,
        skipped = report.skipped,
        pnl = format!("${:.2}", report.pnl),
        bankroll = format!("${:.2}", report.bankroll),
        "Settle complete"
    );
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("propedge=info"));

    let json_logging = std::env::var("PROPEDGE_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
