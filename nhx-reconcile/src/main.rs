//! nhx-reconcile - Main entry point
//!
//! Subcommands:
//! - `aggregate`: collect per-subject segmentation outputs into one
//!   measurement table per dataset
//! - `merge`: join measurements onto subjects across datasets, apply QC
//!   thresholds and write the harmonized table

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use nhx_common::config::{load_config, CONFIG_ENV_VAR};
use nhx_common::logging::init_logging;
use nhx_common::FailureLedger;
use nhx_reconcile::config::AggregateSource;
use nhx_reconcile::services::{aggregate_source, JoinMode};
use nhx_reconcile::{DatasetLabel, ReconcileConfig, ReconcileToolConfig, SubjectReconciler};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Command-line arguments for nhx-reconcile
#[derive(Parser, Debug)]
#[command(name = "nhx-reconcile")]
#[command(about = "Cross-dataset subject and measurement reconciliation")]
#[command(version)]
struct Args {
    /// Configuration file (overrides NHX_CONFIG and the user config file)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "NHX_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build per-dataset measurement tables from segmentation outputs
    Aggregate(AggregateArgs),
    /// Write the harmonized multi-dataset table
    Merge(MergeArgs),
}

#[derive(ClapArgs, Debug)]
struct AggregateArgs {
    /// Dataset label of an extra tree (requires --root and --output)
    #[arg(short, long, requires_all = ["root", "output"])]
    label: Option<DatasetLabel>,

    /// Segmentation derivatives root
    #[arg(short, long, requires = "label")]
    root: Option<PathBuf>,

    /// Measurement table to write
    #[arg(short, long, requires = "label")]
    output: Option<PathBuf>,
}

#[derive(ClapArgs, Debug)]
struct MergeArgs {
    /// Combined subjects table
    #[arg(short, long, env = "NHX_SUBJECTS")]
    subjects: Option<PathBuf>,

    /// Directory holding the per-dataset measurement tables
    #[arg(short, long, env = "NHX_VOLUMES_DIR")]
    volumes_dir: Option<PathBuf>,

    /// Harmonized table path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Join mode: inner or left
    #[arg(long, value_parser = parse_join)]
    join: Option<JoinMode>,

    /// Keep UNKNOWN subjects as their own dataset group
    #[arg(long)]
    allow_unknown: bool,
}

fn parse_join(value: &str) -> std::result::Result<JoinMode, String> {
    match value.to_ascii_lowercase().as_str() {
        "inner" => Ok(JoinMode::Inner),
        "left" => Ok(JoinMode::Left),
        _ => Err(format!("expected 'inner' or 'left', got '{}'", value)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (mut config, source) =
        load_config::<ReconcileToolConfig>(args.config.as_deref(), CONFIG_ENV_VAR)
            .context("Failed to load configuration")?;
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    init_logging(&config.logging, "nhx_reconcile").context("Failed to initialize logging")?;

    info!("Starting nhx-reconcile v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration: {}", source);

    match args.command {
        Command::Aggregate(aggregate_args) => aggregate(config.reconcile, aggregate_args).await,
        Command::Merge(merge_args) => merge(config.reconcile, merge_args).await,
    }
}

async fn aggregate(reconcile: ReconcileConfig, args: AggregateArgs) -> Result<()> {
    let mut sources = reconcile.aggregate.clone();
    if let (Some(label), Some(root), Some(output)) = (args.label, args.root, args.output) {
        sources.push(AggregateSource {
            label,
            root,
            output,
        });
    }
    if sources.is_empty() {
        bail!("Nothing to aggregate: pass --label/--root/--output or set reconcile.aggregate");
    }

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    let sample_limit = reconcile.sample_limit;
    let ledger = tokio::task::spawn_blocking(move || {
        let mut ledger = FailureLedger::with_sample_limit(sample_limit);
        for source in &sources {
            if cancel.is_cancelled() {
                warn!("Cancellation requested, stopping aggregation");
                break;
            }
            match aggregate_source(source, &mut ledger) {
                Ok(report) => info!("{}", report.display_string()),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(dataset = %source.label, error = %e, "Aggregation skipped");
                    if let Some(category) = e.category() {
                        ledger.record(category, source.root.display().to_string(), e.to_string());
                    }
                }
            }
        }
        Ok(ledger)
    })
    .await
    .context("Aggregation task failed")??;

    ledger.log_summary();
    Ok(())
}

async fn merge(mut reconcile: ReconcileConfig, args: MergeArgs) -> Result<()> {
    if let Some(subjects) = args.subjects {
        reconcile.subjects = Some(subjects);
    }
    if let Some(dir) = args.volumes_dir {
        reconcile.volumes_dir = Some(dir);
    }
    if let Some(output) = args.output {
        reconcile.output = Some(output);
    }
    if let Some(join) = args.join {
        reconcile.join = join;
    }
    if args.allow_unknown {
        reconcile.allow_unknown = true;
    }

    let output = reconcile
        .output
        .clone()
        .context("No output path: pass --output or set reconcile.output")?;

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    let run = tokio::task::spawn_blocking(move || SubjectReconciler::new(reconcile).run(&cancel))
        .await
        .context("Reconciliation task failed")?
        .context("Reconciliation failed")?;

    run.report.log_summary();
    let summary_path = run.write(&output)?;
    info!(
        table = %output.display(),
        summary = %summary_path.display(),
        rows = run.table.len(),
        "Harmonized table saved"
    );
    Ok(())
}

/// Cancel the token on Ctrl+C or SIGTERM; the dataset in progress finishes
async fn cancel_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, stopping after current dataset");
        },
        _ = terminate => {
            info!("Received terminate signal, stopping after current dataset");
        },
    }
    token.cancel();
}
