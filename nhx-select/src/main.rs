//! nhx-select - Main entry point
//!
//! Subcommands:
//! - `convert`: select the best T1-weighted series per subject and session
//!   and convert them into `{output_root}/sub-{id}/ses-{key}/anat/`
//! - `manifest`: list one T1w image per subject across standardized roots
//!   for downstream segmentation

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use nhx_common::config::{load_config, CONFIG_ENV_VAR};
use nhx_common::logging::init_logging;
use nhx_common::FailureLedger;
use nhx_select::config::SelectConfig;
use nhx_select::services::cohort::{subjects_from_table, subjects_from_tree, CohortConfig};
use nhx_select::services::manifest::{ManifestBuilder, ManifestRoot};
use nhx_select::services::{ConversionRunner, Transcoder, TreeScanner};
use nhx_select::SelectToolConfig;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Command-line arguments for nhx-select
#[derive(Parser, Debug)]
#[command(name = "nhx-select")]
#[command(about = "Structural sequence selection and conversion")]
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
    /// Select and convert structural sequences
    Convert(ConvertArgs),
    /// Write the segmentation manifest
    Manifest(ManifestArgs),
}

#[derive(ClapArgs, Debug)]
struct ConvertArgs {
    /// Acquisition tree root
    #[arg(short, long, env = "NHX_SOURCE_ROOT")]
    source_root: Option<PathBuf>,

    /// Standardized output root
    #[arg(short, long, env = "NHX_OUTPUT_ROOT")]
    output_root: Option<PathBuf>,

    /// Cohort table restricting the subject list
    #[arg(long)]
    cohort: Option<PathBuf>,

    /// Worker-thread hint for the transcoder
    #[arg(short, long)]
    threads: Option<usize>,

    /// Report the selection plan as JSON without converting
    #[arg(long)]
    dry_run: bool,
}

#[derive(ClapArgs, Debug)]
struct ManifestArgs {
    /// Dataset root as DATASET=PATH (repeatable, appended to configured roots)
    #[arg(short, long = "root", value_parser = parse_root)]
    roots: Vec<ManifestRoot>,

    /// Manifest CSV path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Thread hint written into every row
    #[arg(short, long)]
    threads: Option<usize>,
}

fn parse_root(value: &str) -> std::result::Result<ManifestRoot, String> {
    match value.split_once('=') {
        Some((dataset, path)) if !dataset.is_empty() && !path.is_empty() => Ok(ManifestRoot {
            dataset: dataset.to_string(),
            path: PathBuf::from(path),
        }),
        _ => Err(format!("expected DATASET=PATH, got '{}'", value)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (mut config, source) = load_config::<SelectToolConfig>(args.config.as_deref(), CONFIG_ENV_VAR)
        .context("Failed to load configuration")?;
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    init_logging(&config.logging, "nhx_select").context("Failed to initialize logging")?;

    info!("Starting nhx-select v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration: {}", source);

    match args.command {
        Command::Convert(convert_args) => convert(config.select, convert_args).await,
        Command::Manifest(manifest_args) => manifest(config.select, manifest_args),
    }
}

async fn convert(mut select: SelectConfig, args: ConvertArgs) -> Result<()> {
    if let Some(root) = args.source_root {
        select.source_root = Some(root);
    }
    if let Some(root) = args.output_root {
        select.output_root = Some(root);
    }
    if let Some(threads) = args.threads {
        select.threads = threads;
    }
    if let Some(table) = args.cohort {
        match select.cohort.as_mut() {
            Some(cohort) => cohort.table = table,
            None => {
                select.cohort = Some(CohortConfig {
                    table,
                    id_column: "PATNO".to_string(),
                    require: Vec::new(),
                })
            }
        }
    }

    let source_root = select
        .source_root
        .clone()
        .context("No source root: pass --source-root or set select.source_root")?;
    let output_root = select
        .output_root
        .clone()
        .context("No output root: pass --output-root or set select.output_root")?;
    if !source_root.is_dir() {
        bail!("Source root not found: {}", source_root.display());
    }

    let subjects = match &select.cohort {
        Some(cohort) => subjects_from_table(cohort)?,
        None => subjects_from_tree(&TreeScanner::new(), &source_root)?,
    };
    info!(
        source = %source_root.display(),
        output = %output_root.display(),
        subjects = subjects.len(),
        "Subject list ready"
    );

    let dry_run = args.dry_run;
    let transcoder = select.build_transcoder();
    if !dry_run && !transcoder.is_available() {
        bail!(
            "dcm2niix not available at '{}'; install it or set select.transcoder.binary",
            select.transcoder.binary.display()
        );
    }

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    let summary_root = output_root.clone();
    let run = tokio::task::spawn_blocking(move || {
        let selector = select.build_selector();
        let transcoder: Option<&dyn Transcoder> = if dry_run { None } else { Some(&transcoder) };
        ConversionRunner::new(&selector, transcoder, output_root)
            .with_threads(select.threads)
            .run(
                &subjects,
                &source_root,
                FailureLedger::with_sample_limit(select.sample_limit),
                &cancel,
            )
    })
    .await
    .context("Conversion task failed")?;

    run.log_summary();

    if dry_run {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        let path = run.write_summary(&summary_root)?;
        info!("Statistics saved: {}", path.display());
    }
    Ok(())
}

fn manifest(select: SelectConfig, args: ManifestArgs) -> Result<()> {
    let mut roots = select.manifest.roots.clone();
    roots.extend(args.roots);
    if roots.is_empty() {
        bail!("No dataset roots: pass --root DATASET=PATH or set select.manifest.roots");
    }
    let output = args
        .output
        .or_else(|| select.manifest.output.clone())
        .context("No manifest path: pass --output or set select.manifest.output")?;
    let threads = args
        .threads
        .or(select.manifest.threads)
        .unwrap_or(select.threads);

    let mut ledger = FailureLedger::with_sample_limit(select.sample_limit);
    let manifest = ManifestBuilder::new(threads).build(&roots, &mut ledger)?;
    manifest.write(&output)?;

    for root in &roots {
        info!(dataset = %root.dataset, subjects = manifest.count_for(&root.dataset), "Manifest rows");
    }
    info!(rows = manifest.entries.len(), "Manifest saved: {}", output.display());
    ledger.log_summary();
    Ok(())
}

/// Cancel the token on Ctrl+C or SIGTERM; the subject in progress finishes
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
            info!("Received Ctrl+C, stopping after current subject");
        },
        _ = terminate => {
            info!("Received terminate signal, stopping after current subject");
        },
    }
    token.cancel();
}
