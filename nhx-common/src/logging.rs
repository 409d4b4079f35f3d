//! Tracing subscriber setup shared by the NHX binaries

use crate::config::LoggingConfig;
use crate::{Error, Result};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the filter: `RUST_LOG` wins, then the configured level applied to
/// `default_target`, with everything else at `warn`.
pub fn build_filter(config: &LoggingConfig, default_target: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,{}={},nhx_common={}",
            default_target, config.level, config.level
        ))
    })
}

/// Install the global subscriber
///
/// Logs go to stderr, or are appended to `config.file` when set.
/// Returns `false` if a subscriber was already installed (tests, repeated
/// calls); that is not treated as an error.
pub fn init_logging(config: &LoggingConfig, default_target: &str) -> Result<bool> {
    let filter = build_filter(config, default_target);

    let installed = match &config.file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    Error::Config(format!("Cannot open log file {}: {}", path.display(), e))
                })?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .try_init()
                .is_ok()
        }
        None => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .is_ok(),
    };

    Ok(installed)
}
