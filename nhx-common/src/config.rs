//! Configuration loading and config file resolution
//!
//! Every NHX tool reads the same TOML document; each tool deserializes only
//! the sections it owns (`[select]`, `[reconcile]`) plus the shared
//! `[logging]` table. Unknown sections are ignored.
//!
//! **Config file priority order:**
//! 1. Command-line argument (highest priority)
//! 2. `NHX_CONFIG` environment variable
//! 3. `<user config dir>/nhx/config.toml`
//! 4. Compiled defaults (fallback)

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "NHX_CONFIG";

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Where the effective configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// `--config` on the command line
    CommandLine(PathBuf),
    /// `NHX_CONFIG` environment variable
    Environment(PathBuf),
    /// Per-user default location
    UserFile(PathBuf),
    /// No file found; built-in defaults
    CompiledDefaults,
}

impl ConfigSource {
    /// Path of the file that was read, if any
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigSource::CommandLine(p)
            | ConfigSource::Environment(p)
            | ConfigSource::UserFile(p) => Some(p),
            ConfigSource::CompiledDefaults => None,
        }
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::CommandLine(p) => write!(f, "command line ({})", p.display()),
            ConfigSource::Environment(p) => {
                write!(f, "{} ({})", CONFIG_ENV_VAR, p.display())
            }
            ConfigSource::UserFile(p) => write!(f, "user config ({})", p.display()),
            ConfigSource::CompiledDefaults => write!(f, "compiled defaults"),
        }
    }
}

/// Resolve which config file (if any) to read
///
/// A file named explicitly on the command line or through the environment
/// must exist; the per-user default location is optional.
pub fn resolve_config_source(cli_arg: Option<&Path>, env_var_name: &str) -> Result<ConfigSource> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        if !path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        return Ok(ConfigSource::CommandLine(path.to_path_buf()));
    }

    // Priority 2: Environment variable
    if let Ok(value) = std::env::var(env_var_name) {
        if !value.trim().is_empty() {
            let path = PathBuf::from(value);
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file named by {} not found: {}",
                    env_var_name,
                    path.display()
                )));
            }
            return Ok(ConfigSource::Environment(path));
        }
    }

    // Priority 3: Per-user config file
    if let Some(path) = default_config_path() {
        if path.exists() {
            return Ok(ConfigSource::UserFile(path));
        }
        tracing::debug!(path = %path.display(), "No user config file, using defaults");
    }

    // Priority 4: Compiled defaults
    Ok(ConfigSource::CompiledDefaults)
}

/// Per-user default config file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("nhx").join("config.toml"))
}

/// Parse a config document from TOML text
pub fn parse_config<T: DeserializeOwned>(content: &str) -> Result<T> {
    Ok(toml::from_str(content)?)
}

/// Resolve and load a tool configuration
///
/// Returns the parsed configuration together with the source it was read
/// from. Parse failures are configuration errors.
pub fn load_config<T>(cli_arg: Option<&Path>, env_var_name: &str) -> Result<(T, ConfigSource)>
where
    T: DeserializeOwned + Default,
{
    let source = resolve_config_source(cli_arg, env_var_name)?;

    let config = match source.path() {
        Some(path) => {
            let content = std::fs::read_to_string(path).map_err(|e| {
                Error::Config(format!("Read config {} failed: {}", path.display(), e))
            })?;
            parse_config(&content).map_err(|e| {
                Error::Config(format!("Parse config {} failed: {}", path.display(), e))
            })?
        }
        None => T::default(),
    };

    Ok((config, source))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Deserialize)]
    struct Sample {
        #[serde(default)]
        logging: LoggingConfig,
    }

    #[test]
    fn test_logging_defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert!(config.file.is_none());
    }

    #[test]
    fn test_parse_empty_document_uses_defaults() {
        let sample: Sample = parse_config("").unwrap();
        assert_eq!(sample.logging.level, "info");
    }

    #[test]
    fn test_parse_ignores_foreign_sections() {
        let sample: Sample = parse_config(
            r#"
            [logging]
            level = "debug"

            [reconcile]
            join = "left"
            "#,
        )
        .unwrap();
        assert_eq!(sample.logging.level, "debug");
    }

    #[test]
    fn test_cli_path_must_exist() {
        let result = resolve_config_source(
            Some(Path::new("/nonexistent/nhx/config.toml")),
            "NHX_TEST_UNUSED_VAR",
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
