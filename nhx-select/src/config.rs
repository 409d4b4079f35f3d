//! Configuration for nhx-select
//!
//! Reads the `[logging]` and `[select]` sections of the shared TOML document.
//! Every field has a built-in default, so an empty file (or no file) is a
//! valid configuration. Command-line flags override individual fields after
//! loading.
//!
//! ```toml
//! [select]
//! source_root = "/data/PPMI"
//! output_root = "/data/PPMI_BIDS"
//! image_extensions = ["dcm"]
//! priority = ["MPRAGE", "FSPGR"]
//!
//! [[select.include_patterns]]
//! kind = "contains"
//! value = "t1"
//!
//! [select.cohort]
//! table = "/data/PPMI/Participant_Status.csv"
//! id_column = "PATNO"
//! ```

use crate::rules::classifier::{default_exclude_patterns, default_include_patterns};
use crate::rules::ranker::default_priority_table;
use crate::rules::{Pattern, PatternClassifier, PriorityRanker};
use crate::services::cohort::CohortConfig;
use crate::services::manifest::ManifestRoot;
use crate::services::sequence_selector::SequenceSelector;
use crate::services::transcoder::Dcm2niixTranscoder;
use crate::services::tree_scanner::TreeScanner;
use nhx_common::config::LoggingConfig;
use nhx_common::ledger::DEFAULT_SAMPLE_LIMIT;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Sections of the shared document read by this tool
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SelectToolConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub select: SelectConfig,
}

/// `[select]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectConfig {
    /// Acquisition tree root (`{root}/{subject}/{series}/{timestamp}/...`)
    #[serde(default)]
    pub source_root: Option<PathBuf>,

    /// Standardized output root
    #[serde(default)]
    pub output_root: Option<PathBuf>,

    /// Restrict counted image files; empty counts every regular file
    #[serde(default)]
    pub image_extensions: Vec<String>,

    /// Worker-thread hint passed to the transcoder
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Failure samples kept per category in the run summary
    #[serde(default = "default_sample_limit")]
    pub sample_limit: usize,

    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<Pattern>,

    #[serde(default = "default_include_patterns")]
    pub include_patterns: Vec<Pattern>,

    /// Canonical sequence names, most preferred first
    #[serde(default = "default_priority_table")]
    pub priority: Vec<String>,

    /// Subject list from a cohort table instead of the source tree
    #[serde(default)]
    pub cohort: Option<CohortConfig>,

    #[serde(default)]
    pub transcoder: TranscoderConfig,

    #[serde(default)]
    pub manifest: ManifestConfig,
}

impl Default for SelectConfig {
    fn default() -> Self {
        Self {
            source_root: None,
            output_root: None,
            image_extensions: Vec::new(),
            threads: default_threads(),
            sample_limit: default_sample_limit(),
            exclude_patterns: default_exclude_patterns(),
            include_patterns: default_include_patterns(),
            priority: default_priority_table(),
            cohort: None,
            transcoder: TranscoderConfig::default(),
            manifest: ManifestConfig::default(),
        }
    }
}

impl SelectConfig {
    /// Selector assembled from the configured tables
    pub fn build_selector(&self) -> SequenceSelector {
        SequenceSelector::new(
            PatternClassifier::new(self.exclude_patterns.clone(), self.include_patterns.clone()),
            PriorityRanker::new(self.priority.iter().cloned()),
            TreeScanner::new().with_image_extensions(&self.image_extensions),
        )
    }

    pub fn build_transcoder(&self) -> Dcm2niixTranscoder {
        Dcm2niixTranscoder::new(self.transcoder.binary.clone(), self.transcoder.compress)
    }
}

/// `[select.transcoder]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscoderConfig {
    #[serde(default = "default_binary")]
    pub binary: PathBuf,
    /// Write `.nii.gz` (true) or `.nii` (false)
    #[serde(default = "default_compress")]
    pub compress: bool,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            compress: default_compress(),
        }
    }
}

/// `[select.manifest]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestConfig {
    #[serde(default)]
    pub roots: Vec<ManifestRoot>,
    #[serde(default)]
    pub output: Option<PathBuf>,
    /// Thread hint written into every row; falls back to `select.threads`
    #[serde(default)]
    pub threads: Option<usize>,
}

fn default_threads() -> usize {
    4
}

fn default_sample_limit() -> usize {
    DEFAULT_SAMPLE_LIMIT
}

fn default_binary() -> PathBuf {
    PathBuf::from("dcm2niix")
}

fn default_compress() -> bool {
    true
}
