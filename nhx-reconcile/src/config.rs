//! Configuration for nhx-reconcile
//!
//! Reads the `[logging]` and `[reconcile]` sections of the shared TOML
//! document. Every field has a built-in default; the dataset list defaults
//! to the six cohorts with per-dataset measurement exports, resolved
//! against `volumes_dir` when relative.
//!
//! ```toml
//! [reconcile]
//! subjects = "/data/combined/subjects.csv"
//! volumes_dir = "/data/volumes"
//! output = "/data/combined/harmonized.csv"
//! join = "inner"
//!
//! [reconcile.qc_thresholds]
//! "qc_general grey matter" = 0.70
//!
//! [[reconcile.datasets]]
//! label = "IXI"
//! measurements = "ixi.csv"
//! min_age = 45
//! defaults = { visit_code = "baseline" }
//! ```

use crate::models::DatasetLabel;
use crate::services::inference::{default_rules, InferenceRule};
use crate::services::join::JoinMode;
use crate::services::qc_gate::default_thresholds;
use nhx_common::config::LoggingConfig;
use nhx_common::identifiers::DEFAULT_PREFIXES;
use nhx_common::ledger::DEFAULT_SAMPLE_LIMIT;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Subject table identifier columns tried in order
pub const DEFAULT_ID_COLUMNS: &[&str] = &["subject_id", "Subject"];

/// Sections of the shared document read by this tool
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReconcileToolConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
}

/// `[reconcile]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Combined subjects table (dataset column optional)
    #[serde(default)]
    pub subjects: Option<PathBuf>,

    /// Base directory for relative measurement/subject table paths
    #[serde(default)]
    pub volumes_dir: Option<PathBuf>,

    /// Harmonized table path
    #[serde(default)]
    pub output: Option<PathBuf>,

    /// Subject identifier column candidates; exactly one must be present
    #[serde(default = "default_id_columns")]
    pub id_columns: Vec<String>,

    /// Prefix tokens stripped before joining
    #[serde(default = "default_prefixes")]
    pub prefixes: Vec<String>,

    #[serde(default = "default_rules")]
    pub inference_rules: Vec<InferenceRule>,

    #[serde(default)]
    pub join: JoinMode,

    /// Keep UNKNOWN rows as their own dataset group
    #[serde(default)]
    pub allow_unknown: bool,

    /// QC field → minimum (inclusive)
    #[serde(default = "default_thresholds")]
    pub qc_thresholds: BTreeMap<String, f64>,

    /// Restrict emitted `vol_` columns; empty emits all
    #[serde(default)]
    pub volume_columns: Vec<String>,

    #[serde(default = "default_sample_limit")]
    pub sample_limit: usize,

    #[serde(default = "default_datasets")]
    pub datasets: Vec<DatasetSource>,

    #[serde(default)]
    pub aggregate: Vec<AggregateSource>,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            subjects: None,
            volumes_dir: None,
            output: None,
            id_columns: default_id_columns(),
            prefixes: default_prefixes(),
            inference_rules: default_rules(),
            join: JoinMode::default(),
            allow_unknown: false,
            qc_thresholds: default_thresholds(),
            volume_columns: Vec::new(),
            sample_limit: default_sample_limit(),
            datasets: default_datasets(),
            aggregate: Vec::new(),
        }
    }
}

impl ReconcileConfig {
    /// Resolve a configured table path against `volumes_dir`
    pub fn resolve(&self, path: &Path) -> PathBuf {
        match &self.volumes_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    pub fn dataset(&self, label: DatasetLabel) -> Option<&DatasetSource> {
        self.datasets.iter().find(|d| d.label == label)
    }
}

/// `[[reconcile.datasets]]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSource {
    pub label: DatasetLabel,
    /// Measurement table for this dataset
    #[serde(default)]
    pub measurements: Option<PathBuf>,
    /// Per-dataset subjects table (dataset taken from `label`)
    #[serde(default)]
    pub subjects: Option<PathBuf>,
    /// Subjects younger than this are dropped
    #[serde(default)]
    pub min_age: Option<f64>,
    /// Metadata values filled in where the source has none
    #[serde(default)]
    pub defaults: BTreeMap<String, String>,
}

impl DatasetSource {
    fn with_measurements(label: DatasetLabel, file: &str, defaults: &[(&str, &str)]) -> Self {
        Self {
            label,
            measurements: Some(PathBuf::from(file)),
            subjects: None,
            min_age: None,
            defaults: defaults
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

/// `[[reconcile.aggregate]]`: one segmentation derivatives tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateSource {
    pub label: DatasetLabel,
    /// Directory walked for `volumes.csv` + `qc_scores.csv` pairs
    pub root: PathBuf,
    /// Measurement table written for this dataset
    pub output: PathBuf,
}

fn default_id_columns() -> Vec<String> {
    DEFAULT_ID_COLUMNS.iter().map(|s| s.to_string()).collect()
}

fn default_prefixes() -> Vec<String> {
    DEFAULT_PREFIXES.iter().map(|s| s.to_string()).collect()
}

fn default_sample_limit() -> usize {
    DEFAULT_SAMPLE_LIMIT
}

/// Cohorts with measurement exports, and their metadata defaults
pub fn default_datasets() -> Vec<DatasetSource> {
    const WASHU: &str = "Washington University";
    vec![
        DatasetSource::with_measurements(DatasetLabel::Adni, "adni.csv", &[("visit_code", "bl")]),
        DatasetSource::with_measurements(DatasetLabel::Ixi, "ixi.csv", &[("visit_code", "baseline")]),
        DatasetSource::with_measurements(
            DatasetLabel::Oasis2,
            "oasis2.csv",
            &[("site", WASHU), ("field_strength", "1.5T"), ("visit_code", "ses-01")],
        ),
        DatasetSource::with_measurements(
            DatasetLabel::Oasis3,
            "oasis3.csv",
            &[("site", WASHU), ("field_strength", "3T"), ("visit_code", "ses-01")],
        ),
        DatasetSource::with_measurements(DatasetLabel::Ppmi, "ppmi.csv", &[("visit_code", "baseline")]),
        DatasetSource::with_measurements(
            DatasetLabel::Srpbs,
            "srpb.csv",
            &[
                ("site", "Southwest University"),
                ("field_strength", "3T"),
                ("visit_code", "baseline"),
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use nhx_common::config::parse_config;

    #[test]
    fn test_empty_document_gives_defaults() {
        let config: ReconcileToolConfig = parse_config("").unwrap();
        let reconcile = config.reconcile;
        assert_eq!(reconcile.id_columns, vec!["subject_id", "Subject"]);
        assert_eq!(reconcile.prefixes, vec!["sub-"]);
        assert_eq!(reconcile.join, JoinMode::Inner);
        assert!(!reconcile.allow_unknown);
        assert_eq!(reconcile.qc_thresholds.len(), 3);
        assert_eq!(reconcile.inference_rules.len(), 7);
        assert_eq!(reconcile.datasets.len(), 6);
        assert_eq!(
            reconcile.dataset(DatasetLabel::Adni).unwrap().defaults["visit_code"],
            "bl"
        );
        assert!(reconcile.dataset(DatasetLabel::Oasis1).is_none());
    }

    #[test]
    fn test_section_overrides() {
        let config: ReconcileToolConfig = parse_config(
            r#"
            [reconcile]
            volumes_dir = "/data/volumes"
            join = "left"
            allow_unknown = true
            volume_columns = ["vol_left hippocampus"]

            [reconcile.qc_thresholds]
            "qc_general grey matter" = 0.6

            [[reconcile.inference_rules]]
            prefix = "HC"
            label = "IXI"

            [[reconcile.datasets]]
            label = "OASIS1"
            measurements = "oasis1.csv"
            min_age = 45
            defaults = { visit_code = "baseline" }

            [[reconcile.aggregate]]
            label = "OASIS1"
            root = "/data/OASIS1_BIDS/derivatives/synthseg"
            output = "/data/volumes/oasis1.csv"
            "#,
        )
        .unwrap();
        let reconcile = config.reconcile;

        assert_eq!(reconcile.join, JoinMode::Left);
        assert!(reconcile.allow_unknown);
        assert_eq!(reconcile.qc_thresholds.len(), 1);
        assert_eq!(reconcile.inference_rules.len(), 1);
        assert_eq!(reconcile.datasets.len(), 1);

        let oasis1 = reconcile.dataset(DatasetLabel::Oasis1).unwrap();
        assert_eq!(oasis1.min_age, Some(45.0));
        assert_eq!(
            reconcile.resolve(oasis1.measurements.as_deref().unwrap()),
            PathBuf::from("/data/volumes/oasis1.csv")
        );
        assert_eq!(reconcile.aggregate.len(), 1);
    }

    #[test]
    fn test_absolute_paths_not_rebased() {
        let reconcile = ReconcileConfig {
            volumes_dir: Some(PathBuf::from("/data/volumes")),
            ..Default::default()
        };
        assert_eq!(
            reconcile.resolve(Path::new("/elsewhere/ixi.csv")),
            PathBuf::from("/elsewhere/ixi.csv")
        );
    }
}
