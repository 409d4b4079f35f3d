//! Subject reconciler
//!
//! **Pipeline:**
//! 1. Load the combined subjects table and any per-dataset subjects tables
//! 2. Group subjects by dataset label (UNKNOWN excluded unless allowed)
//! 3. For each dataset: load its measurement table and join on the
//!    normalized identifier
//! 4. Union the joined rows, apply the QC gate, derive metrics
//! 5. Emit the harmonized table and the run summary
//!
//! Per-dataset problems (missing tables, unrecognizable schemas) become
//! ledger entries and the dataset contributes no measurements. A run where
//! no dataset could be joined is a configuration error.

use crate::config::ReconcileConfig;
use crate::error::{ReconcileError, Result};
use crate::models::{DatasetLabel, JoinedRow, MeasurementTable, SubjectTable};
use crate::services::harmonized::{HarmonizedSchema, HarmonizedTable, LEADING_COLUMNS, NIFTI_COLUMN};
use crate::services::inference::DatasetInference;
use crate::services::join::{join_dataset, output_column, JoinMode};
use crate::services::measurement_loader::load_measurements;
use crate::services::qc_gate::QcGate;
use crate::services::subject_loader::{DatasetAssignment, SubjectLoadReport, SubjectLoader};
use crate::services::summary::ReconcileSummary;
use nhx_common::identifiers::IdentifierNormalizer;
use nhx_common::ledger::write_summary_json;
use nhx_common::{FailureCategory, FailureLedger, RunInfo};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Summary file written next to the harmonized table
pub const SUMMARY_FILE_NAME: &str = "reconcile_summary.json";

/// Serialized run summary
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    #[serde(flatten)]
    pub info: RunInfo,
    pub summary: ReconcileSummary,
    pub failures: FailureLedger,
}

impl ReconcileReport {
    pub fn log_summary(&self) {
        tracing::info!("{}", "=".repeat(80));
        tracing::info!(
            run_id = %self.info.run_id,
            elapsed_seconds = self.info.elapsed_seconds(),
            "RECONCILIATION COMPLETE - SUMMARY"
        );
        self.summary.log_summary();
        if self.info.cancelled {
            tracing::warn!("Run cancelled before all datasets were joined");
        }
        self.failures.log_summary();
        tracing::info!("{}", "=".repeat(80));
    }
}

/// Result of one reconciliation
#[derive(Debug, Clone)]
pub struct ReconcileRun {
    pub report: ReconcileReport,
    pub table: HarmonizedTable,
}

impl ReconcileRun {
    /// Write the harmonized table and its summary; returns the summary path
    pub fn write(&self, output: &Path) -> Result<PathBuf> {
        self.table.write(output)?;
        let summary_path = output.with_file_name(SUMMARY_FILE_NAME);
        write_summary_json(&self.report, &summary_path)?;
        tracing::info!(path = %summary_path.display(), "Summary written");
        Ok(summary_path)
    }
}

pub struct SubjectReconciler {
    config: ReconcileConfig,
    normalizer: IdentifierNormalizer,
    inference: DatasetInference,
    gate: QcGate,
}

impl SubjectReconciler {
    pub fn new(config: ReconcileConfig) -> Self {
        Self {
            normalizer: IdentifierNormalizer::new(config.prefixes.clone()),
            inference: DatasetInference::new(config.inference_rules.clone()),
            gate: QcGate::new(config.qc_thresholds.clone()),
            config,
        }
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Load every configured subject table
    ///
    /// The combined table is required when configured; an unreadable
    /// per-dataset table is a ledger entry.
    pub fn load_subjects(
        &self,
        report: &mut SubjectLoadReport,
        ledger: &mut FailureLedger,
    ) -> Result<SubjectTable> {
        let loader = SubjectLoader::new(
            &self.normalizer,
            &self.inference,
            &self.config.id_columns,
            &self.config.datasets,
        );
        let mut subjects = SubjectTable::default();

        if let Some(path) = &self.config.subjects {
            let path = self.config.resolve(path);
            loader
                .load_file(&path, DatasetAssignment::PerRow, &mut subjects, report, ledger)
                .map_err(|e| match e {
                    ReconcileError::MissingSource(p) => {
                        ReconcileError::Configuration(format!("subjects table not found: {}", p))
                    }
                    other => other,
                })?;
        }

        for source in &self.config.datasets {
            let Some(path) = &source.subjects else {
                continue;
            };
            let path = self.config.resolve(path);
            let result = loader.load_file(
                &path,
                DatasetAssignment::Fixed(source.label),
                &mut subjects,
                report,
                ledger,
            );
            match result {
                Ok(()) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    let category = e.category().unwrap_or(FailureCategory::SchemaMismatch);
                    tracing::warn!(dataset = %source.label, error = %e, "Subjects table skipped");
                    ledger.record(category, source.label.to_string(), e.to_string());
                }
            }
        }

        if report.tables_loaded == 0 {
            return Err(ReconcileError::Configuration(
                "no subjects table configured or readable".to_string(),
            ));
        }
        Ok(subjects)
    }

    fn measurements_for(&self, label: DatasetLabel) -> Result<MeasurementTable> {
        let path = self
            .config
            .dataset(label)
            .and_then(|d| d.measurements.as_deref())
            .ok_or_else(|| {
                ReconcileError::MissingSource(format!("no measurement table configured for {}", label))
            })?;
        load_measurements(&self.config.resolve(path), label, &self.normalizer)
    }

    /// Run the full pipeline; nothing is written
    pub fn run(&self, cancel: &CancellationToken) -> Result<ReconcileRun> {
        let mut info = RunInfo::start();
        let mut ledger = FailureLedger::with_sample_limit(self.config.sample_limit);
        let mut summary = ReconcileSummary::default();

        let subjects = self.load_subjects(&mut summary.subjects, &mut ledger)?;

        let mut labels: BTreeSet<DatasetLabel> = subjects.records.iter().map(|r| r.dataset).collect();
        if !self.config.allow_unknown && labels.remove(&DatasetLabel::Unknown) {
            summary.unknown_excluded = subjects.for_dataset(DatasetLabel::Unknown).count();
            tracing::warn!(
                count = summary.unknown_excluded,
                "UNKNOWN subjects excluded (set allow_unknown to keep them)"
            );
        }

        let reserved: HashSet<String> = LEADING_COLUMNS
            .iter()
            .map(|c| c.to_string())
            .chain(std::iter::once(NIFTI_COLUMN.to_string()))
            .chain(subjects.metadata_columns.iter().cloned())
            .collect();

        let mut joined: Vec<JoinedRow> = Vec::new();
        let mut measurement_columns: Vec<String> = Vec::new();
        let mut joined_datasets = 0;
        let mut cancelled = false;

        for label in labels {
            if cancel.is_cancelled() {
                tracing::warn!(dataset = %label, "Cancellation requested, stopping dataset loop");
                cancelled = true;
                break;
            }

            let measurements = match self.measurements_for(label) {
                Ok(measurements) => {
                    joined_datasets += 1;
                    measurements
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    let category = e.category().unwrap_or(FailureCategory::SchemaMismatch);
                    tracing::warn!(dataset = %label, error = %e, "Dataset has no usable measurements");
                    ledger.record(category, label.to_string(), e.to_string());
                    summary.missing_datasets.push(label);
                    if self.config.join != JoinMode::Left {
                        continue;
                    }
                    empty_measurements(label)
                }
            };

            for column in &measurements.columns {
                let name = output_column(column, &reserved);
                if !measurement_columns.contains(&name) {
                    measurement_columns.push(name);
                }
            }

            let (rows, report) = join_dataset(
                subjects.for_dataset(label),
                &measurements,
                &reserved,
                self.config.join,
                self.config.sample_limit,
            );
            joined.extend(rows);
            summary.joins.push(report);
        }

        if joined_datasets == 0 && !cancelled {
            return Err(ReconcileError::Configuration(
                "no dataset has a usable measurement table".to_string(),
            ));
        }

        let (kept, qc) = self.gate.apply(joined);
        summary.qc = qc;
        summary.describe(&kept);

        let schema = HarmonizedSchema::new(
            &subjects.metadata_columns,
            &measurement_columns,
            &self.config.volume_columns,
        );
        info.finish(cancelled);

        Ok(ReconcileRun {
            report: ReconcileReport {
                info,
                summary,
                failures: ledger,
            },
            table: HarmonizedTable::new(schema, kept),
        })
    }
}

fn empty_measurements(dataset: DatasetLabel) -> MeasurementTable {
    MeasurementTable {
        dataset,
        id_column: String::new(),
        columns: Vec::new(),
        records: Vec::new(),
        duplicates: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatasetSource;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::TempDir;

    fn source(label: DatasetLabel, measurements: Option<&str>) -> DatasetSource {
        DatasetSource {
            label,
            measurements: measurements.map(PathBuf::from),
            subjects: None,
            min_age: None,
            defaults: BTreeMap::new(),
        }
    }

    fn config(dir: &Path) -> ReconcileConfig {
        ReconcileConfig {
            subjects: Some(dir.join("subjects.csv")),
            volumes_dir: Some(dir.to_path_buf()),
            qc_thresholds: BTreeMap::new(),
            datasets: vec![source(DatasetLabel::Ixi, Some("ixi.csv"))],
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_combined_table_is_configuration_error() {
        let temp = TempDir::new().unwrap();
        let reconciler = SubjectReconciler::new(config(temp.path()));
        let err = reconciler.run(&CancellationToken::new()).unwrap_err();
        assert!(matches!(err, ReconcileError::Configuration(_)));
    }

    #[test]
    fn test_no_joinable_dataset_is_configuration_error() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("subjects.csv"), "subject_id,age\nsub-IXI002,61\n").unwrap();
        let reconciler = SubjectReconciler::new(config(temp.path()));
        let err = reconciler.run(&CancellationToken::new()).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_cancelled_before_first_dataset() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("subjects.csv"), "subject_id,age\nsub-IXI002,61\n").unwrap();
        fs::write(temp.path().join("ixi.csv"), "subject_id,vol_x\nIXI002,1\n").unwrap();
        let reconciler = SubjectReconciler::new(config(temp.path()));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let run = reconciler.run(&cancel).unwrap();
        assert!(run.report.info.cancelled);
        assert!(run.table.is_empty());
        assert!(run.report.summary.joins.is_empty());
    }
}
