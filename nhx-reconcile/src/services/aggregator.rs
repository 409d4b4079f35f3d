//! Per-subject segmentation output aggregation
//!
//! Walks a segmentation derivatives tree and collects every directory that
//! holds both `volumes.csv` and `qc_scores.csv` into one measurement table:
//!
//! - volume columns are prefixed `vol_`, QC columns `qc_`
//! - the two files are joined on their `subject` column
//! - `subject_id` is the directory name, and the per-file subject columns
//!   are dropped
//!
//! Directories are visited in sorted order; output columns are the union of
//! every directory's columns in first-seen order, `subject_id` first.

use crate::config::AggregateSource;
use crate::error::{ReconcileError, Result};
use crate::models::DatasetLabel;
use nhx_common::{FailureCategory, FailureLedger, Table};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use walkdir::WalkDir;

pub const VOLUMES_FILE: &str = "volumes.csv";
pub const QC_FILE: &str = "qc_scores.csv";
pub const VOLUME_PREFIX: &str = "vol_";
pub const QC_PREFIX: &str = "qc_";
pub const SUBJECT_ID_COLUMN: &str = "subject_id";

const SOURCE_SUBJECT_COLUMN: &str = "subject";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateReport {
    pub dataset: DatasetLabel,
    /// Directories holding both files
    pub directories: usize,
    pub rows: usize,
    /// Directories whose files could not be read or joined
    pub skipped: usize,
}

impl AggregateReport {
    pub fn display_string(&self) -> String {
        format!(
            "{}: {} rows from {} directories ({} skipped)",
            self.dataset, self.rows, self.directories, self.skipped
        )
    }
}

/// One directory's joined rows as (column, cell) pairs
type Rows = Vec<Vec<(String, String)>>;

/// Aggregate every segmentation output directory under `root`
pub fn aggregate_tree(
    root: &Path,
    dataset: DatasetLabel,
    ledger: &mut FailureLedger,
) -> Result<(Table, AggregateReport)> {
    if !root.is_dir() {
        return Err(ReconcileError::MissingSource(root.display().to_string()));
    }

    let mut report = AggregateReport {
        dataset,
        directories: 0,
        rows: 0,
        skipped: 0,
    };
    let mut columns: Vec<String> = vec![SUBJECT_ID_COLUMN.to_string()];
    let mut all_rows: Rows = Vec::new();

    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        let dir = entry.path();
        if !dir.join(VOLUMES_FILE).is_file() || !dir.join(QC_FILE).is_file() {
            continue;
        }
        report.directories += 1;

        let subject_id = entry.file_name().to_string_lossy().to_string();
        match join_directory(dir, &subject_id) {
            Ok(rows) => {
                for row in &rows {
                    for (column, _) in row {
                        if !columns.contains(column) {
                            columns.push(column.clone());
                        }
                    }
                }
                all_rows.extend(rows);
            }
            Err(message) => {
                report.skipped += 1;
                tracing::warn!(subject = %subject_id, %message, "Segmentation output skipped");
                ledger.record(FailureCategory::SchemaMismatch, dir.display().to_string(), message);
            }
        }
    }

    let mut table = Table::new(columns.clone());
    for row in all_rows {
        let cells: HashMap<String, String> = row.into_iter().collect();
        table.push_row(
            columns
                .iter()
                .map(|c| cells.get(c).cloned().unwrap_or_default())
                .collect(),
        )?;
    }
    report.rows = table.len();

    tracing::info!(
        %dataset,
        root = %root.display(),
        directories = report.directories,
        rows = report.rows,
        skipped = report.skipped,
        "Segmentation outputs aggregated"
    );
    Ok((table, report))
}

/// Aggregate one configured tree and write its measurement table
pub fn aggregate_source(source: &AggregateSource, ledger: &mut FailureLedger) -> Result<AggregateReport> {
    let (table, report) = aggregate_tree(&source.root, source.label, ledger)?;
    table.write(&source.output)?;
    tracing::info!(dataset = %source.label, path = %source.output.display(), "Measurement table written");
    Ok(report)
}

fn subject_column(table: &Table) -> Option<usize> {
    table
        .headers()
        .iter()
        .position(|h| h.eq_ignore_ascii_case(SOURCE_SUBJECT_COLUMN))
}

fn join_directory(dir: &Path, subject_id: &str) -> std::result::Result<Rows, String> {
    let volumes = Table::read(&dir.join(VOLUMES_FILE)).map_err(|e| e.to_string())?;
    let qc = Table::read(&dir.join(QC_FILE)).map_err(|e| e.to_string())?;

    let vol_key = subject_column(&volumes).ok_or_else(|| format!("{} has no subject column", VOLUMES_FILE))?;
    let qc_key = subject_column(&qc).ok_or_else(|| format!("{} has no subject column", QC_FILE))?;

    let mut rows = Vec::new();
    for v in 0..volumes.len() {
        let key = volumes.cell(v, vol_key).unwrap_or_default();
        for q in 0..qc.len() {
            if qc.cell(q, qc_key).unwrap_or_default() != key {
                continue;
            }
            let mut row = vec![(SUBJECT_ID_COLUMN.to_string(), subject_id.to_string())];
            row.extend(prefixed_cells(&volumes, v, vol_key, VOLUME_PREFIX));
            row.extend(prefixed_cells(&qc, q, qc_key, QC_PREFIX));
            rows.push(row);
        }
    }

    if rows.is_empty() {
        return Err(format!("no subject rows shared by {} and {}", VOLUMES_FILE, QC_FILE));
    }
    Ok(rows)
}

fn prefixed_cells(table: &Table, row: usize, skip: usize, prefix: &str) -> Vec<(String, String)> {
    table
        .headers()
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != skip)
        .map(|(i, name)| {
            (
                format!("{}{}", prefix, name),
                table.cell(row, i).unwrap_or_default().to_string(),
            )
        })
        .collect()
}
