//! Per-dataset join of subject rows onto measurement rows
//!
//! Both sides carry normalized identifiers, so the join is a plain key
//! lookup. Measurement tables are deduplicated on load, which keeps the
//! output row count at or below the subject row count.

use crate::models::{DatasetLabel, JoinedRow, MeasurementRecord, MeasurementTable, SubjectRecord};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Suffix applied to measurement columns that collide with subject columns
pub const COLLISION_SUFFIX: &str = "_vol";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinMode {
    /// Keep matched subjects only
    #[default]
    Inner,
    /// Keep every subject; unmatched rows carry no measurements
    Left,
}

/// Match counts for one dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinReport {
    pub dataset: DatasetLabel,
    pub subjects: usize,
    pub measurement_rows: usize,
    pub matched: usize,
    pub unmatched: usize,
    /// First unmatched identifiers, in subject order
    pub unmatched_ids: Vec<String>,
}

impl JoinReport {
    /// Matched share in percent; 0 for an empty subject set
    pub fn match_rate(&self) -> f64 {
        if self.subjects == 0 {
            0.0
        } else {
            self.matched as f64 / self.subjects as f64 * 100.0
        }
    }

    pub fn display_string(&self) -> String {
        format!(
            "{}: matched {}/{} ({:.1}%)",
            self.dataset,
            self.matched,
            self.subjects,
            self.match_rate()
        )
    }
}

/// Output name of a measurement column, renamed when it collides
pub fn output_column(column: &str, reserved: &HashSet<String>) -> String {
    if reserved.contains(column) {
        format!("{}{}", column, COLLISION_SUFFIX)
    } else {
        column.to_string()
    }
}

/// Join one dataset's subjects onto its measurement table
///
/// `reserved` holds the subject-side column names; measurement columns with
/// the same name are suffixed. At most `sample_limit` unmatched identifiers
/// are listed in the report.
pub fn join_dataset<'a, I>(
    subjects: I,
    measurements: &MeasurementTable,
    reserved: &HashSet<String>,
    mode: JoinMode,
    sample_limit: usize,
) -> (Vec<JoinedRow>, JoinReport)
where
    I: IntoIterator<Item = &'a SubjectRecord>,
{
    let index: HashMap<&str, &MeasurementRecord> = measurements
        .records
        .iter()
        .map(|r| (r.subject_id.as_str(), r))
        .collect();

    let mut report = JoinReport {
        dataset: measurements.dataset,
        subjects: 0,
        measurement_rows: measurements.len(),
        matched: 0,
        unmatched: 0,
        unmatched_ids: Vec::new(),
    };
    let mut rows = Vec::new();

    for subject in subjects {
        report.subjects += 1;
        match index.get(subject.subject_id.as_str()) {
            Some(record) => {
                report.matched += 1;
                let values: BTreeMap<String, f64> = record
                    .values
                    .iter()
                    .map(|(column, value)| (output_column(column, reserved), *value))
                    .collect();
                rows.push(JoinedRow {
                    subject: subject.clone(),
                    values,
                    matched: true,
                });
            }
            None => {
                report.unmatched += 1;
                if report.unmatched_ids.len() < sample_limit {
                    report.unmatched_ids.push(subject.subject_id.clone());
                }
                if mode == JoinMode::Left {
                    rows.push(JoinedRow {
                        subject: subject.clone(),
                        values: BTreeMap::new(),
                        matched: false,
                    });
                }
            }
        }
    }

    tracing::info!(
        dataset = %report.dataset,
        matched = report.matched,
        unmatched = report.unmatched,
        ?mode,
        "Dataset joined"
    );
    (rows, report)
}
