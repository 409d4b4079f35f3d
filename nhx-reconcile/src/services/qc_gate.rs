//! Quality-control gate
//!
//! A conjunction of `field >= minimum` filters over joined rows. Filters run
//! one after another so each can report how many rows it removed; the
//! retained set does not depend on filter order. A row without a value for
//! a configured field fails that filter, so unmatched rows from a left join
//! survive only when no thresholds are configured.

use crate::models::JoinedRow;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Segmentation QC minimums used for the multi-cohort table
pub fn default_thresholds() -> BTreeMap<String, f64> {
    [
        ("qc_hippocampus+amygdala", 0.75),
        ("qc_general white matter", 0.75),
        ("qc_general grey matter", 0.70),
    ]
    .iter()
    .map(|(field, min)| (field.to_string(), *min))
    .collect()
}

/// Rows removed by one filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRemoval {
    pub field: String,
    pub threshold: f64,
    pub removed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QcReport {
    pub rows_before: usize,
    pub rows_after: usize,
    pub filters: Vec<FilterRemoval>,
}

impl QcReport {
    pub fn removed(&self) -> usize {
        self.rows_before - self.rows_after
    }

    pub fn display_string(&self) -> String {
        format!(
            "QC filtering: {} → {} rows ({} removed)",
            self.rows_before,
            self.rows_after,
            self.removed()
        )
    }
}

#[derive(Debug, Clone)]
pub struct QcGate {
    thresholds: Vec<(String, f64)>,
}

impl QcGate {
    pub fn new<I, S>(thresholds: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self {
            thresholds: thresholds.into_iter().map(|(f, t)| (f.into(), t)).collect(),
        }
    }

    /// True when the row meets every threshold
    pub fn passes(&self, row: &JoinedRow) -> bool {
        self.thresholds
            .iter()
            .all(|(field, min)| meets(row, field, *min))
    }

    pub fn apply(&self, mut rows: Vec<JoinedRow>) -> (Vec<JoinedRow>, QcReport) {
        let mut report = QcReport {
            rows_before: rows.len(),
            ..Default::default()
        };

        for (field, min) in &self.thresholds {
            let before = rows.len();
            rows.retain(|row| meets(row, field, *min));
            let removed = before - rows.len();
            tracing::info!(field = %field, threshold = min, removed, "QC filter applied");
            report.filters.push(FilterRemoval {
                field: field.clone(),
                threshold: *min,
                removed,
            });
        }

        report.rows_after = rows.len();
        (rows, report)
    }
}

impl Default for QcGate {
    fn default() -> Self {
        Self::new(default_thresholds())
    }
}

fn meets(row: &JoinedRow, field: &str, min: f64) -> bool {
    row.value(field).is_some_and(|v| v >= min)
}
