//! Reconciliation summary statistics
//!
//! Describes the harmonized table (dataset and sex distributions, age
//! spread) together with the per-stage reports collected along the way.

use crate::models::{DatasetLabel, JoinedRow};
use crate::services::join::JoinReport;
use crate::services::qc_gate::QcReport;
use crate::services::subject_loader::SubjectLoadReport;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// **Age distribution** over rows with a known age
///
/// Display: "age 67.2 ± 8.1 (range 45.0-91.0, n=120)"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgeStats {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation (0 for a single value)
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

impl AgeStats {
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let std_dev = if values.len() > 1 {
            (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
        } else {
            0.0
        };
        Some(Self {
            count: values.len(),
            mean,
            std_dev,
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        })
    }

    pub fn display_string(&self) -> String {
        format!(
            "age {:.1} ± {:.1} (range {:.1}-{:.1}, n={})",
            self.mean, self.std_dev, self.min, self.max, self.count
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconcileSummary {
    pub total_rows: usize,
    pub datasets: BTreeMap<DatasetLabel, usize>,
    /// Sex value as written; rows without one count under "unknown"
    pub sex: BTreeMap<String, usize>,
    pub age: Option<AgeStats>,
    pub subjects: SubjectLoadReport,
    pub joins: Vec<JoinReport>,
    pub qc: QcReport,
    /// Datasets with subjects but no usable measurement table
    pub missing_datasets: Vec<DatasetLabel>,
    /// UNKNOWN rows kept out of the join
    pub unknown_excluded: usize,
}

impl ReconcileSummary {
    /// Fill the distribution fields from the final rows
    pub fn describe(&mut self, rows: &[JoinedRow]) {
        self.total_rows = rows.len();
        self.datasets.clear();
        self.sex.clear();
        for row in rows {
            *self.datasets.entry(row.subject.dataset).or_default() += 1;
            let sex = row.subject.sex.clone().unwrap_or_else(|| "unknown".to_string());
            *self.sex.entry(sex).or_default() += 1;
        }
        let ages: Vec<f64> = rows.iter().filter_map(|r| r.subject.age).collect();
        self.age = AgeStats::from_values(&ages);
    }

    pub fn log_summary(&self) {
        tracing::info!("Subjects: {}", self.subjects.display_string());
        if self.unknown_excluded > 0 {
            tracing::warn!(
                count = self.unknown_excluded,
                "UNKNOWN subjects excluded from the join"
            );
        }
        for join in &self.joins {
            tracing::info!("{}", join.display_string());
            if !join.unmatched_ids.is_empty() {
                tracing::info!(dataset = %join.dataset, "  unmatched: {}", join.unmatched_ids.join(", "));
            }
        }
        for label in &self.missing_datasets {
            tracing::warn!(dataset = %label, "No measurement table for dataset");
        }
        tracing::info!("{}", self.qc.display_string());
        for filter in &self.qc.filters {
            tracing::info!(
                "  {} >= {}: removed {}",
                filter.field,
                filter.threshold,
                filter.removed
            );
        }
        tracing::info!("Final rows: {}", self.total_rows);
        for (label, count) in &self.datasets {
            tracing::info!("  {}: {}", label, count);
        }
        match &self.age {
            Some(age) => tracing::info!("{}", age.display_string()),
            None => tracing::info!("age: no values"),
        }
        let sex = self
            .sex
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(", ");
        tracing::info!("sex: {}", sex);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SubjectRecord;

    fn row(dataset: DatasetLabel, age: Option<f64>, sex: Option<&str>) -> JoinedRow {
        JoinedRow {
            subject: SubjectRecord {
                subject_id: "X".to_string(),
                raw_id: "X".to_string(),
                dataset,
                age,
                sex: sex.map(str::to_string),
                metadata: BTreeMap::new(),
                nifti_path: None,
            },
            values: BTreeMap::new(),
            matched: true,
        }
    }

    #[test]
    fn test_age_stats() {
        let stats = AgeStats::from_values(&[60.0, 70.0, 80.0]).unwrap();
        assert_eq!(stats.mean, 70.0);
        assert_eq!(stats.std_dev, 10.0);
        assert_eq!(stats.min, 60.0);
        assert_eq!(stats.max, 80.0);
        assert_eq!(stats.display_string(), "age 70.0 ± 10.0 (range 60.0-80.0, n=3)");

        assert_eq!(AgeStats::from_values(&[55.0]).unwrap().std_dev, 0.0);
        assert!(AgeStats::from_values(&[]).is_none());
    }

    #[test]
    fn test_describe_distributions() {
        let mut summary = ReconcileSummary::default();
        summary.describe(&[
            row(DatasetLabel::Ixi, Some(60.0), Some("F")),
            row(DatasetLabel::Ixi, None, Some("M")),
            row(DatasetLabel::Adni, Some(80.0), None),
        ]);
        assert_eq!(summary.total_rows, 3);
        assert_eq!(summary.datasets[&DatasetLabel::Ixi], 2);
        assert_eq!(summary.datasets[&DatasetLabel::Adni], 1);
        assert_eq!(summary.sex["unknown"], 1);
        assert_eq!(summary.age.as_ref().unwrap().count, 2);
    }
}
