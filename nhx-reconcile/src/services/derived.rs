//! Derived volume metrics
//!
//! Computed per row, and emitted as columns only when their source columns
//! exist in the joined data.

use crate::models::JoinedRow;

pub const LEFT_HIPPOCAMPUS: &str = "vol_left hippocampus";
pub const RIGHT_HIPPOCAMPUS: &str = "vol_right hippocampus";
pub const TOTAL_INTRACRANIAL: &str = "vol_total intracranial";

pub const TOTAL_HIPPOCAMPUS: &str = "vol_total_hippocampus";
pub const HIPPOCAMPUS_NORMALIZED: &str = "vol_hippocampus_normalized";

/// A metric computed from other measurement columns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivedMetric {
    /// Left + right hippocampus
    TotalHippocampus,
    /// Total hippocampus / total intracranial volume
    HippocampusNormalized,
}

impl DerivedMetric {
    pub const ALL: [DerivedMetric; 2] = [DerivedMetric::TotalHippocampus, DerivedMetric::HippocampusNormalized];

    pub fn column(&self) -> &'static str {
        match self {
            DerivedMetric::TotalHippocampus => TOTAL_HIPPOCAMPUS,
            DerivedMetric::HippocampusNormalized => HIPPOCAMPUS_NORMALIZED,
        }
    }

    /// Source columns that must be present for the metric to be emitted
    pub fn requires(&self) -> &'static [&'static str] {
        match self {
            DerivedMetric::TotalHippocampus => &[LEFT_HIPPOCAMPUS, RIGHT_HIPPOCAMPUS],
            DerivedMetric::HippocampusNormalized => {
                &[LEFT_HIPPOCAMPUS, RIGHT_HIPPOCAMPUS, TOTAL_INTRACRANIAL]
            }
        }
    }

    /// Value for one row; `None` when an input is missing or the
    /// denominator is zero
    pub fn compute(&self, row: &JoinedRow) -> Option<f64> {
        let total = row.value(LEFT_HIPPOCAMPUS)? + row.value(RIGHT_HIPPOCAMPUS)?;
        match self {
            DerivedMetric::TotalHippocampus => Some(total),
            DerivedMetric::HippocampusNormalized => {
                let tiv = row.value(TOTAL_INTRACRANIAL)?;
                (tiv != 0.0).then(|| total / tiv)
            }
        }
    }
}

/// Metrics whose source columns all appear in `columns`
pub fn applicable_metrics<'a, I>(columns: I) -> Vec<DerivedMetric>
where
    I: IntoIterator<Item = &'a str>,
{
    let present: Vec<&str> = columns.into_iter().collect();
    DerivedMetric::ALL
        .into_iter()
        .filter(|m| m.requires().iter().all(|c| present.contains(c)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DatasetLabel, SubjectRecord};
    use std::collections::BTreeMap;

    fn row(values: &[(&str, f64)]) -> JoinedRow {
        JoinedRow {
            subject: SubjectRecord {
                subject_id: "X".to_string(),
                raw_id: "X".to_string(),
                dataset: DatasetLabel::Adni,
                age: None,
                sex: None,
                metadata: BTreeMap::new(),
                nifti_path: None,
            },
            values: values.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            matched: true,
        }
    }

    #[test]
    fn test_compute() {
        let r = row(&[
            (LEFT_HIPPOCAMPUS, 3500.0),
            (RIGHT_HIPPOCAMPUS, 3700.0),
            (TOTAL_INTRACRANIAL, 1_440_000.0),
        ]);
        assert_eq!(DerivedMetric::TotalHippocampus.compute(&r), Some(7200.0));
        assert_eq!(DerivedMetric::HippocampusNormalized.compute(&r), Some(0.005));
    }

    #[test]
    fn test_zero_denominator_and_missing_inputs() {
        let zero = row(&[(LEFT_HIPPOCAMPUS, 1.0), (RIGHT_HIPPOCAMPUS, 1.0), (TOTAL_INTRACRANIAL, 0.0)]);
        assert_eq!(DerivedMetric::HippocampusNormalized.compute(&zero), None);
        assert_eq!(DerivedMetric::TotalHippocampus.compute(&zero), Some(2.0));

        let left_only = row(&[(LEFT_HIPPOCAMPUS, 1.0)]);
        assert_eq!(DerivedMetric::TotalHippocampus.compute(&left_only), None);
    }

    #[test]
    fn test_applicable_metrics() {
        assert_eq!(
            applicable_metrics([LEFT_HIPPOCAMPUS, RIGHT_HIPPOCAMPUS]),
            vec![DerivedMetric::TotalHippocampus]
        );
        assert!(applicable_metrics([LEFT_HIPPOCAMPUS, TOTAL_INTRACRANIAL]).is_empty());
        assert_eq!(
            applicable_metrics([TOTAL_INTRACRANIAL, RIGHT_HIPPOCAMPUS, LEFT_HIPPOCAMPUS]),
            DerivedMetric::ALL.to_vec()
        );
    }
}
