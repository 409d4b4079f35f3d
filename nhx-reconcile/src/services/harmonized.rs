//! Harmonized output table
//!
//! **Column order:** `subject_id`, `dataset`, `age`, `sex`, visit metadata
//! (first-seen order), `nifti_path`, `vol_*`, `qc_*`, derived metrics.
//!
//! Measurement columns outside the `vol_`/`qc_` families are not emitted.
//! Derived metrics are decided from the full measurement column set, before
//! any `volume_columns` restriction.

use crate::models::JoinedRow;
use crate::services::aggregator::{QC_PREFIX, VOLUME_PREFIX};
use crate::services::derived::{applicable_metrics, DerivedMetric};
use nhx_common::{Result, Table};
use std::path::Path;

pub const LEADING_COLUMNS: [&str; 4] = ["subject_id", "dataset", "age", "sex"];
pub const NIFTI_COLUMN: &str = "nifti_path";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HarmonizedSchema {
    pub metadata: Vec<String>,
    pub volumes: Vec<String>,
    pub qc: Vec<String>,
    pub derived: Vec<DerivedMetric>,
}

impl HarmonizedSchema {
    /// Build the schema from the subject metadata columns and the union of
    /// measurement columns
    ///
    /// A non-empty `volume_columns` selects (in its own order) which `vol_`
    /// columns are emitted; names absent from the data are ignored.
    pub fn new(metadata: &[String], measurement_columns: &[String], volume_columns: &[String]) -> Self {
        let available: Vec<&String> = measurement_columns
            .iter()
            .filter(|c| c.starts_with(VOLUME_PREFIX))
            .collect();
        let volumes = if volume_columns.is_empty() {
            available.into_iter().cloned().collect()
        } else {
            volume_columns
                .iter()
                .filter(|c| available.contains(c))
                .cloned()
                .collect()
        };
        let qc = measurement_columns
            .iter()
            .filter(|c| c.starts_with(QC_PREFIX))
            .cloned()
            .collect();
        let derived = applicable_metrics(measurement_columns.iter().map(String::as_str))
            .into_iter()
            .filter(|m| !measurement_columns.iter().any(|c| c == m.column()))
            .collect();

        Self {
            metadata: metadata.to_vec(),
            volumes,
            qc,
            derived,
        }
    }

    pub fn columns(&self) -> Vec<String> {
        LEADING_COLUMNS
            .iter()
            .map(|c| c.to_string())
            .chain(self.metadata.iter().cloned())
            .chain(std::iter::once(NIFTI_COLUMN.to_string()))
            .chain(self.volumes.iter().cloned())
            .chain(self.qc.iter().cloned())
            .chain(self.derived.iter().map(|m| m.column().to_string()))
            .collect()
    }
}

/// Reconciled rows plus the schema they are emitted with
#[derive(Debug, Clone, Default)]
pub struct HarmonizedTable {
    pub schema: HarmonizedSchema,
    pub rows: Vec<JoinedRow>,
}

impl HarmonizedTable {
    pub fn new(schema: HarmonizedSchema, rows: Vec<JoinedRow>) -> Self {
        Self { schema, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn to_table(&self) -> Result<Table> {
        let mut table = Table::new(self.schema.columns());
        for row in &self.rows {
            table.push_row(self.cells(row))?;
        }
        Ok(table)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        self.to_table()?.write(path)?;
        tracing::info!(
            path = %path.display(),
            rows = self.len(),
            columns = self.schema.columns().len(),
            "Harmonized table written"
        );
        Ok(())
    }

    fn cells(&self, row: &JoinedRow) -> Vec<String> {
        let subject = &row.subject;
        let mut cells = vec![
            subject.subject_id.clone(),
            subject.dataset.to_string(),
            format_number(subject.age),
            subject.sex.clone().unwrap_or_default(),
        ];
        cells.extend(
            self.schema
                .metadata
                .iter()
                .map(|c| subject.metadata.get(c).cloned().unwrap_or_default()),
        );
        cells.push(subject.nifti_path.clone().unwrap_or_default());
        cells.extend(self.schema.volumes.iter().map(|c| format_number(row.value(c))));
        cells.extend(self.schema.qc.iter().map(|c| format_number(row.value(c))));
        cells.extend(self.schema.derived.iter().map(|m| format_number(m.compute(row))));
        cells
    }
}

fn format_number(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DatasetLabel, SubjectRecord};
    use crate::services::derived::{LEFT_HIPPOCAMPUS, RIGHT_HIPPOCAMPUS};
    use std::collections::BTreeMap;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_column_order() {
        let schema = HarmonizedSchema::new(
            &strings(&["site", "visit_code"]),
            &strings(&[
                "qc_general grey matter",
                LEFT_HIPPOCAMPUS,
                "age_vol",
                RIGHT_HIPPOCAMPUS,
            ]),
            &[],
        );
        assert_eq!(
            schema.columns(),
            strings(&[
                "subject_id",
                "dataset",
                "age",
                "sex",
                "site",
                "visit_code",
                "nifti_path",
                LEFT_HIPPOCAMPUS,
                RIGHT_HIPPOCAMPUS,
                "qc_general grey matter",
                "vol_total_hippocampus",
            ])
        );
    }

    #[test]
    fn test_volume_selection_keeps_derived() {
        let schema = HarmonizedSchema::new(
            &[],
            &strings(&[LEFT_HIPPOCAMPUS, RIGHT_HIPPOCAMPUS, "vol_brain-stem"]),
            &strings(&["vol_brain-stem", "vol_missing"]),
        );
        assert_eq!(schema.volumes, strings(&["vol_brain-stem"]));
        assert_eq!(schema.derived, vec![DerivedMetric::TotalHippocampus]);
    }

    #[test]
    fn test_cells() {
        let schema = HarmonizedSchema::new(
            &strings(&["site"]),
            &strings(&[LEFT_HIPPOCAMPUS, RIGHT_HIPPOCAMPUS]),
            &[],
        );
        let row = JoinedRow {
            subject: SubjectRecord {
                subject_id: "IXI002".to_string(),
                raw_id: "sub-IXI002".to_string(),
                dataset: DatasetLabel::Ixi,
                age: Some(61.5),
                sex: None,
                metadata: BTreeMap::new(),
                nifti_path: Some("/data/IXI/sub-IXI002_T1w.nii.gz".to_string()),
            },
            values: [(LEFT_HIPPOCAMPUS.to_string(), 3500.0), (RIGHT_HIPPOCAMPUS.to_string(), 3600.5)]
                .into_iter()
                .collect(),
            matched: true,
        };
        let table = HarmonizedTable::new(schema, vec![row]).to_table().unwrap();
        assert_eq!(
            table.rows()[0],
            strings(&[
                "IXI002",
                "IXI",
                "61.5",
                "",
                "",
                "/data/IXI/sub-IXI002_T1w.nii.gz",
                "3500",
                "3600.5",
                "7100.5",
            ])
        );
    }
}
