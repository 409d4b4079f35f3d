//! Measurement table loading
//!
//! The identifier column is the first header containing `subject`
//! (case-insensitive); every other column is a numeric value column.

use crate::error::{ReconcileError, Result};
use crate::models::{DatasetLabel, MeasurementRecord, MeasurementTable};
use nhx_common::identifiers::IdentifierNormalizer;
use nhx_common::table::parse_number;
use nhx_common::Table;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Index of the measurement identifier column
pub fn find_id_column(table: &Table) -> Option<usize> {
    table
        .headers()
        .iter()
        .position(|h| h.to_ascii_lowercase().contains("subject"))
}

/// Read one dataset's measurement table
///
/// A missing file is `MissingSource`; a table without an identifier column
/// is `SchemaMismatch`.
pub fn load_measurements(
    path: &Path,
    dataset: DatasetLabel,
    normalizer: &IdentifierNormalizer,
) -> Result<MeasurementTable> {
    if !path.is_file() {
        return Err(ReconcileError::MissingSource(path.display().to_string()));
    }
    let table = Table::read(path)?;
    let measurements = measurements_from_table(&table, dataset, normalizer)?;
    tracing::info!(
        %dataset,
        path = %path.display(),
        rows = measurements.len(),
        columns = measurements.columns.len(),
        duplicates = measurements.duplicates,
        "Measurement table loaded"
    );
    Ok(measurements)
}

pub fn measurements_from_table(
    table: &Table,
    dataset: DatasetLabel,
    normalizer: &IdentifierNormalizer,
) -> Result<MeasurementTable> {
    let id_col = find_id_column(table).ok_or_else(|| ReconcileError::SchemaMismatch {
        dataset: dataset.to_string(),
        message: format!(
            "no subject identifier column among [{}]",
            table.headers().join(", ")
        ),
    })?;

    let value_cols: Vec<(usize, &String)> = table
        .headers()
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != id_col)
        .collect();

    let mut seen = HashSet::new();
    let mut records = Vec::new();
    let mut duplicates = 0;

    for row in 0..table.len() {
        let Some(raw_id) = table.value(row, id_col) else {
            continue;
        };
        let subject_id = normalizer.normalize(raw_id);
        if !seen.insert(subject_id.clone()) {
            duplicates += 1;
            continue;
        }
        let values: BTreeMap<String, f64> = value_cols
            .iter()
            .filter_map(|(c, name)| {
                table
                    .cell(row, *c)
                    .and_then(parse_number)
                    .map(|v| ((*name).clone(), v))
            })
            .collect();
        records.push(MeasurementRecord {
            subject_id,
            raw_id: raw_id.to_string(),
            values,
        });
    }

    Ok(MeasurementTable {
        dataset,
        id_column: table.headers()[id_col].clone(),
        columns: value_cols.into_iter().map(|(_, name)| name.clone()).collect(),
        records,
        duplicates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(csv: &str) -> Table {
        Table::from_reader(csv.as_bytes(), b',').unwrap()
    }

    #[test]
    fn test_first_subject_column_wins() {
        let t = table("index,Subject_ID,subject_alt,vol_x\n0,sub-A,B,1.5\n");
        assert_eq!(find_id_column(&t), Some(1));
        assert_eq!(find_id_column(&table("a,b\n1,2\n")), None);
    }

    #[test]
    fn test_values_and_duplicates() {
        let normalizer = IdentifierNormalizer::default();
        let t = table(
            "subject_id,vol_left hippocampus,qc_general grey matter\n\
             sub-OAS30001,3500.5,0.91\n\
             OAS30002,n/a,0.88\n\
             OAS30001,9999,0.10\n",
        );
        let m = measurements_from_table(&t, DatasetLabel::Oasis3, &normalizer).unwrap();
        assert_eq!(m.len(), 2);
        assert_eq!(m.duplicates, 1);
        assert_eq!(m.id_column, "subject_id");
        assert_eq!(m.columns, vec!["vol_left hippocampus", "qc_general grey matter"]);

        let first = m.get("OAS30001").unwrap();
        assert_eq!(first.values["vol_left hippocampus"], 3500.5);
        assert_eq!(first.raw_id, "sub-OAS30001");
        assert!(!m.get("OAS30002").unwrap().values.contains_key("vol_left hippocampus"));
    }

    #[test]
    fn test_schema_mismatch() {
        let normalizer = IdentifierNormalizer::default();
        let err = measurements_from_table(&table("id,vol_x\n1,2\n"), DatasetLabel::Ixi, &normalizer)
            .unwrap_err();
        assert!(matches!(err, ReconcileError::SchemaMismatch { ref dataset, .. } if dataset == "IXI"));
    }

    #[test]
    fn test_missing_file() {
        let normalizer = IdentifierNormalizer::default();
        let err = load_measurements(Path::new("/nonexistent/ixi.csv"), DatasetLabel::Ixi, &normalizer)
            .unwrap_err();
        assert!(matches!(err, ReconcileError::MissingSource(_)));
    }
}
