//! Subject table loading
//!
//! **Per row:**
//! 1. Read the identifier from the single resolvable identifier column
//! 2. Assign a dataset: fixed by the source, else the `dataset` column when
//!    it parses, else inferred from the identifier
//! 3. Apply the dataset's `min_age` and metadata defaults
//! 4. Drop repeated (normalized id, dataset) pairs, keeping the first row
//!
//! UNKNOWN rows are kept and recorded as UnresolvableIdentifier; the
//! reconciler decides whether they reach the output.

use crate::config::DatasetSource;
use crate::error::{ReconcileError, Result};
use crate::models::{DatasetLabel, SubjectRecord, SubjectTable};
use crate::services::inference::DatasetInference;
use nhx_common::identifiers::IdentifierNormalizer;
use nhx_common::table::parse_number;
use nhx_common::{FailureCategory, FailureLedger, Table};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

pub const DATASET_COLUMN: &str = "dataset";
pub const AGE_COLUMN: &str = "age";
pub const SEX_COLUMN: &str = "sex";
pub const NIFTI_COLUMN: &str = "nifti_path";

/// How rows of one table get their dataset label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetAssignment {
    /// Per-dataset table
    Fixed(DatasetLabel),
    /// Combined table: `dataset` column, falling back to inference
    PerRow,
}

/// Row accounting across every subject table loaded
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectLoadReport {
    pub tables_loaded: usize,
    pub rows_read: usize,
    pub missing_id: usize,
    pub below_min_age: usize,
    pub duplicates: usize,
    pub unknown: usize,
    pub loaded: usize,
}

impl SubjectLoadReport {
    pub fn display_string(&self) -> String {
        format!(
            "{} rows read from {} tables, {} loaded ({} duplicates, {} below minimum age, {} without id, {} UNKNOWN)",
            self.rows_read,
            self.tables_loaded,
            self.loaded,
            self.duplicates,
            self.below_min_age,
            self.missing_id,
            self.unknown
        )
    }
}

/// Pick the identifier column: exactly one candidate must be present
pub fn resolve_id_column(table: &Table, candidates: &[String], source: &str) -> Result<usize> {
    let present: Vec<usize> = candidates
        .iter()
        .filter_map(|c| table.column_index(c))
        .collect();
    match present.as_slice() {
        [index] => Ok(*index),
        [] => Err(ReconcileError::Configuration(format!(
            "{}: no subject identifier column (tried {}; available {})",
            source,
            candidates.join(", "),
            table.headers().join(", ")
        ))),
        _ => Err(ReconcileError::Configuration(format!(
            "{}: ambiguous subject identifier column (found several of {})",
            source,
            candidates.join(", ")
        ))),
    }
}

pub struct SubjectLoader<'a> {
    normalizer: &'a IdentifierNormalizer,
    inference: &'a DatasetInference,
    id_columns: &'a [String],
    datasets: &'a [DatasetSource],
}

impl<'a> SubjectLoader<'a> {
    pub fn new(
        normalizer: &'a IdentifierNormalizer,
        inference: &'a DatasetInference,
        id_columns: &'a [String],
        datasets: &'a [DatasetSource],
    ) -> Self {
        Self {
            normalizer,
            inference,
            id_columns,
            datasets,
        }
    }

    /// Read a subject table file into `subjects`
    ///
    /// A missing file is `MissingSource`; an unresolvable identifier column
    /// is a configuration error.
    pub fn load_file(
        &self,
        path: &Path,
        assignment: DatasetAssignment,
        subjects: &mut SubjectTable,
        report: &mut SubjectLoadReport,
        ledger: &mut FailureLedger,
    ) -> Result<()> {
        if !path.is_file() {
            return Err(ReconcileError::MissingSource(path.display().to_string()));
        }
        let table = Table::read(path)?;
        self.load_table(&table, &path.display().to_string(), assignment, subjects, report, ledger)
    }

    pub fn load_table(
        &self,
        table: &Table,
        source: &str,
        assignment: DatasetAssignment,
        subjects: &mut SubjectTable,
        report: &mut SubjectLoadReport,
        ledger: &mut FailureLedger,
    ) -> Result<()> {
        let id_col = resolve_id_column(table, self.id_columns, source)?;
        let dataset_col = table.column_index(DATASET_COLUMN);
        let age_col = table.column_index(AGE_COLUMN);
        let sex_col = table.column_index(SEX_COLUMN);
        let nifti_col = table.column_index(NIFTI_COLUMN);

        let skip: HashSet<usize> = [Some(id_col), dataset_col, age_col, sex_col, nifti_col]
            .into_iter()
            .flatten()
            .collect();
        let metadata_cols: Vec<(usize, &str)> = table
            .headers()
            .iter()
            .enumerate()
            .filter(|(i, name)| !skip.contains(i) && !self.id_columns.contains(*name))
            .map(|(i, name)| (i, name.as_str()))
            .collect();
        for (_, name) in &metadata_cols {
            subjects.add_metadata_column(name);
        }

        let mut seen: HashSet<(String, DatasetLabel)> = subjects
            .records
            .iter()
            .map(|r| (r.subject_id.clone(), r.dataset))
            .collect();

        report.tables_loaded += 1;
        let before = subjects.len();

        for row in 0..table.len() {
            report.rows_read += 1;
            let Some(raw_id) = table.value(row, id_col) else {
                report.missing_id += 1;
                continue;
            };

            let dataset = match assignment {
                DatasetAssignment::Fixed(label) => label,
                DatasetAssignment::PerRow => dataset_col
                    .and_then(|c| table.value(row, c))
                    .and_then(|v| v.parse::<DatasetLabel>().ok())
                    .filter(DatasetLabel::is_known)
                    .unwrap_or_else(|| self.inference.infer(raw_id)),
            };

            let age = age_col.and_then(|c| table.cell(row, c)).and_then(parse_number);
            let source_config = self.datasets.iter().find(|d| d.label == dataset);
            if let Some(min_age) = source_config.and_then(|d| d.min_age) {
                if age.map_or(true, |a| a < min_age) {
                    report.below_min_age += 1;
                    continue;
                }
            }

            let subject_id = self.normalizer.normalize(raw_id);
            if !seen.insert((subject_id.clone(), dataset)) {
                report.duplicates += 1;
                tracing::debug!(subject = %subject_id, %dataset, "Duplicate subject row skipped");
                continue;
            }

            if dataset == DatasetLabel::Unknown {
                report.unknown += 1;
                ledger.record(
                    FailureCategory::UnresolvableIdentifier,
                    raw_id,
                    "identifier matches no dataset rule",
                );
            }

            let mut metadata: BTreeMap<String, String> = metadata_cols
                .iter()
                .filter_map(|(c, name)| table.value(row, *c).map(|v| (name.to_string(), v.to_string())))
                .collect();
            if let Some(config) = source_config {
                for (key, value) in &config.defaults {
                    metadata.entry(key.clone()).or_insert_with(|| value.clone());
                }
            }

            subjects.records.push(SubjectRecord {
                subject_id,
                raw_id: raw_id.to_string(),
                dataset,
                age,
                sex: sex_col.and_then(|c| table.value(row, c)).map(str::to_string),
                metadata,
                nifti_path: nifti_col.and_then(|c| table.value(row, c)).map(str::to_string),
            });
        }

        // Default-only metadata columns still get an output column
        for config in self.datasets {
            if subjects.records[before..].iter().any(|r| r.dataset == config.label) {
                for key in config.defaults.keys() {
                    subjects.add_metadata_column(key);
                }
            }
        }

        report.loaded += subjects.len() - before;
        tracing::info!(
            source = %source,
            rows = table.len(),
            loaded = subjects.len() - before,
            "Subject table loaded"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_datasets;

    fn table(csv: &str) -> Table {
        Table::from_reader(csv.as_bytes(), b',').unwrap()
    }

    fn id_columns() -> Vec<String> {
        vec!["subject_id".to_string(), "Subject".to_string()]
    }

    fn load(csv: &str, assignment: DatasetAssignment, datasets: &[DatasetSource]) -> (SubjectTable, SubjectLoadReport, FailureLedger) {
        let normalizer = IdentifierNormalizer::default();
        let inference = DatasetInference::default();
        let ids = id_columns();
        let loader = SubjectLoader::new(&normalizer, &inference, &ids, datasets);
        let mut subjects = SubjectTable::default();
        let mut report = SubjectLoadReport::default();
        let mut ledger = FailureLedger::new();
        loader
            .load_table(&table(csv), "test.csv", assignment, &mut subjects, &mut report, &mut ledger)
            .unwrap();
        (subjects, report, ledger)
    }

    #[test]
    fn test_id_column_resolution() {
        let ids = id_columns();
        assert_eq!(resolve_id_column(&table("x,Subject\n1,a\n"), &ids, "t").unwrap(), 1);
        assert!(matches!(
            resolve_id_column(&table("x,y\n1,2\n"), &ids, "t"),
            Err(ReconcileError::Configuration(_))
        ));
        assert!(matches!(
            resolve_id_column(&table("subject_id,Subject\n1,2\n"), &ids, "t"),
            Err(ReconcileError::Configuration(_))
        ));
    }

    #[test]
    fn test_combined_table_dataset_column_and_inference() {
        let (subjects, report, ledger) = load(
            "subject_id,dataset,age,sex,site\n\
             sub-IXI002,,61,F,Guys\n\
             002_S_0295,ADNI,72,M,\n\
             OAS2_0001,,80,F,\n\
             3001,,66,M,\n",
            DatasetAssignment::PerRow,
            &[],
        );
        let labels: Vec<_> = subjects.records.iter().map(|r| r.dataset).collect();
        assert_eq!(
            labels,
            vec![
                DatasetLabel::Ixi,
                DatasetLabel::Adni,
                DatasetLabel::Oasis2,
                DatasetLabel::Unknown
            ]
        );
        assert_eq!(subjects.records[0].subject_id, "IXI002");
        assert_eq!(subjects.records[0].raw_id, "sub-IXI002");
        assert_eq!(subjects.records[0].metadata["site"], "Guys");
        assert!(!subjects.records[1].metadata.contains_key("site"));
        assert_eq!(subjects.metadata_columns, vec!["site"]);
        assert_eq!(report.unknown, 1);
        assert_eq!(ledger.count(FailureCategory::UnresolvableIdentifier), 1);
    }

    #[test]
    fn test_duplicates_keep_first_row() {
        let (subjects, report, _) = load(
            "Subject,age,visit\n\
             sub-IXI002,61,baseline\n\
             IXI002,63,followup\n\
             ,50,x\n",
            DatasetAssignment::Fixed(DatasetLabel::Ixi),
            &[],
        );
        assert_eq!(subjects.len(), 1);
        assert_eq!(subjects.records[0].age, Some(61.0));
        assert_eq!(subjects.records[0].metadata["visit"], "baseline");
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.missing_id, 1);
        assert_eq!(report.loaded, 1);
    }

    #[test]
    fn test_min_age_and_defaults() {
        let mut datasets = default_datasets();
        for d in &mut datasets {
            if d.label == DatasetLabel::Oasis2 {
                d.min_age = Some(45.0);
            }
        }
        let (subjects, report, _) = load(
            "subject_id,age\n\
             OAS2_0001,80\n\
             OAS2_0002,30\n\
             OAS2_0003,\n",
            DatasetAssignment::PerRow,
            &datasets,
        );
        assert_eq!(subjects.len(), 1);
        assert_eq!(report.below_min_age, 2);
        let record = &subjects.records[0];
        assert_eq!(record.metadata["field_strength"], "1.5T");
        assert_eq!(record.metadata["visit_code"], "ses-01");
        assert!(subjects.metadata_columns.contains(&"site".to_string()));
    }
}
