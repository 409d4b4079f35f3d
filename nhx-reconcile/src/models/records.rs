//! Subject, measurement and joined rows

use super::dataset::DatasetLabel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One row of demographic/selection data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectRecord {
    /// Normalized identifier (prefix tokens stripped)
    pub subject_id: String,
    /// Identifier as written in the source table
    pub raw_id: String,
    pub dataset: DatasetLabel,
    pub age: Option<f64>,
    pub sex: Option<String>,
    /// Visit/acquisition metadata keyed by column name
    pub metadata: BTreeMap<String, String>,
    /// Canonical image reference
    pub nifti_path: Option<String>,
}

/// Subject rows plus the metadata column order seen while loading
#[derive(Debug, Clone, Default)]
pub struct SubjectTable {
    pub metadata_columns: Vec<String>,
    pub records: Vec<SubjectRecord>,
}

impl SubjectTable {
    /// Register a metadata column, keeping first-seen order
    pub fn add_metadata_column(&mut self, name: &str) {
        if !self.metadata_columns.iter().any(|c| c == name) {
            self.metadata_columns.push(name.to_string());
        }
    }

    pub fn for_dataset(&self, dataset: DatasetLabel) -> impl Iterator<Item = &SubjectRecord> {
        self.records.iter().filter(move |r| r.dataset == dataset)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// One row of volumetric and QC measurements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    pub subject_id: String,
    pub raw_id: String,
    /// Parsed numeric cells; unparseable cells are absent
    pub values: BTreeMap<String, f64>,
}

/// Measurement rows for one dataset
#[derive(Debug, Clone)]
pub struct MeasurementTable {
    pub dataset: DatasetLabel,
    /// Column the identifiers were read from
    pub id_column: String,
    /// Value columns in source order
    pub columns: Vec<String>,
    pub records: Vec<MeasurementRecord>,
    /// Rows dropped because their identifier was already seen
    pub duplicates: usize,
}

impl MeasurementTable {
    pub fn get(&self, subject_id: &str) -> Option<&MeasurementRecord> {
        self.records.iter().find(|r| r.subject_id == subject_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// A subject row with its (possibly absent) measurements attached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinedRow {
    pub subject: SubjectRecord,
    /// Measurement values under their output column names
    pub values: BTreeMap<String, f64>,
    pub matched: bool,
}

impl JoinedRow {
    pub fn value(&self, column: &str) -> Option<f64> {
        self.values.get(column).copied()
    }
}
