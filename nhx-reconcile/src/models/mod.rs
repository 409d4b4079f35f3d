//! Data models for subject reconciliation

pub mod dataset;
pub mod records;

pub use dataset::DatasetLabel;
pub use records::{JoinedRow, MeasurementRecord, MeasurementTable, SubjectRecord, SubjectTable};
