//! Reconciliation services

pub mod aggregator;
pub mod derived;
pub mod harmonized;
pub mod inference;
pub mod join;
pub mod measurement_loader;
pub mod qc_gate;
pub mod reconciler;
pub mod subject_loader;
pub mod summary;

pub use aggregator::{aggregate_source, aggregate_tree, AggregateReport};
pub use derived::DerivedMetric;
pub use harmonized::{HarmonizedSchema, HarmonizedTable};
pub use inference::{DatasetInference, InferenceRule};
pub use join::{join_dataset, JoinMode, JoinReport};
pub use measurement_loader::load_measurements;
pub use qc_gate::{QcGate, QcReport};
pub use reconciler::{ReconcileReport, ReconcileRun, SubjectReconciler};
pub use subject_loader::{DatasetAssignment, SubjectLoadReport, SubjectLoader};
pub use summary::{AgeStats, ReconcileSummary};
