//! # nhx-reconcile
//!
//! Merges per-dataset subject and measurement tables into one harmonized
//! analysis table.
//!
//! **Pipeline:** normalize identifiers, infer dataset labels, join each
//! dataset's measurements onto its subjects, gate on QC scores, derive
//! summary volumes, write the union with a fixed column order.

pub mod config;
pub mod error;
pub mod models;
pub mod services;

pub use config::{ReconcileConfig, ReconcileToolConfig};
pub use error::{ReconcileError, Result};
pub use models::{DatasetLabel, JoinedRow, SubjectRecord};
pub use services::{ReconcileRun, SubjectReconciler};
