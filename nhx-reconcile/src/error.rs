//! Error types for nhx-reconcile
//!
//! Only `Configuration` aborts a run. `MissingSource` and `SchemaMismatch`
//! are raised per dataset and turned into ledger entries by the reconciler.

use nhx_common::FailureCategory;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReconcileError>;

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Expected table file does not exist
    #[error("Missing source: {0}")]
    MissingSource(String),

    /// Table lacks a recognizable identifier column
    #[error("Schema mismatch in {dataset}: {message}")]
    SchemaMismatch { dataset: String, message: String },

    /// Unusable configuration or no data to work with
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// nhx-common error
    #[error("Common error: {0}")]
    Common(#[from] nhx_common::Error),
}

impl ReconcileError {
    pub fn is_fatal(&self) -> bool {
        match self {
            ReconcileError::Configuration(_) => true,
            ReconcileError::Common(e) => e.is_fatal(),
            _ => false,
        }
    }

    /// Ledger category for per-dataset errors
    pub fn category(&self) -> Option<FailureCategory> {
        match self {
            ReconcileError::MissingSource(_) => Some(FailureCategory::MissingSource),
            ReconcileError::SchemaMismatch { .. } => Some(FailureCategory::SchemaMismatch),
            _ => None,
        }
    }
}
