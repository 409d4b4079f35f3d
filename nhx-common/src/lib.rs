//! # NHX Common Library
//!
//! Shared code for the NHX harmonization tools:
//! - Error type used by every crate
//! - TOML configuration loading and file resolution
//! - Logging initialization
//! - Subject identifier normalization
//! - Delimited text tables
//! - Failure ledger and run summary plumbing

pub mod config;
pub mod error;
pub mod identifiers;
pub mod ledger;
pub mod logging;
pub mod table;

pub use error::{Error, Result};
pub use ledger::{FailureCategory, FailureLedger, RunInfo};
pub use table::Table;
