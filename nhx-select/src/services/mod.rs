//! Selection and conversion services
//!
//! - `tree_scanner`: sorted one-level listings of the acquisition tree
//! - `sequence_selector`: per-subject discovery and best-sequence selection
//! - `transcoder`: external conversion seam and the dcm2niix adapter
//! - `conversion_runner`: subject loop, outcomes, run summary
//! - `cohort`: subject list from the tree or a cohort table
//! - `manifest`: segmentation manifest over standardized roots

pub mod cohort;
pub mod conversion_runner;
pub mod manifest;
pub mod sequence_selector;
pub mod statistics;
pub mod transcoder;
pub mod tree_scanner;

pub use conversion_runner::{ConversionOutcome, ConversionRun, ConversionRunner, ConversionStatus};
pub use sequence_selector::{select_best, SequenceSelector};
pub use statistics::ConversionStatistics;
pub use transcoder::{ConversionError, ConversionReport, ConversionRequest, Dcm2niixTranscoder, Transcoder};
pub use tree_scanner::{ScanError, TreeScanner};
