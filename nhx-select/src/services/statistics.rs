//! Conversion run statistics
//!
//! Counters are accumulated by the conversion runner and written into the
//! run summary (`conversion_statistics.json`).

use serde::{Deserialize, Serialize};

/// **Subject discovery counts**
///
/// Display: "N subjects, M with images, K without images"
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectStats {
    /// Subjects in the cohort list
    pub total_subjects: usize,
    /// Subjects with at least one selected sequence
    pub subjects_with_images: usize,
    /// Subjects with no usable sequence (or no directory)
    pub subjects_without_images: usize,
}

impl SubjectStats {
    pub fn display_string(&self) -> String {
        format!(
            "{} subjects, {} with images, {} without images",
            self.total_subjects, self.subjects_with_images, self.subjects_without_images
        )
    }
}

/// **Conversion counts**
///
/// Display: "X sessions, Y sequences selected, Z converted, W failed"
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionStats {
    /// Distinct (subject, session) pairs with a selection
    pub total_sessions: usize,
    /// Selected sequences
    pub total_sequences: usize,
    /// Conversions that produced an image
    pub successful_conversions: usize,
    /// Conversions that failed or produced nothing
    pub failed_conversions: usize,
    /// Selections reported without conversion (dry run)
    pub planned_conversions: usize,
}

impl ConversionStats {
    pub fn display_string(&self) -> String {
        if self.planned_conversions > 0 {
            format!(
                "{} sessions, {} sequences selected, {} planned (dry run)",
                self.total_sessions, self.total_sequences, self.planned_conversions
            )
        } else {
            format!(
                "{} sessions, {} sequences selected, {} converted, {} failed",
                self.total_sessions,
                self.total_sequences,
                self.successful_conversions,
                self.failed_conversions
            )
        }
    }
}

/// Aggregate statistics across the conversion run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionStatistics {
    pub subjects: SubjectStats,
    pub conversions: ConversionStats,
}

impl ConversionStatistics {
    /// Every selected sequence accounted for exactly once
    pub fn is_consistent(&self) -> bool {
        let c = &self.conversions;
        c.total_sequences == c.successful_conversions + c.failed_conversions + c.planned_conversions
    }

    /// Log the final block
    pub fn log_summary(&self) {
        tracing::info!("{}", self.subjects.display_string());
        tracing::info!("{}", self.conversions.display_string());
    }
}
