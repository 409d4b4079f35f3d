//! Per-item failure tracking and run metadata
//!
//! Per-subject, per-sequence and per-dataset failures never abort a run.
//! They are appended to a [`FailureLedger`] that is threaded through each
//! processing step and returned with the run's results, then rendered in
//! the final summary (counts plus the first few samples per category).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Number of samples kept per category unless configured otherwise
pub const DEFAULT_SAMPLE_LIMIT: usize = 10;

/// Failure taxonomy for per-item problems
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FailureCategory {
    /// Expected subject/series directory or table file does not exist
    MissingSource,
    /// Identifier matched no dataset naming rule (classified UNKNOWN)
    UnresolvableIdentifier,
    /// Measurement table lacks a recognizable identifier column
    SchemaMismatch,
    /// Transcoder ran but produced no output artifact
    ConversionFailure,
}

impl FailureCategory {
    pub const ALL: [FailureCategory; 4] = [
        FailureCategory::MissingSource,
        FailureCategory::UnresolvableIdentifier,
        FailureCategory::SchemaMismatch,
        FailureCategory::ConversionFailure,
    ];
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureCategory::MissingSource => "MissingSource",
            FailureCategory::UnresolvableIdentifier => "UnresolvableIdentifier",
            FailureCategory::SchemaMismatch => "SchemaMismatch",
            FailureCategory::ConversionFailure => "ConversionFailure",
        };
        f.write_str(name)
    }
}

/// One recorded failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureEntry {
    /// Subject, sequence stem, dataset label or path the failure concerns
    pub item: String,
    /// Human-readable reason
    pub message: String,
}

/// Counts and first-N samples for one category
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryTally {
    pub count: usize,
    pub samples: Vec<FailureEntry>,
}

/// Append-only failure collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureLedger {
    sample_limit: usize,
    categories: BTreeMap<FailureCategory, CategoryTally>,
}

impl FailureLedger {
    pub fn new() -> Self {
        Self::with_sample_limit(DEFAULT_SAMPLE_LIMIT)
    }

    pub fn with_sample_limit(sample_limit: usize) -> Self {
        Self {
            sample_limit,
            categories: BTreeMap::new(),
        }
    }

    /// Record a failure; the count always increments, the sample is kept
    /// only while the category has fewer than `sample_limit` samples.
    pub fn record(
        &mut self,
        category: FailureCategory,
        item: impl Into<String>,
        message: impl Into<String>,
    ) {
        let tally = self.categories.entry(category).or_default();
        tally.count += 1;
        if tally.samples.len() < self.sample_limit {
            tally.samples.push(FailureEntry {
                item: item.into(),
                message: message.into(),
            });
        }
    }

    pub fn count(&self, category: FailureCategory) -> usize {
        self.categories.get(&category).map(|t| t.count).unwrap_or(0)
    }

    pub fn samples(&self, category: FailureCategory) -> &[FailureEntry] {
        self.categories
            .get(&category)
            .map(|t| t.samples.as_slice())
            .unwrap_or(&[])
    }

    pub fn total(&self) -> usize {
        self.categories.values().map(|t| t.count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Log every non-empty category with its samples
    pub fn log_summary(&self) {
        for category in FailureCategory::ALL {
            let count = self.count(category);
            if count == 0 {
                continue;
            }
            tracing::warn!(category = %category, count, "Failures recorded");
            for sample in self.samples(category) {
                tracing::warn!(category = %category, item = %sample.item, "  {}", sample.message);
            }
            if count > self.samples(category).len() {
                tracing::warn!(
                    category = %category,
                    "  ... and {} more",
                    count - self.samples(category).len()
                );
            }
        }
    }

    pub fn display_string(&self) -> String {
        if self.is_empty() {
            return "no failures".to_string();
        }
        FailureCategory::ALL
            .iter()
            .filter(|c| self.count(**c) > 0)
            .map(|c| format!("{} {}", self.count(*c), c))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Default for FailureLedger {
    fn default() -> Self {
        Self::new()
    }
}

/// Identity and timing of one tool run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Loop stopped early by the caller; completed work is retained
    pub cancelled: bool,
}

impl RunInfo {
    pub fn start() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            cancelled: false,
        }
    }

    pub fn finish(&mut self, cancelled: bool) {
        self.finished_at = Some(Utc::now());
        self.cancelled = cancelled;
    }

    pub fn elapsed_seconds(&self) -> Option<f64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds() as f64 / 1000.0)
    }
}

/// Write any serializable summary as pretty JSON, creating parent dirs
pub fn write_summary_json<T: Serialize>(value: &T, path: &std::path::Path) -> crate::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_counts_beyond_sample_limit() {
        let mut ledger = FailureLedger::with_sample_limit(2);
        for i in 0..5 {
            ledger.record(FailureCategory::ConversionFailure, format!("seq{}", i), "no output");
        }
        assert_eq!(ledger.count(FailureCategory::ConversionFailure), 5);
        assert_eq!(ledger.samples(FailureCategory::ConversionFailure).len(), 2);
        assert_eq!(ledger.samples(FailureCategory::ConversionFailure)[0].item, "seq0");
        assert_eq!(ledger.count(FailureCategory::MissingSource), 0);
    }

    #[test]
    fn test_display_string() {
        let mut ledger = FailureLedger::new();
        assert_eq!(ledger.display_string(), "no failures");
        ledger.record(FailureCategory::UnresolvableIdentifier, "xyz", "no rule");
        assert_eq!(ledger.display_string(), "1 UnresolvableIdentifier");
    }

    #[test]
    fn test_run_info_finish() {
        let mut info = RunInfo::start();
        assert!(info.elapsed_seconds().is_none());
        info.finish(true);
        assert!(info.cancelled);
        assert!(info.elapsed_seconds().unwrap() >= 0.0);
    }
}
