//! Subject loop: select per subject, then hand each selection to the
//! transcoder
//!
//! Each sequence is attempted exactly once. A failed conversion is recorded
//! and counted; the loop continues. Cancellation is checked between
//! subjects, and everything finished before it is kept.

use crate::models::SubjectSelection;
use crate::services::sequence_selector::SequenceSelector;
use crate::services::statistics::ConversionStatistics;
use crate::services::transcoder::{ConversionRequest, Transcoder};
use nhx_common::ledger::{write_summary_json, RunInfo};
use nhx_common::{FailureCategory, FailureLedger};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// File name of the run summary inside the output root
pub const SUMMARY_FILE_NAME: &str = "conversion_statistics.json";

/// Result of handing one selection to the transcoder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ConversionStatus {
    Converted {
        image: PathBuf,
        sidecar: Option<PathBuf>,
    },
    Failed {
        reason: String,
    },
    /// Dry run: selection reported, nothing invoked
    Planned,
}

/// One selection and what happened to it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutcome {
    pub subject_id: String,
    pub session_key: String,
    pub series_label: String,
    pub run: Option<u32>,
    pub stem: String,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    #[serde(flatten)]
    pub status: ConversionStatus,
}

/// Everything a conversion run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionRun {
    #[serde(flatten)]
    pub info: RunInfo,
    pub transcoder: Option<String>,
    pub statistics: ConversionStatistics,
    pub failures: FailureLedger,
    pub outcomes: Vec<ConversionOutcome>,
}

impl ConversionRun {
    pub fn write_summary(&self, output_root: &Path) -> nhx_common::Result<PathBuf> {
        let path = output_root.join(SUMMARY_FILE_NAME);
        write_summary_json(self, &path)?;
        Ok(path)
    }

    pub fn log_summary(&self) {
        tracing::info!("{}", "=".repeat(80));
        tracing::info!(
            run_id = %self.info.run_id,
            elapsed_seconds = self.info.elapsed_seconds(),
            "CONVERSION COMPLETE - STATISTICS"
        );
        self.statistics.log_summary();
        if self.info.cancelled {
            tracing::warn!("Run cancelled before all subjects were processed");
        }
        self.failures.log_summary();
        tracing::info!("{}", "=".repeat(80));
    }
}

/// True when the id names a single directory under the source root
pub fn is_plain_subject_id(subject_id: &str) -> bool {
    !subject_id.is_empty()
        && !subject_id.contains(|c: char| c == '/' || c == '\\')
        && !subject_id.contains("..")
        && Path::new(subject_id).is_relative()
}

/// `{output_root}/sub-{id}/ses-{key}/anat`
pub fn anat_dir(output_root: &Path, subject_id: &str, session_key: &str) -> PathBuf {
    output_root
        .join(format!("sub-{}", subject_id))
        .join(format!("ses-{}", session_key))
        .join("anat")
}

/// Drives selection and conversion across a subject list
pub struct ConversionRunner<'a> {
    selector: &'a SequenceSelector,
    transcoder: Option<&'a dyn Transcoder>,
    output_root: PathBuf,
    threads: usize,
}

impl<'a> ConversionRunner<'a> {
    /// `transcoder = None` runs selection only (dry run)
    pub fn new(
        selector: &'a SequenceSelector,
        transcoder: Option<&'a dyn Transcoder>,
        output_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            selector,
            transcoder,
            output_root: output_root.into(),
            threads: 1,
        }
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    /// Process every subject under `source_root`
    ///
    /// Starts from the ledger handed in (cohort loading may already have
    /// recorded failures) and returns it inside the run.
    pub fn run(
        &self,
        subjects: &[String],
        source_root: &Path,
        mut ledger: FailureLedger,
        cancel: &CancellationToken,
    ) -> ConversionRun {
        let mut info = RunInfo::start();
        let mut statistics = ConversionStatistics::default();
        let mut outcomes = Vec::new();
        statistics.subjects.total_subjects = subjects.len();

        tracing::info!(
            run_id = %info.run_id,
            subjects = subjects.len(),
            dry_run = self.transcoder.is_none(),
            "Processing subjects"
        );

        let mut cancelled = false;
        for (i, subject_id) in subjects.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::warn!(processed = i, remaining = subjects.len() - i, "Cancellation requested");
                cancelled = true;
                break;
            }

            if !is_plain_subject_id(subject_id) {
                tracing::warn!(subject = %subject_id, "Subject id is not a plain directory name");
                ledger.record(
                    FailureCategory::MissingSource,
                    subject_id,
                    "subject id is not a plain directory name",
                );
                statistics.subjects.subjects_without_images += 1;
                continue;
            }

            let selection = self
                .selector
                .select(subject_id, &source_root.join(subject_id), &mut ledger);

            if selection.is_empty() {
                statistics.subjects.subjects_without_images += 1;
                tracing::debug!(subject = %subject_id, "No structural sequences found");
                continue;
            }
            statistics.subjects.subjects_with_images += 1;
            statistics.conversions.total_sequences += selection.selected.len();
            statistics.conversions.total_sessions += selection.session_count();

            self.convert_selection(&selection, &mut statistics, &mut outcomes, &mut ledger);
        }

        info.finish(cancelled);
        ConversionRun {
            info,
            transcoder: self.transcoder.map(|t| t.name().to_string()),
            statistics,
            failures: ledger,
            outcomes,
        }
    }

    fn convert_selection(
        &self,
        selection: &SubjectSelection,
        statistics: &mut ConversionStatistics,
        outcomes: &mut Vec<ConversionOutcome>,
        ledger: &mut FailureLedger,
    ) {
        for selected in &selection.selected {
            let candidate = &selected.candidate;
            let stem = selected.output_stem();
            let request = ConversionRequest {
                input_dir: candidate.container.clone(),
                output_dir: anat_dir(&self.output_root, &candidate.subject_id, &candidate.session_key),
                stem: stem.clone(),
                threads: self.threads,
            };

            let status = match self.transcoder {
                None => {
                    statistics.conversions.planned_conversions += 1;
                    ConversionStatus::Planned
                }
                Some(transcoder) => match transcoder.transcode(&request) {
                    Ok(report) => {
                        statistics.conversions.successful_conversions += 1;
                        tracing::info!(stem = %stem, "✓ Converted");
                        ConversionStatus::Converted {
                            image: report.image,
                            sidecar: report.sidecar,
                        }
                    }
                    Err(e) => {
                        statistics.conversions.failed_conversions += 1;
                        tracing::error!(stem = %stem, "✗ Conversion failed: {}", e);
                        ledger.record(FailureCategory::ConversionFailure, &stem, e.to_string());
                        ConversionStatus::Failed {
                            reason: e.to_string(),
                        }
                    }
                },
            };

            outcomes.push(ConversionOutcome {
                subject_id: candidate.subject_id.clone(),
                session_key: candidate.session_key.clone(),
                series_label: candidate.series_label.clone(),
                run: selected.run,
                stem,
                input_dir: request.input_dir,
                output_dir: request.output_dir,
                status,
            });
        }
    }
}
