//! Sequence selection for one subject
//!
//! **Algorithm:**
//! 1. Enumerate series directories; classify each label; keep INCLUDE only
//! 2. Per series, enumerate timestamp directories; derive the session key;
//!    resolve the container; count images; drop zero-file candidates
//! 3. Rank every surviving candidate
//! 4. Group by session key; emit every candidate at the session's minimum
//!    rank, numbering runs 1..N in discovery order only when N > 1

use crate::models::{CandidateSequence, SelectedSequence, SubjectSelection};
use crate::rules::{derive_session_key, Classification, PatternClassifier, PriorityRanker};
use crate::services::tree_scanner::TreeScanner;
use nhx_common::{FailureCategory, FailureLedger};
use std::collections::BTreeMap;
use std::path::Path;

/// Composes classifier, ranker, session grouping and tree scanning
#[derive(Debug, Clone, Default)]
pub struct SequenceSelector {
    classifier: PatternClassifier,
    ranker: PriorityRanker,
    scanner: TreeScanner,
}

impl SequenceSelector {
    pub fn new(classifier: PatternClassifier, ranker: PriorityRanker, scanner: TreeScanner) -> Self {
        Self {
            classifier,
            ranker,
            scanner,
        }
    }

    /// Discover, rank and select sequences for one subject
    ///
    /// An absent subject directory yields an empty selection and a
    /// MissingSource ledger entry.
    pub fn select(
        &self,
        subject_id: &str,
        subject_root: &Path,
        ledger: &mut FailureLedger,
    ) -> SubjectSelection {
        let candidates = self.discover(subject_id, subject_root, ledger);
        let candidates_found = candidates.len();
        let selected = select_best(candidates);

        tracing::debug!(
            subject = %subject_id,
            candidates = candidates_found,
            selected = selected.len(),
            "Sequence selection complete"
        );

        SubjectSelection {
            subject_id: subject_id.to_string(),
            candidates_found,
            selected,
        }
    }

    /// Steps 1-3: candidates in discovery order, ranked
    pub fn discover(
        &self,
        subject_id: &str,
        subject_root: &Path,
        ledger: &mut FailureLedger,
    ) -> Vec<CandidateSequence> {
        if !subject_root.is_dir() {
            tracing::warn!(
                subject = %subject_id,
                path = %subject_root.display(),
                "Subject directory not found"
            );
            ledger.record(
                FailureCategory::MissingSource,
                subject_id,
                format!("subject directory not found: {}", subject_root.display()),
            );
            return Vec::new();
        }

        let series_dirs = match self.scanner.list_dirs(subject_root) {
            Ok(dirs) => dirs,
            Err(e) => {
                tracing::warn!(subject = %subject_id, "Cannot list series: {}", e);
                ledger.record(FailureCategory::MissingSource, subject_id, e.to_string());
                return Vec::new();
            }
        };

        let mut candidates = Vec::new();
        for series_dir in series_dirs {
            let label = dir_name(&series_dir);
            match self.classifier.classify(&label) {
                Classification::Include => {}
                other => {
                    tracing::trace!(subject = %subject_id, series = %label, ?other, "Series skipped");
                    continue;
                }
            }

            let timestamp_dirs = match self.scanner.list_dirs(&series_dir) {
                Ok(dirs) => dirs,
                Err(e) => {
                    tracing::warn!(subject = %subject_id, series = %label, "Cannot list sessions: {}", e);
                    continue;
                }
            };

            for timestamp_dir in timestamp_dirs {
                if let Some(candidate) = self.candidate_for(subject_id, &label, &timestamp_dir) {
                    candidates.push(candidate);
                }
            }
        }

        candidates
    }

    /// Build a ranked candidate for one timestamp directory, if it has images
    fn candidate_for(
        &self,
        subject_id: &str,
        label: &str,
        timestamp_dir: &Path,
    ) -> Option<CandidateSequence> {
        let timestamp = dir_name(timestamp_dir);

        let container = match self.scanner.resolve_container(timestamp_dir) {
            Ok(Some(container)) => container,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(subject = %subject_id, series = %label, "Cannot resolve container: {}", e);
                return None;
            }
        };

        let file_count = match self.scanner.count_images(&container) {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(subject = %subject_id, series = %label, "Cannot count images: {}", e);
                return None;
            }
        };
        if file_count == 0 {
            return None;
        }

        Some(CandidateSequence {
            subject_id: subject_id.to_string(),
            series_label: label.to_string(),
            session_key: derive_session_key(&timestamp),
            timestamp,
            container,
            file_count,
            rank: self.ranker.rank(label),
        })
    }
}

/// Step 4: per-session minimum-rank selection with tie-only run numbering
///
/// Input order is discovery order; sessions come out sorted by key and
/// candidates within a session keep their relative input order.
pub fn select_best(candidates: Vec<CandidateSequence>) -> Vec<SelectedSequence> {
    let mut sessions: BTreeMap<String, Vec<CandidateSequence>> = BTreeMap::new();
    for candidate in candidates.into_iter().filter(|c| c.file_count > 0) {
        sessions
            .entry(candidate.session_key.clone())
            .or_default()
            .push(candidate);
    }

    let mut selected = Vec::new();
    for (_, group) in sessions {
        let Some(best) = group.iter().map(|c| c.rank).min() else {
            continue;
        };
        let winners: Vec<CandidateSequence> =
            group.into_iter().filter(|c| c.rank == best).collect();
        let tied = winners.len() > 1;

        for (idx, candidate) in winners.into_iter().enumerate() {
            selected.push(SelectedSequence {
                candidate,
                run: tied.then_some(idx as u32 + 1),
            });
        }
    }
    selected
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}
