//! Candidate and selected scan series
//!
//! Both are immutable snapshots built during one run and never persisted
//! beyond the run summary.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One discovered scan series for one subject and one timestamp directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSequence {
    /// Opaque subject key (directory name under the source root)
    pub subject_id: String,
    /// Raw series label (series directory name)
    pub series_label: String,
    /// Raw acquisition timestamp (timestamp directory name)
    pub timestamp: String,
    /// Derived 8-character session key
    pub session_key: String,
    /// Directory holding the image files
    pub container: PathBuf,
    /// Image files counted in `container`
    pub file_count: usize,
    /// Priority rank, lower is preferred
    pub rank: usize,
}

/// A candidate chosen for conversion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedSequence {
    #[serde(flatten)]
    pub candidate: CandidateSequence,
    /// `None` unless several candidates tie for the best rank in a session
    pub run: Option<u32>,
}

impl SelectedSequence {
    /// Canonical output stem for this selection
    pub fn output_stem(&self) -> String {
        canonical_stem(
            &self.candidate.subject_id,
            &self.candidate.session_key,
            self.run,
        )
    }
}

/// `sub-{subject}_ses-{session}[_run-{run:02}]_T1w`
pub fn canonical_stem(subject_id: &str, session_key: &str, run: Option<u32>) -> String {
    match run {
        Some(run) => format!("sub-{}_ses-{}_run-{:02}_T1w", subject_id, session_key, run),
        None => format!("sub-{}_ses-{}_T1w", subject_id, session_key),
    }
}

/// All selections made for one subject
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubjectSelection {
    pub subject_id: String,
    /// Candidates that survived classification and the zero-file check
    pub candidates_found: usize,
    pub selected: Vec<SelectedSequence>,
}

impl SubjectSelection {
    pub fn session_count(&self) -> usize {
        let mut keys: Vec<&str> = self
            .selected
            .iter()
            .map(|s| s.candidate.session_key.as_str())
            .collect();
        keys.sort_unstable();
        keys.dedup();
        keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_stem() {
        assert_eq!(canonical_stem("3001", "20110405", None), "sub-3001_ses-20110405_T1w");
        assert_eq!(
            canonical_stem("3001", "20110405", Some(2)),
            "sub-3001_ses-20110405_run-02_T1w"
        );
        assert_eq!(
            canonical_stem("3001", "20110405", Some(12)),
            "sub-3001_ses-20110405_run-12_T1w"
        );
    }
}
