//! End-to-end selection and conversion over throwaway acquisition trees

use nhx_common::{FailureCategory, FailureLedger};
use nhx_select::services::cohort::{
    subjects_from_table, subjects_from_tree, CohortConfig, ColumnMatch, RequirementGroup,
};
use nhx_select::services::{
    ConversionError, ConversionReport, ConversionRequest, ConversionRunner, ConversionStatus,
    SequenceSelector, Transcoder, TreeScanner,
};
use std::cell::RefCell;
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Writes `{stem}.nii.gz` unless the stem is listed as failing
struct FakeTranscoder {
    failing: Vec<String>,
    cancel_after_first: Option<CancellationToken>,
    calls: RefCell<Vec<String>>,
}

impl FakeTranscoder {
    fn new() -> Self {
        Self {
            failing: Vec::new(),
            cancel_after_first: None,
            calls: RefCell::new(Vec::new()),
        }
    }
}

impl Transcoder for FakeTranscoder {
    fn name(&self) -> &str {
        "fake"
    }

    fn transcode(&self, request: &ConversionRequest) -> Result<ConversionReport, ConversionError> {
        self.calls.borrow_mut().push(request.stem.clone());
        if let Some(token) = &self.cancel_after_first {
            token.cancel();
        }
        if self.failing.contains(&request.stem) {
            return Err(ConversionError::NoOutput {
                stem: request.stem.clone(),
            });
        }
        fs::create_dir_all(&request.output_dir)?;
        let image = request.output_dir.join(format!("{}.nii.gz", request.stem));
        fs::write(&image, b"nifti")?;
        Ok(ConversionReport {
            image,
            sidecar: None,
        })
    }
}

fn add_series(root: &Path, subject: &str, series: &str, timestamp: &str, files: usize) {
    let container = root.join(subject).join(series).join(timestamp).join("I0001");
    fs::create_dir_all(&container).unwrap();
    for i in 0..files {
        fs::write(container.join(format!("{:04}.dcm", i)), b"dicom").unwrap();
    }
}

/// 3001: two tied MPRAGE-class series plus a worse FSPGR in one session,
/// a lone FSPGR in a second session, plus excluded/unclassified series.
/// 3002: an included series with an empty timestamp directory.
fn build_tree() -> TempDir {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("source");
    add_series(&src, "3001", "MPRAGE", "2011-04-05_10_00_00.0", 3);
    add_series(&src, "3001", "SAG_3D_MPRAGE", "2011-04-05_10_20_00.0", 3);
    add_series(&src, "3001", "FSPGR", "2011-04-05_10_40_00.0", 3);
    add_series(&src, "3001", "Localizer", "2011-04-05_09_50_00.0", 3);
    add_series(&src, "3001", "AX_T2", "2011-04-05_11_00_00.0", 3);
    add_series(&src, "3001", "FSPGR", "2012-06-01_08_00_00.0", 2);
    fs::create_dir_all(src.join("3002/MPRAGE/2011-05-01_10_00_00.0")).unwrap();
    dir
}

fn stems(transcoder: &FakeTranscoder) -> Vec<String> {
    transcoder.calls.borrow().clone()
}

#[test]
fn test_tied_best_series_get_run_numbers() {
    let tree = build_tree();
    let src = tree.path().join("source");
    let out = tree.path().join("bids");

    let subjects = subjects_from_tree(&TreeScanner::new(), &src).unwrap();
    assert_eq!(subjects, vec!["3001", "3002"]);

    let selector = SequenceSelector::default();
    let transcoder = FakeTranscoder::new();
    let run = ConversionRunner::new(&selector, Some(&transcoder), &out).run(
        &subjects,
        &src,
        FailureLedger::new(),
        &CancellationToken::new(),
    );

    assert_eq!(
        stems(&transcoder),
        vec![
            "sub-3001_ses-20110405_run-01_T1w",
            "sub-3001_ses-20110405_run-02_T1w",
            "sub-3001_ses-20120601_T1w",
        ]
    );
    assert!(out
        .join("sub-3001/ses-20110405/anat/sub-3001_ses-20110405_run-01_T1w.nii.gz")
        .exists());
    assert!(out
        .join("sub-3001/ses-20120601/anat/sub-3001_ses-20120601_T1w.nii.gz")
        .exists());
    assert!(!out.join("sub-3002").exists());

    // FSPGR in the first session is outranked and never converted
    assert!(run
        .outcomes
        .iter()
        .all(|o| !(o.session_key == "20110405" && o.series_label == "FSPGR")));

    let stats = &run.statistics;
    assert_eq!(stats.subjects.total_subjects, 2);
    assert_eq!(stats.subjects.subjects_with_images, 1);
    assert_eq!(stats.subjects.subjects_without_images, 1);
    assert_eq!(stats.conversions.total_sessions, 2);
    assert_eq!(stats.conversions.total_sequences, 3);
    assert_eq!(stats.conversions.successful_conversions, 3);
    assert_eq!(stats.conversions.failed_conversions, 0);
    assert!(stats.is_consistent());
    assert!(run.failures.is_empty());
    assert!(!run.info.cancelled);
}

#[test]
fn test_failed_conversion_is_recorded_and_run_continues() {
    let tree = build_tree();
    let src = tree.path().join("source");
    let out = tree.path().join("bids");

    let selector = SequenceSelector::default();
    let mut transcoder = FakeTranscoder::new();
    transcoder.failing = vec!["sub-3001_ses-20110405_run-02_T1w".to_string()];

    let subjects = vec!["3001".to_string()];
    let run = ConversionRunner::new(&selector, Some(&transcoder), &out).run(
        &subjects,
        &src,
        FailureLedger::new(),
        &CancellationToken::new(),
    );

    assert_eq!(stems(&transcoder).len(), 3);
    assert_eq!(run.statistics.conversions.successful_conversions, 2);
    assert_eq!(run.statistics.conversions.failed_conversions, 1);
    assert!(run.statistics.is_consistent());
    assert_eq!(run.failures.count(FailureCategory::ConversionFailure), 1);
    assert_eq!(
        run.failures.samples(FailureCategory::ConversionFailure)[0].item,
        "sub-3001_ses-20110405_run-02_T1w"
    );

    let failed: Vec<_> = run
        .outcomes
        .iter()
        .filter(|o| matches!(o.status, ConversionStatus::Failed { .. }))
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].run, Some(2));
}

#[test]
fn test_dry_run_converts_nothing() {
    let tree = build_tree();
    let src = tree.path().join("source");
    let out = tree.path().join("bids");

    let selector = SequenceSelector::default();
    let subjects = vec!["3001".to_string()];
    let run = ConversionRunner::new(&selector, None, &out).run(
        &subjects,
        &src,
        FailureLedger::new(),
        &CancellationToken::new(),
    );

    assert_eq!(run.outcomes.len(), 3);
    assert!(run
        .outcomes
        .iter()
        .all(|o| o.status == ConversionStatus::Planned));
    assert_eq!(run.statistics.conversions.planned_conversions, 3);
    assert!(run.transcoder.is_none());
    assert!(!out.exists());
}

#[test]
fn test_cancellation_keeps_finished_work() {
    let tree = build_tree();
    let src = tree.path().join("source");
    let out = tree.path().join("bids");

    let token = CancellationToken::new();
    let selector = SequenceSelector::default();
    let mut transcoder = FakeTranscoder::new();
    transcoder.cancel_after_first = Some(token.clone());

    let subjects = vec!["3001".to_string(), "3002".to_string()];
    let run = ConversionRunner::new(&selector, Some(&transcoder), &out).run(
        &subjects,
        &src,
        FailureLedger::new(),
        &token,
    );

    // The subject in progress completes; the next one is never started
    assert!(run.info.cancelled);
    assert_eq!(run.statistics.conversions.successful_conversions, 3);
    assert_eq!(run.statistics.subjects.subjects_with_images, 1);
    assert_eq!(run.statistics.subjects.subjects_without_images, 0);
}

#[test]
fn test_cohort_subject_without_directory() {
    let tree = build_tree();
    let src = tree.path().join("source");
    let table = tree.path().join("participants.csv");
    fs::write(&table, "PATNO,COHORT\n3001,2\n3003,2\n3002,1\n").unwrap();

    let cohort = CohortConfig {
        table,
        id_column: "PATNO".to_string(),
        require: vec![RequirementGroup {
            any_of: vec![ColumnMatch {
                column: "COHORT".to_string(),
                values: vec!["2".to_string()],
            }],
        }],
    };
    let subjects = subjects_from_table(&cohort).unwrap();
    assert_eq!(subjects, vec!["3001", "3003"]);

    let selector = SequenceSelector::default();
    let run = ConversionRunner::new(&selector, None, tree.path().join("bids")).run(
        &subjects,
        &src,
        FailureLedger::new(),
        &CancellationToken::new(),
    );
    assert_eq!(run.failures.count(FailureCategory::MissingSource), 1);
    assert_eq!(run.failures.samples(FailureCategory::MissingSource)[0].item, "3003");
    assert_eq!(run.statistics.subjects.subjects_without_images, 1);
}

#[test]
fn test_subject_id_outside_source_root_is_rejected() {
    let tree = build_tree();
    let src = tree.path().join("source");
    let out = tree.path().join("bids");
    add_series(tree.path(), "escaped", "MPRAGE", "2011-04-05_10_00_00.0", 3);

    let selector = SequenceSelector::default();
    let transcoder = FakeTranscoder::new();
    let subjects = vec!["../escaped".to_string(), "3001".to_string()];
    let run = ConversionRunner::new(&selector, Some(&transcoder), &out).run(
        &subjects,
        &src,
        FailureLedger::new(),
        &CancellationToken::new(),
    );

    assert_eq!(run.failures.count(FailureCategory::MissingSource), 1);
    assert_eq!(run.failures.samples(FailureCategory::MissingSource)[0].item, "../escaped");
    assert_eq!(run.statistics.subjects.subjects_without_images, 1);
    assert!(stems(&transcoder).iter().all(|s| !s.contains("escaped")));
    assert!(run.outcomes.iter().all(|o| o.subject_id == "3001"));
    assert!(!tree.path().join("sub-..").exists());
}

#[test]
fn test_summary_json_written() {
    let tree = build_tree();
    let src = tree.path().join("source");
    let out = tree.path().join("bids");

    let selector = SequenceSelector::default();
    let transcoder = FakeTranscoder::new();
    let run = ConversionRunner::new(&selector, Some(&transcoder), &out).run(
        &["3001".to_string()],
        &src,
        FailureLedger::new(),
        &CancellationToken::new(),
    );
    let path = run.write_summary(&out).unwrap();
    assert_eq!(path, out.join("conversion_statistics.json"));

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert!(json.get("run_id").is_some());
    assert_eq!(json["cancelled"], serde_json::Value::Bool(false));
    assert_eq!(json["transcoder"], "fake");
    assert_eq!(json["statistics"]["conversions"]["successful_conversions"], 3);
    assert_eq!(json["outcomes"][0]["status"], "converted");
}
