//! Segmentation manifest builder
//!
//! Walks standardized dataset roots (`{root}/sub-*/[ses-*/]anat/*_T1w.nii.gz`)
//! and lists one structural image per subject for downstream segmentation.
//!
//! **Layout detection:** a subject with `ses-*` directories is longitudinal
//! and uses the first session (sorted); otherwise the subject's own `anat/`
//! is used. Within `anat/` the first `*_T1w.nii.gz` (sorted) wins.

use crate::services::tree_scanner::TreeScanner;
use nhx_common::{Error, FailureCategory, FailureLedger, Result, Table};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Columns of the written manifest, in order
pub const MANIFEST_COLUMNS: [&str; 5] =
    ["subject_id", "input_image", "output_dir", "num_threads", "dataset"];

const T1W_SUFFIX: &str = "_T1w.nii.gz";

/// One standardized dataset root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRoot {
    pub dataset: String,
    pub path: PathBuf,
}

/// One manifest row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub subject_id: String,
    pub input_image: PathBuf,
    pub output_dir: PathBuf,
    pub num_threads: usize,
    pub dataset: String,
}

/// Manifest rows in root order, then subject order
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn to_table(&self) -> Result<Table> {
        let mut table = Table::new(MANIFEST_COLUMNS.iter().map(|c| c.to_string()).collect());
        for e in &self.entries {
            table.push_row(vec![
                e.subject_id.clone(),
                e.input_image.display().to_string(),
                e.output_dir.display().to_string(),
                e.num_threads.to_string(),
                e.dataset.clone(),
            ])?;
        }
        Ok(table)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        self.to_table()?.write(path)
    }

    /// Entry count for one dataset label
    pub fn count_for(&self, dataset: &str) -> usize {
        self.entries.iter().filter(|e| e.dataset == dataset).count()
    }
}

/// Builds manifests from standardized roots
#[derive(Debug, Clone)]
pub struct ManifestBuilder {
    scanner: TreeScanner,
    threads: usize,
}

impl ManifestBuilder {
    pub fn new(threads: usize) -> Self {
        Self {
            scanner: TreeScanner::new(),
            threads: threads.max(1),
        }
    }

    /// Scan every root; a missing root is a configuration error
    pub fn build(&self, roots: &[ManifestRoot], ledger: &mut FailureLedger) -> Result<Manifest> {
        let mut manifest = Manifest::default();
        for root in roots {
            if !root.path.is_dir() {
                return Err(Error::Config(format!(
                    "Manifest root for {} not found: {}",
                    root.dataset,
                    root.path.display()
                )));
            }
            let before = manifest.entries.len();
            self.scan_root(root, &mut manifest, ledger)?;
            tracing::info!(
                dataset = %root.dataset,
                subjects = manifest.entries.len() - before,
                "Manifest root scanned"
            );
        }
        Ok(manifest)
    }

    fn scan_root(
        &self,
        root: &ManifestRoot,
        manifest: &mut Manifest,
        ledger: &mut FailureLedger,
    ) -> Result<()> {
        let subject_dirs = self
            .scanner
            .list_dirs(&root.path)
            .map_err(|e| Error::Config(e.to_string()))?;
        let output_dir = root.path.join("derivatives").join("synthseg");

        for subject_dir in subject_dirs {
            let subject_id = file_name(&subject_dir);
            if !subject_id.starts_with("sub-") {
                continue;
            }
            match self.first_t1w(&subject_dir) {
                Some(image) => manifest.entries.push(ManifestEntry {
                    subject_id,
                    input_image: image,
                    output_dir: output_dir.clone(),
                    num_threads: self.threads,
                    dataset: root.dataset.clone(),
                }),
                None => {
                    tracing::debug!(dataset = %root.dataset, subject = %subject_id, "No T1w image");
                    ledger.record(
                        FailureCategory::MissingSource,
                        format!("{}/{}", root.dataset, subject_id),
                        "no T1w image found",
                    );
                }
            }
        }
        Ok(())
    }

    /// First T1w image of the subject's first session (or of the subject)
    pub fn first_t1w(&self, subject_dir: &Path) -> Option<PathBuf> {
        let sessions: Vec<PathBuf> = self
            .scanner
            .list_dirs(subject_dir)
            .ok()?
            .into_iter()
            .filter(|d| file_name(d).starts_with("ses-"))
            .collect();

        let anat = match sessions.first() {
            Some(session) => session.join("anat"),
            None => subject_dir.join("anat"),
        };
        if !anat.is_dir() {
            return None;
        }

        let mut images: Vec<PathBuf> = std::fs::read_dir(&anat)
            .ok()?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && file_name(p).ends_with(T1W_SUFFIX))
            .collect();
        images.sort();
        images.into_iter().next()
    }
}

impl Default for ManifestBuilder {
    fn default() -> Self {
        Self::new(4)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}
