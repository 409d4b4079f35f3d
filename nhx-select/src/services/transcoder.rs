//! Image format conversion collaborator
//!
//! Pixel decoding and re-encoding is done by an external tool. This module
//! defines the seam ([`Transcoder`]) and the adapter for `dcm2niix`, which
//! writes `{stem}.nii.gz` plus a `{stem}.json` sidecar into the output
//! directory.
//!
//! A tool that exits cleanly but leaves no image behind is a conversion
//! failure; success is judged by the artifact, not the exit status.

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::debug;

/// Conversion errors
#[derive(Debug, Error)]
pub enum ConversionError {
    /// Conversion tool is not installed or not runnable
    #[error("Transcoder not available: {0}")]
    NotAvailable(String),

    /// Tool exited with failure status
    #[error("Transcoder failed (status {status}): {stderr}")]
    Failed { status: String, stderr: String },

    /// Tool ran but produced no output artifact
    #[error("No output produced for {stem}")]
    NoOutput { stem: String },

    /// Output directory could not be prepared
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One conversion to perform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionRequest {
    /// Directory containing the raw image files
    pub input_dir: PathBuf,
    /// Directory receiving the converted artifacts
    pub output_dir: PathBuf,
    /// Output file stem (no extension)
    pub stem: String,
    /// Worker-thread hint, passed through opaquely
    pub threads: usize,
}

/// Artifacts produced by a successful conversion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionReport {
    pub image: PathBuf,
    pub sidecar: Option<PathBuf>,
}

/// Converts a directory of raw images into one volumetric image
pub trait Transcoder {
    /// Tool name for logs and summaries
    fn name(&self) -> &str;

    fn transcode(&self, request: &ConversionRequest) -> Result<ConversionReport, ConversionError>;
}

/// Adapter for the external `dcm2niix` converter
#[derive(Debug)]
pub struct Dcm2niixTranscoder {
    binary: PathBuf,
    compress: bool,
    available: OnceCell<bool>,
}

impl Dcm2niixTranscoder {
    pub fn new(binary: impl Into<PathBuf>, compress: bool) -> Self {
        Self {
            binary: binary.into(),
            compress,
            available: OnceCell::new(),
        }
    }

    /// Check the converter can be launched
    ///
    /// Caches result for subsequent calls.
    pub fn is_available(&self) -> bool {
        *self.available.get_or_init(|| {
            let available = Command::new(&self.binary)
                .arg("-h")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .is_ok();
            debug!(
                command = %self.binary.display(),
                available,
                "dcm2niix availability check"
            );
            available
        })
    }

    /// Expected image path for a stem
    pub fn image_path(&self, output_dir: &Path, stem: &str) -> PathBuf {
        let ext = if self.compress { "nii.gz" } else { "nii" };
        output_dir.join(format!("{}.{}", stem, ext))
    }

    fn build_command(&self, request: &ConversionRequest) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-o")
            .arg(&request.output_dir)
            .arg("-f")
            .arg(&request.stem)
            .arg("-z")
            .arg(if self.compress { "y" } else { "n" })
            .arg("-b")
            .arg("y")
            .arg("-ba")
            .arg("n")
            .arg("-v")
            .arg("0")
            .arg(&request.input_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

impl Default for Dcm2niixTranscoder {
    fn default() -> Self {
        Self::new("dcm2niix", true)
    }
}

impl Transcoder for Dcm2niixTranscoder {
    fn name(&self) -> &str {
        "dcm2niix"
    }

    fn transcode(&self, request: &ConversionRequest) -> Result<ConversionReport, ConversionError> {
        if !self.is_available() {
            return Err(ConversionError::NotAvailable(format!(
                "cannot launch {}",
                self.binary.display()
            )));
        }

        std::fs::create_dir_all(&request.output_dir)?;

        debug!(
            stem = %request.stem,
            input = %request.input_dir.display(),
            threads = request.threads,
            "Running dcm2niix"
        );

        let output = self
            .build_command(request)
            .output()
            .map_err(|e| ConversionError::NotAvailable(format!("Failed to execute dcm2niix: {}", e)))?;

        if !output.status.success() {
            return Err(ConversionError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let image = self.image_path(&request.output_dir, &request.stem);
        if !image.exists() {
            debug!(
                stem = %request.stem,
                stdout = %String::from_utf8_lossy(&output.stdout).trim(),
                "dcm2niix produced no image"
            );
            return Err(ConversionError::NoOutput {
                stem: request.stem.clone(),
            });
        }

        let sidecar = request.output_dir.join(format!("{}.json", request.stem));
        Ok(ConversionReport {
            image,
            sidecar: sidecar.exists().then_some(sidecar),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ConversionRequest {
        ConversionRequest {
            input_dir: PathBuf::from("/raw/3001/MPRAGE/2011-04-05/I1"),
            output_dir: PathBuf::from("/out/sub-3001/ses-20110405/anat"),
            stem: "sub-3001_ses-20110405_T1w".to_string(),
            threads: 4,
        }
    }

    #[test]
    fn test_command_arguments() {
        let t = Dcm2niixTranscoder::default();
        let cmd = t.build_command(&request());
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert_eq!(
            args,
            vec![
                "-o",
                "/out/sub-3001/ses-20110405/anat",
                "-f",
                "sub-3001_ses-20110405_T1w",
                "-z",
                "y",
                "-b",
                "y",
                "-ba",
                "n",
                "-v",
                "0",
                "/raw/3001/MPRAGE/2011-04-05/I1",
            ]
        );
    }

    #[test]
    fn test_image_path_follows_compression() {
        let dir = Path::new("/out");
        assert_eq!(
            Dcm2niixTranscoder::new("dcm2niix", true).image_path(dir, "s"),
            PathBuf::from("/out/s.nii.gz")
        );
        assert_eq!(
            Dcm2niixTranscoder::new("dcm2niix", false).image_path(dir, "s"),
            PathBuf::from("/out/s.nii")
        );
    }

    #[test]
    fn test_missing_binary_not_available() {
        let t = Dcm2niixTranscoder::new("/nonexistent/bin/dcm2niix", true);
        assert!(!t.is_available());
        match t.transcode(&request()) {
            Err(ConversionError::NotAvailable(_)) => {}
            other => panic!("Expected NotAvailable, got {:?}", other),
        }
    }
}
