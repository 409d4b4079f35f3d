//! Acquisition tree scanner
//!
//! Enumerates one level of a subject's acquisition tree at a time:
//! `{subject}/{series}/{timestamp}/{container}/{image files}`.
//!
//! Every listing is sorted by file name so that discovery order, and with it
//! run numbering, is identical across platforms and filesystems.

use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

/// Acquisition tree scanner errors
#[derive(Debug, Error)]
pub enum ScanError {
    /// Specified path does not exist
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// Path exists but is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Cannot access an entry
    #[error("File access error {0}: {1}")]
    FileAccessError(PathBuf, String),
}

/// Acquisition tree scanner
#[derive(Debug, Clone)]
pub struct TreeScanner {
    ignore_patterns: Vec<String>,
    image_extensions: Vec<String>,
}

impl TreeScanner {
    /// Create new scanner with default ignore patterns
    ///
    /// Ignores OS litter like .DS_Store and Thumbs.db as well as any other
    /// hidden entry. Every remaining regular file counts as an image.
    pub fn new() -> Self {
        Self {
            ignore_patterns: vec![".DS_Store".to_string(), "Thumbs.db".to_string()],
            image_extensions: Vec::new(),
        }
    }

    /// Restrict counted image files to these extensions (case-insensitive)
    pub fn with_image_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.image_extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        self
    }

    /// Immediate subdirectories of `dir`, sorted by name
    pub fn list_dirs(&self, dir: &Path) -> Result<Vec<PathBuf>, ScanError> {
        Ok(self
            .list_entries(dir)?
            .into_iter()
            .filter(|e| e.file_type().is_dir())
            .map(|e| e.into_path())
            .collect())
    }

    /// Directory holding a timestamp's image files
    ///
    /// - no entries: `None` (skipped)
    /// - exactly one entry and it is a directory: that directory
    /// - otherwise (flat layout): the timestamp directory itself
    pub fn resolve_container(&self, timestamp_dir: &Path) -> Result<Option<PathBuf>, ScanError> {
        let entries = self.list_entries(timestamp_dir)?;
        match entries.as_slice() {
            [] => Ok(None),
            [only] if only.file_type().is_dir() => Ok(Some(only.path().to_path_buf())),
            _ => Ok(Some(timestamp_dir.to_path_buf())),
        }
    }

    /// Count image files directly inside `container` (non-recursive)
    pub fn count_images(&self, container: &Path) -> Result<usize, ScanError> {
        Ok(self
            .list_entries(container)?
            .iter()
            .filter(|e| e.file_type().is_file() && self.is_image_file(e.path()))
            .count())
    }

    /// Sorted, filtered entries one level below `dir`
    fn list_entries(&self, dir: &Path) -> Result<Vec<DirEntry>, ScanError> {
        if !dir.exists() {
            return Err(ScanError::PathNotFound(dir.to_path_buf()));
        }
        if !dir.is_dir() {
            return Err(ScanError::NotADirectory(dir.to_path_buf()));
        }

        let walker = WalkDir::new(dir)
            .follow_links(true)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || self.should_process_entry(e));

        let mut entries = Vec::new();
        for entry in walker {
            match entry {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    let path = e.path().unwrap_or(dir).to_path_buf();
                    tracing::warn!(path = %path.display(), "Error accessing entry: {}", e);
                    // Only an unreadable root is fatal; bad children are skipped
                    if e.depth() == 0 {
                        return Err(ScanError::FileAccessError(path, e.to_string()));
                    }
                }
            }
        }
        Ok(entries)
    }

    /// Check if entry should be processed
    fn should_process_entry(&self, entry: &DirEntry) -> bool {
        let file_name = entry.file_name().to_string_lossy();

        if file_name.starts_with('.') {
            return false;
        }

        !self
            .ignore_patterns
            .iter()
            .any(|pattern| file_name.as_ref() == pattern.as_str())
    }

    /// Check if a regular file counts as an image
    fn is_image_file(&self, path: &Path) -> bool {
        if self.image_extensions.is_empty() {
            return true;
        }
        path.extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .map(|ext| self.image_extensions.iter().any(|e| *e == ext))
            .unwrap_or(false)
    }
}

impl Default for TreeScanner {
    fn default() -> Self {
        Self::new()
    }
}
