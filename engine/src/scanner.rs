//! Directory scanning.
//!
//! Lists the regular files of an input directory whose base name matches
//! at least one glob filter, optionally descending into subdirectories.

use std::fs;
use std::path::{Path, PathBuf};
use glob::{MatchOptions, Pattern};
use crate::error::EngineError;

/// A compiled set of base-name glob patterns.
///
/// An empty filter matches every file.
#[derive(Debug, Clone, Default)]
pub struct FileFilter {
    patterns: Vec<Pattern>,
}

impl FileFilter {
    /// Compile the given patterns.
    ///
    /// # Errors
    /// `InvalidFilter` for the first pattern that is not a valid glob.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, EngineError> {
        let mut compiled = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let pattern = pattern.as_ref();
            compiled.push(Pattern::new(pattern).map_err(|e| EngineError::InvalidFilter {
                pattern: pattern.to_string(),
                source: e,
            })?);
        }
        Ok(FileFilter { patterns: compiled })
    }

    /// Compile a whitespace-separated filter string such as `"*.txt *.log"`.
    pub fn parse(text: &str) -> Result<Self, EngineError> {
        let patterns: Vec<&str> = text.split_whitespace().collect();
        Self::new(patterns.as_slice())
    }

    /// True if `file_name` matches any pattern (or there are none).
    pub fn matches(&self, file_name: &str) -> bool {
        let options = MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: false,
        };
        self.patterns.is_empty()
            || self
                .patterns
                .iter()
                .any(|p| p.matches_with(file_name, options))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// A file selected for conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    /// Full path of the source file
    pub path: PathBuf,
    /// Base name, used for the output file
    pub file_name: String,
}

/// List matching regular files under `dir`.
///
/// Order is the file system's enumeration order. With `recursive`, files
/// from subdirectories are flattened into the same list; symlinked
/// directories are not followed.
///
/// # Errors
/// `ScanFailed` if `dir` or any visited subdirectory cannot be read.
pub fn list_files(
    dir: &Path,
    filter: &FileFilter,
    recursive: bool,
) -> Result<Vec<ScannedFile>, EngineError> {
    let mut files = Vec::new();

    fn recurse(
        path: &Path,
        filter: &FileFilter,
        recursive: bool,
        files: &mut Vec<ScannedFile>,
    ) -> Result<(), EngineError> {
        let scan_failed = |e| EngineError::ScanFailed {
            path: path.to_path_buf(),
            source: e,
        };

        for entry in fs::read_dir(path).map_err(scan_failed)? {
            let entry = entry.map_err(scan_failed)?;
            let file_type = entry.file_type().map_err(scan_failed)?;
            let entry_path = entry.path();

            if file_type.is_dir() {
                if recursive {
                    recurse(&entry_path, filter, recursive, files)?;
                }
                continue;
            }

            // Symlinks count when they point at a regular file
            let is_file = file_type.is_file()
                || (file_type.is_symlink()
                    && fs::metadata(&entry_path).map(|m| m.is_file()).unwrap_or(false));
            if !is_file {
                continue;
            }

            let file_name = entry.file_name().to_string_lossy().into_owned();
            if filter.matches(&file_name) {
                files.push(ScannedFile {
                    path: entry_path,
                    file_name,
                });
            }
        }
        Ok(())
    }

    recurse(dir, filter, recursive, &mut files)?;
    Ok(files)
}
