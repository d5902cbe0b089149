//! Filesystem operations module.
//!
//! Small helpers the run loop needs around the transform itself:
//! - Making sure the output directory exists
//! - Removing an output that is about to be replaced
//! - Detecting an output path that is really the input file

use std::fs;
use std::io;
use std::path::Path;
use crate::error::EngineError;

/// Ensure `dir` exists as a directory, creating it recursively if necessary.
///
/// # Errors
/// Returns `DirectoryCreationFailed` if the path exists but is not a
/// directory, or creation fails.
pub fn ensure_dir_exists(dir: &Path) -> Result<(), EngineError> {
    match fs::metadata(dir) {
        Ok(metadata) => {
            if metadata.is_dir() {
                Ok(())
            } else {
                Err(EngineError::DirectoryCreationFailed {
                    path: dir.to_path_buf(),
                    source: io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "Path exists but is not a directory",
                    ),
                })
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(dir).map_err(|e| EngineError::DirectoryCreationFailed {
                path: dir.to_path_buf(),
                source: e,
            })
        }
        Err(e) => Err(EngineError::DirectoryCreationFailed {
            path: dir.to_path_buf(),
            source: e,
        }),
    }
}

/// Remove an existing output so it can be written fresh.
pub fn remove_existing_output(path: &Path) -> Result<(), EngineError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        // Gone already; nothing to replace
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(EngineError::RemoveFailed {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// True if both paths resolve to the same existing file.
pub fn is_same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
