//! Output naming.
//!
//! Decides where a converted file lands. The resolver never touches the
//! file system beyond existence checks; replacing an existing file is the
//! caller's job.

use std::path::{Path, PathBuf};
use crate::error::EngineError;

/// Highest `_(N)` suffix tried before giving up.
pub const MAX_COLLISION_SUFFIX: u32 = 1_000_000;

/// Where to write a converted file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Target path for the output
    pub path: PathBuf,
    /// True if a file already exists at `path` and must be removed first
    pub replace: bool,
}

/// Resolve the output path for `file_name` inside `output_dir`.
///
/// Free target: returned as is. Taken target with `overwrite`: same path,
/// flagged `replace`. Taken target without `overwrite`: the first free
/// `base_(N).ext` sibling, counting from 1.
pub fn resolve_output_path(
    output_dir: &Path,
    file_name: &str,
    overwrite: bool,
) -> Result<Resolution, EngineError> {
    let target = output_dir.join(file_name);
    if !target.exists() {
        return Ok(Resolution {
            path: target,
            replace: false,
        });
    }

    if overwrite {
        return Ok(Resolution {
            path: target,
            replace: true,
        });
    }

    let (base, extension) = split_file_name(file_name);
    for counter in 1..=MAX_COLLISION_SUFFIX {
        let candidate = output_dir.join(suffixed_name(base, extension, counter));
        if !candidate.exists() {
            return Ok(Resolution {
                path: candidate,
                replace: false,
            });
        }
    }

    Err(EngineError::NameSpaceExhausted { path: target })
}

/// Split at the first dot after any leading dot.
fn split_file_name(file_name: &str) -> (&str, Option<&str>) {
    let leading = file_name.len() - file_name.trim_start_matches('.').len();
    match file_name[leading..].find('.') {
        Some(pos) => {
            let split = leading + pos;
            (&file_name[..split], Some(&file_name[split + 1..]))
        }
        None => (file_name, None),
    }
}

fn suffixed_name(base: &str, extension: Option<&str>, counter: u32) -> String {
    match extension {
        Some(ext) => format!("{}_({}).{}", base, counter, ext),
        None => format!("{}_({})", base, counter),
    }
}
