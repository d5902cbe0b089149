//! Error types for the conversion engine.
//!
//! Every fallible engine operation returns `EngineError`. The engine never
//! lets one escape a run: the run loop converts the first error it sees into
//! an `Error` event followed by a failed `Outcome` event.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while preparing or executing a conversion run.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Input or output directory was left empty
    #[error("Input and output directories must be specified")]
    MissingDirectories,

    /// Byte mask did not contain exactly eight tokens
    #[error("incorrect number of bytes in the byte mask (expected 8, got {count})")]
    InvalidMaskFormat { count: usize },

    /// A byte mask token is not a base-16 byte
    #[error("error converting byte mask: '{token}' is not a hex byte")]
    InvalidMaskByte { token: String },

    /// A file filter is not a valid glob pattern
    #[error("invalid file filter '{pattern}': {source}")]
    InvalidFilter {
        pattern: String,
        source: glob::PatternError,
    },

    /// Directory could not be listed
    #[error("Failed to enumerate directory {}: {source}", .path.display())]
    ScanFailed { path: PathBuf, source: io::Error },

    /// Output directory could not be created
    #[error("Failed to create directory {}: {source}", .path.display())]
    DirectoryCreationFailed { path: PathBuf, source: io::Error },

    /// Input file could not be opened
    #[error("Cannot open input file {}: {source}", .path.display())]
    OpenInputFailed { path: PathBuf, source: io::Error },

    /// Output file could not be created
    #[error("Cannot create output file {}: {source}", .path.display())]
    OpenOutputFailed { path: PathBuf, source: io::Error },

    /// Read failed in the middle of a file
    #[error("Input stream read error in {}: {source}", .path.display())]
    ReadError { path: PathBuf, source: io::Error },

    /// Write failed in the middle of a file
    #[error("Output stream write error in {}: {source}", .path.display())]
    WriteError { path: PathBuf, source: io::Error },

    /// Existing output could not be removed before replacing it
    #[error("Cannot remove existing output file {}: {source}", .path.display())]
    RemoveFailed { path: PathBuf, source: io::Error },

    /// Overwriting would destroy the file being read
    #[error("Output path {} is the input file itself", .path.display())]
    OutputAliasesInput { path: PathBuf },

    /// No free `name_(N).ext` slot was found
    #[error("No free output name left for {}", .path.display())]
    NameSpaceExhausted { path: PathBuf },

    /// The engine instance is already executing a run
    #[error("A conversion is already running")]
    AlreadyRunning,

    /// Worker thread could not be started
    #[error("Failed to start conversion worker: {source}")]
    WorkerSpawnFailed { source: io::Error },

    /// Worker thread panicked before reporting a summary
    #[error("Conversion worker panicked")]
    WorkerPanicked,
}

impl EngineError {
    /// Extract the OS error code from this error, if available.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::ScanFailed { source, .. }
            | Self::DirectoryCreationFailed { source, .. }
            | Self::OpenInputFailed { source, .. }
            | Self::OpenOutputFailed { source, .. }
            | Self::ReadError { source, .. }
            | Self::WriteError { source, .. }
            | Self::RemoveFailed { source, .. }
            | Self::WorkerSpawnFailed { source } => source.raw_os_error(),
            _ => None,
        }
    }

    /// True for errors caused by the run's configuration rather than I/O.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::MissingDirectories
                | Self::InvalidMaskFormat { .. }
                | Self::InvalidMaskByte { .. }
                | Self::InvalidFilter { .. }
        )
    }
}
