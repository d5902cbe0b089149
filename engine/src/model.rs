//! Core data model for conversion runs.
//!
//! This module defines the main data structures:
//! - ConversionConfig: everything one run needs to know
//! - RunMode, EngineState: enums controlling and describing a run
//! - RunSummary: what a finished run reports back to its caller

use std::path::PathBuf;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Wait between periodic cycles when no interval is configured.
pub const DEFAULT_INTERVAL_SECS: u64 = 60;

/// Settings for one conversion run.
///
/// Directories are only checked when the run starts, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionConfig {
    /// Directory scanned for input files
    pub input_dir: PathBuf,

    /// Directory converted files are written to
    pub output_dir: PathBuf,

    /// Glob patterns matched against base names; empty matches everything
    #[serde(default)]
    pub file_filters: Vec<String>,

    /// Eight hex bytes, e.g. "AF BF FF AF F1 F2 1F FF"
    pub byte_mask: String,

    /// Delete each source after it has been converted
    #[serde(default)]
    pub delete_source: bool,

    /// Replace existing outputs instead of picking a `name_(N)` sibling
    #[serde(default)]
    pub overwrite_existing: bool,

    /// Include files from subdirectories
    #[serde(default)]
    pub recursive: bool,

    /// Seconds between cycles in periodic mode
    #[serde(default)]
    pub interval_seconds: Option<u64>,
}

impl ConversionConfig {
    /// Create a config with every option switched off.
    pub fn new(
        input_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        byte_mask: impl Into<String>,
    ) -> Self {
        ConversionConfig {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            file_filters: Vec::new(),
            byte_mask: byte_mask.into(),
            delete_source: false,
            overwrite_existing: false,
            recursive: false,
            interval_seconds: None,
        }
    }

    pub fn with_filters<S: Into<String>>(mut self, filters: impl IntoIterator<Item = S>) -> Self {
        self.file_filters = filters.into_iter().map(Into::into).collect();
        self
    }

    /// Set filters from whitespace-separated text such as `"*.txt *.log"`.
    pub fn with_filter_text(self, text: &str) -> Self {
        self.with_filters(text.split_whitespace())
    }

    pub fn with_delete_source(mut self, delete_source: bool) -> Self {
        self.delete_source = delete_source;
        self
    }

    pub fn with_overwrite(mut self, overwrite_existing: bool) -> Self {
        self.overwrite_existing = overwrite_existing;
        self
    }

    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn with_interval(mut self, seconds: u64) -> Self {
        self.interval_seconds = Some(seconds);
        self
    }

    /// Interval used by periodic mode.
    pub fn interval(&self) -> u64 {
        self.interval_seconds.unwrap_or(DEFAULT_INTERVAL_SECS)
    }

    /// True if either directory was left empty.
    pub fn has_missing_directories(&self) -> bool {
        self.input_dir.as_os_str().is_empty() || self.output_dir.as_os_str().is_empty()
    }
}

/// Which control loop a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// One scan/convert cycle
    Once,
    /// Cycles separated by a wait, until interrupted
    Periodic,
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Once => write!(f, "once"),
            RunMode::Periodic => write!(f, "periodic"),
        }
    }
}

/// Lifecycle of an engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    /// Never run
    Idle,
    /// A run is in progress
    Running,
    /// Last run finished every file
    Completed,
    /// Last run stopped on an interrupt
    Cancelled,
    /// Last run hit an error
    Failed,
}

impl EngineState {
    /// Returns true if this state is terminal (no run in progress).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EngineState::Completed | EngineState::Cancelled | EngineState::Failed
        )
    }
}

/// What a finished run reports back to the caller that started it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unique identifier for this run
    pub run_id: Uuid,

    pub mode: RunMode,

    pub started_at: DateTime<Utc>,

    pub finished_at: DateTime<Utc>,

    /// Scan/convert cycles started
    pub cycles: u64,

    /// Files fully converted across all cycles
    pub files_converted: u64,

    /// Terminal state of the run
    pub state: EngineState,

    /// Value carried by the run's `Outcome` event
    pub success: bool,
}
