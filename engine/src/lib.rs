//! # MaskConv Engine - Batch XOR File Conversion Library
//!
//! A headless engine that scans a directory, XOR-transforms every matching
//! file with an 8-byte mask and writes the results to an output directory.
//! Designed as the foundation for multiple front-ends (CLI, GUI, automation).
//!
//! ## Overview
//!
//! - Whitespace-separated hex byte masks (`"AF BF FF AF F1 F2 1F FF"`)
//! - Reversible word-wise XOR transform with exact tail handling
//! - Glob filters on base names, optional recursion
//! - Collision-safe `name_(N).ext` output naming or overwrite
//! - One-shot and periodic runs with cooperative interruption
//! - Ordered progress/error/outcome events (decoupled from UI technology)
//!
//! ## Basic Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use maskconv_engine::{ConversionConfig, ConversionEngine, EngineEvent, RunMode};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConversionConfig::new("C:\\incoming", "D:\\converted", "AF BF FF AF F1 F2 1F FF")
//!     .with_filter_text("*.bin *.dat");
//!
//! let engine = Arc::new(ConversionEngine::new());
//! let handle = engine.spawn(config, RunMode::Once)?;
//!
//! for event in handle.events().iter() {
//!     println!("{:?}", event);
//!     if let EngineEvent::Outcome { .. } = event {
//!         break;
//!     }
//! }
//!
//! let summary = handle.join()?;
//! println!("Converted {} files", summary.files_converted);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: Run configuration, modes, states and summaries
//! - **error**: Error types and handling
//! - **mask**: Byte mask parsing
//! - **naming**: Output path resolution
//! - **transform**: The XOR file transform
//! - **scanner**: Directory listing with glob filters
//! - **fs_ops**: Low-level filesystem helpers
//! - **cancel**: Interrupt flag shared with callers
//! - **progress**: Event types and the sink trait
//! - **job**: The conversion engine (run, periodic run, worker spawn)

pub mod model;
pub mod error;
pub mod mask;
pub mod naming;
pub mod transform;
pub mod scanner;
pub mod fs_ops;
pub mod cancel;
pub mod progress;
pub mod job;

// Re-export main types and functions
pub use model::{ConversionConfig, EngineState, RunMode, RunSummary, DEFAULT_INTERVAL_SECS};
pub use error::EngineError;
pub use mask::Mask;
pub use naming::{resolve_output_path, Resolution};
pub use transform::{transform_file, TransformStats};
pub use scanner::{list_files, FileFilter, ScannedFile};
pub use cancel::InterruptHandle;
pub use progress::{EngineEvent, EventSink, ProgressEvent};
pub use job::{ConversionEngine, RunHandle};
