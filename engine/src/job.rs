//! Conversion orchestration module.
//!
//! `ConversionEngine` drives the whole pipeline:
//! - Validating the config and parsing the byte mask
//! - Scanning the input directory
//! - Transforming each file in listing order, then optionally deleting it
//! - Repeating the cycle on a timer in periodic mode
//!
//! Every invocation ends with exactly one `Outcome` event.

use std::fs;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use chrono::Utc;
use crossbeam_channel::Receiver;
use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;
use crate::cancel::{CancellationFlag, InterruptHandle};
use crate::error::EngineError;
use crate::fs_ops;
use crate::mask::Mask;
use crate::model::{ConversionConfig, EngineState, RunMode, RunSummary};
use crate::naming::resolve_output_path;
use crate::progress::{EngineEvent, EventSink, ProgressEvent};
use crate::scanner::{list_files, FileFilter, ScannedFile};
use crate::transform::transform_file;

const MSG_STARTING: &str = "Starting conversion";
const MSG_FINISHED: &str = "Conversion finished";
const MSG_CANCELLED: &str = "Conversion cancelled";

/// How a single pass over the file list ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleOutcome {
    Completed,
    Cancelled,
}

/// Parsed, validated form of a config.
struct RunPlan {
    mask: Mask,
    filter: FileFilter,
}

impl RunPlan {
    fn prepare(config: &ConversionConfig) -> Result<Self, EngineError> {
        if config.has_missing_directories() {
            return Err(EngineError::MissingDirectories);
        }
        let mask = Mask::parse(&config.byte_mask)?;
        let filter = FileFilter::new(config.file_filters.as_slice())?;
        Ok(RunPlan { mask, filter })
    }
}

/// Counters for the run in progress.
struct RunTracker {
    run_id: Uuid,
    mode: RunMode,
    started_at: chrono::DateTime<Utc>,
    cycles: u64,
    files_converted: u64,
}

impl RunTracker {
    fn new(mode: RunMode) -> Self {
        RunTracker {
            run_id: Uuid::new_v4(),
            mode,
            started_at: Utc::now(),
            cycles: 0,
            files_converted: 0,
        }
    }

    fn into_summary(self, state: EngineState, success: bool) -> RunSummary {
        RunSummary {
            run_id: self.run_id,
            mode: self.mode,
            started_at: self.started_at,
            finished_at: Utc::now(),
            cycles: self.cycles,
            files_converted: self.files_converted,
            state,
            success,
        }
    }
}

/// Batch XOR conversion engine.
///
/// One instance runs one conversion at a time and may be reused for
/// sequential runs. Share it through an `Arc` to interrupt it from another
/// thread or to `spawn` runs on a worker.
#[derive(Debug)]
pub struct ConversionEngine {
    cancel: Arc<CancellationFlag>,
    state: Mutex<EngineState>,
}

impl Default for ConversionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversionEngine {
    pub fn new() -> Self {
        ConversionEngine {
            cancel: Arc::new(CancellationFlag::new()),
            state: Mutex::new(EngineState::Idle),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ask the running conversion to stop at its next checkpoint.
    ///
    /// Idempotent; has no effect on a run started afterwards.
    pub fn request_interrupt(&self) {
        info!("Interrupt requested");
        self.cancel.request();
    }

    /// Handle for interrupting this engine from elsewhere.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle::new(Arc::clone(&self.cancel))
    }

    /// Run one scan/convert cycle, blocking the calling thread.
    ///
    /// Reports through `sink` and ends with `Outcome { success }`, where
    /// success is false on any error or interrupt.
    pub fn run(&self, config: ConversionConfig, sink: &dyn EventSink) -> RunSummary {
        self.start(config, RunMode::Once, sink)
    }

    /// Repeat scan/convert cycles until interrupted, blocking the calling
    /// thread.
    ///
    /// Being interrupted is the normal way out and reports
    /// `Outcome { success: true }`; errors report `false`.
    pub fn run_periodic(&self, config: ConversionConfig, sink: &dyn EventSink) -> RunSummary {
        self.start(config, RunMode::Periodic, sink)
    }

    /// Start a run on a dedicated worker thread.
    ///
    /// The engine is claimed and its interrupt flag cleared before this
    /// returns, so an interrupt sent through the handle right away is not
    /// lost.
    ///
    /// # Errors
    /// `WorkerSpawnFailed` if the thread cannot be created.
    pub fn spawn(
        self: &Arc<Self>,
        config: ConversionConfig,
        mode: RunMode,
    ) -> Result<RunHandle, EngineError> {
        let (sender, events) = crossbeam_channel::unbounded();
        let claimed = self.try_begin();
        let engine = Arc::clone(self);

        let worker = thread::Builder::new()
            .name("maskconv-worker".to_string())
            .spawn(move || {
                if claimed {
                    engine.execute(config, mode, &sender)
                } else {
                    reject(mode, &sender)
                }
            })
            .map_err(|e| {
                if claimed {
                    self.set_state(EngineState::Failed);
                }
                EngineError::WorkerSpawnFailed { source: e }
            })?;

        Ok(RunHandle {
            events,
            interrupt: self.interrupt_handle(),
            worker,
        })
    }

    fn start(&self, config: ConversionConfig, mode: RunMode, sink: &dyn EventSink) -> RunSummary {
        if !self.try_begin() {
            return reject(mode, sink);
        }
        self.execute(config, mode, sink)
    }

    /// Claim the engine for a new run and clear any stale interrupt.
    fn try_begin(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == EngineState::Running {
            return false;
        }
        *state = EngineState::Running;
        self.cancel.reset();
        true
    }

    fn set_state(&self, next: EngineState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }

    /// Body of a claimed run. Always emits exactly one `Outcome`.
    fn execute(&self, config: ConversionConfig, mode: RunMode, sink: &dyn EventSink) -> RunSummary {
        let mut tracker = RunTracker::new(mode);
        let span = info_span!("conversion", run_id = %tracker.run_id, mode = %mode);
        let _enter = span.enter();
        let mut guard = UnwindGuard {
            engine: self,
            sink,
            armed: true,
        };

        info!(
            input = %config.input_dir.display(),
            output = %config.output_dir.display(),
            "Run started"
        );

        let result = match mode {
            RunMode::Once => self.execute_once(&config, sink, &mut tracker),
            RunMode::Periodic => self.execute_periodic(&config, sink, &mut tracker),
        };

        let state = match result {
            Ok(state) => state,
            Err(e) => {
                if e.is_config_error() {
                    warn!(error = %e, "Run rejected by configuration");
                } else {
                    error!(error = %e, os_error = ?e.raw_os_error(), "Run failed");
                }
                sink.emit(EngineEvent::Error {
                    message: error_message(&e),
                });
                EngineState::Failed
            }
        };

        // Periodic runs only end by interrupt or error; the interrupt is not a failure
        let success = match state {
            EngineState::Completed => true,
            EngineState::Cancelled => mode == RunMode::Periodic,
            _ => false,
        };

        info!(
            cycles = tracker.cycles,
            files = tracker.files_converted,
            ?state,
            success,
            "Run finished"
        );

        guard.armed = false;
        // State is terminal before the outcome becomes visible
        self.set_state(state);
        sink.emit(EngineEvent::Outcome { success });
        tracker.into_summary(state, success)
    }

    fn execute_once(
        &self,
        config: &ConversionConfig,
        sink: &dyn EventSink,
        tracker: &mut RunTracker,
    ) -> Result<EngineState, EngineError> {
        let plan = RunPlan::prepare(config)?;
        sink.emit(status(MSG_STARTING));

        fs_ops::ensure_dir_exists(&config.output_dir)?;
        let files = list_files(&config.input_dir, &plan.filter, config.recursive)?;
        tracker.cycles += 1;
        info!(files = files.len(), "Files listed");

        match self.convert_cycle(config, &plan, &files, sink, tracker)? {
            CycleOutcome::Cancelled => {
                sink.emit(status(MSG_CANCELLED));
                Ok(EngineState::Cancelled)
            }
            CycleOutcome::Completed => {
                sink.emit(status(MSG_FINISHED));
                Ok(EngineState::Completed)
            }
        }
    }

    fn execute_periodic(
        &self,
        config: &ConversionConfig,
        sink: &dyn EventSink,
        tracker: &mut RunTracker,
    ) -> Result<EngineState, EngineError> {
        let plan = RunPlan::prepare(config)?;
        let interval = config.interval();
        sink.emit(status(MSG_STARTING));

        while !self.cancel.is_requested() {
            fs_ops::ensure_dir_exists(&config.output_dir)?;
            let files = list_files(&config.input_dir, &plan.filter, config.recursive)?;
            tracker.cycles += 1;
            info!(cycle = tracker.cycles, files = files.len(), "Cycle started");

            if self.convert_cycle(config, &plan, &files, sink, tracker)? == CycleOutcome::Cancelled {
                break;
            }

            sink.emit(status(format!("Waiting {} seconds", interval)));
            if self.cancel.wait(Duration::from_secs(interval)) {
                debug!("Wait interrupted");
            }
        }

        sink.emit(status(MSG_CANCELLED));
        Ok(EngineState::Cancelled)
    }

    /// Convert every listed file in order, stopping early on an interrupt.
    ///
    /// The first error aborts the cycle; the file in progress is not rolled
    /// back.
    fn convert_cycle(
        &self,
        config: &ConversionConfig,
        plan: &RunPlan,
        files: &[ScannedFile],
        sink: &dyn EventSink,
        tracker: &mut RunTracker,
    ) -> Result<CycleOutcome, EngineError> {
        let total = files.len();

        for (current, file) in files.iter().enumerate() {
            if self.cancel.is_requested() {
                info!(converted = current, total, "Cycle interrupted");
                return Ok(CycleOutcome::Cancelled);
            }

            sink.emit(EngineEvent::Progress(ProgressEvent {
                current,
                total,
                message: format!("Converting: {}", file.file_name),
            }));

            let resolution =
                resolve_output_path(&config.output_dir, &file.file_name, config.overwrite_existing)?;
            if resolution.replace {
                if fs_ops::is_same_file(&file.path, &resolution.path) {
                    return Err(EngineError::OutputAliasesInput {
                        path: resolution.path,
                    });
                }
                fs_ops::remove_existing_output(&resolution.path)?;
            }

            let stats = transform_file(&file.path, &resolution.path, plan.mask)?;
            if stats.truncated {
                warn!(
                    file = %file.path.display(),
                    "Input shorter than its recorded size; incomplete tail not written"
                );
            }
            debug!(
                file = %file.path.display(),
                output = %resolution.path.display(),
                bytes = stats.bytes_written(),
                "File converted"
            );

            if config.delete_source {
                if let Err(e) = fs::remove_file(&file.path) {
                    warn!(file = %file.path.display(), error = %e, "Could not delete source");
                }
            }

            tracker.files_converted += 1;
        }

        Ok(CycleOutcome::Completed)
    }
}

/// A run executing on a worker thread.
#[derive(Debug)]
pub struct RunHandle {
    events: Receiver<EngineEvent>,
    interrupt: InterruptHandle,
    worker: JoinHandle<RunSummary>,
}

impl RunHandle {
    /// Ordered event stream; the last event is an `Outcome`.
    pub fn events(&self) -> &Receiver<EngineEvent> {
        &self.events
    }

    pub fn request_interrupt(&self) {
        self.interrupt.request();
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    /// Wait for the worker to finish.
    ///
    /// # Errors
    /// `WorkerPanicked` if the worker thread panicked.
    pub fn join(self) -> Result<RunSummary, EngineError> {
        self.worker.join().map_err(|_| EngineError::WorkerPanicked)
    }
}

/// Releases the engine and closes the event stream if a run unwinds.
struct UnwindGuard<'a> {
    engine: &'a ConversionEngine,
    sink: &'a dyn EventSink,
    armed: bool,
}

impl Drop for UnwindGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            error!("Run aborted by a panic");
            self.engine.set_state(EngineState::Failed);
            self.sink.emit(EngineEvent::Outcome { success: false });
        }
    }
}

/// Answer an invocation made while another run holds the engine.
fn reject(mode: RunMode, sink: &dyn EventSink) -> RunSummary {
    warn!(%mode, "Engine busy; run rejected");
    sink.emit(EngineEvent::Error {
        message: EngineError::AlreadyRunning.to_string(),
    });
    sink.emit(EngineEvent::Outcome { success: false });
    RunTracker::new(mode).into_summary(EngineState::Failed, false)
}

fn status(message: impl Into<String>) -> EngineEvent {
    EngineEvent::Progress(ProgressEvent::status(message))
}

fn error_message(err: &EngineError) -> String {
    match err {
        EngineError::MissingDirectories => err.to_string(),
        _ => format!("Conversion failed: {}", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::time::Instant;

    const MASK: &str = "AF BF FF AF F1 F2 1F FF";
    const WAIT_LIMIT: Duration = Duration::from_secs(10);

    type Hook = Box<dyn Fn(&EngineEvent) + Send + Sync>;

    // Test helper: records every event and optionally reacts to it
    struct Recorder {
        events: Mutex<Vec<EngineEvent>>,
        hook: Option<Hook>,
    }

    impl Recorder {
        fn new() -> Self {
            Recorder {
                events: Mutex::new(Vec::new()),
                hook: None,
            }
        }

        fn with_hook(hook: impl Fn(&EngineEvent) + Send + Sync + 'static) -> Self {
            Recorder {
                events: Mutex::new(Vec::new()),
                hook: Some(Box::new(hook)),
            }
        }

        /// Request an interrupt when a progress message starts with `prefix`.
        fn interrupting_on(handle: InterruptHandle, prefix: &'static str) -> Self {
            Self::with_hook(move |event| {
                if let EngineEvent::Progress(p) = event {
                    if p.message.starts_with(prefix) {
                        handle.request();
                    }
                }
            })
        }

        fn events(&self) -> Vec<EngineEvent> {
            self.events.lock().unwrap().clone()
        }

        fn messages(&self) -> Vec<String> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    EngineEvent::Progress(p) => Some(p.message),
                    EngineEvent::Error { message } => Some(format!("error: {}", message)),
                    EngineEvent::Outcome { success } => Some(format!("outcome: {}", success)),
                })
                .collect()
        }
    }

    impl EventSink for Recorder {
        fn emit(&self, event: EngineEvent) {
            if let Some(hook) = &self.hook {
                hook(&event);
            }
            self.events.lock().unwrap().push(event);
        }
    }

    struct Dirs {
        _temp: tempfile::TempDir,
        input: std::path::PathBuf,
        output: std::path::PathBuf,
    }

    fn dirs() -> Dirs {
        let temp = tempfile::tempdir().expect("Failed to create temp dir");
        let input = temp.path().join("in");
        let output = temp.path().join("out");
        fs::create_dir(&input).expect("Failed to create input dir");
        Dirs {
            _temp: temp,
            input,
            output,
        }
    }

    fn config(dirs: &Dirs) -> ConversionConfig {
        ConversionConfig::new(&dirs.input, &dirs.output, MASK)
    }

    fn decode(path: &Path) -> Vec<u8> {
        let temp = tempfile::tempdir().expect("Failed to create temp dir");
        let decoded = temp.path().join("decoded");
        transform_file(path, &decoded, Mask::parse(MASK).unwrap()).expect("Failed to decode");
        fs::read(&decoded).expect("Failed to read decoded")
    }

    fn count_outcomes(events: &[EngineEvent]) -> usize {
        events.iter().filter(|e| e.is_terminal()).count()
    }

    fn recv_until(events: &Receiver<EngineEvent>, mut pred: impl FnMut(&EngineEvent) -> bool) -> Vec<EngineEvent> {
        let deadline = Instant::now() + WAIT_LIMIT;
        let mut seen = Vec::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let event = events
                .recv_timeout(remaining)
                .expect("Timed out waiting for engine event");
            let done = pred(&event);
            seen.push(event);
            if done {
                return seen;
            }
        }
    }

    #[test]
    fn test_run_converts_files_in_order() {
        let dirs = dirs();
        fs::write(dirs.input.join("a.bin"), b"hello world, eleven+").expect("Failed to write a");
        fs::write(dirs.input.join("b.bin"), b"12345678").expect("Failed to write b");

        let engine = ConversionEngine::new();
        let recorder = Recorder::new();
        let summary = engine.run(config(&dirs), &recorder);

        assert!(summary.success);
        assert_eq!(summary.state, EngineState::Completed);
        assert_eq!(summary.files_converted, 2);
        assert_eq!(summary.cycles, 1);
        assert_eq!(engine.state(), EngineState::Completed);

        let events = recorder.events();
        assert_eq!(events.len(), 5);
        assert_eq!(events[0], status(MSG_STARTING));
        for (index, event) in events[1..3].iter().enumerate() {
            match event {
                EngineEvent::Progress(p) => {
                    assert_eq!(p.current, index);
                    assert_eq!(p.total, 2);
                    assert!(p.message.starts_with("Converting: "));
                }
                other => panic!("expected per-file progress, got {:?}", other),
            }
        }
        assert_eq!(events[3], status(MSG_FINISHED));
        assert_eq!(events[4], EngineEvent::Outcome { success: true });

        let a_out = dirs.output.join("a.bin");
        assert_ne!(fs::read(&a_out).unwrap(), b"hello world, eleven+");
        assert_eq!(decode(&a_out), b"hello world, eleven+");
        assert_eq!(decode(&dirs.output.join("b.bin")), b"12345678");
        // Sources stay put by default
        assert!(dirs.input.join("a.bin").exists());
    }

    #[test]
    fn test_run_on_empty_directory_succeeds() {
        let dirs = dirs();
        let engine = ConversionEngine::new();
        let recorder = Recorder::new();

        let summary = engine.run(config(&dirs), &recorder);

        assert!(summary.success);
        assert_eq!(
            recorder.messages(),
            vec![MSG_STARTING, MSG_FINISHED, "outcome: true"]
        );
        assert!(dirs.output.is_dir(), "output directory should be created");
    }

    #[test]
    fn test_malformed_mask_fails_without_touching_disk() {
        let dirs = dirs();
        fs::write(dirs.input.join("a.bin"), b"data").expect("Failed to write a");

        let engine = ConversionEngine::new();
        let recorder = Recorder::new();
        let cfg = ConversionConfig::new(&dirs.input, &dirs.output, "AF BF FF");
        let summary = engine.run(cfg, &recorder);

        assert!(!summary.success);
        assert_eq!(summary.state, EngineState::Failed);
        let events = recorder.events();
        assert_eq!(events.len(), 2);
        match &events[0] {
            EngineEvent::Error { message } => {
                assert!(message.starts_with("Conversion failed: "), "{}", message);
                assert!(message.contains("byte mask"), "{}", message);
            }
            other => panic!("expected error, got {:?}", other),
        }
        assert_eq!(events[1], EngineEvent::Outcome { success: false });
        assert!(!dirs.output.exists());
    }

    #[test]
    fn test_missing_directories_are_reported() {
        let engine = ConversionEngine::new();
        let recorder = Recorder::new();
        let summary = engine.run(ConversionConfig::new("", "out", MASK), &recorder);

        assert!(!summary.success);
        assert_eq!(
            recorder.messages(),
            vec![
                "error: Input and output directories must be specified",
                "outcome: false"
            ]
        );
    }

    #[test]
    fn test_interrupt_before_first_file_converts_nothing() {
        let dirs = dirs();
        fs::write(dirs.input.join("a.bin"), b"aaaa").expect("Failed to write a");
        fs::write(dirs.input.join("b.bin"), b"bbbb").expect("Failed to write b");

        let engine = ConversionEngine::new();
        let recorder = Recorder::interrupting_on(engine.interrupt_handle(), MSG_STARTING);
        let summary = engine.run(config(&dirs), &recorder);

        assert!(!summary.success);
        assert_eq!(summary.state, EngineState::Cancelled);
        assert_eq!(summary.files_converted, 0);
        assert_eq!(
            recorder.messages(),
            vec![MSG_STARTING, MSG_CANCELLED, "outcome: false"]
        );
        assert_eq!(fs::read_dir(&dirs.output).unwrap().count(), 0);
    }

    #[test]
    fn test_interrupt_mid_run_finishes_current_file_only() {
        let dirs = dirs();
        for name in ["a.bin", "b.bin", "c.bin"] {
            fs::write(dirs.input.join(name), b"payload!").expect("Failed to write input");
        }

        let engine = ConversionEngine::new();
        let recorder = Recorder::interrupting_on(engine.interrupt_handle(), "Converting: ");
        let summary = engine.run(config(&dirs), &recorder);

        assert!(!summary.success);
        assert_eq!(summary.files_converted, 1);
        assert_eq!(fs::read_dir(&dirs.output).unwrap().count(), 1);
        let events = recorder.events();
        assert_eq!(count_outcomes(&events), 1);
        assert_eq!(events[events.len() - 2], status(MSG_CANCELLED));
    }

    #[test]
    fn test_engine_is_reusable_after_interrupt() {
        let dirs = dirs();
        fs::write(dirs.input.join("a.bin"), b"reuse me").expect("Failed to write a");

        let engine = ConversionEngine::new();
        engine.request_interrupt();
        // Stale interrupt from before the run is cleared on start
        let summary = engine.run(config(&dirs), &Recorder::new());
        assert!(summary.success);
        assert_eq!(summary.files_converted, 1);
    }

    #[test]
    fn test_collisions_get_numbered_names() {
        let dirs = dirs();
        let engine = ConversionEngine::new();

        for _ in 0..3 {
            fs::write(dirs.input.join("report.txt"), b"quarterly").expect("Failed to write report");
            let summary = engine.run(config(&dirs), &Recorder::new());
            assert!(summary.success);
        }

        assert!(dirs.output.join("report.txt").exists());
        assert!(dirs.output.join("report_(1).txt").exists());
        assert!(dirs.output.join("report_(2).txt").exists());
        assert_eq!(decode(&dirs.output.join("report_(2).txt")), b"quarterly");
    }

    #[test]
    fn test_overwrite_replaces_existing_output() {
        let dirs = dirs();
        fs::create_dir(&dirs.output).expect("Failed to create output dir");
        fs::write(dirs.output.join("report.txt"), b"stale contents that are longer")
            .expect("Failed to write stale output");
        fs::write(dirs.input.join("report.txt"), b"fresh").expect("Failed to write report");

        let engine = ConversionEngine::new();
        let summary = engine.run(config(&dirs).with_overwrite(true), &Recorder::new());

        assert!(summary.success);
        assert_eq!(fs::read_dir(&dirs.output).unwrap().count(), 1);
        assert_eq!(decode(&dirs.output.join("report.txt")), b"fresh");
    }

    #[test]
    fn test_overwrite_refuses_to_replace_the_input() {
        let dirs = dirs();
        fs::write(dirs.input.join("a.bin"), b"keep me!").expect("Failed to write a");

        let engine = ConversionEngine::new();
        let cfg = ConversionConfig::new(&dirs.input, &dirs.input, MASK).with_overwrite(true);
        let recorder = Recorder::new();
        let summary = engine.run(cfg, &recorder);

        assert!(!summary.success);
        assert_eq!(fs::read(dirs.input.join("a.bin")).unwrap(), b"keep me!");
        assert!(recorder
            .messages()
            .iter()
            .any(|m| m.starts_with("error: Conversion failed: Output path")));
    }

    #[test]
    fn test_delete_source_and_filters() {
        let dirs = dirs();
        fs::write(dirs.input.join("keep.log"), b"log").expect("Failed to write log");
        fs::write(dirs.input.join("take.txt"), b"text").expect("Failed to write txt");

        let engine = ConversionEngine::new();
        let cfg = config(&dirs).with_filter_text("*.txt").with_delete_source(true);
        let summary = engine.run(cfg, &Recorder::new());

        assert!(summary.success);
        assert!(!dirs.input.join("take.txt").exists());
        assert!(dirs.input.join("keep.log").exists());
        assert!(dirs.output.join("take.txt").exists());
        assert!(!dirs.output.join("keep.log").exists());
    }

    #[test]
    fn test_recursive_run_flattens_into_output() {
        let dirs = dirs();
        let nested = dirs.input.join("nested");
        fs::create_dir(&nested).expect("Failed to create nested dir");
        fs::write(nested.join("deep.bin"), b"deep file").expect("Failed to write deep");

        let engine = ConversionEngine::new();
        let summary = engine.run(config(&dirs).with_recursive(true), &Recorder::new());

        assert!(summary.success);
        assert_eq!(decode(&dirs.output.join("deep.bin")), b"deep file");
    }

    #[test]
    fn test_scan_failure_aborts_run() {
        let dirs = dirs();
        let engine = ConversionEngine::new();
        let cfg = ConversionConfig::new(dirs.input.join("missing"), &dirs.output, MASK);
        let recorder = Recorder::new();
        let summary = engine.run(cfg, &recorder);

        assert!(!summary.success);
        assert_eq!(engine.state(), EngineState::Failed);
        let messages = recorder.messages();
        assert_eq!(messages[0], MSG_STARTING);
        assert!(messages[1].starts_with("error: Conversion failed: Failed to enumerate"));
        assert_eq!(messages[2], "outcome: false");
    }

    #[test]
    fn test_spawned_run_reports_through_channel() {
        let dirs = dirs();
        fs::write(dirs.input.join("a.bin"), b"threaded").expect("Failed to write a");

        let engine = Arc::new(ConversionEngine::new());
        let handle = engine.spawn(config(&dirs), RunMode::Once).expect("Failed to spawn");
        let events = recv_until(handle.events(), |e| e.is_terminal());
        let summary = handle.join().expect("worker panicked");

        assert_eq!(events.last(), Some(&EngineEvent::Outcome { success: true }));
        assert!(summary.success);
        assert_eq!(summary.files_converted, 1);
    }

    #[test]
    fn test_periodic_stops_promptly_when_interrupted_during_wait() {
        let dirs = dirs();
        fs::write(dirs.input.join("a.bin"), b"periodic").expect("Failed to write a");

        let engine = Arc::new(ConversionEngine::new());
        let cfg = config(&dirs).with_interval(3600);
        let handle = engine.spawn(cfg, RunMode::Periodic).expect("Failed to spawn");

        recv_until(handle.events(), |e| {
            matches!(e, EngineEvent::Progress(p) if p.message == "Waiting 3600 seconds")
        });
        assert_eq!(engine.state(), EngineState::Running);

        let interrupted_at = Instant::now();
        handle.request_interrupt();
        let tail = recv_until(handle.events(), |e| e.is_terminal());
        assert!(interrupted_at.elapsed() < WAIT_LIMIT);

        assert_eq!(tail[tail.len() - 2], status(MSG_CANCELLED));
        assert_eq!(tail.last(), Some(&EngineEvent::Outcome { success: true }));

        let summary = handle.join().expect("worker panicked");
        assert!(summary.success);
        assert_eq!(summary.state, EngineState::Cancelled);
        assert_eq!(summary.cycles, 1);
        assert_eq!(summary.files_converted, 1);
    }

    #[test]
    fn test_periodic_with_unbounded_interval_still_interruptible() {
        let dirs = dirs();
        let engine = Arc::new(ConversionEngine::new());
        let handle = engine
            .spawn(config(&dirs).with_interval(u64::MAX), RunMode::Periodic)
            .expect("Failed to spawn");

        let waiting = format!("Waiting {} seconds", u64::MAX);
        recv_until(handle.events(), |e| {
            matches!(e, EngineEvent::Progress(p) if p.message == waiting)
        });

        handle.request_interrupt();
        let tail = recv_until(handle.events(), |e| e.is_terminal());
        assert_eq!(tail.last(), Some(&EngineEvent::Outcome { success: true }));

        let summary = handle.join().expect("worker panicked");
        assert_eq!(summary.state, EngineState::Cancelled);
        assert_eq!(engine.state(), EngineState::Cancelled);
    }

    #[test]
    fn test_panicking_sink_releases_engine() {
        let dirs = dirs();
        fs::write(dirs.input.join("a.bin"), b"aaaaaaaa").expect("Failed to write a");

        let engine = ConversionEngine::new();
        let recorder = Recorder::with_hook(|event| {
            if let EngineEvent::Progress(p) = event {
                if p.message.starts_with("Converting: ") {
                    panic!("sink failure");
                }
            }
        });

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            engine.run(config(&dirs), &recorder)
        }));
        assert!(result.is_err());
        assert_eq!(engine.state(), EngineState::Failed);
        assert_eq!(
            recorder.events().last(),
            Some(&EngineEvent::Outcome { success: false })
        );

        let summary = engine.run(config(&dirs), &Recorder::new());
        assert!(summary.success, "engine should accept a new run");
    }

    #[test]
    fn test_file_failure_aborts_remaining_files() {
        let dirs = dirs();
        for name in ["a.bin", "b.bin", "c.bin"] {
            fs::write(dirs.input.join(name), b"contents").expect("Failed to write input");
        }
        // A directory in the way cannot be removed as an existing output
        fs::create_dir_all(dirs.output.join("b.bin").join("inner"))
            .expect("Failed to create blocking dir");

        let engine = ConversionEngine::new();
        let recorder = Recorder::new();
        let summary = engine.run(config(&dirs).with_overwrite(true), &recorder);

        assert!(!summary.success);
        assert_eq!(summary.state, EngineState::Failed);

        let events = recorder.events();
        let converting: Vec<String> = events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::Progress(p) => p
                    .message
                    .strip_prefix("Converting: ")
                    .map(str::to_string),
                _ => None,
            })
            .collect();
        assert_eq!(converting.last().map(String::as_str), Some("b.bin"));
        let before = &converting[..converting.len() - 1];
        assert_eq!(summary.files_converted, before.len() as u64);

        let errors: Vec<&String> = events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::Error { message } => Some(message),
                _ => None,
            })
            .collect();
        assert_eq!(errors.len(), 1);
        assert!(
            errors[0].starts_with("Conversion failed: Cannot remove"),
            "{}",
            errors[0]
        );
        assert_eq!(events.last(), Some(&EngineEvent::Outcome { success: false }));
        assert!(!events.contains(&status(MSG_FINISHED)));

        // Only files listed ahead of the failure reach the output
        for name in ["a.bin", "c.bin"] {
            let expected = before.iter().any(|n| n == name);
            assert_eq!(dirs.output.join(name).is_file(), expected, "{}", name);
        }
    }

    #[test]
    fn test_periodic_picks_up_new_files_each_cycle() {
        let dirs = dirs();
        fs::write(dirs.input.join("first.bin"), b"first").expect("Failed to write first");

        let engine = ConversionEngine::new();
        let handle = engine.interrupt_handle();
        let input = dirs.input.clone();
        let waits = Mutex::new(0u32);
        let recorder = Recorder::with_hook(move |event| {
            if let EngineEvent::Progress(p) = event {
                if p.message.starts_with("Waiting") {
                    let mut waits = waits.lock().unwrap();
                    *waits += 1;
                    if *waits == 1 {
                        fs::write(input.join("second.bin"), b"second").unwrap();
                    } else {
                        handle.request();
                    }
                }
            }
        });

        let cfg = config(&dirs).with_interval(0).with_delete_source(true);
        let summary = engine.run_periodic(cfg, &recorder);

        assert!(summary.success);
        assert_eq!(summary.cycles, 2);
        assert_eq!(summary.files_converted, 2);
        assert_eq!(decode(&dirs.output.join("second.bin")), b"second");
        assert_eq!(count_outcomes(&recorder.events()), 1);
    }

    #[test]
    fn test_periodic_interrupt_mid_cycle_exits_loop() {
        let dirs = dirs();
        fs::write(dirs.input.join("a.bin"), b"aaaaaaaa").expect("Failed to write a");
        fs::write(dirs.input.join("b.bin"), b"bbbbbbbb").expect("Failed to write b");

        let engine = ConversionEngine::new();
        let recorder = Recorder::interrupting_on(engine.interrupt_handle(), "Converting: ");
        let summary = engine.run_periodic(config(&dirs).with_interval(3600), &recorder);

        assert!(summary.success);
        assert_eq!(summary.cycles, 1);
        assert_eq!(summary.files_converted, 1);
        assert!(!recorder.messages().iter().any(|m| m.starts_with("Waiting")));
    }

    #[test]
    fn test_periodic_with_bad_mask_fails() {
        let dirs = dirs();
        let engine = ConversionEngine::new();
        let recorder = Recorder::new();
        let cfg = ConversionConfig::new(&dirs.input, &dirs.output, "GG 00 00 00 00 00 00 00");
        let summary = engine.run_periodic(cfg, &recorder);

        assert!(!summary.success);
        let events = recorder.events();
        assert!(matches!(events[0], EngineEvent::Error { .. }));
        assert_eq!(events[1], EngineEvent::Outcome { success: false });
    }

    #[test]
    fn test_second_run_is_rejected_while_busy() {
        let dirs = dirs();
        let engine = Arc::new(ConversionEngine::new());
        let handle = engine
            .spawn(config(&dirs).with_interval(3600), RunMode::Periodic)
            .expect("Failed to spawn");
        recv_until(handle.events(), |e| {
            matches!(e, EngineEvent::Progress(p) if p.message.starts_with("Waiting"))
        });

        let recorder = Recorder::new();
        let rejected = engine.run(config(&dirs), &recorder);
        assert!(!rejected.success);
        assert_eq!(
            recorder.messages(),
            vec!["error: A conversion is already running", "outcome: false"]
        );
        // The active run is unaffected
        assert_eq!(engine.state(), EngineState::Running);

        handle.request_interrupt();
        recv_until(handle.events(), |e| e.is_terminal());
        let summary = handle.join().expect("worker panicked");
        assert!(summary.success);
        assert_eq!(engine.state(), EngineState::Cancelled);
    }
}
