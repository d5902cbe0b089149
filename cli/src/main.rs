//! MaskConv - Command-line interface for the conversion engine.
//!
//! Builds a run from command-line flags, starts it on a worker thread and
//! reports its events to stderr (or as JSON lines on stdout). Ctrl-C asks
//! the engine to stop at its next checkpoint.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use maskconv_engine::{
    ConversionConfig, ConversionEngine, EngineEvent, InterruptHandle, ProgressEvent, RunMode,
    RunSummary,
};
use tracing_subscriber::EnvFilter;

/// MaskConv - XOR-convert every matching file in a directory
#[derive(Parser, Debug)]
#[command(name = "maskconv")]
#[command(version = "0.1.0")]
#[command(about = "XOR files with an 8-byte mask, once or on a timer")]
struct Args {
    /// Directory to scan for input files
    #[arg(long, value_name = "PATH")]
    input: PathBuf,

    /// Directory to write converted files to
    #[arg(long, value_name = "PATH")]
    output: PathBuf,

    /// Whitespace-separated glob patterns matched against file names
    #[arg(long, value_name = "PATTERNS", default_value = "*")]
    filter: String,

    /// Eight hex bytes, e.g. "AF BF FF AF F1 F2 1F FF"
    #[arg(long, value_name = "BYTES", env = "MASKCONV_MASK")]
    mask: String,

    /// Delete each source file after converting it
    #[arg(long)]
    delete_source: bool,

    /// Replace existing outputs instead of writing name_(N) copies
    #[arg(long)]
    overwrite: bool,

    /// Include files from subdirectories
    #[arg(long)]
    recursive: bool,

    /// Repeat the conversion every SECS seconds until interrupted
    #[arg(long, value_name = "SECS")]
    interval: Option<u64>,

    /// Print events as JSON lines on stdout
    #[arg(long)]
    json: bool,

    /// Enable verbose output
    #[arg(long)]
    verbose: bool,
}

impl Args {
    fn to_config(&self) -> ConversionConfig {
        let mut config = ConversionConfig::new(&self.input, &self.output, self.mask.clone())
            .with_filter_text(&self.filter)
            .with_delete_source(self.delete_source)
            .with_overwrite(self.overwrite)
            .with_recursive(self.recursive);
        if let Some(secs) = self.interval {
            config = config.with_interval(secs);
        }
        config
    }

    fn mode(&self) -> RunMode {
        if self.interval.is_some() {
            RunMode::Periodic
        } else {
            RunMode::Once
        }
    }
}

/// Prints engine events for a human or as JSON lines.
struct CliReporter {
    json: bool,
    start_time: Instant,
}

impl CliReporter {
    fn new(json: bool) -> Self {
        CliReporter {
            json,
            start_time: Instant::now(),
        }
    }

    fn timestamp() -> String {
        chrono::Local::now().format("%H:%M:%S").to_string()
    }

    fn format_duration(elapsed: std::time::Duration) -> String {
        let secs = elapsed.as_secs();
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        let secs = secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, mins, secs)
        } else if mins > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}s", secs)
        }
    }

    fn format_progress(progress: &ProgressEvent) -> String {
        if progress.is_status() {
            progress.message.clone()
        } else {
            format!(
                "[{}/{}] {}",
                progress.current + 1,
                progress.total,
                progress.message
            )
        }
    }

    fn report(&self, event: &EngineEvent) {
        if self.json {
            match serde_json::to_string(event) {
                Ok(line) => println!("{}", line),
                Err(e) => tracing::warn!(error = %e, "Could not serialize event"),
            }
            return;
        }

        match event {
            EngineEvent::Progress(progress) => {
                eprintln!("{} {}", Self::timestamp(), Self::format_progress(progress));
            }
            EngineEvent::Error { message } => {
                eprintln!("{} Error: {}", Self::timestamp(), message);
            }
            EngineEvent::Outcome { success } => {
                let verdict = if *success { "succeeded" } else { "failed" };
                eprintln!("{} Run {}", Self::timestamp(), verdict);
            }
        }
    }

    fn report_summary(&self, summary: &RunSummary) {
        if self.json {
            match serde_json::to_string(summary) {
                Ok(line) => println!("{}", line),
                Err(e) => tracing::warn!(error = %e, "Could not serialize summary"),
            }
            return;
        }

        eprintln!();
        eprintln!(
            "Summary: {} files converted in {} cycle(s)",
            summary.files_converted, summary.cycles
        );
        eprintln!("Elapsed: {}", Self::format_duration(self.start_time.elapsed()));
    }
}

/// Forward Ctrl-C to the engine until the returned runtime is dropped.
fn install_interrupt_listener(interrupt: InterruptHandle) -> Result<tokio::runtime::Runtime, String> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("maskconv-signal")
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to start signal listener: {}", e))?;

    runtime.spawn(async move {
        // Each Ctrl-C re-sends the request; the engine treats repeats as one
        while tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupt received, stopping after the current file...");
            interrupt.request();
        }
    });

    Ok(runtime)
}

fn init_logging(verbose: bool) {
    // RUST_LOG wins over --verbose
    let default_level = if verbose { "debug" } else { "warn" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

/// Parse and validate command-line arguments, then run the conversion
fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    // Exit code tracking
    let exit_code = match run_cli(&args) {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            2
        }
    };

    std::process::exit(exit_code);
}

/// Main CLI logic - separated for testability
///
/// Returns the success flag of the run's outcome.
fn run_cli(args: &Args) -> Result<bool, String> {
    let engine = Arc::new(ConversionEngine::new());
    let handle = engine
        .spawn(args.to_config(), args.mode())
        .map_err(|e| format!("Could not start conversion: {}", e))?;

    let _signals = install_interrupt_listener(handle.interrupt_handle())?;
    let reporter = CliReporter::new(args.json);

    let mut outcome = None;
    for event in handle.events().iter() {
        reporter.report(&event);
        if let EngineEvent::Outcome { success } = event {
            outcome = Some(success);
            break;
        }
    }

    let summary = handle
        .join()
        .map_err(|e| format!("Conversion worker failed: {}", e))?;
    reporter.report_summary(&summary);

    Ok(outcome.unwrap_or(summary.success))
}
