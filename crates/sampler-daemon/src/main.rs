//! Power sampler entry point.
//!
//! `acquire` runs one fixed-rate acquisition session and writes a
//! `HHMMSS.txt` record; `analyze` reports interval statistics for a
//! recorded file. With no subcommand, a session runs with the resolved
//! configuration.

mod signals;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sampler_common::config::{interval_for_frequency, SessionConfig};
use sampler_device::{open_device, session_file_path, RecordWriter};
use sampler_runtime::acquisition::{AcquisitionLoop, SessionSummary};
use sampler_runtime::analyzer::analyze_file;
use sampler_runtime::realtime::{EnvironmentGuard, ProcessTimingEnvironment};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::signals::StopSignals;

/// Default nominal rate for `analyze`.
const DEFAULT_ANALYZE_HZ: f64 = 50.0;

/// Power sampler command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "power-sampler",
    about = "Fixed-rate RF power sampler - timed acquisition sessions and timing analysis",
    version,
    long_about = None
)]
struct Args {
    /// Path to a session configuration file (TOML).
    #[arg(long, short = 'c', value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, short = 'l', default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Run one acquisition session.
    Acquire {
        /// Session length, e.g. "100min" or "30s" (overrides config file).
        #[arg(long, short = 'd', value_parser = humantime::parse_duration)]
        duration: Option<Duration>,

        /// Directory for the record file (overrides config file).
        #[arg(long, short = 'o', value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Skip process priority and timer slack adjustments.
        #[arg(long)]
        no_tuning: bool,
    },

    /// Report timing statistics for a recorded session file.
    Analyze {
        /// Record file to analyze.
        file: Option<PathBuf>,

        /// Nominal sampling rate of the recording in Hz.
        #[arg(long, default_value_t = DEFAULT_ANALYZE_HZ)]
        target_hz: f64,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let mut args = Args::parse();

    init_logging(&args.log_level);

    match args.command.take() {
        Some(Command::Analyze {
            file,
            target_hz,
            json,
        }) => run_analyze(file.as_deref(), target_hz, json),
        Some(Command::Acquire {
            duration,
            output_dir,
            no_tuning,
        }) => {
            let mut config = load_config(&args)?;
            if let Some(duration) = duration {
                config.acquisition.session_duration = duration;
            }
            if let Some(dir) = output_dir {
                config.output.directory = dir;
            }
            if no_tuning {
                config.environment.enabled = false;
            }
            run_session(&config)
        }
        None => {
            let config = load_config(&args)?;
            run_session(&config)
        }
    }
}

/// Initialize logging with the specified log level.
fn init_logging(level: &str) {
    let filter = format!(
        "power_sampler={level},sampler_runtime={level},sampler_device={level},sampler_common={level}"
    );

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&filter)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Resolution priority (first existing file wins):
/// 1. Command-line `--config` argument
/// 2. `SAMPLER_CONFIG_PATH` environment variable
/// 3. `config/default.toml` (local development)
/// 4. Built-in defaults
fn load_config(args: &Args) -> Result<SessionConfig> {
    if let Some(config_path) = &args.config {
        info!(?config_path, "Loading config from command-line argument");
        return SessionConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()));
    }

    if let Ok(env_path) = std::env::var("SAMPLER_CONFIG_PATH") {
        let config_path = PathBuf::from(&env_path);
        if config_path.exists() {
            info!(?config_path, "Loading config from SAMPLER_CONFIG_PATH");
            return SessionConfig::from_file(&config_path).with_context(|| {
                format!("Failed to load config from SAMPLER_CONFIG_PATH={env_path}")
            });
        }
        warn!(
            path = %env_path,
            "SAMPLER_CONFIG_PATH set but file does not exist, checking other locations"
        );
    }

    let local_path = PathBuf::from("config/default.toml");
    if local_path.exists() {
        info!(?local_path, "Loading config from local path");
        return SessionConfig::from_file(&local_path)
            .with_context(|| format!("Failed to load config from {}", local_path.display()));
    }

    info!("No config file found, using built-in defaults");
    Ok(SessionConfig::default())
}

/// Run one acquisition session end to end.
///
/// Teardown runs in reverse order of setup on every path: the record file
/// is flushed by the loop, the device guard closes the handle, and the
/// environment guard reverts priority and timer slack.
fn run_session(config: &SessionConfig) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        target_hz = config.acquisition.target_frequency_hz,
        duration = %humantime::format_duration(config.acquisition.session_duration),
        center_hz = config.acquisition.center_frequency_hz,
        span_hz = config.acquisition.span_hz,
        "Starting acquisition session"
    );

    let signals = StopSignals::install().context("Failed to set up signal handlers")?;

    let mut acquisition = AcquisitionLoop::new(config.acquisition.clone(), &config.scheduler)
        .context("Invalid acquisition configuration")?
        .with_stop_flag(signals.stop_flag());

    let environment =
        EnvironmentGuard::apply(ProcessTimingEnvironment::new(config.environment.clone()));
    if environment.status().is_untuned() {
        info!("Running without process timing adjustments");
    }

    let mut device = open_device(&config.device).context("Failed to open spectrum analyzer")?;

    let path = session_file_path(&config.output.directory);
    let mut writer = RecordWriter::create(&path)
        .with_context(|| format!("Failed to create record file {}", path.display()))?;
    info!(path = %path.display(), "Writing samples");

    let summary = acquisition
        .run(&mut *device, &mut writer)
        .context("Acquisition session failed")?;
    info!(records = writer.written(), path = %path.display(), "Record file complete");

    device.close().context("Failed to close spectrum analyzer")?;
    drop(environment);

    report_summary(&summary, &path);
    if signals.received() > 0 {
        info!(signals = signals.received(), "Session stopped by signal");
    }
    Ok(())
}

fn report_summary(summary: &SessionSummary, path: &Path) {
    println!("Samples:            {}", summary.samples);
    println!("Elapsed:            {:.2} s", summary.elapsed.as_secs_f64());
    println!("Achieved rate:      {:.3} Hz", summary.achieved_frequency_hz);
    println!("Overdue ticks:      {}", summary.overdue_ticks);
    if let Some(max) = summary.lateness.max {
        println!("Max lateness:       {} us", max.as_micros());
    }
    if let Some(p99) = summary.lateness.p99 {
        println!("P99 lateness:       {} us", p99.as_micros());
    }
    if summary.stopped_early {
        println!("Stopped early:      yes");
    }
    println!("Record file:        {}", path.display());
}

/// Analyze a recorded session file.
///
/// Analysis failures are reported to the user rather than failing the
/// process; a missing file argument prints usage.
fn run_analyze(file: Option<&Path>, target_hz: f64, json: bool) -> Result<()> {
    let Some(file) = file else {
        println!("Usage: power-sampler analyze <timestamp_file> [--target-hz HZ]");
        return Ok(());
    };

    let target_interval = match interval_for_frequency(target_hz) {
        Ok(interval) => interval,
        Err(e) => anyhow::bail!("invalid --target-hz: {e}"),
    };

    match analyze_file(file, target_interval) {
        Ok(report) if json => {
            let text =
                serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
            println!("{text}");
        }
        Ok(report) => {
            println!("Timing analysis of {}", file.display());
            println!("{report}");
        }
        Err(e) => println!("Error analyzing file: {e}"),
    }
    Ok(())
}
