use std::path::PathBuf;
use thiserror::Error;

/// Sampler error types covering configuration, device, persistence, and scheduling failures.
#[derive(Debug, Error)]
pub enum SamplerError {
    /// Configuration or initialization error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Spectrum analyzer open, configure, or sweep failure.
    #[error("device error: {0}")]
    Device(String),

    /// The device handle was used after it had been closed.
    #[error("device is closed")]
    DeviceClosed,

    /// Writing a sample record failed.
    #[error("failed to write sample record: {0}")]
    Sink(#[source] std::io::Error),

    /// The session output file could not be created.
    #[error("failed to create output file {path}: {source}")]
    OutputFile {
        /// Path of the output file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A tick was requested from a scheduler that was never started.
    #[error("scheduler has not been started")]
    SchedulerNotStarted,

    /// Timing analysis failed.
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

/// Convenience type alias for sampler operations.
pub type SamplerResult<T> = Result<T, SamplerError>;

/// Errors reported by the timing analyzer.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Fewer than two timestamps; no interval can be formed.
    #[error("need at least 2 timestamps to analyze, found {found}")]
    TooFewSamples {
        /// Number of timestamps supplied.
        found: usize,
    },

    /// A timestamp was NaN or infinite.
    #[error("timestamp at index {index} is not a finite number")]
    NonFinite {
        /// Position of the offending timestamp.
        index: usize,
    },

    /// The target interval was zero.
    #[error("target interval must be greater than zero")]
    InvalidTarget,

    /// A record line could not be parsed.
    #[error("line {line}: {message}")]
    Parse {
        /// 1-based line number in the record file.
        line: usize,
        /// What was wrong with the line.
        message: String,
    },

    /// The record file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path of the record file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}
