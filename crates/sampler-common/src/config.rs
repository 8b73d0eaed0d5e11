//! Configuration structures for an acquisition session.
//!
//! Supports TOML deserialization with defaults matching the built-in
//! 50 Hz power-versus-time session.

use crate::error::{SamplerError, SamplerResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level session configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Measurement and timing parameters for the session.
    pub acquisition: AcquisitionConfig,

    /// Sleep/spin tuning for the precision scheduler.
    pub scheduler: SchedulerConfig,

    /// Best-effort process timing adjustments.
    pub environment: EnvironmentConfig,

    /// Spectrum analyzer selection.
    pub device: DeviceConfig,

    /// Where session records are written.
    pub output: OutputConfig,
}

/// Measurement parameters, read-only for the lifetime of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Sweep center frequency in Hz.
    pub center_frequency_hz: f64,

    /// Sweep span in Hz.
    pub span_hz: f64,

    /// Resolution bandwidth in Hz (also used as video bandwidth).
    pub resolution_bandwidth_hz: f64,

    /// Reference level in dBm.
    pub reference_level_dbm: f64,

    /// Detector averaging mode.
    pub averaging: AveragingMode,

    /// Fixed offset added to every computed power value.
    pub calibration_offset_db: f64,

    /// Wall-clock length of the timed loop.
    #[serde(with = "humantime_serde")]
    pub session_duration: Duration,

    /// Sampling rate the scheduler is driven at.
    pub target_frequency_hz: f64,

    /// Sweeps read and discarded before the scheduler starts.
    pub warmup_sweeps: u32,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            center_frequency_hz: 3.4e9,
            span_hz: 100e3,
            resolution_bandwidth_hz: 30e3,
            reference_level_dbm: 0.0,
            averaging: AveragingMode::Average,
            calibration_offset_db: 14.6,
            session_duration: Duration::from_secs(6000),
            target_frequency_hz: 50.0,
            warmup_sweeps: 10,
        }
    }
}

impl AcquisitionConfig {
    /// Nominal spacing between ticks.
    ///
    /// # Errors
    ///
    /// Returns [`SamplerError::Config`] if `target_frequency_hz` has no
    /// representable interval.
    pub fn target_interval(&self) -> SamplerResult<Duration> {
        interval_for_frequency(self.target_frequency_hz)
    }

    /// Check that the session can actually be scheduled.
    ///
    /// # Errors
    ///
    /// Returns [`SamplerError::Config`] describing the first invalid field.
    pub fn validate(&self) -> SamplerResult<()> {
        self.target_interval()?;
        if self.session_duration.is_zero() {
            return Err(SamplerError::Config(
                "session_duration must be greater than zero".into(),
            ));
        }
        if !(self.span_hz.is_finite() && self.span_hz > 0.0) {
            return Err(SamplerError::Config(format!(
                "span_hz must be positive, got {}",
                self.span_hz
            )));
        }
        if !(self.resolution_bandwidth_hz.is_finite() && self.resolution_bandwidth_hz > 0.0) {
            return Err(SamplerError::Config(format!(
                "resolution_bandwidth_hz must be positive, got {}",
                self.resolution_bandwidth_hz
            )));
        }
        Ok(())
    }
}

/// Tick interval for a rate in Hz.
///
/// # Errors
///
/// Returns [`SamplerError::Config`] unless `1 / frequency_hz` is a non-zero
/// [`Duration`]. Rates so small the interval overflows, or so large it
/// rounds to zero, are rejected along with non-positive and non-finite ones.
pub fn interval_for_frequency(frequency_hz: f64) -> SamplerResult<Duration> {
    if !(frequency_hz.is_finite() && frequency_hz > 0.0) {
        return Err(SamplerError::Config(format!(
            "target frequency must be positive, got {frequency_hz} Hz"
        )));
    }
    match Duration::try_from_secs_f64(1.0 / frequency_hz) {
        Ok(interval) if !interval.is_zero() => Ok(interval),
        _ => Err(SamplerError::Config(format!(
            "target frequency {frequency_hz} Hz has no representable tick interval"
        ))),
    }
}

/// Detector averaging mode passed to the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AveragingMode {
    /// Average detector.
    #[default]
    Average,
    /// Min/max detector.
    MinMax,
}

/// Precision scheduler tuning.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Waits longer than this use a coarse OS sleep before spinning.
    #[serde(with = "humantime_serde")]
    pub spin_threshold: Duration,

    /// How early the coarse sleep wakes before the target.
    #[serde(with = "humantime_serde")]
    pub wake_margin: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            spin_threshold: Duration::from_millis(1),
            wake_margin: Duration::from_micros(500),
        }
    }
}

/// Best-effort process timing adjustments.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Apply the adjustments at all.
    pub enabled: bool,

    /// Nice value to request for the process (-20..=19, lower is higher priority).
    pub priority_nice: i32,

    /// Timer slack to request for the sampling thread.
    #[serde(with = "humantime_serde")]
    pub timer_slack: Duration,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            priority_nice: -10,
            timer_slack: Duration::from_micros(1),
        }
    }
}

/// Spectrum analyzer selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Driver type.
    pub driver: DeviceDriver,

    /// Bins per simulated sweep.
    pub bins: usize,

    /// Level of every simulated bin in dBm.
    pub noise_floor_dbm: f32,

    /// Time each simulated sweep takes to acquire.
    #[serde(with = "humantime_serde")]
    pub sweep_latency: Duration,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            driver: DeviceDriver::Simulated,
            bins: 1024,
            noise_floor_dbm: -100.0,
            sweep_latency: Duration::from_millis(2),
        }
    }
}

/// Supported spectrum analyzer drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeviceDriver {
    /// In-process simulated analyzer.
    #[default]
    Simulated,
}

/// Session output location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory the session record file is created in.
    pub directory: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    /// Serialize configuration to TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Serde helper module for `Duration` using humantime format.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
