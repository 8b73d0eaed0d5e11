//! Offline timing analysis of a recorded session.
//!
//! Works only on the timestamps persisted in a record file; it has no tie to
//! a live scheduler.

use sampler_common::error::AnalysisError;
use sampler_device::read_timestamps;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Tolerance for the coarse accuracy bucket, in milliseconds.
pub const WITHIN_1MS: f64 = 1.0;
/// Tolerance for the fine accuracy bucket, in milliseconds.
pub const WITHIN_100US: f64 = 0.1;

/// Interval statistics for one timestamp sequence. Intervals are in milliseconds.
#[derive(Debug, Clone, Serialize)]
pub struct TimingReport {
    /// Number of timestamps.
    pub sample_count: usize,
    /// Last timestamp minus first, in seconds.
    pub duration_s: f64,
    /// Nominal interval the session aimed for.
    pub target_interval_ms: f64,
    /// Mean interval.
    pub mean_interval_ms: f64,
    /// Population standard deviation of the intervals.
    pub stddev_interval_ms: f64,
    /// Shortest interval.
    pub min_interval_ms: f64,
    /// Longest interval.
    pub max_interval_ms: f64,
    /// Largest absolute deviation from the target interval.
    pub max_jitter_ms: f64,
    /// 99th percentile of absolute deviation from the target interval.
    pub p99_jitter_ms: f64,
    /// Observed span minus the nominal span for the same number of intervals.
    pub cumulative_drift_ms: f64,
    /// Intervals per second over the whole sequence.
    pub achieved_frequency_hz: f64,
    /// Intervals strictly within ±1 ms of target.
    pub within_1ms: usize,
    /// Intervals strictly within ±100 µs of target.
    pub within_100us: usize,
    /// Fraction of intervals within ±1 ms of target.
    pub fraction_within_1ms: f64,
    /// Fraction of intervals within ±100 µs of target.
    pub fraction_within_100us: f64,
}

impl TimingReport {
    /// Number of intervals analyzed.
    #[must_use]
    pub fn interval_count(&self) -> usize {
        self.sample_count.saturating_sub(1)
    }
}

/// Successive differences of `timestamps`, converted to milliseconds.
#[must_use]
pub fn intervals_ms(timestamps: &[f64]) -> Vec<f64> {
    timestamps
        .windows(2)
        .map(|pair| (pair[1] - pair[0]) * 1000.0)
        .collect()
}

/// Analyze an ordered sequence of Unix timestamps (seconds).
///
/// # Errors
///
/// - [`AnalysisError::TooFewSamples`] with fewer than 2 timestamps
/// - [`AnalysisError::NonFinite`] if any timestamp is NaN or infinite
/// - [`AnalysisError::InvalidTarget`] if `target_interval` is zero
#[allow(clippy::cast_precision_loss)]
pub fn analyze(timestamps: &[f64], target_interval: Duration) -> Result<TimingReport, AnalysisError> {
    if timestamps.len() < 2 {
        return Err(AnalysisError::TooFewSamples {
            found: timestamps.len(),
        });
    }
    if let Some(index) = timestamps.iter().position(|t| !t.is_finite()) {
        return Err(AnalysisError::NonFinite { index });
    }
    if target_interval.is_zero() {
        return Err(AnalysisError::InvalidTarget);
    }

    let target_ms = target_interval.as_secs_f64() * 1000.0;
    let intervals = intervals_ms(timestamps);
    let n = intervals.len() as f64;

    let mean = intervals.iter().sum::<f64>() / n;
    let variance = intervals.iter().map(|i| (i - mean).powi(2)).sum::<f64>() / n;
    let min = intervals.iter().copied().fold(f64::INFINITY, f64::min);
    let max = intervals.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let mut deviations: Vec<f64> = intervals.iter().map(|i| (i - target_ms).abs()).collect();
    deviations.sort_unstable_by(f64::total_cmp);
    let max_jitter = deviations.last().copied().unwrap_or(0.0);
    let p99_jitter = percentile_sorted(&deviations, 99.0);

    let within_1ms = deviations.iter().filter(|&&d| d < WITHIN_1MS).count();
    let within_100us = deviations.iter().filter(|&&d| d < WITHIN_100US).count();

    let duration_s = timestamps[timestamps.len() - 1] - timestamps[0];
    let cumulative_drift_ms = duration_s * 1000.0 - n * target_ms;
    let achieved_frequency_hz = if duration_s > 0.0 { n / duration_s } else { 0.0 };

    Ok(TimingReport {
        sample_count: timestamps.len(),
        duration_s,
        target_interval_ms: target_ms,
        mean_interval_ms: mean,
        stddev_interval_ms: variance.sqrt(),
        min_interval_ms: min,
        max_interval_ms: max,
        max_jitter_ms: max_jitter,
        p99_jitter_ms: p99_jitter,
        cumulative_drift_ms,
        achieved_frequency_hz,
        within_1ms,
        within_100us,
        fraction_within_1ms: within_1ms as f64 / n,
        fraction_within_100us: within_100us as f64 / n,
    })
}

/// Load a record file and analyze its timestamps.
///
/// # Errors
///
/// Any read, parse, or analysis error.
pub fn analyze_file(path: &Path, target_interval: Duration) -> Result<TimingReport, AnalysisError> {
    let timestamps = read_timestamps(path)?;
    analyze(&timestamps, target_interval)
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn percentile_sorted(sorted: &[f64], percentile: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((percentile / 100.0) * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

impl fmt::Display for TimingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let intervals = self.interval_count();
        #[allow(clippy::cast_precision_loss)]
        let pct = |count: usize| count as f64 / intervals.max(1) as f64 * 100.0;

        writeln!(f, "Samples:            {}", self.sample_count)?;
        writeln!(f, "Duration:           {:.2} s", self.duration_s)?;
        writeln!(f, "Target interval:    {:.1} ms", self.target_interval_ms)?;
        writeln!(f, "Mean interval:      {:.3} ms", self.mean_interval_ms)?;
        writeln!(f, "Std deviation:      {:.3} ms", self.stddev_interval_ms)?;
        writeln!(f, "Min interval:       {:.3} ms", self.min_interval_ms)?;
        writeln!(f, "Max interval:       {:.3} ms", self.max_interval_ms)?;
        writeln!(f, "Max jitter:         {:.3} ms", self.max_jitter_ms)?;
        writeln!(f, "P99 jitter:         {:.3} ms", self.p99_jitter_ms)?;
        writeln!(f, "Cumulative drift:   {:.3} ms", self.cumulative_drift_ms)?;
        writeln!(f, "Achieved rate:      {:.3} Hz", self.achieved_frequency_hz)?;
        writeln!(
            f,
            "Within ±1ms:        {}/{} ({:.1}%)",
            self.within_1ms,
            intervals,
            pct(self.within_1ms)
        )?;
        write!(
            f,
            "Within ±100µs:      {}/{} ({:.1}%)",
            self.within_100us,
            intervals,
            pct(self.within_100us)
        )
    }
}
