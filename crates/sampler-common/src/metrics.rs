//! Tick lateness metrics for live sessions.
//!
//! Lateness is how far after its nominal target instant a tick actually
//! fired. A ring buffer keeps the most recent values for percentiles
//! without growing over a multi-hour session.

use std::time::Duration;

/// Per-tick lateness metrics with a ring buffer for percentile queries.
#[derive(Debug)]
pub struct TickMetrics {
    /// Ring buffer of lateness values in nanoseconds.
    samples: Box<[u64]>,
    /// Current write position in the ring buffer.
    write_pos: usize,
    /// Number of samples held (saturates at buffer size).
    sample_count: usize,
    /// Total ticks recorded.
    total_ticks: u64,
    /// Smallest lateness in nanoseconds.
    min_ns: u64,
    /// Largest lateness in nanoseconds.
    max_ns: u64,
    /// Sum of lateness for mean calculation.
    sum_ns: u64,
    /// Ticks that were already overdue when checked.
    overdue_count: u64,
}

impl TickMetrics {
    /// Create a collector retaining the last `histogram_size` values.
    #[must_use]
    pub fn new(histogram_size: usize) -> Self {
        let size = histogram_size.max(1);
        Self {
            samples: vec![0u64; size].into_boxed_slice(),
            write_pos: 0,
            sample_count: 0,
            total_ticks: 0,
            min_ns: u64::MAX,
            max_ns: 0,
            sum_ns: 0,
            overdue_count: 0,
        }
    }

    /// Record one tick's lateness.
    ///
    /// Allocation-free so it can sit inside the sampling loop.
    pub fn record(&mut self, lateness: Duration, overdue: bool) {
        let ns = u64::try_from(lateness.as_nanos()).unwrap_or(u64::MAX);

        self.samples[self.write_pos] = ns;
        self.write_pos = (self.write_pos + 1) % self.samples.len();
        self.sample_count = self.sample_count.saturating_add(1).min(self.samples.len());

        self.total_ticks += 1;
        self.min_ns = self.min_ns.min(ns);
        self.max_ns = self.max_ns.max(ns);
        self.sum_ns = self.sum_ns.saturating_add(ns);

        if overdue {
            self.overdue_count += 1;
        }
    }

    /// Total ticks recorded.
    #[must_use]
    pub fn total_ticks(&self) -> u64 {
        self.total_ticks
    }

    /// Ticks that fired without waiting because their target had passed.
    #[must_use]
    pub fn overdue_count(&self) -> u64 {
        self.overdue_count
    }

    /// Smallest observed lateness.
    #[must_use]
    pub fn min(&self) -> Option<Duration> {
        (self.total_ticks > 0).then(|| Duration::from_nanos(self.min_ns))
    }

    /// Largest observed lateness.
    #[must_use]
    pub fn max(&self) -> Option<Duration> {
        (self.total_ticks > 0).then(|| Duration::from_nanos(self.max_ns))
    }

    /// Mean lateness.
    #[must_use]
    pub fn mean(&self) -> Option<Duration> {
        (self.total_ticks > 0).then(|| Duration::from_nanos(self.sum_ns / self.total_ticks))
    }

    /// Compute a percentile over the retained window.
    ///
    /// Returns `None` with no samples or a percentile outside `0.0..=100.0`.
    #[must_use]
    pub fn percentile(&self, percentile: f64) -> Option<Duration> {
        if self.sample_count == 0 || !(0.0..=100.0).contains(&percentile) {
            return None;
        }

        let mut sorted: Vec<u64> = self.samples[..self.sample_count].to_vec();
        sorted.sort_unstable();

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
        let idx = ((percentile / 100.0) * (sorted.len() - 1) as f64).round() as usize;
        let idx = idx.min(sorted.len() - 1);

        Some(Duration::from_nanos(sorted[idx]))
    }

    /// Get a snapshot of current metrics.
    #[must_use]
    pub fn snapshot(&self) -> LatenessSnapshot {
        LatenessSnapshot {
            total_ticks: self.total_ticks,
            overdue_count: self.overdue_count,
            min: self.min(),
            max: self.max(),
            mean: self.mean(),
            p99: self.percentile(99.0),
        }
    }

    /// Reset all metrics to initial state.
    pub fn reset(&mut self) {
        self.samples.fill(0);
        self.write_pos = 0;
        self.sample_count = 0;
        self.total_ticks = 0;
        self.min_ns = u64::MAX;
        self.max_ns = 0;
        self.sum_ns = 0;
        self.overdue_count = 0;
    }
}

/// Immutable lateness summary for reporting.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct LatenessSnapshot {
    /// Total ticks recorded.
    pub total_ticks: u64,
    /// Ticks that fired without waiting.
    pub overdue_count: u64,
    /// Smallest lateness.
    pub min: Option<Duration>,
    /// Largest lateness.
    pub max: Option<Duration>,
    /// Mean lateness.
    pub mean: Option<Duration>,
    /// 99th percentile over the retained window.
    pub p99: Option<Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_recording() {
        let mut metrics = TickMetrics::new(100);

        metrics.record(Duration::from_micros(5), false);
        metrics.record(Duration::from_micros(60), false);
        metrics.record(Duration::from_micros(10), false);

        assert_eq!(metrics.total_ticks(), 3);
        assert_eq!(metrics.min(), Some(Duration::from_micros(5)));
        assert_eq!(metrics.max(), Some(Duration::from_micros(60)));
        assert_eq!(metrics.mean(), Some(Duration::from_micros(25)));
    }

    #[test]
    fn test_overdue_counting() {
        let mut metrics = TickMetrics::new(100);

        metrics.record(Duration::from_micros(3), false);
        metrics.record(Duration::from_millis(7), true);
        metrics.record(Duration::from_millis(2), true);

        assert_eq!(metrics.overdue_count(), 2);
    }

    #[test]
    fn test_percentile_calculation() {
        let mut metrics = TickMetrics::new(100);

        for i in 1..=100 {
            metrics.record(Duration::from_micros(i), false);
        }

        let p50 = metrics.percentile(50.0).unwrap();
        assert!(p50.as_micros() >= 49 && p50.as_micros() <= 51);

        let p99 = metrics.percentile(99.0).unwrap();
        assert!(p99.as_micros() >= 98 && p99.as_micros() <= 100);

        assert!(metrics.percentile(-1.0).is_none());
        assert!(metrics.percentile(101.0).is_none());
        assert!(metrics.percentile(f64::NAN).is_none());
    }

    #[test]
    fn test_ring_buffer_wrapping() {
        let mut metrics = TickMetrics::new(10);

        for i in 0..25 {
            metrics.record(Duration::from_micros(i), false);
        }

        assert_eq!(metrics.total_ticks(), 25);
        // Only the last ten (15..25 µs) remain for percentiles
        assert_eq!(metrics.percentile(0.0), Some(Duration::from_micros(15)));
    }

    #[test]
    fn test_reset() {
        let mut metrics = TickMetrics::new(100);
        metrics.record(Duration::from_micros(500), true);

        metrics.reset();

        assert_eq!(metrics.total_ticks(), 0);
        assert_eq!(metrics.overdue_count(), 0);
        assert!(metrics.min().is_none());
        assert!(metrics.percentile(50.0).is_none());
    }

    #[test]
    fn test_snapshot() {
        let mut metrics = TickMetrics::new(100);
        metrics.record(Duration::from_micros(4), false);
        metrics.record(Duration::from_micros(6), true);

        let snap = metrics.snapshot();
        assert_eq!(snap.total_ticks, 2);
        assert_eq!(snap.overdue_count, 1);
        assert_eq!(snap.min, Some(Duration::from_micros(4)));
        assert_eq!(snap.max, Some(Duration::from_micros(6)));
    }
}
