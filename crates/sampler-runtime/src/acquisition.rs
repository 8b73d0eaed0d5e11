//! Bounded-duration sampling session.
//!
//! Each iteration:
//! 1. Wait for the next scheduler tick
//! 2. Acquire one sweep
//! 3. Integrate it to total power
//! 4. Map the tick instant to Unix time
//! 5. Append the sample to the sink
//!
//! The loop ends once wall-clock time since session start reaches the
//! configured duration, or when the stop flag is raised.

use crate::scheduler::PrecisionScheduler;
use sampler_common::config::{AcquisitionConfig, SchedulerConfig};
use sampler_common::error::SamplerResult;
use sampler_common::metrics::{LatenessSnapshot, TickMetrics};
use sampler_common::time::ClockAnchor;
use sampler_device::{PowerIntegrator, Sample, SampleSink, SpectrumAnalyzer, SweepSettings};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Lateness values kept for percentiles.
const LATENESS_HISTORY: usize = 10_000;

/// Outcome of a completed session.
#[derive(Debug, Clone, Copy)]
pub struct SessionSummary {
    /// Samples written to the sink.
    pub samples: u64,
    /// Wall-clock length of the timed loop.
    pub elapsed: Duration,
    /// `samples / elapsed`.
    pub achieved_frequency_hz: f64,
    /// Ticks that fired without waiting.
    pub overdue_ticks: u64,
    /// Lateness of ticks relative to their grid instants.
    pub lateness: LatenessSnapshot,
    /// Whether the session ended on the stop flag rather than its duration.
    pub stopped_early: bool,
}

/// Drives one sampling session.
#[derive(Debug)]
pub struct AcquisitionLoop {
    config: AcquisitionConfig,
    scheduler: PrecisionScheduler,
    metrics: TickMetrics,
    stop: Option<Arc<AtomicBool>>,
    samples: u64,
}

impl AcquisitionLoop {
    /// Create a loop for a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SamplerError::Config`](sampler_common::SamplerError::Config)
    /// if the acquisition config is invalid.
    pub fn new(config: AcquisitionConfig, scheduler: &SchedulerConfig) -> SamplerResult<Self> {
        config.validate()?;
        let scheduler = PrecisionScheduler::from_frequency(config.target_frequency_hz, scheduler)?;
        Ok(Self {
            config,
            scheduler,
            metrics: TickMetrics::new(LATENESS_HISTORY),
            stop: None,
            samples: 0,
        })
    }

    /// End the session early when `flag` becomes true.
    #[must_use]
    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop = Some(flag);
        self
    }

    /// Samples written in the current or last session.
    pub fn sample_count(&self) -> u64 {
        self.samples
    }

    /// The scheduler driving the loop.
    pub fn scheduler(&self) -> &PrecisionScheduler {
        &self.scheduler
    }

    /// Tick lateness metrics for the current or last session.
    pub fn metrics(&self) -> &TickMetrics {
        &self.metrics
    }

    /// Configure the device, start sweeping, and discard warm-up sweeps.
    ///
    /// Runs before the scheduler starts so warm-up latency never shows up in
    /// recorded timing.
    ///
    /// # Errors
    ///
    /// Propagates any device failure.
    pub fn prepare<D: SpectrumAnalyzer>(&self, device: &mut D) -> SamplerResult<PowerIntegrator> {
        let settings = SweepSettings::from(&self.config);
        info!(
            center_hz = settings.center_frequency_hz,
            span_hz = settings.span_hz,
            rbw_hz = settings.rbw_hz,
            "Configuring analyzer"
        );
        device.configure(&settings)?;
        device.initiate()?;

        let info = device.sweep_info()?;
        debug!(
            bins = info.sweep_length,
            start_hz = info.start_frequency_hz,
            bin_size_hz = info.bin_size_hz,
            "Sweep geometry"
        );

        for _ in 0..self.config.warmup_sweeps {
            device.get_sweep()?;
        }
        debug!(sweeps = self.config.warmup_sweeps, "Warm-up complete");

        Ok(PowerIntegrator::new(
            info.bin_size_hz,
            self.config.calibration_offset_db,
        ))
    }

    /// Run a full session: prepare the device, then sample until the
    /// configured duration elapses.
    ///
    /// The sink is flushed on every exit path; on failure the flush is
    /// best-effort and the original error is returned.
    ///
    /// # Errors
    ///
    /// Propagates device and sink failures. Lateness is never an error.
    pub fn run<D, S>(&mut self, device: &mut D, sink: &mut S) -> SamplerResult<SessionSummary>
    where
        D: SpectrumAnalyzer,
        S: SampleSink + ?Sized,
    {
        let integrator = self.prepare(device)?;

        match self.timed_loop(device, sink, &integrator) {
            Ok(summary) => {
                sink.flush()?;
                info!(
                    samples = summary.samples,
                    elapsed_s = summary.elapsed.as_secs_f64(),
                    achieved_hz = summary.achieved_frequency_hz,
                    overdue = summary.overdue_ticks,
                    coarse_sleeps = self.scheduler.coarse_sleeps(),
                    max_lateness_us = summary.lateness.max.map_or(0, |d| d.as_micros()),
                    stopped_early = summary.stopped_early,
                    "Session complete"
                );
                Ok(summary)
            }
            Err(e) => {
                warn!(samples = self.samples, "Session aborted: {e}");
                if let Err(flush_err) = sink.flush() {
                    warn!("Flushing samples after abort failed: {flush_err}");
                }
                Err(e)
            }
        }
    }

    fn timed_loop<D, S>(
        &mut self,
        device: &mut D,
        sink: &mut S,
        integrator: &PowerIntegrator,
    ) -> SamplerResult<SessionSummary>
    where
        D: SpectrumAnalyzer,
        S: SampleSink + ?Sized,
    {
        let duration = self.config.session_duration;
        let status_every = status_interval(self.config.target_frequency_hz);

        let anchor = ClockAnchor::now();
        let session_start: Instant = anchor.monotonic();
        self.scheduler.start();
        self.metrics.reset();
        self.samples = 0;

        info!(
            duration_s = duration.as_secs_f64(),
            target_hz = self.config.target_frequency_hz,
            unix_start = anchor.unix_seconds(),
            "Timed sampling started"
        );

        let mut stopped_early = false;
        while session_start.elapsed() < duration {
            if self.stop_requested() {
                info!(samples = self.samples, "Stop requested, ending session");
                stopped_early = true;
                break;
            }

            let tick = self.scheduler.wait_for_next_tick()?;
            self.metrics.record(tick.lateness(), tick.overdue);
            if tick.overdue {
                warn!(
                    sequence = tick.sequence,
                    behind_us = tick.lateness().as_micros(),
                    "Tick overdue, catching up on the original grid"
                );
            }

            let sweep = device.get_sweep()?;
            let sample = Sample {
                unix_timestamp: anchor.to_unix_seconds(tick.fired_at),
                power_dbm: integrator.total_power_dbm(&sweep.max),
            };
            sink.append(&sample)?;
            self.samples += 1;

            trace!(
                sequence = tick.sequence,
                power_dbm = sample.power_dbm,
                "Sample recorded"
            );

            if self.samples % status_every == 0 {
                info!(
                    samples = self.samples,
                    mean_lateness_us = self.metrics.mean().map_or(0, |d| d.as_micros()),
                    max_lateness_us = self.metrics.max().map_or(0, |d| d.as_micros()),
                    overdue = self.metrics.overdue_count(),
                    "Periodic status"
                );
            }
        }

        let elapsed = session_start.elapsed();
        #[allow(clippy::cast_precision_loss)]
        let achieved_frequency_hz = if elapsed.is_zero() {
            0.0
        } else {
            self.samples as f64 / elapsed.as_secs_f64()
        };

        Ok(SessionSummary {
            samples: self.samples,
            elapsed,
            achieved_frequency_hz,
            overdue_ticks: self.scheduler.overdue_ticks(),
            lateness: self.metrics.snapshot(),
            stopped_early,
        })
    }

    fn stop_requested(&self) -> bool {
        self.stop
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

/// Samples between status lines: about one per minute.
fn status_interval(target_frequency_hz: f64) -> u64 {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let per_minute = (target_frequency_hz * 60.0).round() as u64;
    per_minute.max(1)
}
