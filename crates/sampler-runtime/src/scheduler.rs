//! Precision periodic scheduler.
//!
//! Tick `n` targets `epoch + n * interval`, always measured from the fixed
//! epoch captured by [`PrecisionScheduler::start`], so a late tick never
//! shifts the ticks after it.
//!
//! Waiting is hybrid:
//! 1. If the target has already passed, return immediately (overdue tick).
//! 2. If more than `spin_threshold` remains, sleep for the remainder minus
//!    `wake_margin`, yielding the CPU for the bulk of the interval.
//! 3. Busy-poll the monotonic clock until the target is reached.
//!
//! The busy-poll phase is bounded by `wake_margin` plus the OS sleep's
//! early-wake error, so CPU burn per tick stays roughly constant regardless
//! of the interval.

use sampler_common::config::{interval_for_frequency, SchedulerConfig};
use sampler_common::error::{SamplerError, SamplerResult};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Result of a single wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// 1-based tick number since the last start.
    pub sequence: u64,
    /// Nominal instant on the epoch grid.
    pub target: Instant,
    /// Monotonic instant at which control returned to the caller.
    pub fired_at: Instant,
    /// Whether the target had already passed when the wait began.
    pub overdue: bool,
}

impl Tick {
    /// How far after its target this tick fired.
    #[must_use]
    pub fn lateness(&self) -> Duration {
        self.fired_at.saturating_duration_since(self.target)
    }
}

/// Fixed-rate scheduler anchored to a start epoch.
///
/// Single-threaded: one owner calls [`wait_for_next_tick`](Self::wait_for_next_tick)
/// in a loop.
#[derive(Debug, Clone)]
pub struct PrecisionScheduler {
    /// Nominal spacing between ticks.
    interval: Duration,
    /// Remaining waits above this use a coarse sleep first.
    spin_threshold: Duration,
    /// How early the coarse sleep aims to wake.
    wake_margin: Duration,
    /// Start instant; `None` until started.
    epoch: Option<Instant>,
    /// Ticks delivered since the last start.
    tick_count: u64,
    /// Instant returned by the previous tick.
    last_fired: Option<Instant>,
    /// Ticks that were overdue when requested.
    overdue_ticks: u64,
    /// Waits that used an OS sleep before spinning.
    coarse_sleeps: u64,
}

impl PrecisionScheduler {
    /// Create an unstarted scheduler with default sleep/spin tuning.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self::with_config(interval, &SchedulerConfig::default())
    }

    /// Create an unstarted scheduler with explicit tuning.
    #[must_use]
    pub fn with_config(interval: Duration, config: &SchedulerConfig) -> Self {
        Self {
            interval,
            spin_threshold: config.spin_threshold,
            wake_margin: config.wake_margin,
            epoch: None,
            tick_count: 0,
            last_fired: None,
            overdue_ticks: 0,
            coarse_sleeps: 0,
        }
    }

    /// Create an unstarted scheduler ticking at `frequency_hz`.
    ///
    /// # Errors
    ///
    /// Returns [`SamplerError::Config`] if the frequency is not positive or
    /// its interval cannot be represented.
    pub fn from_frequency(frequency_hz: f64, config: &SchedulerConfig) -> SamplerResult<Self> {
        let interval = interval_for_frequency(frequency_hz)?;
        Ok(Self::with_config(interval, config))
    }

    /// Capture the epoch and reset the tick count.
    ///
    /// Calling this again restarts the grid from the new epoch with no
    /// memory of earlier ticks.
    pub fn start(&mut self) -> Instant {
        let epoch = Instant::now();
        self.epoch = Some(epoch);
        self.tick_count = 0;
        self.last_fired = None;
        self.overdue_ticks = 0;
        self.coarse_sleeps = 0;

        info!(
            interval_us = self.interval.as_micros(),
            spin_threshold_us = self.spin_threshold.as_micros(),
            wake_margin_us = self.wake_margin.as_micros(),
            "Scheduler started"
        );
        epoch
    }

    /// Whether [`start`](Self::start) has been called.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.epoch.is_some()
    }

    /// Start instant of the current grid.
    #[must_use]
    pub fn epoch(&self) -> Option<Instant> {
        self.epoch
    }

    /// Nominal tick spacing.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Ticks delivered since the last start.
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Ticks that returned without waiting since the last start.
    #[must_use]
    pub fn overdue_ticks(&self) -> u64 {
        self.overdue_ticks
    }

    /// Waits since the last start that slept before spinning.
    #[must_use]
    pub fn coarse_sleeps(&self) -> u64 {
        self.coarse_sleeps
    }

    /// Target instant of the next tick, if started.
    #[must_use]
    pub fn next_target(&self) -> Option<Instant> {
        self.epoch
            .map(|epoch| epoch + grid_offset(self.interval, self.tick_count + 1))
    }

    /// Block until the next grid instant and report when control resumed.
    ///
    /// An overdue tick returns at once and keeps the original grid; the
    /// caller sees back-to-back ticks until it has caught up.
    ///
    /// # Errors
    ///
    /// Returns [`SamplerError::SchedulerNotStarted`] if called before
    /// [`start`](Self::start). Lateness is never an error.
    pub fn wait_for_next_tick(&mut self) -> SamplerResult<Tick> {
        let target = self.next_target().ok_or(SamplerError::SchedulerNotStarted)?;
        let sequence = self.tick_count + 1;
        let now = Instant::now();

        let (fired_at, overdue) = if target <= now {
            self.overdue_ticks += 1;
            debug!(
                sequence,
                behind_us = (now - target).as_micros(),
                "Tick overdue"
            );
            (self.strictly_after_last(now), true)
        } else {
            let remaining = target - now;
            if remaining > self.spin_threshold {
                let coarse = remaining.saturating_sub(self.wake_margin);
                if !coarse.is_zero() {
                    coarse_sleep(coarse);
                    self.coarse_sleeps += 1;
                }
            }
            (spin_until(target), false)
        };

        self.tick_count = sequence;
        self.last_fired = Some(fired_at);

        trace!(
            sequence,
            lateness_ns = fired_at.saturating_duration_since(target).as_nanos(),
            "Tick"
        );

        Ok(Tick {
            sequence,
            target,
            fired_at,
            overdue,
        })
    }

    /// Keep returned instants strictly increasing even for back-to-back
    /// overdue ticks.
    fn strictly_after_last(&self, mut now: Instant) -> Instant {
        if let Some(last) = self.last_fired {
            while now <= last {
                std::hint::spin_loop();
                now = Instant::now();
            }
        }
        now
    }
}

/// `interval * n` without the `u32` limit of `Duration * u32`.
fn grid_offset(interval: Duration, n: u64) -> Duration {
    let total = interval.as_nanos().saturating_mul(u128::from(n));
    let secs = u64::try_from(total / NANOS_PER_SEC).unwrap_or(u64::MAX);
    #[allow(clippy::cast_possible_truncation)]
    let nanos = (total % NANOS_PER_SEC) as u32;
    Duration::new(secs, nanos)
}

/// Busy-poll until `target`, returning the first instant at or past it.
fn spin_until(target: Instant) -> Instant {
    loop {
        let now = Instant::now();
        if now >= target {
            return now;
        }
        std::hint::spin_loop();
    }
}

/// Relative sleep; may wake early or late, the spin phase absorbs either.
#[cfg(target_os = "linux")]
#[allow(unsafe_code)]
fn coarse_sleep(duration: Duration) {
    let ts = libc::timespec {
        tv_sec: libc::time_t::try_from(duration.as_secs()).unwrap_or(libc::time_t::MAX),
        tv_nsec: duration.subsec_nanos().try_into().unwrap_or(0),
    };

    // SAFETY: clock_nanosleep is safe with a valid timespec; a null
    // remainder pointer is allowed for relative sleeps.
    unsafe {
        libc::clock_nanosleep(libc::CLOCK_MONOTONIC, 0, &ts, std::ptr::null_mut());
    }
}

#[cfg(not(target_os = "linux"))]
fn coarse_sleep(duration: Duration) {
    std::thread::sleep(duration);
}
