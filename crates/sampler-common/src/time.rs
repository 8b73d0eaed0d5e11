//! Monotonic-to-wall-clock mapping.
//!
//! Ticks are measured on the monotonic clock; records carry Unix time. The
//! two are tied together once per session so that every timestamp shares a
//! single offset and inherits the monotonic clock's spacing.

use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::debug;

/// A monotonic instant paired with the wall-clock time read next to it.
#[derive(Debug, Clone, Copy)]
pub struct ClockAnchor {
    monotonic: Instant,
    unix_seconds: f64,
}

impl ClockAnchor {
    /// Capture both clocks now.
    #[must_use]
    pub fn now() -> Self {
        let monotonic = Instant::now();
        let unix_seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0.0, |d| d.as_secs_f64());
        debug!(unix_seconds, "Clock anchor captured");
        Self {
            monotonic,
            unix_seconds,
        }
    }

    /// Build an anchor from explicit readings.
    #[must_use]
    pub fn from_parts(monotonic: Instant, unix_seconds: f64) -> Self {
        Self {
            monotonic,
            unix_seconds,
        }
    }

    /// Monotonic side of the anchor.
    #[must_use]
    pub fn monotonic(&self) -> Instant {
        self.monotonic
    }

    /// Wall-clock side of the anchor, in seconds since the Unix epoch.
    #[must_use]
    pub fn unix_seconds(&self) -> f64 {
        self.unix_seconds
    }

    /// Map a monotonic instant to Unix seconds.
    ///
    /// Instants earlier than the anchor map to earlier Unix times.
    #[must_use]
    pub fn to_unix_seconds(&self, instant: Instant) -> f64 {
        if instant >= self.monotonic {
            self.unix_seconds + (instant - self.monotonic).as_secs_f64()
        } else {
            self.unix_seconds - (self.monotonic - instant).as_secs_f64()
        }
    }
}
