//! Best-effort process timing adjustments.
//!
//! Raises process priority and tightens the thread's timer slack so OS
//! sleeps wake closer to their deadline. Every change is optional: a
//! failure is logged and the session runs on, less precisely.
//!
//! Whatever [`TimingEnvironment::apply`] changed is reverted by
//! [`TimingEnvironment::restore`]; [`EnvironmentGuard`] calls it on drop so
//! the revert also happens on early return or panic.

use sampler_common::config::EnvironmentConfig;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What a timing environment actually managed to change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnvironmentStatus {
    /// Nice value in effect, if priority was changed.
    pub priority_nice: Option<i32>,
    /// Timer slack in effect, if it was changed.
    pub timer_slack: Option<Duration>,
}

impl EnvironmentStatus {
    /// Whether no adjustment took effect.
    #[must_use]
    pub fn is_untuned(&self) -> bool {
        self.priority_nice.is_none() && self.timer_slack.is_none()
    }
}

/// Capability to tune process timing for the duration of a session.
pub trait TimingEnvironment {
    /// Apply adjustments. Never fails; reports what took effect.
    fn apply(&mut self) -> EnvironmentStatus;

    /// Revert everything `apply` changed. Safe to call more than once.
    fn restore(&mut self);
}

/// Environment that changes nothing.
///
/// For tests and platforms without tuning support; sessions are still
/// correct, just not tightened.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEnvironment;

impl TimingEnvironment for NoopEnvironment {
    fn apply(&mut self) -> EnvironmentStatus {
        debug!("Process timing adjustments disabled");
        EnvironmentStatus::default()
    }

    fn restore(&mut self) {}
}

/// OS-backed environment: process nice value and thread timer slack.
#[derive(Debug)]
pub struct ProcessTimingEnvironment {
    config: EnvironmentConfig,
    saved_nice: Option<i32>,
    saved_slack_ns: Option<u64>,
}

impl ProcessTimingEnvironment {
    /// Create an environment from configuration. Nothing changes until `apply`.
    #[must_use]
    pub fn new(config: EnvironmentConfig) -> Self {
        Self {
            config,
            saved_nice: None,
            saved_slack_ns: None,
        }
    }
}

impl TimingEnvironment for ProcessTimingEnvironment {
    fn apply(&mut self) -> EnvironmentStatus {
        if !self.config.enabled {
            info!("Process timing adjustments disabled in configuration");
            return EnvironmentStatus::default();
        }

        let priority_nice = raise_priority(self.config.priority_nice).map(|(previous, applied)| {
            self.saved_nice = Some(previous);
            applied
        });

        let timer_slack = set_timer_slack(self.config.timer_slack).map(|(previous, applied)| {
            self.saved_slack_ns = Some(previous);
            applied
        });

        let status = EnvironmentStatus {
            priority_nice,
            timer_slack,
        };
        info!(?status, "Process timing environment applied");
        status
    }

    fn restore(&mut self) {
        if let Some(previous) = self.saved_nice.take() {
            restore_priority(previous);
        }
        if let Some(previous) = self.saved_slack_ns.take() {
            restore_timer_slack(previous);
        }
    }
}

/// Scoped application of a timing environment.
#[derive(Debug)]
pub struct EnvironmentGuard<E: TimingEnvironment> {
    environment: E,
    status: EnvironmentStatus,
}

impl<E: TimingEnvironment> EnvironmentGuard<E> {
    /// Apply `environment` now; it is restored when the guard drops.
    pub fn apply(mut environment: E) -> Self {
        let status = environment.apply();
        Self {
            environment,
            status,
        }
    }

    /// What took effect.
    pub fn status(&self) -> EnvironmentStatus {
        self.status
    }
}

impl<E: TimingEnvironment> Drop for EnvironmentGuard<E> {
    fn drop(&mut self) {
        self.environment.restore();
    }
}

/// Set the process nice value. Returns `(previous, applied)` on success.
#[cfg(target_os = "linux")]
#[allow(unsafe_code)]
fn raise_priority(nice: i32) -> Option<(i32, i32)> {
    let nice = nice.clamp(-20, 19);

    // getpriority can legitimately return -1, so errno must be cleared first.
    // SAFETY: __errno_location returns the calling thread's errno slot.
    let previous = unsafe {
        *libc::__errno_location() = 0;
        libc::getpriority(libc::PRIO_PROCESS, 0)
    };
    if previous == -1 && std::io::Error::last_os_error().raw_os_error() != Some(0) {
        warn!(
            error = %std::io::Error::last_os_error(),
            "getpriority failed, leaving process priority unchanged"
        );
        return None;
    }

    if previous <= nice {
        debug!(current = previous, requested = nice, "Process priority already at or above requested");
        return None;
    }

    // SAFETY: setpriority on our own process with a clamped nice value.
    let result = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, nice) };
    if result == -1 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EACCES) || err.raw_os_error() == Some(libc::EPERM) {
            warn!(
                "setpriority failed with {err} - running without CAP_SYS_NICE. \
                 Sampling continues at normal priority."
            );
        } else {
            warn!("setpriority failed: {err}");
        }
        return None;
    }

    debug!(previous, applied = nice, "Process priority raised");
    Some((previous, nice))
}

#[cfg(not(target_os = "linux"))]
fn raise_priority(nice: i32) -> Option<(i32, i32)> {
    warn!(nice, "Process priority adjustment not available on this platform");
    None
}

#[cfg(target_os = "linux")]
#[allow(unsafe_code)]
fn restore_priority(previous: i32) {
    // SAFETY: setpriority on our own process; lowering priority is always permitted.
    let result = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, previous) };
    if result == -1 {
        warn!(
            error = %std::io::Error::last_os_error(),
            previous,
            "Failed to restore process priority"
        );
    } else {
        debug!(nice = previous, "Process priority restored");
    }
}

#[cfg(not(target_os = "linux"))]
fn restore_priority(_previous: i32) {}

/// Set the calling thread's timer slack. Returns `(previous_ns, applied)`.
#[cfg(target_os = "linux")]
#[allow(unsafe_code)]
fn set_timer_slack(slack: Duration) -> Option<(u64, Duration)> {
    // A slack of 0 means "reset to default", so the floor is 1ns.
    let requested_ns = u64::try_from(slack.as_nanos()).unwrap_or(u64::MAX).max(1);

    // SAFETY: PR_GET_TIMERSLACK takes no further arguments.
    let previous = unsafe { libc::prctl(libc::PR_GET_TIMERSLACK) };
    let Ok(previous_ns) = u64::try_from(previous) else {
        warn!(
            error = %std::io::Error::last_os_error(),
            "PR_GET_TIMERSLACK failed, leaving timer slack unchanged"
        );
        return None;
    };

    // SAFETY: PR_SET_TIMERSLACK takes a single unsigned long.
    let result = unsafe {
        libc::prctl(
            libc::PR_SET_TIMERSLACK,
            libc::c_ulong::try_from(requested_ns).unwrap_or(libc::c_ulong::MAX),
        )
    };
    if result == -1 {
        warn!(
            error = %std::io::Error::last_os_error(),
            "PR_SET_TIMERSLACK failed, leaving timer slack unchanged"
        );
        return None;
    }

    debug!(previous_ns, requested_ns, "Timer slack set");
    Some((previous_ns, Duration::from_nanos(requested_ns)))
}

#[cfg(not(target_os = "linux"))]
fn set_timer_slack(_slack: Duration) -> Option<(u64, Duration)> {
    warn!("Timer slack adjustment not available on this platform");
    None
}

#[cfg(target_os = "linux")]
#[allow(unsafe_code)]
fn restore_timer_slack(previous_ns: u64) {
    // SAFETY: PR_SET_TIMERSLACK takes a single unsigned long.
    let result = unsafe {
        libc::prctl(
            libc::PR_SET_TIMERSLACK,
            libc::c_ulong::try_from(previous_ns).unwrap_or(libc::c_ulong::MAX),
        )
    };
    if result == -1 {
        warn!(
            error = %std::io::Error::last_os_error(),
            previous_ns,
            "Failed to restore timer slack"
        );
    } else {
        debug!(previous_ns, "Timer slack restored");
    }
}

#[cfg(not(target_os = "linux"))]
fn restore_timer_slack(_previous_ns: u64) {}
