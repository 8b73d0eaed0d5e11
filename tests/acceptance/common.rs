//! Common utilities for integration tests.

use sampler_common::config::AcquisitionConfig;
use sampler_device::SimulatedAnalyzer;
use std::time::{Duration, Instant};

/// Acquisition config for a short session at `hz` with minimal warm-up.
pub fn session_config(hz: f64, duration: Duration) -> AcquisitionConfig {
    AcquisitionConfig {
        target_frequency_hz: hz,
        session_duration: duration,
        warmup_sweeps: 2,
        ..Default::default()
    }
}

/// Simulated analyzer that answers instantly with a flat -100 dBm trace.
pub fn instant_analyzer() -> SimulatedAnalyzer {
    SimulatedAnalyzer::new(1000, -100.0, Duration::ZERO)
}

/// Mean spacing between consecutive instants.
pub fn mean_spacing(instants: &[Instant]) -> Duration {
    assert!(instants.len() >= 2, "need at least two instants");
    let span = instants[instants.len() - 1] - instants[0];
    span / u32::try_from(instants.len() - 1).expect("instant count fits u32")
}

/// Absolute difference of two durations.
pub fn abs_diff(a: Duration, b: Duration) -> Duration {
    if a > b {
        a - b
    } else {
        b - a
    }
}
