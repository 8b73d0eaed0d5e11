//! Process timing environment tests.
//!
//! Timer slack is per-thread and needs no privileges. Raising priority
//! needs CAP_SYS_NICE, so that test is ignored by default.

use sampler_common::config::EnvironmentConfig;
use sampler_runtime::{EnvironmentGuard, ProcessTimingEnvironment};
use std::time::Duration;

#[test]
fn test_disabled_environment_is_untuned() {
    let guard = EnvironmentGuard::apply(ProcessTimingEnvironment::new(EnvironmentConfig {
        enabled: false,
        ..Default::default()
    }));
    assert!(guard.status().is_untuned());
}

#[test]
fn test_unprivileged_session_still_gets_environment() {
    // Without privileges the priority change is refused, which must not
    // stop the guard from applying what it can.
    let guard = EnvironmentGuard::apply(ProcessTimingEnvironment::new(EnvironmentConfig::default()));
    if cfg!(target_os = "linux") {
        assert_eq!(guard.status().timer_slack, Some(Duration::from_micros(1)));
    } else {
        assert!(guard.status().is_untuned());
    }
}

#[cfg(target_os = "linux")]
#[test]
#[ignore = "Requires CAP_SYS_NICE or root"]
fn test_priority_raised_and_restored() {
    let config = EnvironmentConfig {
        enabled: true,
        priority_nice: -10,
        timer_slack: Duration::from_micros(1),
    };

    {
        let guard = EnvironmentGuard::apply(ProcessTimingEnvironment::new(config.clone()));
        assert_eq!(guard.status().priority_nice, Some(-10));
    }

    // Once restored, applying again is a fresh increase from the old value.
    let guard = EnvironmentGuard::apply(ProcessTimingEnvironment::new(config));
    assert_eq!(guard.status().priority_nice, Some(-10));
}
