//! Scheduler acceptance tests.
//!
//! # Acceptance Criteria
//!
//! - Mean spacing over 1000 ticks within 0.5 ms of the interval
//! - Returned instants strictly increasing
//! - Overdue ticks return immediately and the grid is never re-anchored

use super::common::{abs_diff, mean_spacing};
use sampler_common::config::SchedulerConfig;
use sampler_common::SamplerError;
use sampler_runtime::PrecisionScheduler;
use std::time::{Duration, Instant};

#[test]
fn test_thousand_ticks_mean_spacing() {
    let interval = Duration::from_millis(5);
    let mut scheduler = PrecisionScheduler::with_config(interval, &SchedulerConfig::default());
    scheduler.start();

    let fired: Vec<Instant> = (0..1000)
        .map(|_| scheduler.wait_for_next_tick().unwrap().fired_at)
        .collect();

    let mean = mean_spacing(&fired);
    println!("Mean spacing over 1000 ticks: {mean:?}");
    assert!(
        abs_diff(mean, interval) < Duration::from_micros(500),
        "mean spacing {mean:?} too far from {interval:?}"
    );

    for pair in fired.windows(2) {
        assert!(pair[1] > pair[0], "instants must be strictly increasing");
    }
}

#[test]
fn test_ticks_never_fire_before_target() {
    let mut scheduler = PrecisionScheduler::new(Duration::from_millis(2));
    scheduler.start();

    for _ in 0..200 {
        let tick = scheduler.wait_for_next_tick().unwrap();
        assert!(tick.fired_at >= tick.target);
    }
}

#[test]
fn test_catch_up_keeps_grid() {
    let interval = Duration::from_millis(10);
    let mut scheduler = PrecisionScheduler::new(interval);
    let epoch = scheduler.start();

    // Stall for several intervals; the missed grid points fire back-to-back.
    std::thread::sleep(Duration::from_millis(45));

    let burst_start = Instant::now();
    let mut overdue = 0;
    loop {
        let tick = scheduler.wait_for_next_tick().unwrap();
        if !tick.overdue {
            assert_eq!(tick.target, epoch + interval * u32::try_from(tick.sequence).unwrap());
            break;
        }
        overdue += 1;
    }

    assert!(overdue >= 3, "expected catch-up ticks, got {overdue}");
    assert_eq!(scheduler.overdue_ticks(), overdue);
    assert!(burst_start.elapsed() < Duration::from_millis(25));
}

#[test]
fn test_wait_requires_start() {
    let mut scheduler = PrecisionScheduler::new(Duration::from_millis(20));
    assert!(matches!(
        scheduler.wait_for_next_tick(),
        Err(SamplerError::SchedulerNotStarted)
    ));
}
