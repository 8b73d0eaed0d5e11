//! End-to-end session tests.
//!
//! A session writes a record file through [`RecordWriter`]; the file is
//! then read back and analyzed the way the `analyze` command does it.

use super::common::{instant_analyzer, session_config};
use sampler_common::config::SchedulerConfig;
use sampler_common::{SamplerError, SamplerResult};
use sampler_device::{
    read_timestamps, session_file_path, OpenDevice, RecordWriter, SimulatedAnalyzer,
    SpectrumAnalyzer, Sweep, SweepInfo, SweepSettings,
};
use sampler_runtime::{analyze_file, AcquisitionLoop, EnvironmentGuard, NoopEnvironment};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_one_second_session_at_50hz() {
    let dir = tempfile::tempdir().unwrap();
    let path = session_file_path(dir.path());

    let _environment = EnvironmentGuard::apply(NoopEnvironment);
    let mut device = OpenDevice::new(instant_analyzer());
    let mut writer = RecordWriter::create(&path).unwrap();

    let mut acquisition =
        AcquisitionLoop::new(session_config(50.0, Duration::from_secs(1)), &SchedulerConfig::default())
            .unwrap();
    let summary = acquisition.run(&mut *device, &mut writer).unwrap();
    assert_eq!(writer.written(), summary.samples);
    drop(writer);
    device.close().unwrap();

    println!(
        "samples={} achieved={:.3} Hz overdue={}",
        summary.samples, summary.achieved_frequency_hz, summary.overdue_ticks
    );
    assert!(
        (45..=52).contains(&summary.samples),
        "unexpected sample count {}",
        summary.samples
    );
    assert!(!summary.stopped_early);

    let timestamps = read_timestamps(&path).unwrap();
    assert_eq!(timestamps.len() as u64, summary.samples);
    for pair in timestamps.windows(2) {
        assert!(pair[1] > pair[0], "timestamps must be strictly increasing");
    }

    let report = analyze_file(&path, Duration::from_millis(20)).unwrap();
    println!("{report}");
    assert_eq!(report.sample_count, timestamps.len());
    assert!((report.mean_interval_ms - 20.0).abs() < 1.0);
    assert!(report.fraction_within_1ms > 0.5);
}

#[test]
fn test_record_lines_are_two_columns() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("120000.txt");

    let mut device = instant_analyzer();
    let mut writer = RecordWriter::create(&path).unwrap();
    let mut acquisition = AcquisitionLoop::new(
        session_config(100.0, Duration::from_millis(100)),
        &SchedulerConfig::default(),
    )
    .unwrap();
    acquisition.run(&mut device, &mut writer).unwrap();
    drop(writer);

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(!content.is_empty());
    for line in content.lines() {
        let fields: Vec<&str> = line.split('\t').collect();
        assert_eq!(fields.len(), 2, "bad line {line:?}");
        let (secs, frac) = fields[0].split_once('.').unwrap();
        assert!(secs.parse::<u64>().unwrap() > 1_600_000_000);
        assert_eq!(frac.len(), 6);
        let (_, power_frac) = fields[1].split_once('.').unwrap();
        assert_eq!(power_frac.len(), 2);
        assert!(fields[1].parse::<f64>().unwrap().is_finite());
    }
}

/// Analyzer wrapper that counts real closes through a shared counter, so the
/// count survives the guard being dropped.
struct CountingAnalyzer {
    inner: SimulatedAnalyzer,
    closes: Arc<AtomicU32>,
}

impl SpectrumAnalyzer for CountingAnalyzer {
    fn configure(&mut self, settings: &SweepSettings) -> SamplerResult<()> {
        self.inner.configure(settings)
    }

    fn initiate(&mut self) -> SamplerResult<()> {
        self.inner.initiate()
    }

    fn sweep_info(&self) -> SamplerResult<SweepInfo> {
        self.inner.sweep_info()
    }

    fn get_sweep(&mut self) -> SamplerResult<Sweep> {
        self.inner.get_sweep()
    }

    fn close(&mut self) -> SamplerResult<()> {
        if self.inner.is_open() {
            self.closes.fetch_add(1, Ordering::Relaxed);
        }
        self.inner.close()
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }
}

#[test]
fn test_device_failure_closes_handle_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("130000.txt");
    let closes = Arc::new(AtomicU32::new(0));

    let result = {
        let mut device = OpenDevice::new(CountingAnalyzer {
            inner: instant_analyzer().failing_after(6),
            closes: Arc::clone(&closes),
        });
        let mut writer = RecordWriter::create(&path).unwrap();
        let mut acquisition = AcquisitionLoop::new(
            session_config(100.0, Duration::from_secs(5)),
            &SchedulerConfig::default(),
        )
        .unwrap();

        let result = acquisition.run(&mut *device, &mut writer);
        assert_eq!(acquisition.sample_count(), 4);
        assert_eq!(closes.load(Ordering::Relaxed), 0);
        result
    };

    assert!(matches!(result, Err(SamplerError::Device(_))));
    assert_eq!(closes.load(Ordering::Relaxed), 1);

    // Samples taken before the failure were flushed.
    let timestamps = read_timestamps(&path).unwrap();
    assert_eq!(timestamps.len(), 4);
}

#[test]
fn test_explicit_close_is_not_repeated_on_drop() {
    let closes = Arc::new(AtomicU32::new(0));
    let device = OpenDevice::new(CountingAnalyzer {
        inner: instant_analyzer(),
        closes: Arc::clone(&closes),
    });
    device.close().unwrap();
    assert_eq!(closes.load(Ordering::Relaxed), 1);
}

#[test]
fn test_stop_flag_ends_session_early() {
    let stop = Arc::new(AtomicBool::new(false));
    let mut device = instant_analyzer();
    let mut samples = Vec::new();
    let mut acquisition = AcquisitionLoop::new(
        session_config(100.0, Duration::from_secs(30)),
        &SchedulerConfig::default(),
    )
    .unwrap()
    .with_stop_flag(Arc::clone(&stop));

    let raiser = {
        let stop = Arc::clone(&stop);
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(150));
            stop.store(true, Ordering::Relaxed);
        })
    };

    let summary = acquisition.run(&mut device, &mut samples).unwrap();
    raiser.join().unwrap();

    assert!(summary.stopped_early);
    assert!(summary.elapsed < Duration::from_secs(2));
    assert_eq!(samples.len() as u64, summary.samples);
}
