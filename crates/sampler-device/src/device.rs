use sampler_common::config::{AcquisitionConfig, AveragingMode, DeviceConfig, DeviceDriver};
use sampler_common::error::{SamplerError, SamplerResult};
use std::ops::{Deref, DerefMut};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Sweep parameters sent to the analyzer before acquisition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepSettings {
    /// Center frequency in Hz.
    pub center_frequency_hz: f64,
    /// Span in Hz.
    pub span_hz: f64,
    /// Resolution bandwidth in Hz.
    pub rbw_hz: f64,
    /// Video bandwidth in Hz.
    pub vbw_hz: f64,
    /// Reference level in dBm.
    pub reference_level_dbm: f64,
    /// Detector averaging mode.
    pub averaging: AveragingMode,
}

impl From<&AcquisitionConfig> for SweepSettings {
    fn from(config: &AcquisitionConfig) -> Self {
        Self {
            center_frequency_hz: config.center_frequency_hz,
            span_hz: config.span_hz,
            rbw_hz: config.resolution_bandwidth_hz,
            vbw_hz: config.resolution_bandwidth_hz,
            reference_level_dbm: config.reference_level_dbm,
            averaging: config.averaging,
        }
    }
}

/// Geometry of the sweeps the analyzer will return.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepInfo {
    /// Number of bins per sweep.
    pub sweep_length: usize,
    /// Frequency of the first bin in Hz.
    pub start_frequency_hz: f64,
    /// Width of one bin in Hz.
    pub bin_size_hz: f64,
}

/// One sweep in log units (dBm per bin).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sweep {
    /// Minimum-detector trace.
    pub min: Vec<f32>,
    /// Maximum-detector trace.
    pub max: Vec<f32>,
}

/// Spectrum analyzer abstraction.
///
/// An implementation represents a device that is already open. Opening is a
/// driver-specific constructor (see [`open_device`]); closing goes through
/// [`OpenDevice`] so a handle is released exactly once on every exit path.
pub trait SpectrumAnalyzer: Send {
    /// Apply sweep settings.
    fn configure(&mut self, settings: &SweepSettings) -> SamplerResult<()>;

    /// Begin sweeping with the configured settings.
    fn initiate(&mut self) -> SamplerResult<()>;

    /// Report the geometry of the sweeps that will be returned.
    fn sweep_info(&self) -> SamplerResult<SweepInfo>;

    /// Acquire one full sweep. Blocks until the sweep is available.
    fn get_sweep(&mut self) -> SamplerResult<Sweep>;

    /// Release the device.
    fn close(&mut self) -> SamplerResult<()>;

    /// Whether the handle is still usable.
    fn is_open(&self) -> bool;
}

impl<T: SpectrumAnalyzer + ?Sized> SpectrumAnalyzer for Box<T> {
    fn configure(&mut self, settings: &SweepSettings) -> SamplerResult<()> {
        (**self).configure(settings)
    }

    fn initiate(&mut self) -> SamplerResult<()> {
        (**self).initiate()
    }

    fn sweep_info(&self) -> SamplerResult<SweepInfo> {
        (**self).sweep_info()
    }

    fn get_sweep(&mut self) -> SamplerResult<Sweep> {
        (**self).get_sweep()
    }

    fn close(&mut self) -> SamplerResult<()> {
        (**self).close()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }
}

/// Open the analyzer selected by configuration.
///
/// # Errors
///
/// Returns [`SamplerError::Device`] if the device cannot be opened.
pub fn open_device(config: &DeviceConfig) -> SamplerResult<OpenDevice<Box<dyn SpectrumAnalyzer>>> {
    match config.driver {
        DeviceDriver::Simulated => {
            info!(bins = config.bins, "Using simulated spectrum analyzer");
            let device: Box<dyn SpectrumAnalyzer> = Box::new(SimulatedAnalyzer::from_config(config));
            Ok(OpenDevice::new(device))
        }
    }
}

/// Exclusive owner of an open device handle.
///
/// Dropping the guard closes the device if it is still open, so an early
/// return or a panic in the session still releases the hardware.
#[derive(Debug)]
pub struct OpenDevice<D: SpectrumAnalyzer> {
    device: D,
}

impl<D: SpectrumAnalyzer> OpenDevice<D> {
    /// Take ownership of an open device.
    pub fn new(device: D) -> Self {
        Self { device }
    }

    /// Close the device now and surface any close error.
    ///
    /// # Errors
    ///
    /// Returns whatever the driver reports when closing.
    pub fn close(mut self) -> SamplerResult<()> {
        self.device.close()
    }
}

impl<D: SpectrumAnalyzer> Deref for OpenDevice<D> {
    type Target = D;

    fn deref(&self) -> &D {
        &self.device
    }
}

impl<D: SpectrumAnalyzer> DerefMut for OpenDevice<D> {
    fn deref_mut(&mut self) -> &mut D {
        &mut self.device
    }
}

impl<D: SpectrumAnalyzer> Drop for OpenDevice<D> {
    fn drop(&mut self) {
        if self.device.is_open() {
            debug!("Closing device handle");
            if let Err(e) = self.device.close() {
                warn!("Device close failed: {e}");
            }
        }
    }
}

/// Simulated spectrum analyzer.
///
/// Returns a flat trace at a fixed level after an optional acquisition
/// delay. Can be told to start failing after a number of sweeps.
#[derive(Debug)]
pub struct SimulatedAnalyzer {
    open: bool,
    settings: Option<SweepSettings>,
    initiated: bool,
    bins: usize,
    level_dbm: f32,
    latency: Duration,
    sweeps_taken: u64,
    fail_after: Option<u64>,
}

impl SimulatedAnalyzer {
    /// Create an open simulated analyzer.
    pub fn new(bins: usize, level_dbm: f32, latency: Duration) -> Self {
        Self {
            open: true,
            settings: None,
            initiated: false,
            bins,
            level_dbm,
            latency,
            sweeps_taken: 0,
            fail_after: None,
        }
    }

    /// Create a simulated analyzer from device configuration.
    pub fn from_config(config: &DeviceConfig) -> Self {
        Self::new(config.bins, config.noise_floor_dbm, config.sweep_latency)
    }

    /// Make every sweep after the first `sweeps` fail (for testing).
    #[must_use]
    pub fn failing_after(mut self, sweeps: u64) -> Self {
        self.fail_after = Some(sweeps);
        self
    }

    /// Number of sweeps returned so far.
    pub fn sweeps_taken(&self) -> u64 {
        self.sweeps_taken
    }

    fn ensure_open(&self) -> SamplerResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(SamplerError::DeviceClosed)
        }
    }
}

impl SpectrumAnalyzer for SimulatedAnalyzer {
    fn configure(&mut self, settings: &SweepSettings) -> SamplerResult<()> {
        self.ensure_open()?;
        if self.bins == 0 {
            return Err(SamplerError::Device("sweep must have at least one bin".into()));
        }
        self.settings = Some(*settings);
        self.initiated = false;
        Ok(())
    }

    fn initiate(&mut self) -> SamplerResult<()> {
        self.ensure_open()?;
        if self.settings.is_none() {
            return Err(SamplerError::Device("initiate before configure".into()));
        }
        self.initiated = true;
        Ok(())
    }

    fn sweep_info(&self) -> SamplerResult<SweepInfo> {
        self.ensure_open()?;
        let settings = self
            .settings
            .as_ref()
            .ok_or_else(|| SamplerError::Device("sweep info queried before configure".into()))?;

        #[allow(clippy::cast_precision_loss)]
        let bin_size_hz = settings.span_hz / self.bins as f64;
        Ok(SweepInfo {
            sweep_length: self.bins,
            start_frequency_hz: settings.center_frequency_hz - settings.span_hz / 2.0,
            bin_size_hz,
        })
    }

    fn get_sweep(&mut self) -> SamplerResult<Sweep> {
        self.ensure_open()?;
        if !self.initiated {
            return Err(SamplerError::Device("sweep requested before initiate".into()));
        }
        if self.fail_after.is_some_and(|limit| self.sweeps_taken >= limit) {
            return Err(SamplerError::Device("simulated sweep failure".into()));
        }

        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }

        self.sweeps_taken += 1;
        let trace = vec![self.level_dbm; self.bins];
        Ok(Sweep {
            min: trace.clone(),
            max: trace,
        })
    }

    fn close(&mut self) -> SamplerResult<()> {
        if self.open {
            self.open = false;
            self.initiated = false;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
