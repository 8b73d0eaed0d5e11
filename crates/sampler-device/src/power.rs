//! Total-power integration over a log-scale sweep.
//!
//! Each bin is converted from dBm to linear power, the bins are summed and
//! scaled by the bin width, and the total is converted back to dBm with a
//! fixed calibration offset applied.

/// Reported level when the integrated linear power is not positive.
pub const POWER_FLOOR_DBM: f64 = -120.0;

/// Precomputed conversion from a sweep to calibrated total power.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerIntegrator {
    bin_size_mw: f64,
    calibration_offset_db: f64,
}

impl PowerIntegrator {
    /// Build an integrator for sweeps with the given bin width.
    ///
    /// The bin width in Hz is scaled by 1e-6 to milliwatt units, matching the
    /// analyzer's calibration convention.
    #[must_use]
    pub fn new(bin_size_hz: f64, calibration_offset_db: f64) -> Self {
        Self {
            bin_size_mw: bin_size_hz / 1e6,
            calibration_offset_db,
        }
    }

    /// Total calibrated power of one sweep in dBm.
    #[must_use]
    pub fn total_power_dbm(&self, bins_dbm: &[f32]) -> f64 {
        let linear: f64 = bins_dbm
            .iter()
            .map(|&db| 10f64.powf(f64::from(db) / 10.0))
            .sum();
        let total_mw = linear * self.bin_size_mw;

        if total_mw > 0.0 {
            10.0 * total_mw.log10() + self.calibration_offset_db
        } else {
            POWER_FLOOR_DBM + self.calibration_offset_db
        }
    }
}

/// One-shot form of [`PowerIntegrator::total_power_dbm`].
#[must_use]
pub fn total_power_dbm(bins_dbm: &[f32], bin_size_hz: f64, calibration_offset_db: f64) -> f64 {
    PowerIntegrator::new(bin_size_hz, calibration_offset_db).total_power_dbm(bins_dbm)
}
