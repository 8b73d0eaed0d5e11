//! Measurement plane for the power sampler.
//!
//! This crate provides:
//! - [`SpectrumAnalyzer`] trait abstracting the analyzer SDK
//! - [`OpenDevice`] guard that owns a device handle and closes it exactly once
//! - [`power`] module converting a log-scale sweep to total power
//! - [`record`] module writing and reading the two-column session file

pub mod power;
pub mod record;

mod device;

pub use device::*;
pub use power::*;
pub use record::*;
