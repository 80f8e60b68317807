//! Fuel Consumption Model
//!
//! Converts mass air flow (and fuel trims) into instantaneous fuel flow and
//! integrates cumulative fuel used with the trapezoidal rule over the
//! irregular intervals between fast-tier samples.

mod config;
mod integrator;
mod model;

pub use config::{FuelConfig, FuelError};
pub use integrator::{Step, TrapezoidIntegrator};
pub use model::{FastSamples, FuelModel, FuelState};
