//! Gear Estimation
//!
//! No ECU PID reports the engaged gear on this class of vehicle, so it is
//! guessed from the engine-speed to road-speed ratio against a per-gear
//! table of ratio bands.

mod estimator;

pub use estimator::{estimate, Gear, GearBand, GearConfig, GearError, GearEstimator, GearState};
