//! Fuel model configuration

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fuel model errors
#[derive(Debug, Error)]
pub enum FuelError {
    #[error("Invalid fuel config: {0}")]
    InvalidConfig(String),
}

/// Calibration constants for the MAF to fuel flow conversion
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FuelConfig {
    /// Stoichiometric air-fuel mass ratio (gasoline: 14.7)
    pub air_fuel_ratio: f64,
    /// Fuel density in g/ml (gasoline: ~0.745)
    pub fuel_density_g_per_ml: f64,
    /// Longer intervals between samples are treated as a gap, not integrated
    pub max_integration_gap_ms: u64,
}

impl Default for FuelConfig {
    fn default() -> Self {
        Self {
            air_fuel_ratio: 14.7,
            fuel_density_g_per_ml: 0.745,
            max_integration_gap_ms: 5_000,
        }
    }
}

impl FuelConfig {
    pub fn validate(&self) -> Result<(), FuelError> {
        if !(self.air_fuel_ratio.is_finite() && self.air_fuel_ratio > 0.0) {
            return Err(FuelError::InvalidConfig(format!(
                "air_fuel_ratio must be positive, got {}",
                self.air_fuel_ratio
            )));
        }
        if !(self.fuel_density_g_per_ml.is_finite() && self.fuel_density_g_per_ml > 0.0) {
            return Err(FuelError::InvalidConfig(format!(
                "fuel_density_g_per_ml must be positive, got {}",
                self.fuel_density_g_per_ml
            )));
        }
        if self.max_integration_gap_ms == 0 {
            return Err(FuelError::InvalidConfig(
                "max_integration_gap_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
