//! Data Validator for Range Checking

use crate::error::ValidationError;
use obd_protocol::ParameterId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Inclusive plausible range of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Physical range the Mode 01 encoding can express for `parameter`
    pub fn physical(parameter: ParameterId) -> Self {
        match parameter {
            ParameterId::Rpm => Self::new(0.0, 16383.75),
            ParameterId::Speed | ParameterId::IntakePressure => Self::new(0.0, 255.0),
            ParameterId::Maf => Self::new(0.0, 655.35),
            ParameterId::AbsoluteLoad => Self::new(0.0, 25700.0),
            ParameterId::IntakeTemp | ParameterId::CoolantTemp => Self::new(-40.0, 215.0),
            ParameterId::ShortFuelTrim1 | ParameterId::LongFuelTrim1 => Self::new(-100.0, 99.22),
            ParameterId::O2B1S1 | ParameterId::O2B1S2 => Self::new(0.0, 1.275),
            ParameterId::ElmVoltage => Self::new(0.0, 30.0),
            ParameterId::ThrottlePos
            | ParameterId::RelativeThrottlePos
            | ParameterId::EngineLoad
            | ParameterId::AcceleratorPosD
            | ParameterId::FuelLevel => Self::new(0.0, 100.0),
        }
    }
}

/// Validation configuration: per-parameter overrides of the physical ranges
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub ranges: BTreeMap<ParameterId, ValueRange>,
}

impl ValidationConfig {
    /// Reject inverted or non-finite override ranges
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (parameter, range) in &self.ranges {
            if !range.min.is_finite() || !range.max.is_finite() || range.min > range.max {
                return Err(ValidationError::InvalidRange {
                    field: parameter.name(),
                    min: range.min,
                    max: range.max,
                });
            }
        }
        Ok(())
    }
}

/// Plausibility validator for decoded readings
#[derive(Debug, Clone)]
pub struct Validator {
    config: ValidationConfig,
}

impl Validator {
    /// Create a new validator with given config
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Range in force for `parameter`
    pub fn range(&self, parameter: ParameterId) -> ValueRange {
        self.config
            .ranges
            .get(&parameter)
            .copied()
            .unwrap_or_else(|| ValueRange::physical(parameter))
    }

    /// Validate a single value against a range
    pub fn validate_range(
        &self,
        field: &'static str,
        value: f64,
        range: ValueRange,
    ) -> Result<(), ValidationError> {
        if !value.is_finite() {
            Err(ValidationError::NotFinite { field, value })
        } else if value < range.min || value > range.max {
            Err(ValidationError::OutOfRange {
                field,
                value,
                min: range.min,
                max: range.max,
            })
        } else {
            Ok(())
        }
    }

    /// Validate a decoded reading, returning it unchanged when plausible
    pub fn validate(&self, parameter: ParameterId, value: f64) -> Result<f64, ValidationError> {
        self.validate_range(parameter.name(), value, self.range(parameter))?;
        Ok(value)
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(ValidationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_rpm() {
        let validator = Validator::default();
        assert!(validator.validate(ParameterId::Rpm, 3000.0).is_ok());
        assert!(validator.validate(ParameterId::Rpm, 0.0).is_ok());
        assert!(validator.validate(ParameterId::Rpm, 8000.0).is_ok());
    }

    #[test]
    fn test_invalid_rpm() {
        let validator = Validator::default();
        assert!(validator.validate(ParameterId::Rpm, -100.0).is_err());
        assert!(validator.validate(ParameterId::Rpm, 20000.0).is_err());
    }

    #[test]
    fn test_coolant_temp_range() {
        let validator = Validator::default();
        assert!(validator.validate(ParameterId::CoolantTemp, -40.0).is_ok());
        assert!(validator.validate(ParameterId::CoolantTemp, 90.0).is_ok());
        assert!(validator.validate(ParameterId::CoolantTemp, 215.0).is_ok());
        assert!(validator.validate(ParameterId::CoolantTemp, -50.0).is_err());
        assert!(validator.validate(ParameterId::CoolantTemp, 250.0).is_err());
    }

    #[test]
    fn test_nan_is_rejected() {
        let validator = Validator::default();
        let err = validator.validate(ParameterId::Maf, f64::NAN).unwrap_err();
        assert!(matches!(err, ValidationError::NotFinite { field: "MAF", .. }));
    }

    #[test]
    fn test_override_range() {
        let mut config = ValidationConfig::default();
        config
            .ranges
            .insert(ParameterId::Speed, ValueRange::new(0.0, 200.0));
        let validator = Validator::new(config);
        assert!(validator.validate(ParameterId::Speed, 210.0).is_err());
        assert!(validator.validate(ParameterId::Rpm, 7000.0).is_ok());
    }

    #[test]
    fn test_inverted_override_rejected() {
        let mut config = ValidationConfig::default();
        config
            .ranges
            .insert(ParameterId::Maf, ValueRange::new(10.0, 1.0));
        assert!(config.validate().is_err());
    }
}
