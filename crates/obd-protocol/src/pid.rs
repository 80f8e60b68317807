//! OBD-II Parameter Definitions and Response Parsing
//!
//! Defines the parameters the logger knows how to poll, the polling tier each
//! one belongs to by default, and the Mode 01 decoding formulas.

use crate::error::ObdError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Polling group sharing a target sampling interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Volatile engine state, ~1 s
    Fast,
    /// Oxygen sensors, ~15 s
    Medium,
    /// Slow-moving state (fuel level, temperatures, battery), ~30 s
    Slow,
}

impl Tier {
    /// All tiers in polling order
    pub const ALL: [Tier; 3] = [Tier::Fast, Tier::Medium, Tier::Slow];

    /// Lowercase label for logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Fast => "fast",
            Tier::Medium => "medium",
            Tier::Slow => "slow",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engineering unit of a decoded reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Rpm,
    KilometersPerHour,
    Percent,
    GramsPerSecond,
    Kilopascal,
    Celsius,
    Volt,
}

impl Unit {
    /// Short display symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            Unit::Rpm => "rpm",
            Unit::KilometersPerHour => "km/h",
            Unit::Percent => "%",
            Unit::GramsPerSecond => "g/s",
            Unit::Kilopascal => "kPa",
            Unit::Celsius => "°C",
            Unit::Volt => "V",
        }
    }
}

/// Parameters polled from the ECU (Mode 01 PIDs plus the adapter voltage)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParameterId {
    /// Engine RPM (0x0C)
    Rpm,
    /// Vehicle speed (0x0D)
    Speed,
    /// Throttle position (0x11)
    ThrottlePos,
    /// Relative throttle position (0x45)
    RelativeThrottlePos,
    /// Mass air flow rate (0x10)
    Maf,
    /// Calculated engine load (0x04)
    EngineLoad,
    /// Absolute load value (0x43)
    AbsoluteLoad,
    /// Intake manifold absolute pressure (0x0B)
    IntakePressure,
    /// Intake air temperature (0x0F)
    IntakeTemp,
    /// Accelerator pedal position D (0x49)
    AcceleratorPosD,
    /// Short-term fuel trim bank 1 (0x06)
    #[serde(rename = "SHORT_FUEL_TRIM_1")]
    ShortFuelTrim1,
    /// Long-term fuel trim bank 1 (0x07)
    #[serde(rename = "LONG_FUEL_TRIM_1")]
    LongFuelTrim1,
    /// Oxygen sensor voltage bank 1, sensor 2 (0x15)
    #[serde(rename = "O2_B1S2")]
    O2B1S2,
    /// Oxygen sensor voltage bank 1, sensor 1 (0x14)
    #[serde(rename = "O2_B1S1")]
    O2B1S1,
    /// Fuel tank level input (0x2F)
    FuelLevel,
    /// Adapter supply voltage (ELM327 `ATRV`, not a PID)
    ElmVoltage,
    /// Engine coolant temperature (0x05)
    CoolantTemp,
}

impl ParameterId {
    /// Every known parameter, fast tier first, in default column order
    pub const ALL: [ParameterId; 17] = [
        ParameterId::Rpm,
        ParameterId::Speed,
        ParameterId::ThrottlePos,
        ParameterId::RelativeThrottlePos,
        ParameterId::Maf,
        ParameterId::EngineLoad,
        ParameterId::AbsoluteLoad,
        ParameterId::IntakePressure,
        ParameterId::IntakeTemp,
        ParameterId::AcceleratorPosD,
        ParameterId::ShortFuelTrim1,
        ParameterId::LongFuelTrim1,
        ParameterId::O2B1S2,
        ParameterId::O2B1S1,
        ParameterId::FuelLevel,
        ParameterId::ElmVoltage,
        ParameterId::CoolantTemp,
    ];

    /// Canonical upper-case identifier, also used as the CSV column name
    pub fn name(&self) -> &'static str {
        match self {
            ParameterId::Rpm => "RPM",
            ParameterId::Speed => "SPEED",
            ParameterId::ThrottlePos => "THROTTLE_POS",
            ParameterId::RelativeThrottlePos => "RELATIVE_THROTTLE_POS",
            ParameterId::Maf => "MAF",
            ParameterId::EngineLoad => "ENGINE_LOAD",
            ParameterId::AbsoluteLoad => "ABSOLUTE_LOAD",
            ParameterId::IntakePressure => "INTAKE_PRESSURE",
            ParameterId::IntakeTemp => "INTAKE_TEMP",
            ParameterId::AcceleratorPosD => "ACCELERATOR_POS_D",
            ParameterId::ShortFuelTrim1 => "SHORT_FUEL_TRIM_1",
            ParameterId::LongFuelTrim1 => "LONG_FUEL_TRIM_1",
            ParameterId::O2B1S2 => "O2_B1S2",
            ParameterId::O2B1S1 => "O2_B1S1",
            ParameterId::FuelLevel => "FUEL_LEVEL",
            ParameterId::ElmVoltage => "ELM_VOLTAGE",
            ParameterId::CoolantTemp => "COOLANT_TEMP",
        }
    }

    /// Mode 01 PID code, `None` for adapter-local values
    pub fn pid(&self) -> Option<u8> {
        let code = match self {
            ParameterId::Rpm => 0x0C,
            ParameterId::Speed => 0x0D,
            ParameterId::ThrottlePos => 0x11,
            ParameterId::RelativeThrottlePos => 0x45,
            ParameterId::Maf => 0x10,
            ParameterId::EngineLoad => 0x04,
            ParameterId::AbsoluteLoad => 0x43,
            ParameterId::IntakePressure => 0x0B,
            ParameterId::IntakeTemp => 0x0F,
            ParameterId::AcceleratorPosD => 0x49,
            ParameterId::ShortFuelTrim1 => 0x06,
            ParameterId::LongFuelTrim1 => 0x07,
            ParameterId::O2B1S2 => 0x15,
            ParameterId::O2B1S1 => 0x14,
            ParameterId::FuelLevel => 0x2F,
            ParameterId::CoolantTemp => 0x05,
            ParameterId::ElmVoltage => return None,
        };
        Some(code)
    }

    /// Tier this parameter is polled in unless configured otherwise
    pub fn default_tier(&self) -> Tier {
        match self {
            ParameterId::O2B1S2 | ParameterId::O2B1S1 => Tier::Medium,
            ParameterId::FuelLevel | ParameterId::ElmVoltage | ParameterId::CoolantTemp => {
                Tier::Slow
            }
            _ => Tier::Fast,
        }
    }

    /// Engineering unit of the decoded value
    pub fn unit(&self) -> Unit {
        match self {
            ParameterId::Rpm => Unit::Rpm,
            ParameterId::Speed => Unit::KilometersPerHour,
            ParameterId::Maf => Unit::GramsPerSecond,
            ParameterId::IntakePressure => Unit::Kilopascal,
            ParameterId::IntakeTemp | ParameterId::CoolantTemp => Unit::Celsius,
            ParameterId::O2B1S2 | ParameterId::O2B1S1 | ParameterId::ElmVoltage => Unit::Volt,
            ParameterId::ThrottlePos
            | ParameterId::RelativeThrottlePos
            | ParameterId::EngineLoad
            | ParameterId::AbsoluteLoad
            | ParameterId::AcceleratorPosD
            | ParameterId::ShortFuelTrim1
            | ParameterId::LongFuelTrim1
            | ParameterId::FuelLevel => Unit::Percent,
        }
    }

    /// Number of data bytes the formula needs
    pub fn response_bytes(&self) -> usize {
        match self {
            ParameterId::Rpm | ParameterId::Maf | ParameterId::AbsoluteLoad => 2,
            ParameterId::ElmVoltage => 0,
            _ => 1,
        }
    }

    /// All parameters whose default tier is `tier`, in catalogue order
    pub fn defaults_for(tier: Tier) -> Vec<ParameterId> {
        Self::ALL
            .iter()
            .copied()
            .filter(|p| p.default_tier() == tier)
            .collect()
    }
}

impl fmt::Display for ParameterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ParameterId {
    type Err = ObdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ObdError::InvalidResponse(format!("unknown parameter {s}")))
    }
}

/// Decoded response to a single parameter request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PidResponse {
    /// The parameter that was queried
    pub parameter: ParameterId,
    /// Timestamp when the response was received (Unix ms)
    pub timestamp_ms: u64,
    /// Decoded value in the parameter's unit
    pub value: f64,
    /// Raw data bytes from the response
    pub raw_bytes: Vec<u8>,
}

impl PidResponse {
    /// Decode the data bytes of a Mode 01 response
    pub fn decode(
        parameter: ParameterId,
        raw_bytes: Vec<u8>,
        timestamp_ms: u64,
    ) -> Result<Self, ObdError> {
        let value = Self::decode_value(parameter, &raw_bytes)?;
        Ok(Self {
            parameter,
            timestamp_ms,
            value,
            raw_bytes,
        })
    }

    fn decode_value(parameter: ParameterId, bytes: &[u8]) -> Result<f64, ObdError> {
        if bytes.len() < parameter.response_bytes() {
            return Err(ObdError::InvalidResponse(format!(
                "{} needs {} data bytes, got {}",
                parameter,
                parameter.response_bytes(),
                bytes.len()
            )));
        }

        // Indexed lazily: ELM_VOLTAGE carries no data bytes
        let a = || bytes[0] as f64;
        let word = || (a() * 256.0) + bytes[1] as f64;

        let value = match parameter {
            // ((A*256)+B)/4
            ParameterId::Rpm => word() / 4.0,
            // ((A*256)+B)/100 g/s
            ParameterId::Maf => word() / 100.0,
            // ((A*256)+B)*100/255 %
            ParameterId::AbsoluteLoad => word() * 100.0 / 255.0,
            // A km/h, A kPa
            ParameterId::Speed | ParameterId::IntakePressure => a(),
            // A - 40 °C
            ParameterId::CoolantTemp | ParameterId::IntakeTemp => a() - 40.0,
            // (A - 128) * 100 / 128 %
            ParameterId::ShortFuelTrim1 | ParameterId::LongFuelTrim1 => (a() - 128.0) * 100.0 / 128.0,
            // A / 200 V
            ParameterId::O2B1S1 | ParameterId::O2B1S2 => a() / 200.0,
            // A * 100 / 255 %
            ParameterId::ThrottlePos
            | ParameterId::RelativeThrottlePos
            | ParameterId::EngineLoad
            | ParameterId::AcceleratorPosD
            | ParameterId::FuelLevel => a() * 100.0 / 255.0,
            ParameterId::ElmVoltage => {
                return Err(ObdError::InvalidResponse(
                    "ELM_VOLTAGE is not a Mode 01 PID".to_string(),
                ))
            }
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpm_decode() {
        // 1A 2B => ((0x1A * 256) + 0x2B) / 4 = (26*256 + 43) / 4 = 6699/4 = 1674.75
        let response = PidResponse::decode(ParameterId::Rpm, vec![0x1A, 0x2B], 0).unwrap();
        assert!((response.value - 1674.75).abs() < 0.01);
    }

    #[test]
    fn test_coolant_temp_decode() {
        // 0x73 = 115, so temp = 115 - 40 = 75°C
        let response = PidResponse::decode(ParameterId::CoolantTemp, vec![0x73], 0).unwrap();
        assert!((response.value - 75.0).abs() < 0.01);
    }

    #[test]
    fn test_maf_decode() {
        // 0x03E8 = 1000 => 10.00 g/s
        let response = PidResponse::decode(ParameterId::Maf, vec![0x03, 0xE8], 0).unwrap();
        assert!((response.value - 10.0).abs() < 0.001);
    }

    #[test]
    fn test_fuel_trim_decode() {
        // 0x80 = 128, so trim = (128-128)*100/128 = 0%
        let response = PidResponse::decode(ParameterId::ShortFuelTrim1, vec![0x80], 0).unwrap();
        assert!((response.value - 0.0).abs() < 0.01);

        // 0x90 = 144, so trim = (144-128)*100/128 = 12.5%
        let response = PidResponse::decode(ParameterId::LongFuelTrim1, vec![0x90], 0).unwrap();
        assert!((response.value - 12.5).abs() < 0.01);
    }

    #[test]
    fn test_short_response_is_an_error_not_zero() {
        let err = PidResponse::decode(ParameterId::Rpm, vec![0x1A], 0).unwrap_err();
        assert!(matches!(err, ObdError::InvalidResponse(_)));
    }

    #[test]
    fn test_names_parse_back() {
        for p in ParameterId::ALL {
            assert_eq!(p.name().parse::<ParameterId>().unwrap(), p);
        }
        assert!("NOT_A_PID".parse::<ParameterId>().is_err());
    }

    #[test]
    fn test_serde_names_match_display_names() {
        for p in ParameterId::ALL {
            let parsed = serde_variant_name(p);
            assert_eq!(parsed, p.name());
        }
    }

    #[test]
    fn test_default_tiers() {
        assert_eq!(ParameterId::defaults_for(Tier::Fast).len(), 12);
        assert_eq!(
            ParameterId::defaults_for(Tier::Medium),
            vec![ParameterId::O2B1S2, ParameterId::O2B1S1]
        );
        assert_eq!(
            ParameterId::defaults_for(Tier::Slow),
            vec![
                ParameterId::FuelLevel,
                ParameterId::ElmVoltage,
                ParameterId::CoolantTemp
            ]
        );
        assert_eq!(ParameterId::ElmVoltage.pid(), None);
    }

    // The serde variant name is what config files use, so it must match `name()`.
    fn serde_variant_name(p: ParameterId) -> String {
        use serde::de::value::{Error, StrDeserializer};
        use serde::de::IntoDeserializer;
        let de: StrDeserializer<'_, Error> = p.name().into_deserializer();
        let parsed = ParameterId::deserialize(de).unwrap();
        parsed.name().to_string()
    }
}
