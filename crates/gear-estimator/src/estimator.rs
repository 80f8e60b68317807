//! Gear estimator implementation

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Gear estimator errors
#[derive(Debug, Error)]
pub enum GearError {
    #[error("Invalid gear config: {0}")]
    InvalidConfig(String),
}

/// Estimated gear
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Gear {
    /// Stationary or rolling below the minimum speed
    Neutral,
    /// Forward gear 1..=6
    Forward(u8),
    /// Engine below idle, missing inputs, or a ratio outside every band
    #[default]
    Unknown,
}

impl fmt::Display for Gear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Gear::Neutral => f.write_str("N"),
            Gear::Forward(g) => write!(f, "{}", g),
            Gear::Unknown => f.write_str("?"),
        }
    }
}

impl Serialize for Gear {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// RPM per km/h range of one gear, exclusive below and inclusive above
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GearBand {
    pub gear: u8,
    pub min_ratio: f64,
    pub max_ratio: f64,
}

impl GearBand {
    pub const fn new(gear: u8, min_ratio: f64, max_ratio: f64) -> Self {
        Self {
            gear,
            min_ratio,
            max_ratio,
        }
    }

    fn contains(&self, ratio: f64) -> bool {
        ratio > self.min_ratio && ratio <= self.max_ratio
    }

    /// Band widened by `margin` on both sides
    fn contains_with_margin(&self, ratio: f64, margin: f64) -> bool {
        ratio > self.min_ratio * (1.0 - margin) && ratio <= self.max_ratio * (1.0 + margin)
    }
}

/// Calibration of the estimator for one vehicle's gearing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GearConfig {
    /// Below this RPM the engine is considered off or stalling
    pub idle_rpm: f64,
    /// Below this speed (km/h) the vehicle is considered stationary
    pub min_speed_kmh: f64,
    /// Fraction by which the current gear's band is widened before switching
    pub hysteresis: f64,
    /// Ratio bands, one per forward gear
    pub bands: Vec<GearBand>,
}

impl Default for GearConfig {
    // Opel Corsa D 1.2, five-speed manual
    fn default() -> Self {
        Self {
            idle_rpm: 600.0,
            min_speed_kmh: 2.0,
            hysteresis: 0.05,
            bands: vec![
                GearBand::new(1, 90.0, 130.0),
                GearBand::new(2, 60.0, 90.0),
                GearBand::new(3, 45.0, 60.0),
                GearBand::new(4, 35.0, 45.0),
                GearBand::new(5, 25.0, 35.0),
            ],
        }
    }
}

impl GearConfig {
    pub fn validate(&self) -> Result<(), GearError> {
        let invalid = |msg: String| Err(GearError::InvalidConfig(msg));

        if !(self.idle_rpm.is_finite() && self.idle_rpm >= 0.0) {
            return invalid(format!("idle_rpm must be non-negative, got {}", self.idle_rpm));
        }
        if !(self.min_speed_kmh.is_finite() && self.min_speed_kmh >= 0.0) {
            return invalid(format!(
                "min_speed_kmh must be non-negative, got {}",
                self.min_speed_kmh
            ));
        }
        if !(0.0..0.5).contains(&self.hysteresis) {
            return invalid(format!("hysteresis must be in [0, 0.5), got {}", self.hysteresis));
        }
        if self.bands.is_empty() {
            return invalid("at least one gear band is required".to_string());
        }

        let mut sorted = self.bands.clone();
        sorted.sort_by(|a, b| a.min_ratio.total_cmp(&b.min_ratio));
        for band in &sorted {
            if !(1..=6).contains(&band.gear) {
                return invalid(format!("gear {} is outside 1..=6", band.gear));
            }
            if !(band.min_ratio.is_finite() && band.max_ratio.is_finite())
                || band.min_ratio < 0.0
                || band.min_ratio >= band.max_ratio
            {
                return invalid(format!(
                    "gear {} band ({}, {}] is empty or inverted",
                    band.gear, band.min_ratio, band.max_ratio
                ));
            }
        }
        for pair in sorted.windows(2) {
            if pair[0].max_ratio > pair[1].min_ratio {
                return invalid(format!(
                    "gear {} and gear {} bands overlap",
                    pair[0].gear, pair[1].gear
                ));
            }
        }
        let mut gears: Vec<u8> = sorted.iter().map(|b| b.gear).collect();
        gears.sort_unstable();
        gears.dedup();
        if gears.len() != sorted.len() {
            return invalid("a gear appears in more than one band".to_string());
        }
        Ok(())
    }

    fn band(&self, gear: u8) -> Option<&GearBand> {
        self.bands.iter().find(|b| b.gear == gear)
    }
}

/// Estimate the gear from RPM and speed (km/h).
///
/// Pure: the same inputs and `last` always give the same answer. While the
/// ratio stays inside `last`'s band widened by the hysteresis margin, `last`
/// is kept.
pub fn estimate(config: &GearConfig, rpm: Option<f64>, speed_kmh: Option<f64>, last: Gear) -> Gear {
    let (Some(rpm), Some(speed)) = (rpm, speed_kmh) else {
        return Gear::Unknown;
    };
    if !rpm.is_finite() || !speed.is_finite() || rpm < config.idle_rpm {
        return Gear::Unknown;
    }
    if speed < config.min_speed_kmh {
        return Gear::Neutral;
    }

    let ratio = rpm / speed;

    if let Gear::Forward(g) = last {
        if config
            .band(g)
            .is_some_and(|b| b.contains_with_margin(ratio, config.hysteresis))
        {
            return last;
        }
    }

    config
        .bands
        .iter()
        .find(|b| b.contains(ratio))
        .map_or(Gear::Unknown, |b| Gear::Forward(b.gear))
}

/// Current estimate and the inputs it came from
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct GearState {
    pub estimated_gear: Gear,
    pub last_rpm: Option<f64>,
    pub last_speed: Option<f64>,
}

/// Stateful wrapper that remembers the last estimate for hysteresis
#[derive(Debug, Clone)]
pub struct GearEstimator {
    config: GearConfig,
    state: GearState,
}

impl GearEstimator {
    pub fn new(config: GearConfig) -> Result<Self, GearError> {
        config.validate()?;
        Ok(Self {
            config,
            state: GearState::default(),
        })
    }

    /// Estimate without updating state
    pub fn estimate(&self, rpm: Option<f64>, speed_kmh: Option<f64>) -> Gear {
        estimate(&self.config, rpm, speed_kmh, self.state.estimated_gear)
    }

    /// Estimate and remember the result
    pub fn update(&mut self, rpm: Option<f64>, speed_kmh: Option<f64>) -> Gear {
        let gear = self.estimate(rpm, speed_kmh);
        if gear != self.state.estimated_gear {
            debug!("Gear {} -> {}", self.state.estimated_gear, gear);
        }
        self.state = GearState {
            estimated_gear: gear,
            last_rpm: rpm,
            last_speed: speed_kmh,
        };
        gear
    }

    pub fn state(&self) -> &GearState {
        &self.state
    }
}
