//! Scheduler configuration

use data_validator::{ValidationConfig, ValidationError};
use obd_protocol::{ParameterId, Tier};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Scheduler errors
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Rejected configuration, fatal at startup
    #[error("Invalid scheduler config: {0}")]
    InvalidConfig(String),

    /// Rejected plausibility range override
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// One polling tier: its target interval and the parameters it reads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierConfig {
    /// Target interval between rounds
    pub interval_ms: u64,
    /// Parameters read in this tier, in order; `None` uses the catalogue defaults
    #[serde(default)]
    pub parameters: Option<Vec<ParameterId>>,
}

impl TierConfig {
    pub fn fast() -> Self {
        Self {
            interval_ms: 1_000,
            parameters: None,
        }
    }

    pub fn medium() -> Self {
        Self {
            interval_ms: 15_000,
            parameters: None,
        }
    }

    pub fn slow() -> Self {
        Self {
            interval_ms: 30_000,
            parameters: None,
        }
    }

    /// Parameters this tier reads, resolving catalogue defaults
    pub fn resolved_parameters(&self, tier: Tier) -> Vec<ParameterId> {
        self.parameters
            .clone()
            .unwrap_or_else(|| ParameterId::defaults_for(tier))
    }
}

/// Configuration for the tiered scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Fast tier (RPM, speed, MAF, trims, ...)
    pub fast: TierConfig,
    /// Medium tier (oxygen sensors)
    pub medium: TierConfig,
    /// Slow tier (fuel level, voltage, coolant)
    pub slow: TierConfig,
    /// Upper bound on a single parameter read
    pub read_timeout_ms: u64,
    /// Consecutive failures after which a parameter is reported at warn level
    pub max_consecutive_failures: u32,
    /// Timeouts in a row after which the rest of the tick is recorded as
    /// timed out without being read
    pub max_consecutive_timeouts: u32,
    /// A value older than this many tier intervals is flagged stale
    pub stale_factor: f64,
    /// Plausibility range overrides
    pub validation: ValidationConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            fast: TierConfig::fast(),
            medium: TierConfig::medium(),
            slow: TierConfig::slow(),
            read_timeout_ms: 2_000,
            max_consecutive_failures: 3,
            max_consecutive_timeouts: 2,
            stale_factor: 3.0,
            validation: ValidationConfig::default(),
        }
    }
}

impl SchedulerConfig {
    /// Tier config by tier
    pub fn tier(&self, tier: Tier) -> &TierConfig {
        match tier {
            Tier::Fast => &self.fast,
            Tier::Medium => &self.medium,
            Tier::Slow => &self.slow,
        }
    }

    /// Same tiers, keeping only parameters in `supported`
    pub fn restricted_to(&self, supported: &[ParameterId]) -> Self {
        let mut config = self.clone();
        for tier in Tier::ALL {
            let tier_config = match tier {
                Tier::Fast => &mut config.fast,
                Tier::Medium => &mut config.medium,
                Tier::Slow => &mut config.slow,
            };
            let kept = tier_config
                .resolved_parameters(tier)
                .into_iter()
                .filter(|p| supported.contains(p))
                .collect();
            tier_config.parameters = Some(kept);
        }
        config
    }

    /// Check intervals, timeouts, and tier membership
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.read_timeout_ms == 0 {
            return Err(SchedulerError::InvalidConfig(
                "read_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_consecutive_timeouts == 0 {
            return Err(SchedulerError::InvalidConfig(
                "max_consecutive_timeouts must be greater than zero".to_string(),
            ));
        }
        if !self.stale_factor.is_finite() || self.stale_factor < 1.0 {
            return Err(SchedulerError::InvalidConfig(format!(
                "stale_factor must be at least 1.0, got {}",
                self.stale_factor
            )));
        }

        let mut seen: HashMap<ParameterId, Tier> = HashMap::new();
        for tier in Tier::ALL {
            let config = self.tier(tier);
            if config.interval_ms == 0 {
                return Err(SchedulerError::InvalidConfig(format!(
                    "{} tier interval_ms must be greater than zero",
                    tier
                )));
            }
            for parameter in config.resolved_parameters(tier) {
                if let Some(first) = seen.insert(parameter, tier) {
                    let message = if first == tier {
                        format!("{} is listed more than once in the {} tier", parameter, tier)
                    } else {
                        format!(
                            "{} is listed in more than one tier ({} and {})",
                            parameter, first, tier
                        )
                    };
                    return Err(SchedulerError::InvalidConfig(message));
                }
            }
        }

        if self.fast.resolved_parameters(Tier::Fast).is_empty() {
            return Err(SchedulerError::InvalidConfig(
                "fast tier must poll at least one parameter".to_string(),
            ));
        }

        self.validation.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(SchedulerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = SchedulerConfig::default();
        config.medium.interval_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("medium tier interval_ms"));
    }

    #[test]
    fn test_duplicate_parameter_rejected() {
        let mut config = SchedulerConfig::default();
        config.slow.parameters = Some(vec![ParameterId::Rpm]);
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("RPM"));
        assert!(err.contains("more than one tier (fast and slow)"), "{}", err);
    }

    #[test]
    fn test_repeat_within_one_tier_rejected() {
        let mut config = SchedulerConfig::default();
        config.fast.parameters = Some(vec![ParameterId::Rpm, ParameterId::Speed, ParameterId::Rpm]);
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("RPM is listed more than once in the fast tier"), "{}", err);
    }

    #[test]
    fn test_zero_timeout_streak_rejected() {
        let config = SchedulerConfig {
            max_consecutive_timeouts: 0,
            ..SchedulerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_restrict_to_drops_unsupported_parameters() {
        let supported = vec![ParameterId::Rpm, ParameterId::Speed, ParameterId::FuelLevel];
        let config = SchedulerConfig::default().restricted_to(&supported);

        assert_eq!(
            config.fast.resolved_parameters(Tier::Fast),
            vec![ParameterId::Rpm, ParameterId::Speed]
        );
        assert!(config.medium.resolved_parameters(Tier::Medium).is_empty());
        assert_eq!(
            config.slow.resolved_parameters(Tier::Slow),
            vec![ParameterId::FuelLevel]
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_fast_tier_rejected() {
        let mut config = SchedulerConfig::default();
        config.fast.parameters = Some(Vec::new());
        assert!(config.validate().is_err());
    }
}
