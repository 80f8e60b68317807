//! Application configuration
//!
//! Loaded from an optional file, then `ECU_LOGGER_*` environment overrides
//! (nested keys separated by `__`).

use fuel_model::FuelConfig;
use gear_estimator::GearConfig;
use obd_protocol::Tier;
use obd_scheduler::SchedulerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use watchdog::WatchdogConfig;

/// Configuration errors; fatal at startup
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error(transparent)]
    Scheduler(#[from] obd_scheduler::SchedulerError),
    #[error(transparent)]
    Fuel(#[from] fuel_model::FuelError),
    #[error(transparent)]
    Gear(#[from] gear_estimator::GearError),
    #[error(transparent)]
    Watchdog(#[from] watchdog::WatchdogError),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Serial device of the ELM327 adapter (rfcomm for Bluetooth)
    pub device: String,
    pub baud_rate: u32,
    /// Simulated ECU, no hardware
    pub mock: bool,
    /// Drop parameters the ECU does not list as supported before polling
    pub skip_unsupported: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            device: "/dev/rfcomm0".to_string(),
            baud_rate: 38_400,
            mock: false,
            skip_unsupported: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is not set
    pub level: String,
    /// JSON lines instead of human-readable output
    pub json: bool,
    /// Directory for `ecu_log_*.csv`
    pub dir: PathBuf,
    /// Explicit CSV path; overrides the timestamped name in `dir`
    pub csv_path: Option<PathBuf>,
    /// Rows kept in memory for the dashboard
    pub recent_rows: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            dir: PathBuf::from("."),
            csv_path: None,
            recent_rows: 100_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Main loop period; must be finer than the fast interval
    pub tick_interval_ms: u64,
    /// Dashboard snapshot refresh period
    pub display_interval_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 200,
            display_interval_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub transport: TransportConfig,
    pub scheduler: SchedulerConfig,
    pub fuel: FuelConfig,
    pub gear: GearConfig,
    pub watchdog: WatchdogConfig,
    pub logging: LoggingConfig,
    pub server: ServerConfig,
    pub runtime: RuntimeConfig,
}

impl AppConfig {
    /// Load from `path` (if any) plus environment, then validate
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("ECU_LOGGER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let app: AppConfig = builder.build()?.try_deserialize()?;
        app.validate()?;
        Ok(app)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scheduler.validate()?;
        self.fuel.validate()?;
        self.gear.validate()?;
        self.watchdog.validate()?;

        let fast_ms = self.scheduler.tier(Tier::Fast).interval_ms;
        if self.watchdog.stale_threshold_ms <= fast_ms {
            return Err(ConfigError::Invalid(format!(
                "watchdog.stale_threshold_ms ({}) must be greater than the fast interval ({})",
                self.watchdog.stale_threshold_ms, fast_ms
            )));
        }
        if self.runtime.tick_interval_ms == 0 || self.runtime.display_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "runtime intervals must be greater than zero".to_string(),
            ));
        }
        if self.logging.recent_rows == 0 {
            return Err(ConfigError::Invalid(
                "logging.recent_rows must be greater than zero".to_string(),
            ));
        }
        if !self.transport.mock && self.transport.device.is_empty() {
            return Err(ConfigError::Invalid(
                "transport.device is required unless transport.mock is set".to_string(),
            ));
        }
        Ok(())
    }
}
