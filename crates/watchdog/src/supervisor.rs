//! Watchdog state machine
//!
//! Healthy -> Stalled -> Recovering -> Healthy, with Recovering -> Stalled
//! when a recovery attempt does not bring the fast tier back in time. Only
//! observed staleness drives transitions; read errors are never consulted.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum WatchdogError {
    #[error("Invalid watchdog config: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Fast-tier silence (ms) after which the link is declared stalled
    pub stale_threshold_ms: u64,
    /// How long one recovery attempt may take before it is retried
    pub recovery_timeout_ms: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            stale_threshold_ms: 5_000,
            recovery_timeout_ms: 10_000,
        }
    }
}

impl WatchdogConfig {
    pub fn validate(&self) -> Result<(), WatchdogError> {
        if self.stale_threshold_ms == 0 {
            return Err(WatchdogError::InvalidConfig(
                "stale_threshold_ms must be greater than zero".to_string(),
            ));
        }
        if self.recovery_timeout_ms == 0 {
            return Err(WatchdogError::InvalidConfig(
                "recovery_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchdogStatus {
    Healthy,
    Stalled,
    Recovering,
}

impl WatchdogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatchdogStatus::Healthy => "healthy",
            WatchdogStatus::Stalled => "stalled",
            WatchdogStatus::Recovering => "recovering",
        }
    }
}

/// Snapshot of the supervisor for dashboards
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatchdogState {
    pub last_fast_update_ms: Option<u64>,
    pub threshold_ms: u64,
    pub status: WatchdogStatus,
    /// True from the first stall until the fast tier is back
    pub tripped: bool,
    pub recovery_attempts: u32,
    pub recovery_started_ms: Option<u64>,
}

/// Requests and notifications for the owner of the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogEvent {
    /// The fast tier has been silent too long; reset the transport
    RecoveryRequested { stalled_for_ms: u64, attempt: u32 },
    /// Fast data is flowing again
    Recovered { downtime_ms: u64 },
}

#[derive(Debug, Clone)]
pub struct WatchdogSupervisor {
    config: WatchdogConfig,
    /// Silence is measured from here: the last fast update, startup, or the
    /// point the wall clock stepped back to
    reference_ms: u64,
    state: WatchdogState,
    stalled_since_ms: Option<u64>,
}

impl WatchdogSupervisor {
    pub fn new(config: WatchdogConfig, now_ms: u64) -> Result<Self, WatchdogError> {
        config.validate()?;
        let state = WatchdogState {
            last_fast_update_ms: None,
            threshold_ms: config.stale_threshold_ms,
            status: WatchdogStatus::Healthy,
            tripped: false,
            recovery_attempts: 0,
            recovery_started_ms: None,
        };
        Ok(Self {
            config,
            reference_ms: now_ms,
            state,
            stalled_since_ms: None,
        })
    }

    /// Feed the store's last fast-tier success time and advance the machine.
    ///
    /// Any change of `last_fast_update` is progress, including one to an
    /// earlier time after the wall clock stepped back.
    pub fn observe(&mut self, now_ms: u64, last_fast_update: Option<u64>) -> Option<WatchdogEvent> {
        if let Some(update) = last_fast_update {
            if self.state.last_fast_update_ms != Some(update) {
                self.state.last_fast_update_ms = Some(update);
                self.reference_ms = update;
                return self.mark_healthy(now_ms);
            }
        }

        if now_ms < self.reference_ms {
            debug!(
                "Wall clock stepped back {} ms; restarting the silence measurement",
                self.reference_ms - now_ms
            );
            self.reference_ms = now_ms;
        }
        if let Some(started) = self.state.recovery_started_ms {
            if now_ms < started {
                self.state.recovery_started_ms = Some(now_ms);
            }
        }
        let silent_for = now_ms - self.reference_ms;

        match self.state.status {
            WatchdogStatus::Healthy => {
                if silent_for > self.config.stale_threshold_ms {
                    warn!(
                        "No fast-tier data for {} ms (threshold {} ms); transport stalled",
                        silent_for, self.config.stale_threshold_ms
                    );
                    self.state.status = WatchdogStatus::Stalled;
                    self.state.tripped = true;
                    self.stalled_since_ms = Some(now_ms);
                    self.state.recovery_attempts += 1;
                    return Some(WatchdogEvent::RecoveryRequested {
                        stalled_for_ms: silent_for,
                        attempt: self.state.recovery_attempts,
                    });
                }
                None
            }
            // Waiting for the owner to start recovery
            WatchdogStatus::Stalled => None,
            WatchdogStatus::Recovering => {
                let started = self.state.recovery_started_ms.unwrap_or(now_ms);
                if now_ms.saturating_sub(started) > self.config.recovery_timeout_ms {
                    self.state.recovery_attempts += 1;
                    warn!(
                        "Recovery did not restore fast-tier data within {} ms; retrying (attempt {})",
                        self.config.recovery_timeout_ms, self.state.recovery_attempts
                    );
                    self.state.status = WatchdogStatus::Stalled;
                    self.state.recovery_started_ms = None;
                    return Some(WatchdogEvent::RecoveryRequested {
                        stalled_for_ms: silent_for,
                        attempt: self.state.recovery_attempts,
                    });
                }
                None
            }
        }
    }

    /// Called by the owner once it has started resetting the transport.
    pub fn begin_recovery(&mut self, now_ms: u64) {
        if self.state.status == WatchdogStatus::Healthy {
            return;
        }
        self.state.status = WatchdogStatus::Recovering;
        self.state.recovery_started_ms = Some(now_ms);
    }

    fn mark_healthy(&mut self, now_ms: u64) -> Option<WatchdogEvent> {
        if self.state.status == WatchdogStatus::Healthy {
            return None;
        }
        let downtime_ms = self
            .stalled_since_ms
            .map_or(0, |since| now_ms.saturating_sub(since));
        info!(
            "Fast-tier data restored after {} ms and {} recovery attempt(s)",
            downtime_ms, self.state.recovery_attempts
        );
        self.state.status = WatchdogStatus::Healthy;
        self.state.tripped = false;
        self.state.recovery_attempts = 0;
        self.state.recovery_started_ms = None;
        self.stalled_since_ms = None;
        Some(WatchdogEvent::Recovered { downtime_ms })
    }

    pub fn status(&self) -> WatchdogStatus {
        self.state.status
    }

    pub fn state(&self) -> &WatchdogState {
        &self.state
    }

    pub fn config(&self) -> &WatchdogConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn supervisor(now_ms: u64) -> WatchdogSupervisor {
        WatchdogSupervisor::new(WatchdogConfig::default(), now_ms).unwrap()
    }

    #[test]
    fn test_stays_healthy_at_threshold() {
        let mut wd = supervisor(0);
        assert_eq!(wd.observe(1_000, Some(1_000)), None);
        assert_eq!(wd.observe(6_000, Some(1_000)), None);
        assert_eq!(wd.status(), WatchdogStatus::Healthy);
    }

    #[test]
    fn test_stalls_past_threshold() {
        let mut wd = supervisor(0);
        wd.observe(1_000, Some(1_000));
        let event = wd.observe(6_001, Some(1_000));
        assert_eq!(
            event,
            Some(WatchdogEvent::RecoveryRequested {
                stalled_for_ms: 5_001,
                attempt: 1
            })
        );
        assert_eq!(wd.status(), WatchdogStatus::Stalled);
        assert!(wd.state().tripped);
    }

    #[test]
    fn test_never_connected_stalls_from_startup() {
        let mut wd = supervisor(10_000);
        assert_eq!(wd.observe(14_000, None), None);
        assert!(matches!(
            wd.observe(15_001, None),
            Some(WatchdogEvent::RecoveryRequested { attempt: 1, .. })
        ));
    }

    #[test]
    fn test_one_successful_round_restores_health() {
        let mut wd = supervisor(0);
        wd.observe(1_000, Some(1_000));
        wd.observe(7_000, Some(1_000));
        wd.begin_recovery(7_000);
        assert_eq!(wd.status(), WatchdogStatus::Recovering);

        let event = wd.observe(8_000, Some(7_900));
        assert_eq!(event, Some(WatchdogEvent::Recovered { downtime_ms: 1_000 }));
        assert_eq!(wd.status(), WatchdogStatus::Healthy);
        assert!(!wd.state().tripped);
        assert_eq!(wd.state().recovery_attempts, 0);
    }

    #[test]
    fn test_stalled_recovers_without_begin_recovery() {
        let mut wd = supervisor(0);
        wd.observe(7_000, None);
        assert_eq!(wd.status(), WatchdogStatus::Stalled);
        assert!(matches!(
            wd.observe(7_200, Some(7_100)),
            Some(WatchdogEvent::Recovered { .. })
        ));
    }

    #[test]
    fn test_stalled_waits_for_owner() {
        let mut wd = supervisor(0);
        wd.observe(6_000, None);
        assert_eq!(wd.observe(60_000, None), None);
        assert_eq!(wd.status(), WatchdogStatus::Stalled);
    }

    #[test]
    fn test_recovery_timeout_retries() {
        let mut wd = supervisor(0);
        wd.observe(6_000, None);
        wd.begin_recovery(6_000);

        assert_eq!(wd.observe(16_000, None), None);
        let event = wd.observe(16_001, None);
        assert!(matches!(
            event,
            Some(WatchdogEvent::RecoveryRequested { attempt: 2, .. })
        ));
        assert_eq!(wd.status(), WatchdogStatus::Stalled);
    }

    #[test]
    fn test_old_update_is_not_progress() {
        let mut wd = supervisor(0);
        wd.observe(1_000, Some(1_000));
        wd.observe(7_000, Some(1_000));
        wd.begin_recovery(7_000);
        assert_eq!(wd.observe(7_500, Some(1_000)), None);
        assert_eq!(wd.status(), WatchdogStatus::Recovering);
    }

    #[test]
    fn test_clock_step_back_does_not_stall() {
        let mut wd = supervisor(0);
        wd.observe(10_000, Some(10_000));
        assert_eq!(wd.observe(2_000, Some(10_000)), None);
        assert_eq!(wd.status(), WatchdogStatus::Healthy);
    }

    #[test]
    fn test_updates_after_clock_step_back_are_progress() {
        let mut wd = supervisor(0);
        wd.observe(1_000_000, Some(1_000_000));

        // Wall clock steps back 600 s; new updates carry the earlier times
        let base = 400_000;
        assert_eq!(wd.observe(base, Some(base)), None);
        assert_eq!(wd.observe(base + 1_000, Some(base + 1_000)), None);
        assert_eq!(wd.state().last_fast_update_ms, Some(base + 1_000));

        // Then the link dies
        assert_eq!(wd.observe(base + 6_000, Some(base + 1_000)), None);
        let event = wd.observe(base + 61_000, Some(base + 1_000));
        assert_eq!(
            event,
            Some(WatchdogEvent::RecoveryRequested {
                stalled_for_ms: 60_000,
                attempt: 1
            })
        );
        assert_eq!(wd.status(), WatchdogStatus::Stalled);
    }

    #[test]
    fn test_link_dying_at_clock_step_back_still_stalls() {
        let mut wd = supervisor(0);
        wd.observe(1_000_000, Some(1_000_000));

        assert_eq!(wd.observe(400_000, Some(1_000_000)), None);
        assert_eq!(wd.observe(405_000, Some(1_000_000)), None);
        assert!(matches!(
            wd.observe(405_001, Some(1_000_000)),
            Some(WatchdogEvent::RecoveryRequested { stalled_for_ms: 5_001, .. })
        ));
    }

    #[test]
    fn test_recovery_retry_survives_clock_step_back() {
        let mut wd = supervisor(0);
        wd.observe(100_000, None);
        wd.begin_recovery(100_000);

        assert_eq!(wd.observe(50_000, None), None);
        assert_eq!(wd.observe(60_000, None), None);
        assert!(matches!(
            wd.observe(60_001, None),
            Some(WatchdogEvent::RecoveryRequested { attempt: 2, .. })
        ));
    }

    #[test]
    fn test_begin_recovery_ignored_when_healthy() {
        let mut wd = supervisor(0);
        wd.begin_recovery(100);
        assert_eq!(wd.status(), WatchdogStatus::Healthy);
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let config = WatchdogConfig {
            stale_threshold_ms: 0,
            ..WatchdogConfig::default()
        };
        assert!(WatchdogSupervisor::new(config, 0).is_err());
    }
}
