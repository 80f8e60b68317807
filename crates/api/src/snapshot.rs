//! Read-only dashboard view

use fuel_model::FuelState;
use gear_estimator::GearState;
use obd_protocol::{ReadFailure, Tier};
use obd_scheduler::{Freshness, TieredScheduler};
use serde::Serialize;
use watchdog::WatchdogState;

/// One parameter as the dashboard shows it: the last known good value with
/// its age, never blanked on a failed read
#[derive(Debug, Clone, Serialize)]
pub struct ParameterView {
    pub name: &'static str,
    pub unit: &'static str,
    pub tier: Tier,
    pub value: Option<f64>,
    pub age_ms: Option<u64>,
    pub stale: bool,
    pub last_failure: Option<ReadFailure>,
}

/// Copy-on-read snapshot published at display granularity
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub timestamp_ms: u64,
    pub parameters: Vec<ParameterView>,
    pub fuel: FuelState,
    pub gear: GearState,
    pub watchdog: WatchdogState,
    pub rows_logged: u64,
}

impl DashboardSnapshot {
    pub fn capture(
        now_ms: u64,
        scheduler: &TieredScheduler,
        fuel: &FuelState,
        gear: &GearState,
        watchdog: &WatchdogState,
        rows_logged: u64,
    ) -> Self {
        let store = scheduler.store();
        let parameters = scheduler
            .parameters()
            .into_iter()
            .map(|p| ParameterView {
                name: p.name(),
                unit: p.unit().symbol(),
                tier: scheduler.tier_of(p).unwrap_or_else(|| p.default_tier()),
                value: store.value(p),
                age_ms: store.age_ms(p, now_ms),
                stale: scheduler.freshness(p, now_ms) == Freshness::Stale,
                last_failure: store.last_failure(p),
            })
            .collect();

        Self {
            timestamp_ms: now_ms,
            parameters,
            fuel: fuel.clone(),
            gear: *gear,
            watchdog: watchdog.clone(),
            rows_logged,
        }
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterView> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obd_protocol::{ParameterId, Scripted, ScriptedSource};
    use obd_scheduler::SchedulerConfig;
    use watchdog::{WatchdogConfig, WatchdogSupervisor};

    #[tokio::test]
    async fn test_stale_value_is_kept_and_flagged() {
        let mut scheduler = TieredScheduler::new(SchedulerConfig::default()).unwrap();
        let mut source = ScriptedSource::new();
        source.set(ParameterId::Rpm, 900.0);
        scheduler.run_tick(&mut source, 0).await;

        source.set_answer(ParameterId::Rpm, Scripted::NoData);
        for t in 1..=4 {
            scheduler.run_tick(&mut source, t * 1_000).await;
        }

        let watchdog = WatchdogSupervisor::new(WatchdogConfig::default(), 0).unwrap();
        let snapshot = DashboardSnapshot::capture(
            4_000,
            &scheduler,
            &FuelState::default(),
            &GearState::default(),
            watchdog.state(),
            0,
        );

        let rpm = snapshot.parameter("RPM").unwrap();
        assert_eq!(rpm.value, Some(900.0));
        assert_eq!(rpm.age_ms, Some(4_000));
        assert!(rpm.stale);
        assert_eq!(rpm.last_failure, Some(ReadFailure::NoData));
        assert_eq!(rpm.tier, Tier::Fast);

        let speed = snapshot.parameter("SPEED").unwrap();
        assert_eq!(speed.value, None);
        assert!(!speed.stale);
    }
}
