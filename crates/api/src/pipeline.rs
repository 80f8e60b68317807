//! Acquisition loop
//!
//! One loop drives everything: scheduler tick, fuel and gear derivation on
//! each fast round, one log row per fast round, watchdog observation and
//! transport recovery, and the dashboard snapshot.

use crate::config::AppConfig;
use crate::snapshot::DashboardSnapshot;
use fuel_model::{FastSamples, FuelModel};
use gear_estimator::GearEstimator;
use metrics::{counter, gauge};
use obd_protocol::{ParameterId, ParameterSource};
use obd_scheduler::{RoundReport, SampleStore, TickReport, TieredScheduler};
use std::fs::File;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use storage::{CsvLogWriter, LogRow, Repository, RowEmitter, StorageError};
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use watchdog::{WatchdogEvent, WatchdogSupervisor};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Scheduler(#[from] obd_scheduler::SchedulerError),
    #[error(transparent)]
    Fuel(#[from] fuel_model::FuelError),
    #[error(transparent)]
    Gear(#[from] gear_estimator::GearError),
    #[error(transparent)]
    Watchdog(#[from] watchdog::WatchdogError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// What one `step` did
#[derive(Debug, Clone)]
pub struct StepReport {
    pub tick: TickReport,
    pub row: Option<LogRow>,
    /// Watchdog events, in the order they were raised
    pub events: Vec<WatchdogEvent>,
}

/// Current wall clock as Unix milliseconds
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub struct Pipeline<S: ParameterSource> {
    source: S,
    scheduler: TieredScheduler,
    fuel: FuelModel,
    gear: GearEstimator,
    watchdog: WatchdogSupervisor,
    emitter: RowEmitter,
    csv: Option<CsvLogWriter<File>>,
    repository: Arc<Repository>,
    snapshot_tx: watch::Sender<DashboardSnapshot>,
    tick_interval: Duration,
    recovery_timeout: Duration,
    display_interval_ms: u64,
    last_publish_ms: Option<u64>,
    rows_logged: u64,
}

impl<S: ParameterSource> Pipeline<S> {
    pub fn new(
        config: &AppConfig,
        source: S,
        repository: Arc<Repository>,
        now_ms: u64,
    ) -> Result<Self, PipelineError> {
        let scheduler = TieredScheduler::new(config.scheduler.clone())?;
        let fuel = FuelModel::new(config.fuel.clone())?;
        let gear = GearEstimator::new(config.gear.clone())?;
        let watchdog = WatchdogSupervisor::new(config.watchdog.clone(), now_ms)?;
        let emitter = RowEmitter::new(scheduler.parameters());

        let initial = DashboardSnapshot::capture(
            now_ms,
            &scheduler,
            fuel.state(),
            gear.state(),
            watchdog.state(),
            0,
        );
        let (snapshot_tx, _) = watch::channel(initial);

        Ok(Self {
            source,
            scheduler,
            fuel,
            gear,
            watchdog,
            emitter,
            csv: None,
            repository,
            snapshot_tx,
            tick_interval: Duration::from_millis(config.runtime.tick_interval_ms),
            recovery_timeout: Duration::from_millis(config.watchdog.recovery_timeout_ms),
            display_interval_ms: config.runtime.display_interval_ms,
            last_publish_ms: None,
            rows_logged: 0,
        })
    }

    /// Also append every row to `writer`
    pub fn with_csv_log(mut self, writer: CsvLogWriter<File>) -> Self {
        self.csv = Some(writer);
        self
    }

    /// CSV header, fixed for the whole run
    pub fn header(&self) -> &[String] {
        self.emitter.header()
    }

    /// Receiver for dashboard snapshots
    pub fn subscribe(&self) -> watch::Receiver<DashboardSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// One iteration of the loop at wall time `now_ms`.
    ///
    /// The watchdog is checked before the tick as well as after it: a hung
    /// link can hold the tick for several read timeouts, and the next step
    /// must not start another round before the stall is acted on.
    pub async fn step(&mut self, now_ms: u64) -> StepReport {
        let mut events = Vec::new();
        events.extend(self.supervise(now_ms).await);

        let tick = self.scheduler.run_tick(&mut self.source, now_ms).await;
        let row = tick.fast_round().map(|fast| self.on_fast_round(fast));

        events.extend(self.supervise(now_ms).await);

        let publish_due = match self.last_publish_ms {
            None => true,
            Some(last) => now_ms < last || now_ms - last >= self.display_interval_ms,
        };
        if publish_due {
            self.publish(now_ms);
        }

        StepReport { tick, row, events }
    }

    /// Feed the watchdog and act on what it asks for
    async fn supervise(&mut self, now_ms: u64) -> Option<WatchdogEvent> {
        let event = self
            .watchdog
            .observe(now_ms, self.scheduler.store().last_fast_update());
        match event {
            Some(WatchdogEvent::RecoveryRequested {
                stalled_for_ms,
                attempt,
            }) => {
                counter!("ecu_watchdog_recoveries_total").increment(1);
                warn!(
                    "Fast tier silent for {} ms; resetting transport (attempt {})",
                    stalled_for_ms, attempt
                );
                self.recover(now_ms).await;
            }
            Some(WatchdogEvent::Recovered { downtime_ms }) => {
                info!("Acquisition resumed after {} ms", downtime_ms);
            }
            None => {}
        }
        event
    }

    fn on_fast_round(&mut self, fast: &RoundReport) -> LogRow {
        let store = self.scheduler.store();
        let samples = FastSamples::new(
            round_value(fast, store, ParameterId::Maf),
            round_value(fast, store, ParameterId::ShortFuelTrim1),
            round_value(fast, store, ParameterId::LongFuelTrim1),
        );
        let fuel = self.fuel.on_fast_tick(fast.started_at_ms, &samples);
        gauge!("ecu_fuel_cumulative_base_ml").set(fuel.cumulative_base_ml);
        gauge!("ecu_fuel_cumulative_corrected_ml").set(fuel.cumulative_corrected_ml);

        self.gear.update(
            round_value(fast, store, ParameterId::Rpm),
            round_value(fast, store, ParameterId::Speed),
        );

        let row = self
            .emitter
            .emit(fast.started_at_ms, store, self.fuel.state(), self.gear.state());

        if let Some(csv) = self.csv.as_mut() {
            if let Err(e) = csv.append(&row) {
                error!("Failed to write CSV row: {}", e);
            }
        }
        if let Err(e) = self.repository.insert_row(row.clone()) {
            warn!("Failed to keep row in memory: {}", e);
        }
        self.rows_logged += 1;
        counter!("ecu_rows_logged_total").increment(1);
        row
    }

    async fn recover(&mut self, now_ms: u64) {
        self.watchdog.begin_recovery(now_ms);
        self.fuel.rebaseline();

        match tokio::time::timeout(self.recovery_timeout, self.source.reconnect()).await {
            Ok(Ok(())) => info!("Transport reconnected"),
            Ok(Err(e)) => warn!("Transport reconnect failed: {}", e),
            Err(_) => warn!(
                "Transport reconnect did not finish within {:?}",
                self.recovery_timeout
            ),
        }
    }

    fn publish(&mut self, now_ms: u64) {
        let snapshot = DashboardSnapshot::capture(
            now_ms,
            &self.scheduler,
            self.fuel.state(),
            self.gear.state(),
            self.watchdog.state(),
            self.rows_logged,
        );
        self.snapshot_tx.send_replace(snapshot);
        self.last_publish_ms = Some(now_ms);
    }

    /// Run until `shutdown` resolves, then flush the CSV log
    pub async fn run<F: Future<Output = ()>>(&mut self, shutdown: F) {
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(
            "Acquisition loop started ({} parameters, tick {:?})",
            self.emitter.parameters().len(),
            self.tick_interval
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    let report = self.step(now_ms()).await;
                    if report.tick.failures() > 0 {
                        debug!("{} read failure(s) this tick", report.tick.failures());
                    }
                }
            }
        }

        self.finish();
    }

    /// Flush the CSV log and report totals
    pub fn finish(&mut self) {
        if let Some(csv) = self.csv.as_mut() {
            if let Err(e) = csv.flush() {
                error!("Failed to flush CSV log: {}", e);
            }
        }
        let fuel = self.fuel.state();
        info!(
            "Logged {} rows; fuel used {:.1} ml (base) / {:.1} ml (trim-corrected)",
            self.rows_logged, fuel.cumulative_base_ml, fuel.cumulative_corrected_ml
        );
    }

    pub fn scheduler(&self) -> &TieredScheduler {
        &self.scheduler
    }

    pub fn fuel(&self) -> &FuelModel {
        &self.fuel
    }

    pub fn gear(&self) -> &GearEstimator {
        &self.gear
    }

    pub fn watchdog(&self) -> &WatchdogSupervisor {
        &self.watchdog
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn rows_logged(&self) -> u64 {
        self.rows_logged
    }
}

/// Value from this round when the parameter is fast-tier, otherwise the
/// store's current value
fn round_value(fast: &RoundReport, store: &SampleStore, parameter: ParameterId) -> Option<f64> {
    if fast.readings.iter().any(|r| r.parameter == parameter) {
        fast.value(parameter)
    } else {
        store.current_value(parameter)
    }
}
