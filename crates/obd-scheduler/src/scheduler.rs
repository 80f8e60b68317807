//! Tiered Scheduler Implementation

use crate::config::{SchedulerConfig, SchedulerError};
use crate::store::{Reading, SampleStore};
use data_validator::Validator;
use metrics::counter;
use obd_protocol::{ParameterId, ParameterSource, ReadFailure, Tier};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of one tier round: every parameter of the tier, in order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundReport {
    pub tier: Tier,
    /// Round timestamp shared by every reading
    pub started_at_ms: u64,
    pub readings: Vec<Reading>,
}

impl RoundReport {
    /// Value read for `parameter` in this round, if it succeeded
    pub fn value(&self, parameter: ParameterId) -> Option<f64> {
        self.readings
            .iter()
            .find(|r| r.parameter == parameter)
            .and_then(|r| r.value)
    }

    pub fn successes(&self) -> usize {
        self.readings.iter().filter(|r| r.value.is_some()).count()
    }

    pub fn failures(&self) -> usize {
        self.readings.len() - self.successes()
    }
}

/// Everything one `run_tick` call did
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickReport {
    pub now_ms: u64,
    pub rounds: Vec<RoundReport>,
}

impl TickReport {
    pub fn round(&self, tier: Tier) -> Option<&RoundReport> {
        self.rounds.iter().find(|r| r.tier == tier)
    }

    /// The fast round, present only on ticks where the fast tier was due
    pub fn fast_round(&self) -> Option<&RoundReport> {
        self.round(Tier::Fast)
    }

    /// No tier was due
    pub fn is_idle(&self) -> bool {
        self.rounds.is_empty()
    }

    pub fn failures(&self) -> usize {
        self.rounds.iter().map(RoundReport::failures).sum()
    }
}

/// Freshness of a parameter's last valid value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    Fresh,
    Stale,
    /// Never read successfully
    Missing,
}

#[derive(Debug, Clone)]
struct TierState {
    tier: Tier,
    interval_ms: u64,
    parameters: Vec<ParameterId>,
    last_round_ms: Option<u64>,
    rounds: u64,
}

impl TierState {
    fn is_due(&self, now_ms: u64) -> bool {
        match self.last_round_ms {
            None => true,
            // Wall clock stepped backwards: poll now and re-baseline
            Some(last) if now_ms < last => true,
            Some(last) => now_ms - last >= self.interval_ms,
        }
    }
}

/// Samples parameters in fast/medium/slow tiers at independent rates.
///
/// Each call to [`TieredScheduler::run_tick`] checks which tiers are due and
/// reads every parameter of those tiers, so the caller can drive it from a
/// single loop at any cadence finer than the fast interval.
pub struct TieredScheduler {
    tiers: Vec<TierState>,
    store: SampleStore,
    validator: Validator,
    read_timeout: Duration,
    max_consecutive_failures: u32,
    max_consecutive_timeouts: u32,
    stale_factor: f64,
}

impl TieredScheduler {
    /// Create a scheduler, rejecting invalid configuration
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        config.validate()?;

        let tiers: Vec<TierState> = Tier::ALL
            .iter()
            .map(|&tier| {
                let tier_config = config.tier(tier);
                TierState {
                    tier,
                    interval_ms: tier_config.interval_ms,
                    parameters: tier_config.resolved_parameters(tier),
                    last_round_ms: None,
                    rounds: 0,
                }
            })
            .collect();

        for t in &tiers {
            info!(
                "{} tier: {} parameters every {} ms",
                t.tier,
                t.parameters.len(),
                t.interval_ms
            );
        }

        Ok(Self {
            tiers,
            store: SampleStore::new(),
            validator: Validator::new(config.validation.clone()),
            read_timeout: Duration::from_millis(config.read_timeout_ms),
            max_consecutive_failures: config.max_consecutive_failures,
            max_consecutive_timeouts: config.max_consecutive_timeouts,
            stale_factor: config.stale_factor,
        })
    }

    /// Run every tier that is due at `now_ms`.
    ///
    /// All reads of a round are stamped with `now_ms`. Individual read
    /// failures are recorded and counted, never returned as errors.
    ///
    /// Once `max_consecutive_timeouts` reads in a row have timed out, the
    /// remaining reads of the tick are recorded as timeouts without being
    /// sent, so a hung link costs a bounded amount of time per tick.
    pub async fn run_tick<S: ParameterSource>(&mut self, source: &mut S, now_ms: u64) -> TickReport {
        let mut timeouts = 0;
        let mut rounds = Vec::new();
        for idx in 0..self.tiers.len() {
            if self.tiers[idx].is_due(now_ms) {
                rounds.push(self.run_round(idx, source, now_ms, &mut timeouts).await);
            }
        }
        TickReport { now_ms, rounds }
    }

    async fn run_round<S: ParameterSource>(
        &mut self,
        idx: usize,
        source: &mut S,
        now_ms: u64,
        timeouts: &mut u32,
    ) -> RoundReport {
        let tier = self.tiers[idx].tier;
        let parameters = self.tiers[idx].parameters.clone();
        let mut readings = Vec::with_capacity(parameters.len());

        for parameter in parameters {
            let result = if *timeouts >= self.max_consecutive_timeouts {
                counter!("obd_reads_skipped_total", "tier" => tier.as_str()).increment(1);
                Err(ReadFailure::Timeout)
            } else {
                counter!("obd_reads_total", "tier" => tier.as_str()).increment(1);
                let result = self.read_one(source, parameter).await;
                if matches!(result, Err(ReadFailure::Timeout)) {
                    *timeouts += 1;
                    if *timeouts == self.max_consecutive_timeouts {
                        warn!(
                            "{} reads in a row timed out; skipping the rest of this tick",
                            timeouts
                        );
                    }
                } else {
                    *timeouts = 0;
                }
                result
            };

            let value = match result {
                Ok(value) => {
                    self.store.record_success(parameter, tier, value, now_ms);
                    Some(value)
                }
                Err(failure) => {
                    counter!(
                        "obd_read_failures_total",
                        "tier" => tier.as_str(),
                        "reason" => failure.as_str()
                    )
                    .increment(1);

                    let streak = self.store.record_failure(parameter, failure, now_ms);
                    if streak == self.max_consecutive_failures {
                        warn!(
                            "{} failed {} times in a row (last: {})",
                            parameter,
                            streak,
                            failure.as_str()
                        );
                    }
                    None
                }
            };

            readings.push(Reading {
                parameter,
                value,
                observed_at_ms: now_ms,
            });
        }

        let state = &mut self.tiers[idx];
        state.last_round_ms = Some(now_ms);
        state.rounds += 1;

        let report = RoundReport {
            tier,
            started_at_ms: now_ms,
            readings,
        };
        debug!(
            "{} round #{}: {} ok, {} failed",
            tier,
            state.rounds,
            report.successes(),
            report.failures()
        );
        report
    }

    /// One bounded read, validated before it can reach the store
    async fn read_one<S: ParameterSource>(
        &self,
        source: &mut S,
        parameter: ParameterId,
    ) -> Result<f64, ReadFailure> {
        match tokio::time::timeout(self.read_timeout, source.read(parameter)).await {
            Ok(Ok(value)) => self.validator.validate(parameter, value).map_err(|e| {
                debug!("Rejected reading: {}", e);
                ReadFailure::Implausible
            }),
            Ok(Err(e)) => {
                debug!("{} read failed: {}", parameter, e);
                Err(e.kind())
            }
            Err(_) => {
                debug!(
                    "{} read timed out after {} ms",
                    parameter,
                    self.read_timeout.as_millis()
                );
                Err(ReadFailure::Timeout)
            }
        }
    }

    /// Read-only view of the latest values
    pub fn store(&self) -> &SampleStore {
        &self.store
    }

    /// Whether `tier` would run at `now_ms`
    pub fn is_due(&self, tier: Tier, now_ms: u64) -> bool {
        self.tier_state(tier).is_due(now_ms)
    }

    /// Configured interval of `tier`
    pub fn interval_ms(&self, tier: Tier) -> u64 {
        self.tier_state(tier).interval_ms
    }

    /// Number of completed rounds of `tier`
    pub fn rounds(&self, tier: Tier) -> u64 {
        self.tier_state(tier).rounds
    }

    /// Every polled parameter: fast tier first, then medium, then slow
    pub fn parameters(&self) -> Vec<ParameterId> {
        self.tiers
            .iter()
            .flat_map(|t| t.parameters.iter().copied())
            .collect()
    }

    /// Tier `parameter` is polled in, if it is polled at all
    pub fn tier_of(&self, parameter: ParameterId) -> Option<Tier> {
        self.tiers
            .iter()
            .find(|t| t.parameters.contains(&parameter))
            .map(|t| t.tier)
    }

    /// Classify the age of `parameter`'s last valid value against its tier
    pub fn freshness(&self, parameter: ParameterId, now_ms: u64) -> Freshness {
        let (Some(tier), Some(age)) = (self.tier_of(parameter), self.store.age_ms(parameter, now_ms))
        else {
            return Freshness::Missing;
        };
        let limit = self.tier_state(tier).interval_ms as f64 * self.stale_factor;
        if age as f64 > limit {
            Freshness::Stale
        } else {
            Freshness::Fresh
        }
    }

    fn tier_state(&self, tier: Tier) -> &TierState {
        // Tier::ALL order is fixed at construction
        &self.tiers[tier as usize]
    }
}
