//! Most-recent-value table per parameter

use obd_protocol::{ParameterId, ReadFailure, Tier};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One read attempt. `value` is `None` when the read failed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub parameter: ParameterId,
    pub value: Option<f64>,
    /// Round timestamp (Unix ms)
    pub observed_at_ms: u64,
}

#[derive(Debug, Clone, Default)]
struct Slot {
    last_valid: Option<Reading>,
    last_attempt_ms: Option<u64>,
    last_failure: Option<ReadFailure>,
    consecutive_failures: u32,
    total_reads: u64,
    total_failures: u64,
}

/// Latest valid reading per parameter plus attempt bookkeeping.
///
/// Only the scheduler writes here. A failed read never replaces the last
/// valid value; it only updates the attempt bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct SampleStore {
    slots: HashMap<ParameterId, Slot>,
    last_fast_update_ms: Option<u64>,
}

impl SampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_success(
        &mut self,
        parameter: ParameterId,
        tier: Tier,
        value: f64,
        now_ms: u64,
    ) {
        let slot = self.slots.entry(parameter).or_default();
        slot.last_valid = Some(Reading {
            parameter,
            value: Some(value),
            observed_at_ms: now_ms,
        });
        slot.last_attempt_ms = Some(now_ms);
        slot.last_failure = None;
        slot.consecutive_failures = 0;
        slot.total_reads += 1;

        if tier == Tier::Fast {
            self.last_fast_update_ms = Some(now_ms);
        }
    }

    /// Returns the consecutive failure count after this failure
    pub(crate) fn record_failure(
        &mut self,
        parameter: ParameterId,
        failure: ReadFailure,
        now_ms: u64,
    ) -> u32 {
        let slot = self.slots.entry(parameter).or_default();
        slot.last_attempt_ms = Some(now_ms);
        slot.last_failure = Some(failure);
        slot.consecutive_failures = slot.consecutive_failures.saturating_add(1);
        slot.total_reads += 1;
        slot.total_failures += 1;
        slot.consecutive_failures
    }

    /// Latest valid reading, whatever happened since
    pub fn latest(&self, parameter: ParameterId) -> Option<Reading> {
        self.slots.get(&parameter).and_then(|s| s.last_valid)
    }

    /// Latest valid value, whatever happened since
    pub fn value(&self, parameter: ParameterId) -> Option<f64> {
        self.latest(parameter).and_then(|r| r.value)
    }

    /// Latest valid value, but only if the most recent attempt succeeded
    pub fn current_value(&self, parameter: ParameterId) -> Option<f64> {
        if self.last_attempt_failed(parameter) {
            None
        } else {
            self.value(parameter)
        }
    }

    /// Whether the most recent attempt for `parameter` failed
    pub fn last_attempt_failed(&self, parameter: ParameterId) -> bool {
        self.slots
            .get(&parameter)
            .map_or(false, |s| s.last_failure.is_some())
    }

    /// Why the most recent attempt failed, if it did
    pub fn last_failure(&self, parameter: ParameterId) -> Option<ReadFailure> {
        self.slots.get(&parameter).and_then(|s| s.last_failure)
    }

    /// When `parameter` was last attempted
    pub fn last_attempt(&self, parameter: ParameterId) -> Option<u64> {
        self.slots.get(&parameter).and_then(|s| s.last_attempt_ms)
    }

    /// Milliseconds since the last valid value, `None` if never read
    pub fn age_ms(&self, parameter: ParameterId, now_ms: u64) -> Option<u64> {
        self.latest(parameter)
            .map(|r| now_ms.saturating_sub(r.observed_at_ms))
    }

    pub fn consecutive_failures(&self, parameter: ParameterId) -> u32 {
        self.slots
            .get(&parameter)
            .map_or(0, |s| s.consecutive_failures)
    }

    /// (attempts, failures) since startup
    pub fn counts(&self, parameter: ParameterId) -> (u64, u64) {
        self.slots
            .get(&parameter)
            .map_or((0, 0), |s| (s.total_reads, s.total_failures))
    }

    /// Timestamp of the most recent successful fast-tier read
    pub fn last_fast_update(&self) -> Option<u64> {
        self.last_fast_update_ms
    }
}
