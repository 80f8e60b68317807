//! Log row assembly

use chrono::{DateTime, SecondsFormat, Utc};
use fuel_model::FuelState;
use gear_estimator::GearState;
use obd_protocol::ParameterId;
use obd_scheduler::SampleStore;
use serde::{Deserialize, Serialize};

/// Columns after the raw parameters, in order
pub const DERIVED_COLUMNS: [&str; 5] = [
    "inst_fuel_flow_base_ml_min",
    "inst_fuel_flow_corrected_ml_min",
    "cumulative_fuel_base_ml",
    "cumulative_fuel_corrected_ml",
    "estimated_gear",
];

/// One log line, already formatted. `fields[0]` is the timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRow {
    pub timestamp_ms: u64,
    pub fields: Vec<String>,
}

/// RFC 3339 UTC with millisecond precision
pub fn format_timestamp(timestamp_ms: u64) -> String {
    i64::try_from(timestamp_ms)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| timestamp_ms.to_string())
}

fn blank_or<T>(value: Option<T>, format: impl FnOnce(T) -> String) -> String {
    value.map(format).unwrap_or_default()
}

/// Builds rows with a column order fixed at construction.
#[derive(Debug, Clone)]
pub struct RowEmitter {
    parameters: Vec<ParameterId>,
    header: Vec<String>,
}

impl RowEmitter {
    /// `parameters` are the raw columns, in the order they are polled
    pub fn new(parameters: Vec<ParameterId>) -> Self {
        let header = std::iter::once("timestamp".to_string())
            .chain(parameters.iter().map(|p| p.name().to_string()))
            .chain(DERIVED_COLUMNS.iter().map(|c| c.to_string()))
            .collect();
        Self { parameters, header }
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn parameters(&self) -> &[ParameterId] {
        &self.parameters
    }

    /// Assemble the row for the fast tick at `now_ms`.
    ///
    /// A raw field is blank when the parameter has never been read or its
    /// latest attempt failed. Nothing is ever filled in with zero.
    pub fn emit(
        &self,
        now_ms: u64,
        store: &SampleStore,
        fuel: &FuelState,
        gear: &GearState,
    ) -> LogRow {
        let mut fields = Vec::with_capacity(self.header.len());
        fields.push(format_timestamp(now_ms));

        for parameter in &self.parameters {
            fields.push(blank_or(store.current_value(*parameter), |v| v.to_string()));
        }

        let integrating = fuel.last_sample_ms.is_some();
        fields.push(blank_or(fuel.inst_flow_base_ml_min, |v| format!("{:.3}", v)));
        fields.push(blank_or(fuel.inst_flow_corrected_ml_min, |v| format!("{:.3}", v)));
        fields.push(blank_or(
            integrating.then_some(fuel.cumulative_base_ml),
            |v| format!("{:.3}", v),
        ));
        fields.push(blank_or(
            integrating.then_some(fuel.cumulative_corrected_ml),
            |v| format!("{:.3}", v),
        ));
        fields.push(gear.estimated_gear.to_string());

        LogRow {
            timestamp_ms: now_ms,
            fields,
        }
    }
}
