//! One-shot PID scan
//!
//! Reports which catalogue parameters the ECU supports and reads each
//! supported one once.

use obd_protocol::{ParameterId, ParameterSource, SupportedPids};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize)]
pub struct ScanEntry {
    pub name: &'static str,
    /// Mode 01 PID as `0x0C`; absent for adapter-level values
    pub pid: Option<String>,
    pub unit: &'static str,
    pub supported: bool,
    pub value: Option<f64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub timestamp: String,
    pub supported_count: usize,
    pub parameters: Vec<ScanEntry>,
}

impl ScanReport {
    pub fn entry(&self, name: &str) -> Option<&ScanEntry> {
        self.parameters.iter().find(|e| e.name == name)
    }
}

/// Read every supported parameter once, each bounded by `read_timeout`
pub async fn scan<S: ParameterSource>(
    source: &mut S,
    support: &SupportedPids,
    read_timeout: Duration,
    now_ms: u64,
) -> ScanReport {
    let mut parameters = Vec::with_capacity(ParameterId::ALL.len());

    for parameter in ParameterId::ALL {
        let supported = support.supports(parameter);
        let (value, error) = if supported {
            match tokio::time::timeout(read_timeout, source.read(parameter)).await {
                Ok(Ok(value)) => (Some(value), None),
                Ok(Err(e)) => (None, Some(e.to_string())),
                Err(_) => (None, Some(format!("no answer within {:?}", read_timeout))),
            }
        } else {
            (None, None)
        };
        debug!("{}: supported={} value={:?}", parameter, supported, value);

        parameters.push(ScanEntry {
            name: parameter.name(),
            pid: parameter.pid().map(|pid| format!("0x{:02X}", pid)),
            unit: parameter.unit().symbol(),
            supported,
            value,
            error,
        });
    }

    let supported_count = parameters.iter().filter(|e| e.supported).count();
    info!(
        "Scan complete: {} of {} parameters supported",
        supported_count,
        parameters.len()
    );

    ScanReport {
        timestamp: storage::format_timestamp(now_ms),
        supported_count,
        parameters,
    }
}
