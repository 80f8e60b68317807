//! OBD-II Error Types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while reading a parameter from the ECU
#[derive(Debug, Error)]
pub enum ObdError {
    /// Serial port connection error
    #[error("Serial port error: {0}")]
    SerialError(String),

    /// Timeout waiting for response
    #[error("Timeout waiting for OBD response after {0}ms")]
    Timeout(u64),

    /// The ECU answered but had no data for the request
    #[error("No data for {0}")]
    NoData(&'static str),

    /// Invalid response from adapter
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// PID not supported by vehicle
    #[error("PID {0:02X} not supported by vehicle")]
    PidNotSupported(u8),

    /// Adapter not responding
    #[error("OBD adapter not responding")]
    AdapterNotResponding,

    /// Vehicle not connected
    #[error("Vehicle ignition is off or not connected")]
    VehicleNotConnected,
}

/// Coarse classification of a failed read, used for counting and logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadFailure {
    /// The ECU returned nothing usable for this parameter
    NoData,
    /// The read did not complete within its bound
    Timeout,
    /// The link to the adapter itself is broken
    Transport,
    /// A value was decoded but failed plausibility checks
    Implausible,
}

impl ObdError {
    /// Classify this error for the scheduler's failure bookkeeping
    pub fn kind(&self) -> ReadFailure {
        match self {
            ObdError::NoData(_) | ObdError::PidNotSupported(_) | ObdError::InvalidResponse(_) => {
                ReadFailure::NoData
            }
            ObdError::Timeout(_) => ReadFailure::Timeout,
            ObdError::SerialError(_)
            | ObdError::AdapterNotResponding
            | ObdError::VehicleNotConnected => ReadFailure::Transport,
        }
    }
}

impl ReadFailure {
    /// Stable lowercase label for logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadFailure::NoData => "no_data",
            ReadFailure::Timeout => "timeout",
            ReadFailure::Transport => "transport",
            ReadFailure::Implausible => "implausible",
        }
    }
}

impl From<std::io::Error> for ObdError {
    fn from(err: std::io::Error) -> Self {
        ObdError::SerialError(err.to_string())
    }
}

impl From<tokio_serial::Error> for ObdError {
    fn from(err: tokio_serial::Error) -> Self {
        ObdError::SerialError(err.to_string())
    }
}
