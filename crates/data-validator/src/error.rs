//! Validation Error Types

use thiserror::Error;

/// Errors during data validation
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    /// Value out of allowed range
    #[error("{field} value {value} is out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    /// NaN or infinite value
    #[error("{field} value {value} is not a finite number")]
    NotFinite { field: &'static str, value: f64 },

    /// Range with min above max, or non-finite bounds
    #[error("Invalid range for {field}: [{min}, {max}]")]
    InvalidRange {
        field: &'static str,
        min: f64,
        max: f64,
    },
}
