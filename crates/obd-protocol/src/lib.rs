//! OBD-II Protocol Implementation
//!
//! This crate provides the parameter catalogue, Mode 01 decoding, and async
//! serial communication with ELM327-compatible OBD-II adapters. Everything
//! above it only sees the [`ParameterSource`] capability.

mod client;
mod error;
mod mock;
mod pid;
mod source;
mod support;

pub use client::ObdClient;
pub use error::{ObdError, ReadFailure};
pub use mock::{Scripted, ScriptedSource};
pub use pid::{ParameterId, PidResponse, Tier, Unit};
pub use source::ParameterSource;
pub use support::{SupportedPids, SUPPORT_RANGES};

/// OBD-II mode constants
pub mod mode {
    /// Current data
    pub const CURRENT_DATA: u8 = 0x01;
}
