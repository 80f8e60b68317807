//! Dashboard routes

pub mod log;
pub mod metrics;
pub mod snapshot;
