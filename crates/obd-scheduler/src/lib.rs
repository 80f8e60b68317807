//! OBD-II Tiered Scheduler
//!
//! Polls parameters in fast/medium/slow tiers with independent target
//! intervals and publishes the latest valid value of each parameter into a
//! [`SampleStore`] that the rest of the pipeline reads from.

mod config;
mod scheduler;
mod store;

pub use config::{SchedulerConfig, SchedulerError, TierConfig};
pub use scheduler::{Freshness, RoundReport, TickReport, TieredScheduler};
pub use store::{Reading, SampleStore};
