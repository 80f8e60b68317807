//! Acquisition Watchdog
//!
//! Detects when the fast tier stops producing data and asks the owner of the
//! transport to reset it.

mod supervisor;

pub use supervisor::{
    WatchdogConfig, WatchdogError, WatchdogEvent, WatchdogState, WatchdogStatus, WatchdogSupervisor,
};
