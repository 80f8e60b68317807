//! Data Validation
//!
//! Plausibility checks applied to every decoded OBD-II reading before it is
//! allowed into the sample store.

mod error;
mod validator;

pub use error::ValidationError;
pub use validator::{ValidationConfig, Validator, ValueRange};
