//! Read-one-parameter capability offered by the transport

use crate::error::ObdError;
use crate::pid::ParameterId;
use std::future::Future;

/// Anything that can turn a parameter identifier into a decoded reading.
///
/// Implementations may block on I/O; callers are expected to bound every
/// `read` with their own timeout. A failed read is always an `Err`, never a
/// sentinel value.
pub trait ParameterSource: Send {
    /// Read one parameter, decoded into its engineering unit
    fn read(&mut self, parameter: ParameterId)
        -> impl Future<Output = Result<f64, ObdError>> + Send;

    /// Tear down and re-establish the link to the ECU
    fn reconnect(&mut self) -> impl Future<Output = Result<(), ObdError>> + Send;
}
