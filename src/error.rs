//! Error type shared by the estimator, the control loop and its collaborators.

use thiserror::Error;

use crate::hal::TargetId;

/// Errors raised by this crate.
///
/// `InvalidParameter` and `InvalidInput` are caller bugs and are returned
/// immediately. `SensorUnavailable` and `ActuatorFailure` are reported by the
/// hardware collaborators and are absorbed by the control loop.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid parameter {name}: {value} (must be finite and > 0)")]
    InvalidParameter { name: &'static str, value: f64 },
    #[error("invalid input {name}: {value}")]
    InvalidInput { name: &'static str, value: f64 },
    #[error("sensor unavailable: {0}")]
    SensorUnavailable(String),
    #[error("actuator {target} failed: {reason}")]
    ActuatorFailure { target: TargetId, reason: String },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// True for the transient I/O conditions the control loop recovers from.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::SensorUnavailable(_) | Error::ActuatorFailure { .. }
        )
    }
}
