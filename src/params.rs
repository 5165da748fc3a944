//! Kalman noise parameters
//!
//! Process and measurement noise variances for the angle estimator

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Noise variances for the angle estimator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseParams {
    /// Process noise variance of the angle
    pub q_angle: f64,
    /// Process noise variance of the gyro bias
    pub q_bias: f64,
    /// Measurement noise variance of the accelerometer angle
    pub r_measure: f64,
}

impl NoiseParams {
    /// Create validated noise parameters
    pub fn new(q_angle: f64, q_bias: f64, r_measure: f64) -> Result<Self, Error> {
        let params = Self {
            q_angle,
            q_bias,
            r_measure,
        };
        params.validate()?;
        Ok(params)
    }

    /// Tuning that works for an MPU6050 sampled at ~100 Hz
    pub fn default_params() -> Self {
        Self {
            q_angle: 0.001,
            q_bias: 0.003,
            r_measure: 0.03,
        }
    }

    /// Every variance must be finite and strictly positive
    pub fn validate(&self) -> Result<(), Error> {
        check_variance("q_angle", self.q_angle)?;
        check_variance("q_bias", self.q_bias)?;
        check_variance("r_measure", self.r_measure)
    }
}

impl Default for NoiseParams {
    fn default() -> Self {
        Self::default_params()
    }
}

pub(crate) fn check_variance(name: &'static str, value: f64) -> Result<(), Error> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidParameter { name, value })
    }
}
