//! hexapod-tilt - body tilt estimation and servo actuation
//!
//! A scalar Kalman filter fuses an accelerometer-derived angle with a gyro
//! rate into a filtered tilt angle and a gyro bias estimate. A control loop
//! drives the filter from a tilt sensor and turns the filtered angle into
//! per-leg PWM duty cycles, holding position through sensor dropouts and
//! isolating failed actuators.

pub mod config;
pub mod control;
pub mod error;
pub mod estimator;
pub mod hal;
pub mod imu;
pub mod mapping;
pub mod params;
pub mod sim;
pub mod state;

// Re-export main types
pub use config::RobotConfig;
pub use control::{ControlLoop, CycleReport, LoopConfig, RunSummary, ShutdownSignal};
pub use error::Error;
pub use estimator::AngleEstimator;
pub use hal::{Actuator, LegTarget, TiltSensor};
pub use mapping::{DutyMapping, DutyRange, LinearMapping};
pub use params::NoiseParams;
pub use state::{Covariance, FilterState};
