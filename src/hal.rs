//! Interfaces to the hardware collaborators.
//!
//! Drivers for the I2C IMU and the PWM servo outputs live outside this crate;
//! they plug into the control loop through these traits. Both are synchronous
//! and any bus timeout is the driver's business.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Actuator channel, e.g. a softPwm pin or a PCA9685 output
pub type TargetId = u8;

/// Leg index as used by the command mapping
pub type LegId = usize;

/// Single-axis tilt sensor.
///
/// Both readings must use the unit system the estimator is tuned for
/// (degrees and degrees per second in this crate). A read that cannot
/// complete this cycle returns [`Error::SensorUnavailable`].
pub trait TiltSensor {
    fn read_accel_angle(&mut self) -> Result<f64, Error>;

    fn read_gyro_rate(&mut self) -> Result<f64, Error>;
}

/// PWM actuator bank.
///
/// A failed write returns [`Error::ActuatorFailure`].
pub trait Actuator {
    fn write(&mut self, target: TargetId, duty: u16) -> Result<(), Error>;
}

impl<T: TiltSensor + ?Sized> TiltSensor for &mut T {
    fn read_accel_angle(&mut self) -> Result<f64, Error> {
        (**self).read_accel_angle()
    }

    fn read_gyro_rate(&mut self) -> Result<f64, Error> {
        (**self).read_gyro_rate()
    }
}

impl<T: Actuator + ?Sized> Actuator for &mut T {
    fn write(&mut self, target: TargetId, duty: u16) -> Result<(), Error> {
        (**self).write(target, duty)
    }
}

/// Binds a leg to the actuator channel that drives it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegTarget {
    pub leg: LegId,
    pub target: TargetId,
}

impl LegTarget {
    pub fn new(leg: LegId, target: TargetId) -> Self {
        Self { leg, target }
    }
}
