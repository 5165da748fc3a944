//! IMU sample conversion and two-axis tilt estimation.
//!
//! Assumes an MPU6050-style part: three accelerometer axes in g and three gyro
//! axes in deg/s. Roll is rotation about x, pitch about y.

use crate::error::Error;
use crate::estimator::AngleEstimator;
use crate::hal::TiltSensor;
use crate::params::NoiseParams;

/// Register counts per physical unit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuScale {
    pub accel_lsb_per_g: f64,
    pub gyro_lsb_per_dps: f64,
}

impl Default for ImuScale {
    fn default() -> Self {
        // +-2 g and +-250 deg/s full scale
        Self {
            accel_lsb_per_g: 16384.0,
            gyro_lsb_per_dps: 131.0,
        }
    }
}

/// Raw register values as read from the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawImuSample {
    pub accel: [i16; 3],
    pub gyro: [i16; 3],
}

impl RawImuSample {
    pub fn scaled(&self, scale: ImuScale) -> ImuSample {
        ImuSample {
            accel: self.accel.map(|v| f64::from(v) / scale.accel_lsb_per_g),
            gyro: self.gyro.map(|v| f64::from(v) / scale.gyro_lsb_per_dps),
        }
    }
}

/// One IMU reading in physical units
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ImuSample {
    /// Acceleration [g]
    pub accel: [f64; 3],
    /// Angular rate [deg/s]
    pub gyro: [f64; 3],
}

/// Roll from gravity, in (-180, 180] deg
pub fn accel_roll(sample: &ImuSample) -> f64 {
    let [_, ay, az] = sample.accel;
    ay.atan2(az).to_degrees()
}

/// Pitch from gravity, in [-90, 90] deg
pub fn accel_pitch(sample: &ImuSample) -> f64 {
    let [ax, ay, az] = sample.accel;
    (-ax / (ay * ay + az * az).sqrt()).atan().to_degrees()
}

/// Filtered roll and pitch [deg]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Tilt {
    pub roll: f64,
    pub pitch: f64,
}

/// Roll and pitch estimators fed from one IMU
#[derive(Debug, Clone)]
pub struct TiltEstimator {
    roll: AngleEstimator,
    pitch: AngleEstimator,
}

impl TiltEstimator {
    /// Both axes share `params` and are seeded from `first`
    pub fn new(params: NoiseParams, first: &ImuSample) -> Result<Self, Error> {
        let mut roll = AngleEstimator::new(params)?;
        let mut pitch = AngleEstimator::new(params)?;
        roll.set_initial_angle(accel_roll(first));
        pitch.set_initial_angle(accel_pitch(first));
        Ok(Self { roll, pitch })
    }

    pub fn update(&mut self, sample: &ImuSample, dt: f64) -> Result<Tilt, Error> {
        let roll = accel_roll(sample);
        let pitch = accel_pitch(sample);
        let [roll_rate, mut pitch_rate, _] = sample.gyro;

        // atan2 roll jumps between +-180 when the body rolls over; restart the
        // filter from the measurement instead of dragging it across.
        let filtered_roll = self.roll.angle();
        if (roll < -90.0 && filtered_roll > 90.0) || (roll > 90.0 && filtered_roll < -90.0) {
            self.roll.set_initial_angle(roll);
        } else {
            self.roll.update(roll, roll_rate, dt)?;
        }

        // Upside down the pitch axis turns the other way.
        if self.roll.angle().abs() > 90.0 {
            pitch_rate = -pitch_rate;
        }
        self.pitch.update(pitch, pitch_rate, dt)?;

        Ok(self.tilt())
    }

    pub fn tilt(&self) -> Tilt {
        Tilt {
            roll: self.roll.angle(),
            pitch: self.pitch.angle(),
        }
    }

    pub fn roll(&self) -> &AngleEstimator {
        &self.roll
    }

    pub fn pitch(&self) -> &AngleEstimator {
        &self.pitch
    }
}

/// Source of full IMU readings, e.g. an I2C driver
pub trait ImuSource {
    fn read_sample(&mut self) -> Result<ImuSample, Error>;
}

/// Which tilt axis an [`AxisSensor`] reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Roll,
    Pitch,
}

/// Presents one axis of an [`ImuSource`] as a [`TiltSensor`].
///
/// The accelerometer read fetches a fresh sample and the gyro read that
/// follows reuses it, so each control cycle costs one bus transaction.
pub struct AxisSensor<S> {
    source: S,
    axis: Axis,
    pending: Option<ImuSample>,
}

impl<S: ImuSource> AxisSensor<S> {
    pub fn new(source: S, axis: Axis) -> Self {
        Self {
            source,
            axis,
            pending: None,
        }
    }

    pub fn into_inner(self) -> S {
        self.source
    }
}

impl<S: ImuSource> TiltSensor for AxisSensor<S> {
    fn read_accel_angle(&mut self) -> Result<f64, Error> {
        self.pending = None;
        let sample = self.source.read_sample()?;
        self.pending = Some(sample);
        Ok(match self.axis {
            Axis::Roll => accel_roll(&sample),
            Axis::Pitch => accel_pitch(&sample),
        })
    }

    fn read_gyro_rate(&mut self) -> Result<f64, Error> {
        let sample = match self.pending.take() {
            Some(sample) => sample,
            None => self.source.read_sample()?,
        };
        Ok(match self.axis {
            Axis::Roll => sample.gyro[0],
            Axis::Pitch => sample.gyro[1],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn level() -> ImuSample {
        ImuSample {
            accel: [0.0, 0.0, 1.0],
            gyro: [0.0; 3],
        }
    }

    #[test]
    fn test_raw_scaling() {
        let raw = RawImuSample {
            accel: [0, -8192, 16384],
            gyro: [131, 0, -262],
        };
        let s = raw.scaled(ImuScale::default());
        assert_eq!(s.accel, [0.0, -0.5, 1.0]);
        assert_eq!(s.gyro, [1.0, 0.0, -2.0]);
    }

    #[test]
    fn test_accel_angles() {
        assert_abs_diff_eq!(accel_roll(&level()), 0.0);
        assert_abs_diff_eq!(accel_pitch(&level()), 0.0);

        let rolled = ImuSample {
            accel: [0.0, 1.0, 1.0],
            gyro: [0.0; 3],
        };
        assert_abs_diff_eq!(accel_roll(&rolled), 45.0, epsilon = 1e-9);

        let pitched = ImuSample {
            accel: [-1.0, 0.0, 1.0],
            gyro: [0.0; 3],
        };
        assert_abs_diff_eq!(accel_pitch(&pitched), 45.0, epsilon = 1e-9);
    }

    #[test]
    fn test_tilt_estimator_tracks_static_tilt() {
        let sample = ImuSample {
            accel: [-0.5, 0.5, 0.8],
            gyro: [0.0; 3],
        };
        let mut tilt = TiltEstimator::new(NoiseParams::default(), &level()).unwrap();
        for _ in 0..2000 {
            tilt.update(&sample, 0.01).unwrap();
        }
        let out = tilt.tilt();
        assert_abs_diff_eq!(out.roll, accel_roll(&sample), epsilon = 1e-3);
        assert_abs_diff_eq!(out.pitch, accel_pitch(&sample), epsilon = 1e-3);
    }

    fn rolled_to(deg: f64) -> ImuSample {
        let r = deg.to_radians();
        ImuSample {
            accel: [0.0, r.sin(), r.cos()],
            gyro: [0.0; 3],
        }
    }

    #[test]
    fn test_roll_wrap_reseeds_instead_of_sweeping() {
        let mut tilt = TiltEstimator::new(NoiseParams::default(), &rolled_to(170.0)).unwrap();
        for _ in 0..10 {
            tilt.update(&rolled_to(170.0), 0.01).unwrap();
        }
        let wrapped = rolled_to(-175.0);
        let out = tilt.update(&wrapped, 0.01).unwrap();
        assert_eq!(out.roll, accel_roll(&wrapped));
        assert_abs_diff_eq!(out.roll, -175.0, epsilon = 1e-9);
    }

    #[test]
    fn test_tilt_estimator_rejects_negative_dt() {
        let mut tilt = TiltEstimator::new(NoiseParams::default(), &level()).unwrap();
        assert!(tilt.update(&level(), -0.01).is_err());
    }

    struct Counting(u32);

    impl ImuSource for Counting {
        fn read_sample(&mut self) -> Result<ImuSample, Error> {
            self.0 += 1;
            Ok(ImuSample {
                accel: [0.0, 1.0, 1.0],
                gyro: [3.0, -4.0, 0.0],
            })
        }
    }

    #[test]
    fn test_axis_sensor_reads_once_per_cycle() {
        let mut sensor = AxisSensor::new(Counting(0), Axis::Roll);
        assert_abs_diff_eq!(sensor.read_accel_angle().unwrap(), 45.0, epsilon = 1e-9);
        assert_eq!(sensor.read_gyro_rate().unwrap(), 3.0);
        assert_eq!(sensor.into_inner().0, 1);

        let mut pitch = AxisSensor::new(Counting(0), Axis::Pitch);
        assert_eq!(pitch.read_gyro_rate().unwrap(), -4.0);
    }
}
