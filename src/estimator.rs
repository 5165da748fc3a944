//! Angle estimator
//!
//! Discrete-time Kalman filter over the state [angle, gyro bias]. The angle is
//! propagated by integrating the unbiased gyro rate, the bias is modelled as a
//! random walk, and the accelerometer-derived angle is the only measurement.

use crate::error::Error;
use crate::params::{check_variance, NoiseParams};
use crate::state::{Covariance, FilterState};

/// Single-axis Kalman angle estimator
#[derive(Debug, Clone)]
pub struct AngleEstimator {
    params: NoiseParams,
    state: FilterState,
}

impl AngleEstimator {
    /// Create a new estimator with zero angle, zero bias and zero covariance
    pub fn new(params: NoiseParams) -> Result<Self, Error> {
        params.validate()?;
        Ok(Self {
            params,
            state: FilterState::default(),
        })
    }

    /// Replace all three noise variances. On error the old values stay in effect.
    pub fn configure(&mut self, q_angle: f64, q_bias: f64, r_measure: f64) -> Result<(), Error> {
        self.params = NoiseParams::new(q_angle, q_bias, r_measure)?;
        Ok(())
    }

    pub fn set_q_angle(&mut self, q_angle: f64) -> Result<(), Error> {
        check_variance("q_angle", q_angle)?;
        self.params.q_angle = q_angle;
        Ok(())
    }

    pub fn set_q_bias(&mut self, q_bias: f64) -> Result<(), Error> {
        check_variance("q_bias", q_bias)?;
        self.params.q_bias = q_bias;
        Ok(())
    }

    pub fn set_r_measure(&mut self, r_measure: f64) -> Result<(), Error> {
        check_variance("r_measure", r_measure)?;
        self.params.r_measure = r_measure;
        Ok(())
    }

    /// Seed the angle, typically from the first accelerometer sample.
    /// Bias and covariance are left as they are.
    pub fn set_initial_angle(&mut self, angle: f64) {
        self.state.angle = angle;
    }

    /// Fuse one accelerometer angle and one gyro rate sample
    ///
    /// # Arguments
    /// * `new_angle` - Angle derived from the accelerometer [deg]
    /// * `new_rate` - Gyro rate [deg/s]
    /// * `dt` - Time since the previous update [s], must be >= 0
    ///
    /// # Returns
    /// The filtered angle. On error the state is left untouched.
    pub fn update(&mut self, new_angle: f64, new_rate: f64, dt: f64) -> Result<f64, Error> {
        if !(dt >= 0.0) || !dt.is_finite() {
            return Err(Error::InvalidInput {
                name: "dt",
                value: dt,
            });
        }
        if !new_angle.is_finite() {
            return Err(Error::InvalidInput {
                name: "new_angle",
                value: new_angle,
            });
        }
        if !new_rate.is_finite() {
            return Err(Error::InvalidInput {
                name: "new_rate",
                value: new_rate,
            });
        }

        let NoiseParams {
            q_angle,
            q_bias,
            r_measure,
        } = self.params;
        let s = &mut self.state;
        let p = &mut s.p.0;

        // Predict
        s.rate = new_rate - s.bias;
        s.angle += dt * s.rate;

        p[0][0] += dt * (dt * p[1][1] - p[0][1] - p[1][0] + q_angle);
        p[0][1] -= dt * p[1][1];
        p[1][0] -= dt * p[1][1];
        p[1][1] += dt * q_bias;

        // Innovation; r_measure > 0 keeps the denominator positive even for dt = 0
        let innovation = new_angle - s.angle;
        let innovation_cov = p[0][0] + r_measure;

        // Gain
        let k0 = p[0][0] / innovation_cov;
        let k1 = p[1][0] / innovation_cov;

        // Correct
        s.angle += k0 * innovation;
        s.bias += k1 * innovation;

        let p00 = p[0][0];
        let p01 = p[0][1];
        p[0][0] -= k0 * p00;
        p[0][1] -= k0 * p01;
        p[1][0] -= k1 * p00;
        p[1][1] -= k1 * p01;

        Ok(s.angle)
    }

    pub fn angle(&self) -> f64 {
        self.state.angle
    }

    pub fn bias(&self) -> f64 {
        self.state.bias
    }

    /// Unbiased rate from the last update
    pub fn rate(&self) -> f64 {
        self.state.rate
    }

    pub fn covariance(&self) -> Covariance {
        self.state.p
    }

    pub fn state(&self) -> FilterState {
        self.state
    }

    pub fn params(&self) -> NoiseParams {
        self.params
    }

    pub fn q_angle(&self) -> f64 {
        self.params.q_angle
    }

    pub fn q_bias(&self) -> f64 {
        self.params.q_bias
    }

    pub fn r_measure(&self) -> f64 {
        self.params.r_measure
    }
}

impl Default for AngleEstimator {
    fn default() -> Self {
        Self {
            params: NoiseParams::default(),
            state: FilterState::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    #[test]
    fn test_configure_accepts_positive() {
        let mut kf = AngleEstimator::default();
        kf.configure(0.002, 0.004, 0.05).unwrap();
        assert_eq!(kf.q_angle(), 0.002);
        assert_eq!(kf.q_bias(), 0.004);
        assert_eq!(kf.r_measure(), 0.05);
    }

    #[test]
    fn test_configure_rejects_non_positive_and_keeps_old() {
        let mut kf = AngleEstimator::default();
        for (qa, qb, r) in [(0.0, 0.003, 0.03), (0.001, 0.0, 0.03), (0.001, 0.003, -0.5)] {
            let err = kf.configure(qa, qb, r).unwrap_err();
            assert!(matches!(err, Error::InvalidParameter { .. }));
        }
        assert_eq!(kf.params(), NoiseParams::default());
        assert!(kf.set_r_measure(0.0).is_err());
        assert!(AngleEstimator::new(NoiseParams {
            q_angle: -1.0,
            ..NoiseParams::default()
        })
        .is_err());
    }

    #[test]
    fn test_first_update_trusts_measurement_partially() {
        let mut kf = AngleEstimator::default();
        kf.configure(0.001, 0.003, 0.03).unwrap();
        kf.set_initial_angle(0.0);
        let angle = kf.update(1.0, 0.0, 0.01).unwrap();
        assert!(angle > 0.0 && angle < 1.0, "angle = {angle}");
    }

    #[test]
    fn test_set_initial_angle_keeps_covariance() {
        let mut kf = AngleEstimator::default();
        kf.update(3.0, 0.5, 0.01).unwrap();
        let p = kf.covariance();
        kf.set_initial_angle(42.0);
        assert_eq!(kf.angle(), 42.0);
        assert_eq!(kf.covariance(), p);
    }

    #[test]
    fn test_negative_dt_leaves_state_unchanged() {
        let mut kf = AngleEstimator::default();
        kf.set_initial_angle(5.0);
        for _ in 0..10 {
            kf.update(6.0, 1.0, 0.01).unwrap();
        }
        let before = kf.state();
        let err = kf.update(7.0, 1.0, -0.01).unwrap_err();
        assert!(matches!(err, Error::InvalidInput { name: "dt", .. }));
        assert_eq!(kf.state(), before);

        assert!(kf.update(7.0, 1.0, f64::NAN).is_err());
        assert!(kf.update(f64::INFINITY, 1.0, 0.01).is_err());
        assert_eq!(kf.state(), before);
    }

    #[test]
    fn test_zero_dt_is_pure_correction() {
        let mut kf = AngleEstimator::default();
        for _ in 0..50 {
            kf.update(2.0, 0.0, 0.01).unwrap();
        }
        let before = kf.state();
        let angle = kf.update(before.angle, 100.0, 0.0).unwrap();
        // no time passed and no innovation: nothing moves
        assert_abs_diff_eq!(angle, before.angle, epsilon = 1e-12);
        assert!(angle.is_finite());
    }

    #[test]
    fn test_converges_to_constant_angle() {
        let mut kf = AngleEstimator::default();
        for _ in 0..1000 {
            kf.update(10.0, 0.0, 0.01).unwrap();
        }
        assert_abs_diff_eq!(kf.angle(), 10.0, epsilon = 1e-3);

        let p = kf.covariance();
        kf.update(10.0, 0.0, 0.01).unwrap();
        assert!(kf.covariance().max_abs_diff(&p) < 1e-9);
    }

    #[test]
    fn test_learns_constant_rate_as_bias() {
        let mut kf = AngleEstimator::default();
        for _ in 0..1000 {
            kf.update(0.0, 2.0, 0.01).unwrap();
        }
        assert_abs_diff_eq!(kf.bias(), 2.0, epsilon = 1e-3);
        assert_abs_diff_eq!(kf.angle(), 0.0, epsilon = 1e-3);
        assert_abs_diff_eq!(kf.rate(), 0.0, epsilon = 1e-2);
    }

    proptest! {
        #[test]
        fn prop_covariance_stays_symmetric_and_non_negative(
            samples in prop::collection::vec((-90.0f64..90.0, -250.0f64..250.0, 0.0f64..0.1), 1..200)
        ) {
            let mut kf = AngleEstimator::default();
            for (angle, rate, dt) in samples {
                kf.update(angle, rate, dt).unwrap();
                let p = kf.covariance();
                prop_assert!(p.is_symmetric(1e-9));
                prop_assert!(p.diagonal_non_negative());
            }
        }
    }
}
