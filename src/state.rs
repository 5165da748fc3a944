//! Estimator state representation
//!
//! The hidden state is the pair (angle, gyro bias) together with its 2x2
//! error covariance. Both are plain `Copy` values so a snapshot can be taken
//! before an update and compared afterwards.

/// 2x2 error covariance over (angle, bias)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Covariance(pub [[f64; 2]; 2]);

impl Covariance {
    /// All-zero covariance: the starting angle is assumed known and the bias zero
    pub fn zero() -> Self {
        Self([[0.0; 2]; 2])
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.0[row][col]
    }

    /// Off-diagonal terms agree within `tol`
    pub fn is_symmetric(&self, tol: f64) -> bool {
        (self.0[0][1] - self.0[1][0]).abs() <= tol
    }

    pub fn diagonal_non_negative(&self) -> bool {
        self.0[0][0] >= 0.0 && self.0[1][1] >= 0.0
    }

    /// Largest element-wise difference to `other`
    pub fn max_abs_diff(&self, other: &Covariance) -> f64 {
        let mut max = 0.0f64;
        for row in 0..2 {
            for col in 0..2 {
                max = max.max((self.0[row][col] - other.0[row][col]).abs());
            }
        }
        max
    }
}

/// Snapshot of the estimator
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FilterState {
    /// Best-estimate angle [deg]
    pub angle: f64,
    /// Best-estimate gyro bias [deg/s]
    pub bias: f64,
    /// Unbiased rate from the last predict step [deg/s]
    pub rate: f64,
    /// Error covariance
    pub p: Covariance,
}

impl FilterState {
    /// State seeded with an initial angle
    pub fn with_angle(angle: f64) -> Self {
        Self {
            angle,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_abs_diff() {
        let a = Covariance([[1.0, 0.5], [0.5, 2.0]]);
        let b = Covariance([[1.0, 0.25], [0.5, 2.5]]);
        assert_eq!(a.max_abs_diff(&b), 0.5);
        assert!(a.is_symmetric(0.0));
        assert!(!b.is_symmetric(0.1));
    }
}
