//! Angle to duty-cycle mapping
//!
//! Duty cycles are expressed in softPwm ticks. With a 200-tick range at
//! 100 us per tick the servo period is 20 ms, so 5..25 ticks covers the
//! usual 0.5..2.5 ms hobby-servo pulse.

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::hal::LegId;

/// Allowed duty-cycle window for every actuator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DutyRange {
    pub min: u16,
    pub max: u16,
    /// Safe position driven on shutdown and before the first good cycle
    pub neutral: u16,
}

impl DutyRange {
    pub fn new(min: u16, max: u16, neutral: u16) -> Result<Self, Error> {
        let range = Self { min, max, neutral };
        range.validate()?;
        Ok(range)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.min > self.max {
            return Err(Error::InvalidConfig(format!(
                "duty min {} exceeds max {}",
                self.min, self.max
            )));
        }
        if !(self.min..=self.max).contains(&self.neutral) {
            return Err(Error::InvalidConfig(format!(
                "neutral duty {} outside [{}, {}]",
                self.neutral, self.min, self.max
            )));
        }
        Ok(())
    }

    /// Round and clamp a mapped value into the window. NaN maps to neutral.
    pub fn clamp(&self, duty: f64) -> u16 {
        if duty.is_nan() {
            return self.neutral;
        }
        duty.round().clamp(f64::from(self.min), f64::from(self.max)) as u16
    }
}

impl Default for DutyRange {
    fn default() -> Self {
        Self {
            min: 5,
            max: 25,
            neutral: 15,
        }
    }
}

/// Linear rescale of `value` from [from_min, from_max] to [to_min, to_max]
pub fn map_range(value: f64, from_min: f64, from_max: f64, to_min: f64, to_max: f64) -> f64 {
    (value - from_min) * (to_max - to_min) / (from_max - from_min) + to_min
}

/// Turns a filtered angle into a duty cycle for one leg.
///
/// The result is unclamped; the control loop clamps it into its [`DutyRange`].
pub trait DutyMapping {
    fn duty_for(&self, leg: LegId, angle: f64) -> f64;
}

impl<F> DutyMapping for F
where
    F: Fn(LegId, f64) -> f64,
{
    fn duty_for(&self, leg: LegId, angle: f64) -> f64 {
        self(leg, angle)
    }
}

/// Maps [angle_min, angle_max] linearly onto [duty_min, duty_max].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearMapping {
    pub angle_min: f64,
    pub angle_max: f64,
    pub duty_min: f64,
    pub duty_max: f64,
    /// Legs mounted on the opposite side of the body see the angle negated
    #[serde(default)]
    pub mirrored_legs: Vec<LegId>,
}

impl LinearMapping {
    pub fn new(angle_min: f64, angle_max: f64, duty: DutyRange) -> Result<Self, Error> {
        let mapping = Self {
            angle_min,
            angle_max,
            duty_min: f64::from(duty.min),
            duty_max: f64::from(duty.max),
            mirrored_legs: Vec::new(),
        };
        mapping.validate()?;
        Ok(mapping)
    }

    pub fn with_mirrored_legs(mut self, legs: impl IntoIterator<Item = LegId>) -> Self {
        self.mirrored_legs = legs.into_iter().collect();
        self
    }

    pub fn validate(&self) -> Result<(), Error> {
        let finite = [self.angle_min, self.angle_max, self.duty_min, self.duty_max]
            .iter()
            .all(|v| v.is_finite());
        if !finite || self.angle_max <= self.angle_min {
            return Err(Error::InvalidConfig(format!(
                "mapping angle range [{}, {}] must be finite and increasing",
                self.angle_min, self.angle_max
            )));
        }
        Ok(())
    }
}

impl DutyMapping for LinearMapping {
    fn duty_for(&self, leg: LegId, angle: f64) -> f64 {
        let angle = if self.mirrored_legs.contains(&leg) {
            -angle
        } else {
            angle
        };
        map_range(
            angle,
            self.angle_min,
            self.angle_max,
            self.duty_min,
            self.duty_max,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_map_range() {
        assert_relative_eq!(map_range(0.0, -5.0, 5.0, -10.0, 20.0), 5.0);
        assert_relative_eq!(map_range(5.0, -5.0, 5.0, -10.0, 20.0), 20.0);
    }

    #[test]
    fn test_linear_mapping_centre_is_neutral() {
        let duty = DutyRange::default();
        let mapping = LinearMapping::new(-45.0, 45.0, duty).unwrap();
        assert_eq!(duty.clamp(mapping.duty_for(0, 0.0)), duty.neutral);
        assert_eq!(duty.clamp(mapping.duty_for(0, 45.0)), 25);
        assert_eq!(duty.clamp(mapping.duty_for(0, 90.0)), 25);
        assert_eq!(duty.clamp(mapping.duty_for(0, -90.0)), 5);
    }

    #[test]
    fn test_mirrored_leg() {
        let mapping = LinearMapping::new(-45.0, 45.0, DutyRange::default())
            .unwrap()
            .with_mirrored_legs([1]);
        assert_relative_eq!(mapping.duty_for(0, 9.0), 17.0);
        assert_relative_eq!(mapping.duty_for(1, 9.0), 13.0);
    }

    #[test]
    fn test_closure_mapping() {
        let mapping = |leg: LegId, angle: f64| 15.0 + leg as f64 + angle;
        assert_relative_eq!(mapping.duty_for(2, 1.5), 18.5);
    }

    #[test]
    fn test_duty_range_validation() {
        assert!(DutyRange::new(25, 5, 15).is_err());
        assert!(DutyRange::new(5, 25, 30).is_err());
        assert_eq!(DutyRange::default().clamp(f64::NAN), 15);
    }
}
