//! Robot configuration
//!
//! Noise parameters, duty range, angle mapping and the leg to actuator
//! bindings, loaded once at startup from TOML.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::control::LoopConfig;
use crate::error::Error;
use crate::hal::{LegId, LegTarget};
use crate::mapping::{DutyRange, LinearMapping};
use crate::params::NoiseParams;

/// Startup configuration for the tilt loop, usually read from a TOML file.
///
/// ```toml
/// period_ms = 20
///
/// [noise]
/// q_angle = 0.001
/// q_bias = 0.003
/// r_measure = 0.03
///
/// [duty]
/// min = 5
/// max = 25
/// neutral = 15
///
/// [mapping]
/// angle_min = -45.0
/// angle_max = 45.0
/// mirrored_legs = [3, 4, 5]
///
/// [[legs]]
/// leg = 0
/// target = 1
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotConfig {
    /// Control period [ms]
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,
    #[serde(default)]
    pub noise: NoiseParams,
    #[serde(default)]
    pub duty: DutyRange,
    #[serde(default)]
    pub mapping: MappingConfig,
    pub legs: Vec<LegTarget>,
}

/// Angle window mapped onto the duty range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingConfig {
    /// Angle giving the minimum duty [deg]
    pub angle_min: f64,
    /// Angle giving the maximum duty [deg]
    pub angle_max: f64,
    #[serde(default)]
    pub mirrored_legs: Vec<LegId>,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            angle_min: -45.0,
            angle_max: 45.0,
            mirrored_legs: Vec::new(),
        }
    }
}

fn default_period_ms() -> u64 {
    125
}

impl Default for RobotConfig {
    fn default() -> Self {
        // six legs on channels 0..5, right side mirrored
        Self {
            period_ms: default_period_ms(),
            noise: NoiseParams::default(),
            duty: DutyRange::default(),
            mapping: MappingConfig {
                mirrored_legs: vec![3, 4, 5],
                ..MappingConfig::default()
            },
            legs: (0..6u8).map(|i| LegTarget::new(usize::from(i), i)).collect(),
        }
    }
}

impl RobotConfig {
    pub fn from_toml_file(path: &Path) -> Result<Self, Error> {
        let raw = fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, Error> {
        let cfg: RobotConfig = toml::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), Error> {
        self.noise.validate()?;
        self.duty.validate()?;
        self.linear_mapping()?;
        if self.legs.is_empty() {
            return Err(Error::InvalidConfig("at least one leg is required".into()));
        }
        let mut seen = BTreeSet::new();
        for leg in &self.legs {
            if !seen.insert(leg.target) {
                return Err(Error::InvalidConfig(format!(
                    "actuator target {} is bound to more than one leg",
                    leg.target
                )));
            }
        }
        Ok(())
    }

    pub fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            duty: self.duty,
            period: Duration::from_millis(self.period_ms),
        }
    }

    pub fn linear_mapping(&self) -> Result<LinearMapping, Error> {
        Ok(
            LinearMapping::new(self.mapping.angle_min, self.mapping.angle_max, self.duty)?
                .with_mirrored_legs(self.mapping.mirrored_legs.iter().copied()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
period_ms = 20

[noise]
q_angle = 0.002
q_bias = 0.003
r_measure = 0.05

[duty]
min = 6
max = 24
neutral = 15

[mapping]
angle_min = -30.0
angle_max = 30.0
mirrored_legs = [1]

[[legs]]
leg = 0
target = 1

[[legs]]
leg = 1
target = 4
"#;

    #[test]
    fn test_parse_sample() {
        let cfg = RobotConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(cfg.loop_config().period, Duration::from_millis(20));
        assert_eq!(cfg.noise.r_measure, 0.05);
        assert_eq!(cfg.legs, vec![LegTarget::new(0, 1), LegTarget::new(1, 4)]);
        let mapping = cfg.linear_mapping().unwrap();
        assert_eq!(mapping.duty_min, 6.0);
        assert_eq!(mapping.mirrored_legs, vec![1]);
    }

    #[test]
    fn test_defaults_fill_missing_sections() {
        let cfg = RobotConfig::from_toml_str("[[legs]]\nleg = 0\ntarget = 1\n").unwrap();
        assert_eq!(cfg.period_ms, 125);
        assert_eq!(cfg.noise, NoiseParams::default());
        assert_eq!(cfg.duty, DutyRange::default());
    }

    #[test]
    fn test_rejects_bad_noise() {
        let raw = SAMPLE.replace("q_bias = 0.003", "q_bias = 0.0");
        let err = RobotConfig::from_toml_str(&raw).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { name: "q_bias", .. }));
    }

    #[test]
    fn test_rejects_duplicate_target() {
        let raw = SAMPLE.replace("target = 4", "target = 1");
        assert!(matches!(
            RobotConfig::from_toml_str(&raw),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        assert!(matches!(
            RobotConfig::from_toml_str("legs = 3"),
            Err(Error::Toml(_))
        ));
    }

    #[test]
    fn test_default_is_valid() {
        RobotConfig::default().validate().unwrap();
    }
}
