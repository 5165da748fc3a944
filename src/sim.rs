//! Simulation harness
//!
//! Synthetic IMU and actuator collaborators, plus a closed-loop run used to
//! evaluate the estimator without hardware.

use std::collections::BTreeSet;
use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use crate::control::{ControlLoop, LoopConfig};
use crate::error::Error;
use crate::estimator::AngleEstimator;
use crate::hal::{Actuator, LegTarget, TargetId, TiltSensor};
use crate::mapping::{DutyRange, LinearMapping};
use crate::params::NoiseParams;

/// Simulation configuration
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub dt: f64,
    pub steps: usize,
    /// Body sway amplitude [deg]
    pub sway_amplitude: f64,
    /// Body sway frequency [Hz]
    pub sway_frequency: f64,
    /// Accelerometer angle noise [deg]
    pub sigma_accel: f64,
    /// Gyro noise [deg/s]
    pub sigma_gyro: f64,
    /// Constant gyro offset [deg/s]
    pub gyro_bias: f64,
    /// 1-based cycles on which the IMU reports unavailable
    pub dropout_cycles: Vec<u64>,
    /// Actuator channels whose writes fail
    pub failing_targets: Vec<TargetId>,
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            dt: 0.01,
            steps: 2000,
            sway_amplitude: 10.0,
            sway_frequency: 0.25,
            sigma_accel: 2.0,
            sigma_gyro: 0.5,
            gyro_bias: 1.5,
            dropout_cycles: Vec::new(),
            failing_targets: Vec::new(),
            seed: 42,
        }
    }
}

/// IMU on a body swaying sinusoidally about one axis
pub struct SimulatedImu {
    rng: StdRng,
    accel_noise: Normal<f64>,
    gyro_noise: Normal<f64>,
    amplitude: f64,
    omega: f64,
    gyro_bias: f64,
    dt: f64,
    dropouts: BTreeSet<u64>,
    cycle: u64,
    last_accel_angle: Option<f64>,
}

impl SimulatedImu {
    pub fn new(config: &SimConfig) -> Result<Self, Error> {
        let accel_noise = Normal::new(0.0, config.sigma_accel)
            .map_err(|_| Error::InvalidConfig(format!("sigma_accel {}", config.sigma_accel)))?;
        let gyro_noise = Normal::new(0.0, config.sigma_gyro)
            .map_err(|_| Error::InvalidConfig(format!("sigma_gyro {}", config.sigma_gyro)))?;
        Ok(Self {
            rng: StdRng::seed_from_u64(config.seed),
            accel_noise,
            gyro_noise,
            amplitude: config.sway_amplitude,
            omega: 2.0 * PI * config.sway_frequency,
            gyro_bias: config.gyro_bias,
            dt: config.dt,
            dropouts: config.dropout_cycles.iter().copied().collect(),
            cycle: 0,
            last_accel_angle: None,
        })
    }

    /// Cycles started so far; each accelerometer read starts one
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    fn t(&self) -> f64 {
        self.cycle.saturating_sub(1) as f64 * self.dt
    }

    /// True body angle for the current cycle [deg]
    pub fn true_angle(&self) -> f64 {
        self.amplitude * (self.omega * self.t()).sin()
    }

    /// True body rate for the current cycle [deg/s]
    pub fn true_rate(&self) -> f64 {
        self.amplitude * self.omega * (self.omega * self.t()).cos()
    }

    /// Accelerometer angle delivered this cycle, `None` on a dropout
    pub fn last_accel_angle(&self) -> Option<f64> {
        self.last_accel_angle
    }
}

impl TiltSensor for SimulatedImu {
    fn read_accel_angle(&mut self) -> Result<f64, Error> {
        self.cycle += 1;
        self.last_accel_angle = None;
        if self.dropouts.contains(&self.cycle) {
            return Err(Error::SensorUnavailable(format!(
                "simulated dropout on cycle {}",
                self.cycle
            )));
        }
        let angle = self.true_angle() + self.accel_noise.sample(&mut self.rng);
        self.last_accel_angle = Some(angle);
        Ok(angle)
    }

    fn read_gyro_rate(&mut self) -> Result<f64, Error> {
        Ok(self.true_rate() + self.gyro_bias + self.gyro_noise.sample(&mut self.rng))
    }
}

/// Actuator bank that records successful writes
#[derive(Debug, Default, Clone)]
pub struct RecordingActuator {
    writes: Vec<(TargetId, u16)>,
    failing: BTreeSet<TargetId>,
}

impl RecordingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every later write to `target` fails
    pub fn fail_target(&mut self, target: TargetId) {
        self.failing.insert(target);
    }

    pub fn writes(&self) -> &[(TargetId, u16)] {
        &self.writes
    }

    /// Most recent duty written to `target`
    pub fn last_duty(&self, target: TargetId) -> Option<u16> {
        self.writes
            .iter()
            .rev()
            .find(|(t, _)| *t == target)
            .map(|&(_, duty)| duty)
    }

    pub fn clear(&mut self) {
        self.writes.clear();
    }
}

impl Actuator for RecordingActuator {
    fn write(&mut self, target: TargetId, duty: u16) -> Result<(), Error> {
        if self.failing.contains(&target) {
            return Err(Error::ActuatorFailure {
                target,
                reason: "simulated fault".into(),
            });
        }
        self.writes.push((target, duty));
        Ok(())
    }
}

/// Simulation results for one cycle
#[derive(Debug, Clone)]
pub struct SimStep {
    pub t: f64,
    pub angle_true: f64,
    /// `None` when the IMU dropped out
    pub angle_measured: Option<f64>,
    pub angle_filtered: f64,
    pub bias: f64,
    pub err_measured: Option<f64>,
    pub err_filtered: f64,
    /// Duty of the first leg
    pub duty: u16,
    pub held: bool,
    pub actuator_failures: usize,
}

/// Run the estimator and control loop against a simulated swaying body
pub fn run_simulation(config: SimConfig, params: NoiseParams) -> Result<Vec<SimStep>, Error> {
    let mut actuator = RecordingActuator::new();
    for &target in &config.failing_targets {
        actuator.fail_target(target);
    }
    let duty = DutyRange::default();
    let targets = [LegTarget::new(0, 0), LegTarget::new(1, 1)];
    let mapping = LinearMapping::new(-45.0, 45.0, duty)?.with_mirrored_legs([1]);

    let mut control = ControlLoop::new(
        AngleEstimator::new(params)?,
        SimulatedImu::new(&config)?,
        actuator,
        mapping,
        LoopConfig {
            duty,
            period: std::time::Duration::ZERO,
        },
    )?;

    let mut results = Vec::with_capacity(config.steps);

    for step in 0..config.steps {
        let report = control.poll(config.dt, &targets)?;

        let imu = control.sensor();
        let angle_true = imu.true_angle();
        let angle_measured = imu.last_accel_angle();
        let angle_filtered = control.filtered_angle();

        results.push(SimStep {
            t: step as f64 * config.dt,
            angle_true,
            angle_measured,
            angle_filtered,
            bias: control.estimator().bias(),
            err_measured: angle_measured.map(|m| (m - angle_true).abs()),
            err_filtered: (angle_filtered - angle_true).abs(),
            duty: report.commands.first().map_or(duty.neutral, |c| c.duty),
            held: report.held,
            actuator_failures: report.failures.len(),
        });
    }

    Ok(results)
}

/// Calculate RMS error
pub fn rms_error(errors: &[f64]) -> f64 {
    if errors.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = errors.iter().map(|&e| e * e).sum();
    (sum_sq / errors.len() as f64).sqrt()
}
