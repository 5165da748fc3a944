//! Actuation control loop
//!
//! One cycle reads the tilt sensor, fuses the sample into the estimator, maps
//! the filtered angle to a duty cycle per leg and writes every actuator. A
//! cycle's writes finish before the next cycle's sensor read starts.
//!
//! Sensor dropouts hold the previous cycle's commands. Actuator failures are
//! reported per target and never abort the cycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::error::Error;
use crate::estimator::AngleEstimator;
use crate::hal::{Actuator, LegTarget, TargetId, TiltSensor};
use crate::mapping::{DutyMapping, DutyRange};

/// Cooperative cancellation flag checked once per cycle.
///
/// Clones share the flag, so one can be moved into a signal handler thread.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal(Arc<AtomicBool>);

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Loop tuning supplied at startup
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopConfig {
    pub duty: DutyRange,
    /// Target cycle period. Zero runs the loop back to back.
    pub period: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            duty: DutyRange::default(),
            period: Duration::from_millis(125),
        }
    }
}

/// Duty cycle issued to one actuator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub target: TargetId,
    pub duty: u16,
}

/// A write that failed during a cycle
#[derive(Debug)]
pub struct ActuatorFault {
    pub target: TargetId,
    pub error: Error,
}

/// What one cycle did
#[derive(Debug)]
pub struct CycleReport {
    /// Zero-based cycle index
    pub cycle: u64,
    /// Filtered angle, `None` when the cycle held its previous commands
    pub filtered_angle: Option<f64>,
    /// Commands issued this cycle, in target order
    pub commands: Vec<Command>,
    pub failures: Vec<ActuatorFault>,
    pub held: bool,
}

/// Totals over a [`ControlLoop::run`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub held_cycles: u64,
    pub actuator_failures: u64,
}

impl RunSummary {
    fn record(&mut self, report: &CycleReport) {
        self.cycles += 1;
        if report.held {
            self.held_cycles += 1;
        }
        self.actuator_failures += report.failures.len() as u64;
    }
}

/// Drives one estimator from one sensor into a bank of actuators
pub struct ControlLoop<S, A, M> {
    estimator: AngleEstimator,
    sensor: S,
    actuator: A,
    mapping: M,
    config: LoopConfig,
    last_commands: Vec<Command>,
    cycle: u64,
}

impl<S, A, M> ControlLoop<S, A, M>
where
    S: TiltSensor,
    A: Actuator,
    M: DutyMapping,
{
    pub fn new(
        estimator: AngleEstimator,
        sensor: S,
        actuator: A,
        mapping: M,
        config: LoopConfig,
    ) -> Result<Self, Error> {
        config.duty.validate()?;
        Ok(Self {
            estimator,
            sensor,
            actuator,
            mapping,
            config,
            last_commands: Vec::new(),
            cycle: 0,
        })
    }

    /// Seed the estimator with one accelerometer reading
    pub fn bootstrap(&mut self) -> Result<f64, Error> {
        let angle = finite_reading("accelerometer", self.sensor.read_accel_angle())?;
        self.estimator.set_initial_angle(angle);
        info!("estimator seeded at {angle:.3} deg");
        Ok(angle)
    }

    /// Run one cycle from explicit samples.
    ///
    /// Invalid samples or `dt` are returned as errors and nothing is written.
    /// Actuator failures end up in the report.
    pub fn step(
        &mut self,
        raw_angle: f64,
        raw_rate: f64,
        dt: f64,
        targets: &[LegTarget],
    ) -> Result<CycleReport, Error> {
        let angle = self.estimator.update(raw_angle, raw_rate, dt)?;
        debug!(
            "cycle {}: raw {raw_angle:.3} filtered {angle:.3} bias {:.4}",
            self.cycle,
            self.estimator.bias()
        );

        let duty = self.config.duty;
        let commands: Vec<Command> = targets
            .iter()
            .map(|t| Command {
                target: t.target,
                duty: duty.clamp(self.mapping.duty_for(t.leg, angle)),
            })
            .collect();

        let failures = self.issue(&commands);
        self.last_commands = commands.clone();
        Ok(self.finish(Some(angle), commands, failures, false))
    }

    /// Re-issue the previous cycle's commands without touching the estimator.
    ///
    /// Each target gets the duty it was last sent. Targets that have never
    /// been commanded get the neutral duty; commands for targets no longer in
    /// `targets` are dropped.
    pub fn hold(&mut self, targets: &[LegTarget]) -> CycleReport {
        let neutral = self.config.duty.neutral;
        let commands: Vec<Command> = targets
            .iter()
            .map(|t| {
                self.last_commands
                    .iter()
                    .find(|c| c.target == t.target)
                    .copied()
                    .unwrap_or(Command {
                        target: t.target,
                        duty: neutral,
                    })
            })
            .collect();
        let failures = self.issue(&commands);
        self.finish(None, commands, failures, true)
    }

    /// Read the sensor and run one cycle, holding on a dropout
    pub fn poll(&mut self, dt: f64, targets: &[LegTarget]) -> Result<CycleReport, Error> {
        let reading = self.read_sensors();
        self.apply(reading, dt, targets)
    }

    /// Cycle at the configured period until `shutdown` is triggered, then
    /// drive every target to neutral.
    ///
    /// The signal is checked after the sensor read and before any write, so
    /// no actuator is left mid-command. `dt` is measured from the last cycle
    /// that updated the estimator, so held cycles do not lose elapsed time.
    /// Sensor errors of any kind are held through; only an estimator error
    /// stops the loop. The actuators are parked either way.
    pub fn run(
        &mut self,
        targets: &[LegTarget],
        shutdown: &ShutdownSignal,
    ) -> Result<RunSummary, Error> {
        let result = self.run_cycles(targets, shutdown);
        self.park(targets);
        result
    }

    fn run_cycles(
        &mut self,
        targets: &[LegTarget],
        shutdown: &ShutdownSignal,
    ) -> Result<RunSummary, Error> {
        let mut summary = RunSummary::default();
        let mut last_update = Instant::now();

        loop {
            let started = Instant::now();
            let reading = self.read_sensors();
            if shutdown.is_triggered() {
                info!("shutdown requested after {} cycles", summary.cycles);
                break;
            }

            let dt = started.duration_since(last_update).as_secs_f64();
            let report = self.apply(reading, dt, targets)?;
            if !report.held {
                last_update = started;
            }
            summary.record(&report);

            if let Some(rest) = self.config.period.checked_sub(started.elapsed()) {
                thread::sleep(rest);
            }
        }

        Ok(summary)
    }

    /// Drive every target to the neutral duty
    pub fn park(&mut self, targets: &[LegTarget]) -> Vec<ActuatorFault> {
        let commands = self.neutral_commands(targets);
        let failures = self.issue(&commands);
        info!(
            "parked {} actuators at duty {} ({} failed)",
            commands.len(),
            self.config.duty.neutral,
            failures.len()
        );
        self.last_commands = commands;
        failures
    }

    fn apply(
        &mut self,
        reading: Result<(f64, f64), Error>,
        dt: f64,
        targets: &[LegTarget],
    ) -> Result<CycleReport, Error> {
        match reading {
            Ok((angle, rate)) => self.step(angle, rate, dt, targets),
            Err(err) if err.is_transient() => {
                warn!("cycle {}: {err}; holding last commands", self.cycle);
                Ok(self.hold(targets))
            }
            Err(err) => Err(err),
        }
    }

    /// Any failure, bus errors included, comes back as `SensorUnavailable`.
    fn read_sensors(&mut self) -> Result<(f64, f64), Error> {
        let angle = finite_reading("accelerometer", self.sensor.read_accel_angle())?;
        let rate = finite_reading("gyroscope", self.sensor.read_gyro_rate())?;
        Ok((angle, rate))
    }

    fn issue(&mut self, commands: &[Command]) -> Vec<ActuatorFault> {
        let mut failures = Vec::new();
        for command in commands {
            if let Err(error) = self.actuator.write(command.target, command.duty) {
                warn!(
                    "cycle {}: write of duty {} to target {} failed: {error}",
                    self.cycle, command.duty, command.target
                );
                failures.push(ActuatorFault {
                    target: command.target,
                    error,
                });
            }
        }
        failures
    }

    fn neutral_commands(&self, targets: &[LegTarget]) -> Vec<Command> {
        targets
            .iter()
            .map(|t| Command {
                target: t.target,
                duty: self.config.duty.neutral,
            })
            .collect()
    }

    fn finish(
        &mut self,
        filtered_angle: Option<f64>,
        commands: Vec<Command>,
        failures: Vec<ActuatorFault>,
        held: bool,
    ) -> CycleReport {
        let report = CycleReport {
            cycle: self.cycle,
            filtered_angle,
            commands,
            failures,
            held,
        };
        self.cycle += 1;
        report
    }

    pub fn estimator(&self) -> &AngleEstimator {
        &self.estimator
    }

    pub fn estimator_mut(&mut self) -> &mut AngleEstimator {
        &mut self.estimator
    }

    /// Latest filtered angle, for diagnostics
    pub fn filtered_angle(&self) -> f64 {
        self.estimator.angle()
    }

    pub fn last_commands(&self) -> &[Command] {
        &self.last_commands
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    pub fn sensor(&self) -> &S {
        &self.sensor
    }

    pub fn sensor_mut(&mut self) -> &mut S {
        &mut self.sensor
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    pub fn actuator_mut(&mut self) -> &mut A {
        &mut self.actuator
    }

    pub fn into_parts(self) -> (AngleEstimator, S, A, M) {
        (self.estimator, self.sensor, self.actuator, self.mapping)
    }
}

fn finite_reading(sensor: &str, reading: Result<f64, Error>) -> Result<f64, Error> {
    match reading {
        Ok(value) if value.is_finite() => Ok(value),
        Ok(value) => Err(Error::SensorUnavailable(format!(
            "{sensor} returned non-finite value {value}"
        ))),
        Err(Error::SensorUnavailable(reason)) => Err(Error::SensorUnavailable(reason)),
        Err(err) => Err(Error::SensorUnavailable(format!("{sensor}: {err}"))),
    }
}
