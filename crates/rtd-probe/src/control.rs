//! Heater drive for closed-loop runs.
//!
//! The supply voltage ramps up at a fixed step per reading until the probe
//! first reads the target, then a PID controller takes over. One step is taken
//! per reading.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            kp: 0.65,
            ki: 0.01,
            kd: 0.05,
        }
    }
}

/// Discrete PID with a clamped output. The integral is not advanced on steps
/// that end in saturation.
#[derive(Debug, Clone)]
pub struct PidController {
    gains: PidGains,
    min_output: f64,
    max_output: f64,
    integral: f64,
    prev_error: f64,
}

impl PidController {
    /// `min_output` must be below `max_output`; `HeaterControl::new` checks this.
    pub fn new(gains: PidGains, min_output: f64, max_output: f64) -> Self {
        Self {
            gains,
            min_output,
            max_output,
            integral: 0.0,
            prev_error: 0.0,
        }
    }

    pub fn update(&mut self, target: f64, measured: f64) -> f64 {
        let error = target - measured;
        self.integral += error;
        let derivative = error - self.prev_error;
        let raw = self.gains.kp * error
            + self.gains.ki * self.integral
            + self.gains.kd * derivative;

        let output = raw.clamp(self.min_output, self.max_output);
        if output <= self.min_output || output >= self.max_output {
            self.integral -= error;
        }
        self.prev_error = error;
        output
    }

    pub fn integral(&self) -> f64 {
        self.integral
    }

    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_error = 0.0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    Ramp,
    Pid,
}

impl fmt::Display for ControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ramp => f.write_str("ramp"),
            Self::Pid => f.write_str("pid"),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ControlError {
    #[error("{0} must be a finite number")]
    NotFinite(&'static str),

    #[error("output range {min}..{max} is empty")]
    EmptyRange { min: f64, max: f64 },

    #[error("ramp step must be positive, got {0}")]
    RampStep(f64),

    #[error("ramp limit {limit} is outside the output range {min}..{max}")]
    RampLimit { limit: f64, min: f64, max: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControlConfig {
    pub target_c: f64,
    /// Band around the target that ends the ramp.
    pub tolerance_c: f64,
    /// Readings to take before the ramp may end.
    pub settle_readings: u64,
    /// Volts added per reading while ramping.
    pub ramp_step: f64,
    /// Ramp stops climbing here.
    pub ramp_limit: f64,
    pub min_output: f64,
    pub max_output: f64,
    pub gains: PidGains,
}

impl ControlConfig {
    pub fn with_target(target_c: f64) -> Self {
        Self {
            target_c,
            tolerance_c: 0.1,
            settle_readings: 3,
            ramp_step: 0.05,
            ramp_limit: 6.0,
            min_output: 0.0,
            max_output: 12.0,
            gains: PidGains::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ControlError> {
        let fields = [
            ("target", self.target_c),
            ("tolerance", self.tolerance_c),
            ("ramp step", self.ramp_step),
            ("ramp limit", self.ramp_limit),
            ("min output", self.min_output),
            ("max output", self.max_output),
            ("kp", self.gains.kp),
            ("ki", self.gains.ki),
            ("kd", self.gains.kd),
        ];
        if let Some((name, _)) = fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(ControlError::NotFinite(*name));
        }
        if self.min_output >= self.max_output {
            return Err(ControlError::EmptyRange {
                min: self.min_output,
                max: self.max_output,
            });
        }
        if self.ramp_step <= 0.0 {
            return Err(ControlError::RampStep(self.ramp_step));
        }
        if self.ramp_limit < self.min_output || self.ramp_limit > self.max_output {
            return Err(ControlError::RampLimit {
                limit: self.ramp_limit,
                min: self.min_output,
                max: self.max_output,
            });
        }
        Ok(())
    }
}

/// Ramp-then-PID drive.
#[derive(Debug, Clone)]
pub struct HeaterControl {
    config: ControlConfig,
    mode: ControlMode,
    output: f64,
    readings: u64,
    pid: PidController,
}

impl HeaterControl {
    pub fn new(config: ControlConfig) -> Result<Self, ControlError> {
        config.validate()?;
        let pid = PidController::new(config.gains, config.min_output, config.max_output);
        Ok(Self {
            mode: ControlMode::Ramp,
            output: config.min_output,
            readings: 0,
            pid,
            config,
        })
    }

    /// Takes one reading (`None` for a fault or a missed reply) and returns the
    /// output to command. PID holds its last output while readings are missing.
    pub fn step(&mut self, temperature_c: Option<f64>) -> f64 {
        let temperature_c = temperature_c.filter(|t| t.is_finite());

        match self.mode {
            ControlMode::Ramp => {
                self.output = (self.output + self.config.ramp_step).min(self.config.ramp_limit);
            }
            ControlMode::Pid => {
                if let Some(t) = temperature_c {
                    self.output = self.pid.update(self.config.target_c, t);
                }
            }
        }

        self.readings += 1;
        if self.mode == ControlMode::Ramp && self.readings > self.config.settle_readings {
            if let Some(t) = temperature_c {
                if (t - self.config.target_c).abs() <= self.config.tolerance_c {
                    info!(
                        target_c = self.config.target_c,
                        temperature_c = t,
                        readings = self.readings,
                        "Target reached, switching to PID"
                    );
                    self.mode = ControlMode::Pid;
                }
            }
        }
        self.output
    }

    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    pub fn output(&self) -> f64 {
        self.output
    }

    pub fn readings(&self) -> u64 {
        self.readings
    }

    pub fn config(&self) -> &ControlConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn output_is_clamped_to_range() {
        let gains = PidGains {
            kp: 10.0,
            ki: 0.0,
            kd: 0.0,
        };
        let mut pid = PidController::new(gains, 0.0, 12.0);
        assert_eq!(pid.update(100.0, 0.0), 12.0);
        assert_eq!(pid.update(0.0, 100.0), 0.0);
    }

    #[test]
    fn saturated_steps_do_not_wind_up() {
        let gains = PidGains {
            kp: 0.0,
            ki: 1.0,
            kd: 0.0,
        };
        let mut pid = PidController::new(gains, 0.0, 12.0);
        for _ in 0..5 {
            assert_eq!(pid.update(100.0, 0.0), 12.0);
        }
        assert_eq!(pid.integral(), 0.0);

        // Unsaturated steps integrate normally.
        assert!(approx(pid.update(5.0, 0.0), 5.0));
        assert!(approx(pid.update(5.0, 2.0), 8.0));
        assert!(approx(pid.integral(), 8.0));

        pid.reset();
        assert_eq!(pid.integral(), 0.0);
    }

    #[test]
    fn ramps_until_target_then_switches_to_pid() {
        let mut heater = HeaterControl::new(ControlConfig::with_target(20.0)).unwrap();

        // Ramp ends only after more than three readings.
        for n in 1..=3 {
            let out = heater.step(Some(20.0));
            assert!(approx(out, 0.05 * n as f64), "reading {n}: {out}");
            assert_eq!(heater.mode(), ControlMode::Ramp);
        }
        assert!(approx(heater.step(Some(20.02)), 0.20));
        assert_eq!(heater.mode(), ControlMode::Pid);

        // error 1, integral 1, derivative 1
        assert!(approx(heater.step(Some(19.0)), 0.65 + 0.01 + 0.05));
    }

    #[test]
    fn ramp_continues_outside_tolerance_and_stops_at_limit() {
        let mut config = ControlConfig::with_target(20.0);
        config.ramp_limit = 0.1;
        let mut heater = HeaterControl::new(config).unwrap();

        for _ in 0..6 {
            heater.step(Some(15.0));
        }
        assert_eq!(heater.mode(), ControlMode::Ramp);
        assert!(approx(heater.output(), 0.1));

        // Missing readings keep ramping but never end the ramp.
        heater.step(None);
        assert_eq!(heater.mode(), ControlMode::Ramp);
        assert_eq!(heater.readings(), 7);
    }

    #[test]
    fn pid_holds_output_without_a_reading() {
        let mut config = ControlConfig::with_target(20.0);
        config.settle_readings = 0;
        let mut heater = HeaterControl::new(config).unwrap();
        heater.step(Some(20.0));
        assert_eq!(heater.mode(), ControlMode::Pid);

        let out = heater.step(Some(18.0));
        assert_eq!(heater.step(None), out);
        assert_eq!(heater.step(Some(f64::NAN)), out);
    }

    #[test]
    fn rejects_bad_config() {
        let mut config = ControlConfig::with_target(20.0);
        config.max_output = 0.0;
        assert!(matches!(
            HeaterControl::new(config),
            Err(ControlError::EmptyRange { .. })
        ));

        let mut config = ControlConfig::with_target(20.0);
        config.ramp_step = 0.0;
        assert_eq!(config.validate(), Err(ControlError::RampStep(0.0)));

        let mut config = ControlConfig::with_target(20.0);
        config.ramp_limit = 20.0;
        assert!(matches!(config.validate(), Err(ControlError::RampLimit { .. })));

        let config = ControlConfig::with_target(f64::INFINITY);
        assert_eq!(config.validate(), Err(ControlError::NotFinite("target")));
    }
}
