// Timeouts, topics, calibration and drivetrain configuration
use std::time::Duration;

use serde::Deserialize;

use crate::drive::{ActuatorId, DriveError, InputShaping, RampConfig};

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// Command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topics
pub const TOPIC_CMD_DRIVE: &str = "drivetrain/cmd"; // commands
pub const TOPIC_CMD_RESET: &str = "drivetrain/cmd/reset"; // odometry reset requests
pub const TOPIC_POSE: &str = "drivetrain/state/pose"; // odometry
pub const TOPIC_HEALTH: &str = "drivetrain/state/health"; // health status
pub const TOPIC_TELEMETRY: &str = "drivetrain/telemetry"; // raw readings

// Integrated encoder: 2048 ticks/rev, 10.71:1 gearbox, 6" wheel (meters)
pub const DISTANCE_PER_PULSE: f64 = (0.1524 * std::f64::consts::PI) / (2048.0 * 10.71);

// Ramp times (seconds from neutral to full output)
pub const OPEN_LOOP_RAMP_SECONDS: f64 = 0.5;
pub const CLOSED_LOOP_RAMP_SECONDS: f64 = 0.1;

// Battery voltage used to express a voltage command as a normalized output
pub const NOMINAL_VOLTAGE: f64 = 12.0;

// Operator inputs below this magnitude are treated as zero
pub const DEADBAND: f64 = 0.02;

// Consecutive faulted cycles before health is reported degraded
pub const FAULT_THRESHOLD: u32 = 5;

// Actuator ids on the bus
pub const LEFT_MASTER_ID: ActuatorId = ActuatorId(1);
pub const RIGHT_MASTER_ID: ActuatorId = ActuatorId(2);
pub const LEFT_FOLLOWER_ID: ActuatorId = ActuatorId(3);
pub const RIGHT_FOLLOWER_ID: ActuatorId = ActuatorId(4);

/// Drivetrain parameters, fixed after construction except for the open-loop ramp.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    /// Meters travelled per encoder tick
    pub distance_per_pulse: f64,
    pub ramp: RampConfig,
    /// Control period the host calls the drive and update operations at
    pub loop_hz: f64,
    pub nominal_voltage: f64,
    /// Square operator inputs (sign preserved) for finer control near zero
    pub square_inputs: bool,
    /// Arcade/tank inputs with a smaller magnitude are zero, in [0, 1)
    pub deadband: f64,
    pub fault_threshold: u32,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            distance_per_pulse: DISTANCE_PER_PULSE,
            ramp: RampConfig {
                open_loop_seconds: OPEN_LOOP_RAMP_SECONDS,
                closed_loop_seconds: CLOSED_LOOP_RAMP_SECONDS,
            },
            loop_hz: LOOP_HZ as f64,
            nominal_voltage: NOMINAL_VOLTAGE,
            square_inputs: false,
            deadband: DEADBAND,
            fault_threshold: FAULT_THRESHOLD,
        }
    }
}

impl DriveConfig {
    /// Control period in seconds
    pub fn period_seconds(&self) -> f64 {
        1.0 / self.loop_hz
    }

    /// Conditioning applied to arcade and tank inputs
    pub fn input_shaping(&self) -> InputShaping {
        InputShaping {
            deadband: self.deadband,
            square: self.square_inputs,
        }
    }

    /// Reject values the drivetrain cannot safely run with
    pub fn validate(&self) -> Result<(), DriveError> {
        if !(self.distance_per_pulse.is_finite() && self.distance_per_pulse > 0.0) {
            return Err(DriveError::Configuration(format!(
                "distance_per_pulse must be positive, got {}",
                self.distance_per_pulse
            )));
        }
        self.ramp.validate()?;
        if !(self.loop_hz.is_finite() && self.loop_hz > 0.0) {
            return Err(DriveError::Configuration(format!(
                "loop_hz must be positive, got {}",
                self.loop_hz
            )));
        }
        if !(self.nominal_voltage.is_finite() && self.nominal_voltage > 0.0) {
            return Err(DriveError::Configuration(format!(
                "nominal_voltage must be positive, got {}",
                self.nominal_voltage
            )));
        }
        if !(0.0..1.0).contains(&self.deadband) {
            return Err(DriveError::Configuration(format!(
                "deadband must be in [0, 1), got {}",
                self.deadband
            )));
        }
        if self.fault_threshold == 0 {
            return Err(DriveError::Configuration(
                "fault_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(DriveConfig::default().validate().is_ok());
        assert!((DriveConfig::default().period_seconds() - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_non_positive_distance_per_pulse() {
        for bad in [0.0, -0.001, f64::NAN] {
            let config = DriveConfig {
                distance_per_pulse: bad,
                ..Default::default()
            };
            assert!(matches!(
                config.validate(),
                Err(DriveError::Configuration(_))
            ));
        }
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: DriveConfig =
            serde_json::from_str(r#"{"distance_per_pulse": 0.001, "ramp": {"open_loop_seconds": 2.0}}"#)
                .unwrap();
        assert_eq!(config.distance_per_pulse, 0.001);
        assert_eq!(config.ramp.open_loop_seconds, 2.0);
        assert_eq!(config.ramp.closed_loop_seconds, CLOSED_LOOP_RAMP_SECONDS);
        assert_eq!(config.fault_threshold, FAULT_THRESHOLD);
        assert_eq!(config.deadband, DEADBAND);
    }

    #[test]
    fn test_deadband_range() {
        for bad in [-0.1, 1.0, f64::NAN] {
            let config = DriveConfig {
                deadband: bad,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "deadband {} accepted", bad);
        }
        let config = DriveConfig {
            deadband: 0.0,
            square_inputs: true,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(
            config.input_shaping(),
            InputShaping {
                deadband: 0.0,
                square: true
            }
        );
    }
}
