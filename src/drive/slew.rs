// Slew-rate limiting of per-side outputs
//
// Two ramp constants are kept: open loop for operator commands and closed
// loop for autonomous ones. The constant is picked per command by its origin;
// the emitted output per side is shared, since it is what the motor is doing.

use serde::{Deserialize, Serialize};

use super::DriveError;
use super::mixer::WheelOutputs;
use crate::config::{CLOSED_LOOP_RAMP_SECONDS, OPEN_LOOP_RAMP_SECONDS};

/// Minimum time (seconds) to go from neutral to full output
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RampConfig {
    pub open_loop_seconds: f64,
    pub closed_loop_seconds: f64,
}

impl Default for RampConfig {
    fn default() -> Self {
        Self {
            open_loop_seconds: OPEN_LOOP_RAMP_SECONDS,
            closed_loop_seconds: CLOSED_LOOP_RAMP_SECONDS,
        }
    }
}

impl RampConfig {
    /// Hardware-side ramping off; the core limits in software
    pub fn disabled() -> Self {
        Self {
            open_loop_seconds: 0.0,
            closed_loop_seconds: 0.0,
        }
    }

    pub fn validate(&self) -> Result<(), DriveError> {
        validate_ramp_seconds(self.open_loop_seconds)?;
        validate_ramp_seconds(self.closed_loop_seconds)
    }

    pub fn seconds_for(&self, origin: CommandOrigin) -> f64 {
        match origin {
            CommandOrigin::Manual => self.open_loop_seconds,
            CommandOrigin::Autonomous => self.closed_loop_seconds,
        }
    }
}

pub(crate) fn validate_ramp_seconds(seconds: f64) -> Result<(), DriveError> {
    if !(seconds.is_finite() && seconds >= 0.0) {
        return Err(DriveError::Configuration(format!(
            "ramp seconds must be zero or positive, got {}",
            seconds
        )));
    }
    Ok(())
}

/// Who issued a normalized drive command
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandOrigin {
    /// Driver / teleop, open-loop ramp
    #[default]
    Manual,
    /// Trajectory controller, closed-loop ramp
    Autonomous,
}

/// Bounds how fast each side's output may change
#[derive(Debug, Clone)]
pub struct SlewRateLimiter {
    ramp: RampConfig,
    last: WheelOutputs,
}

impl SlewRateLimiter {
    pub fn new(ramp: RampConfig) -> Self {
        Self {
            ramp,
            last: WheelOutputs::zero(),
        }
    }

    pub fn ramp(&self) -> RampConfig {
        self.ramp
    }

    pub fn set_open_loop_seconds(&mut self, seconds: f64) -> Result<(), DriveError> {
        validate_ramp_seconds(seconds)?;
        self.ramp.open_loop_seconds = seconds;
        Ok(())
    }

    /// Last emitted outputs
    pub fn last(&self) -> WheelOutputs {
        self.last
    }

    /// Overwrite the emitted state, e.g. after the outputs were driven directly
    ///
    /// A non-finite side is taken as neutral so it cannot stick in the state.
    pub fn sync(&mut self, outputs: WheelOutputs) {
        self.last = WheelOutputs {
            left: finite_or_zero(outputs.left),
            right: finite_or_zero(outputs.right),
        };
    }

    /// Advance toward `target` by at most `dt / ramp_seconds` per side
    pub fn step(&mut self, target: WheelOutputs, origin: CommandOrigin, dt: f64) -> WheelOutputs {
        let ramp_seconds = self.ramp.seconds_for(origin);
        self.last = WheelOutputs {
            left: limit(self.last.left, finite_or_zero(target.left), ramp_seconds, dt),
            right: limit(self.last.right, finite_or_zero(target.right), ramp_seconds, dt),
        };
        self.last
    }
}

fn limit(current: f64, target: f64, ramp_seconds: f64, dt: f64) -> f64 {
    if ramp_seconds <= 0.0 {
        return target;
    }
    let max_delta = dt.max(0.0) / ramp_seconds;
    current + (target - current).clamp(-max_delta, max_delta)
}

/// Neutral for NaN and infinities
pub(crate) fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}
