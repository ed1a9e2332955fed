// Hardware capability traits consumed by the drivetrain core
//
// Each piece of hardware is reached through a small trait implemented by a
// thin adapter (CAN motor controller, IMU driver, simulator). The core owns
// its handles exclusively and never sees vendor types.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use super::slew::RampConfig;

/// Bus address of an actuator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActuatorId(pub u8);

impl fmt::Display for ActuatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What the motor does when commanded to zero output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeutralMode {
    Coast,
    Brake,
}

/// Direction of a follower relative to its master
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowerInversion {
    /// Spin the same way the master's output shaft spins
    FollowMaster,
    /// Spin opposite to the master's output shaft
    OpposeMaster,
}

impl FollowerInversion {
    /// Sign applied to the master's direction
    pub fn sign(self) -> f64 {
        match self {
            FollowerInversion::FollowMaster => 1.0,
            FollowerInversion::OpposeMaster => -1.0,
        }
    }
}

/// Error types for hardware collaborator calls
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HalError {
    #[error("Timeout waiting for {what}")]
    Timeout { what: String },

    #[error("Bus error: {0}")]
    Bus(String),

    #[error("Device {0} is not configured")]
    NotConfigured(ActuatorId),

    #[error("Invalid {what} reading: {value}")]
    InvalidReading { what: String, value: f64 },
}

pub type Result<T> = std::result::Result<T, HalError>;

/// Turn a non-finite sample into an [`HalError::InvalidReading`]
///
/// A NaN or infinite reading would poison everything integrated from it, so
/// it is handled like a failed read.
pub fn finite_reading(what: &str, reading: Result<f64>) -> Result<f64> {
    match reading {
        Ok(value) if !value.is_finite() => Err(HalError::InvalidReading {
            what: what.to_string(),
            value,
        }),
        other => other,
    }
}

/// Motor controller with an integrated encoder
pub trait Actuator {
    fn id(&self) -> ActuatorId;

    /// Restore factory defaults and select the integrated sensor for feedback
    fn configure_defaults(&mut self) -> Result<()>;

    fn set_inverted(&mut self, inverted: bool) -> Result<()>;

    fn set_neutral_mode(&mut self, mode: NeutralMode) -> Result<()>;

    /// Mirror `master`'s output from now on
    fn configure_follower(&mut self, master: ActuatorId, inversion: FollowerInversion)
        -> Result<()>;

    fn configure_ramp(&mut self, ramp: RampConfig) -> Result<()>;

    /// Output as a fraction of full scale, in [-1, 1]
    fn set_normalized_output(&mut self, value: f64) -> Result<()>;

    fn set_voltage(&mut self, volts: f64) -> Result<()>;

    /// Encoder position in ticks, accumulated since the last zeroing
    fn cumulative_position(&mut self) -> Result<f64>;

    /// Encoder velocity in ticks per second
    fn velocity(&mut self) -> Result<f64>;

    fn set_cumulative_position(&mut self, ticks: f64) -> Result<()>;

    /// Keep the motor safety watchdog from disabling output
    fn feed_safety(&mut self);
}

/// Gyro reporting an unbounded, accumulating yaw angle
pub trait HeadingSensor {
    fn reset_zero(&mut self) -> Result<()>;

    fn cumulative_angle_degrees(&mut self) -> Result<f64>;
}

/// Best-effort sink for named numeric readings
pub trait TelemetrySink {
    fn publish(&mut self, key: &str, value: f64);
}

/// Drops every reading
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTelemetry;

impl TelemetrySink for NullTelemetry {
    fn publish(&mut self, _key: &str, _value: f64) {}
}

/// A named reading as forwarded by [`ChannelTelemetry`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub key: String,
    pub value: f64,
}

/// Forwards readings to an async consumer (e.g. a zenoh publisher task)
#[derive(Debug, Clone)]
pub struct ChannelTelemetry {
    tx: UnboundedSender<TelemetrySample>,
}

impl ChannelTelemetry {
    pub fn new(tx: UnboundedSender<TelemetrySample>) -> Self {
        Self { tx }
    }
}

impl TelemetrySink for ChannelTelemetry {
    fn publish(&mut self, key: &str, value: f64) {
        // Receiver gone means nobody is listening; readings are best effort
        let _ = self.tx.send(TelemetrySample {
            key: key.to_string(),
            value,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_channel_telemetry_forwards_samples() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut sink = ChannelTelemetry::new(tx);
        sink.publish("Left Encoder", 42.0);

        let sample = rx.try_recv().unwrap();
        assert_eq!(sample.key, "Left Encoder");
        assert_eq!(sample.value, 42.0);
    }

    #[test]
    fn test_channel_telemetry_ignores_closed_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut sink = ChannelTelemetry::new(tx);
        sink.publish("Right Encoder", 1.0);
    }

    #[test]
    fn test_non_finite_reading_is_an_error() {
        assert_eq!(finite_reading("gyro angle", Ok(12.5)), Ok(12.5));
        assert!(matches!(
            finite_reading("gyro angle", Ok(f64::INFINITY)),
            Err(HalError::InvalidReading { value, .. }) if value == f64::INFINITY
        ));
        assert!(finite_reading("left position", Ok(f64::NAN)).is_err());

        let timeout = HalError::Timeout {
            what: "velocity".to_string(),
        };
        assert_eq!(finite_reading("velocity", Err(timeout.clone())), Err(timeout));
    }

    #[test]
    fn test_follower_inversion_sign() {
        assert_eq!(FollowerInversion::FollowMaster.sign(), 1.0);
        assert_eq!(FollowerInversion::OpposeMaster.sign(), -1.0);
    }
}
