// Define message types for the drivetrain and its host runtime

use serde::{Deserialize, Serialize};

use crate::drive::CommandOrigin;

/// Motion command accepted by the drivetrain
///
/// Arcade and tank values are normalized by convention ([-1, 1]) but are not
/// checked here; the mixer saturates them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DriveCommand {
    Arcade { speed: f64, steer: f64 },
    Tank { left: f64, right: f64 },
    DirectVoltage { left_volts: f64, right_volts: f64 },
}

impl DriveCommand {
    /// Neutral output on both sides
    pub fn neutral() -> Self {
        DriveCommand::Arcade {
            speed: 0.0,
            steer: 0.0,
        }
    }
}

// Command from teleop/trajectory follower -> runtime
// Origin defaults to manual so teleop tools can leave it out
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    #[serde(flatten)]
    pub command: DriveCommand,
    #[serde(default)]
    pub origin: CommandOrigin,
}

/// Wheel surface speeds in m/s
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WheelSpeeds {
    pub left: f64,
    pub right: f64,
}

/// Health of the drivetrain's sensor and actuator links
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DriveHealth {
    #[default]
    Ok,
    /// Repeated communication faults, odometry running on stale samples
    Degraded,
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
    Degraded,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_wire_format() {
        let env: CommandEnvelope =
            serde_json::from_str(r#"{"mode":"arcade","speed":0.5,"steer":-0.25}"#).unwrap();
        assert_eq!(
            env.command,
            DriveCommand::Arcade {
                speed: 0.5,
                steer: -0.25
            }
        );
        assert_eq!(env.origin, CommandOrigin::Manual);

        let env: CommandEnvelope = serde_json::from_str(
            r#"{"mode":"direct_voltage","left_volts":6.0,"right_volts":-6.0,"origin":"autonomous"}"#,
        )
        .unwrap();
        assert_eq!(
            env.command,
            DriveCommand::DirectVoltage {
                left_volts: 6.0,
                right_volts: -6.0
            }
        );
        assert_eq!(env.origin, CommandOrigin::Autonomous);
    }

    #[test]
    fn test_health_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&RuntimeHealth::CmdStale).unwrap(),
            "\"cmd_stale\""
        );
        assert_eq!(
            serde_json::to_string(&DriveHealth::Degraded).unwrap(),
            "\"degraded\""
        );
    }
}
