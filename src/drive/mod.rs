// Drivetrain control core
//
// Provides:
// - Hardware capability traits (actuator, heading sensor, telemetry sink)
// - Encoder scaling and heading normalization
// - Arcade/tank mixing with slew-rate limiting
// - Dead-reckoning odometry
// - The `Drivetrain` that ties them to owned hardware

mod drivetrain;
pub mod encoder;
pub mod hal;
pub mod heading;
pub mod mixer;
pub mod odometry;
pub mod slew;

pub use drivetrain::{DriveError, DriveHardware, Drivetrain};
pub use encoder::EncoderConverter;
pub use hal::{
    Actuator, ActuatorId, ChannelTelemetry, FollowerInversion, HalError, HeadingSensor,
    NeutralMode, NullTelemetry, TelemetrySample, TelemetrySink,
};
pub use heading::normalize_degrees;
pub use mixer::{InputShaping, WheelOutputs};
pub use odometry::{OdometryEstimator, Pose};
pub use slew::{CommandOrigin, RampConfig, SlewRateLimiter};
