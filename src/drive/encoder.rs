// Encoder ticks -> physical distance and velocity

use super::DriveError;

/// Scales raw encoder readings by a fixed calibration factor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncoderConverter {
    distance_per_pulse: f64,
}

impl EncoderConverter {
    /// Fails if `distance_per_pulse` is not a positive, finite number
    pub fn new(distance_per_pulse: f64) -> Result<Self, DriveError> {
        if !(distance_per_pulse.is_finite() && distance_per_pulse > 0.0) {
            return Err(DriveError::Configuration(format!(
                "distance_per_pulse must be positive, got {}",
                distance_per_pulse
            )));
        }
        Ok(Self { distance_per_pulse })
    }

    pub fn to_distance(&self, ticks: f64) -> f64 {
        ticks * self.distance_per_pulse
    }

    pub fn to_velocity(&self, ticks_per_second: f64) -> f64 {
        ticks_per_second * self.distance_per_pulse
    }
}
