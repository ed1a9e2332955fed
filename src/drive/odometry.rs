// Dead-reckoning pose estimation
//
// Encoders are authoritative for distance travelled, the gyro for heading.
// Each increment is projected along the current heading sample.

use serde::{Deserialize, Serialize};

/// Robot pose in the field frame (meters, degrees in [-180, 180])
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub heading_degrees: f64,
}

impl Pose {
    pub fn new(x: f64, y: f64, heading_degrees: f64) -> Self {
        Self {
            x,
            y,
            heading_degrees,
        }
    }
}

/// Integrates wheel distance deltas and heading samples into a [`Pose`]
#[derive(Debug, Clone)]
pub struct OdometryEstimator {
    pose: Pose,
    prev_left: f64,
    prev_right: f64,
}

impl OdometryEstimator {
    /// Start at the origin facing `heading_degrees`, with the given
    /// cumulative wheel distances as references
    pub fn new(heading_degrees: f64, left_distance: f64, right_distance: f64) -> Self {
        Self {
            pose: Pose::new(0.0, 0.0, heading_degrees),
            prev_left: left_distance,
            prev_right: right_distance,
        }
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    /// Advance the pose by one cycle and return it
    ///
    /// Distances are cumulative; heading is already normalized.
    pub fn update(&mut self, heading_degrees: f64, left_distance: f64, right_distance: f64) -> Pose {
        let delta_left = left_distance - self.prev_left;
        let delta_right = right_distance - self.prev_right;
        self.prev_left = left_distance;
        self.prev_right = right_distance;

        let mean_delta = (delta_left + delta_right) / 2.0;
        let heading = heading_degrees.to_radians();

        self.pose = Pose {
            x: self.pose.x + mean_delta * heading.cos(),
            y: self.pose.y + mean_delta * heading.sin(),
            heading_degrees,
        };
        self.pose
    }

    /// Back to the origin, with new references for the next delta
    pub fn reset(&mut self, heading_degrees: f64, left_distance: f64, right_distance: f64) {
        *self = Self::new(heading_degrees, left_distance, right_distance);
    }
}
