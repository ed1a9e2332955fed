// Differential-drive mixing
// Converts arcade (speed + steer) or tank (left + right) inputs into
// normalized per-side outputs in [-1, 1].

/// Largest normalized output sent to a side
const MAX_OUTPUT: f64 = 1.0;

/// Normalized output for each side of the drivetrain
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WheelOutputs {
    pub left: f64,
    pub right: f64,
}

impl WheelOutputs {
    pub fn new(left: f64, right: f64) -> Self {
        Self { left, right }
    }

    pub fn zero() -> Self {
        Self::default()
    }
}

/// Conditioning applied to each input before mixing
///
/// The default passes inputs through untouched (apart from saturation).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputShaping {
    /// Inputs with a smaller magnitude are zero; the rest is rescaled so
    /// full scale is still reached. Must be in [0, 1).
    pub deadband: f64,
    /// Square inputs (sign preserved) for finer control near zero
    pub square: bool,
}

impl InputShaping {
    fn apply(self, value: f64) -> f64 {
        // NaN from a faulty input device becomes neutral
        if value.is_nan() {
            return 0.0;
        }
        let clamped = value.clamp(-MAX_OUTPUT, MAX_OUTPUT);
        let banded = apply_deadband(clamped, self.deadband);
        if self.square {
            banded * banded.abs()
        } else {
            banded
        }
    }
}

/// Zero inside the band, linear from 0 at the edge to full scale outside it
fn apply_deadband(value: f64, deadband: f64) -> f64 {
    if deadband <= 0.0 {
        return value;
    }
    if value.abs() <= deadband {
        return 0.0;
    }
    (value - deadband.copysign(value)) / (MAX_OUTPUT - deadband)
}

/// Arcade mixing: left = speed + steer, right = speed - steer
///
/// If either side exceeds full scale both are divided by the larger
/// magnitude, so the left/right ratio survives saturation.
pub fn arcade(speed: f64, steer: f64, shaping: InputShaping) -> WheelOutputs {
    let speed = shaping.apply(speed);
    let steer = shaping.apply(steer);

    let mut left = speed + steer;
    let mut right = speed - steer;

    let max_magnitude = left.abs().max(right.abs());
    if max_magnitude > MAX_OUTPUT {
        let scale = MAX_OUTPUT / max_magnitude;
        left *= scale;
        right *= scale;
    }

    WheelOutputs { left, right }
}

/// Tank mixing
///
/// The right input is negated to match how the right gearbox is mounted.
/// NOTE: verify against the physical robot; a wrong sign here silently
/// reverses the right side.
pub fn tank(left: f64, right: f64, shaping: InputShaping) -> WheelOutputs {
    WheelOutputs {
        left: shaping.apply(left),
        right: -shaping.apply(right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-12;

    const RAW: InputShaping = InputShaping {
        deadband: 0.0,
        square: false,
    };

    const SQUARED: InputShaping = InputShaping {
        deadband: 0.0,
        square: true,
    };

    #[test]
    fn test_zero_command() {
        assert_eq!(arcade(0.0, 0.0, RAW), WheelOutputs::zero());
        let out = tank(0.0, 0.0, RAW);
        assert_eq!((out.left, out.right), (0.0, 0.0));
    }

    #[test]
    fn test_arcade_forward_and_turn() {
        let out = arcade(0.5, 0.0, RAW);
        assert_eq!(out, WheelOutputs::new(0.5, 0.5));

        let out = arcade(0.5, 0.25, RAW);
        assert!((out.left - 0.75).abs() < EPS);
        assert!((out.right - 0.25).abs() < EPS);

        // Pure steer spins in place
        let out = arcade(0.0, 0.4, RAW);
        assert!((out.left + out.right).abs() < EPS);
    }

    #[test]
    fn test_arcade_outputs_always_in_range() {
        let values = [-1.0, -0.75, -0.5, -0.1, 0.0, 0.1, 0.5, 0.75, 1.0];
        let shapings = [
            RAW,
            SQUARED,
            InputShaping {
                deadband: 0.02,
                square: true,
            },
        ];
        for &speed in &values {
            for &steer in &values {
                for shaping in shapings {
                    let out = arcade(speed, steer, shaping);
                    assert!(out.left.abs() <= 1.0 + EPS, "left {:?}", out);
                    assert!(out.right.abs() <= 1.0 + EPS, "right {:?}", out);
                }
            }
        }
    }

    #[test]
    fn test_arcade_saturation_preserves_ratio() {
        let (speed, steer) = (0.9, 0.6);
        let raw_left = speed + steer;
        let raw_right = speed - steer;

        let out = arcade(speed, steer, RAW);
        assert!((out.left - 1.0).abs() < EPS, "larger side saturates at full scale");
        assert!((out.left / out.right - raw_left / raw_right).abs() < 1e-9);
    }

    #[test]
    fn test_out_of_convention_inputs_are_clamped() {
        // |speed| > 1 is saturated, not rejected
        assert_eq!(arcade(3.0, 0.0, RAW), WheelOutputs::new(1.0, 1.0));
        assert_eq!(arcade(-7.0, 0.0, RAW), WheelOutputs::new(-1.0, -1.0));

        let out = tank(2.0, -2.0, RAW);
        assert_eq!(out, WheelOutputs::new(1.0, 1.0));

        assert_eq!(arcade(f64::NAN, 0.0, RAW), WheelOutputs::zero());
    }

    #[test]
    fn test_tank_negates_right() {
        let out = tank(0.3, 0.6, RAW);
        assert!((out.left - 0.3).abs() < EPS);
        assert!((out.right + 0.6).abs() < EPS);
    }

    #[test]
    fn test_squared_inputs_keep_sign() {
        let out = tank(-0.5, 0.5, SQUARED);
        assert!((out.left + 0.25).abs() < EPS);
        assert!((out.right + 0.25).abs() < EPS);

        let out = arcade(-0.5, 0.0, SQUARED);
        assert!((out.left + 0.25).abs() < EPS);
    }

    #[test]
    fn test_deadband_zeroes_small_inputs_and_rescales() {
        let shaping = InputShaping {
            deadband: 0.02,
            square: false,
        };
        // Stick noise around center does not move the robot
        assert_eq!(arcade(0.015, -0.02, shaping), WheelOutputs::zero());
        assert_eq!(tank(-0.01, 0.02, shaping).left, 0.0);

        // Continuous at the band edge, full scale still reachable
        let out = arcade(0.51, 0.0, shaping);
        assert!((out.left - 0.5).abs() < EPS);
        assert_eq!(arcade(1.0, 0.0, shaping), WheelOutputs::new(1.0, 1.0));
        let out = tank(-1.0, 0.0, shaping);
        assert!((out.left + 1.0).abs() < EPS);
    }
}
