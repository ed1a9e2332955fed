// Heading normalization
//
// The gyro accumulates rotation without wrapping, so 2.5 turns reads 900°.
// Pose math wants the minimal-magnitude representative instead.

/// Symmetric (IEEE 754) remainder of `raw` by 360°.
///
/// The quotient is rounded half-to-even, not floored or truncated, so the
/// result is always in [-180, 180]: 370 -> 10, 190 -> -170, 180 -> 180,
/// -180 -> -180, 540 -> -180.
pub fn normalize_degrees(raw: f64) -> f64 {
    ieee_remainder(raw, 360.0)
}

fn ieee_remainder(x: f64, y: f64) -> f64 {
    let quotient = (x / y).round_ties_even();
    x - quotient * y
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_reference_values() {
        assert!((normalize_degrees(370.0) - 10.0).abs() < EPS);
        assert!((normalize_degrees(-370.0) + 10.0).abs() < EPS);
        assert!((normalize_degrees(190.0) + 170.0).abs() < EPS);
        assert_eq!(normalize_degrees(180.0), 180.0);
        assert_eq!(normalize_degrees(-180.0), -180.0);
        assert_eq!(normalize_degrees(0.0), 0.0);
    }

    #[test]
    fn test_ties_round_to_even_quotient() {
        // 540 / 360 = 1.5 rounds to 2
        assert!((normalize_degrees(540.0) + 180.0).abs() < EPS);
        // 900 / 360 = 2.5 rounds to 2
        assert!((normalize_degrees(900.0) - 180.0).abs() < EPS);
    }

    #[test]
    fn test_always_in_range_and_idempotent() {
        let mut raw = -5000.0;
        while raw <= 5000.0 {
            let n = normalize_degrees(raw);
            assert!((-180.0..=180.0).contains(&n), "{} -> {}", raw, n);
            assert!((normalize_degrees(n) - n).abs() < EPS, "not idempotent at {}", raw);
            raw += 7.3;
        }
    }

    #[test]
    fn test_large_accumulated_angle() {
        // Ten full turns plus a bit
        assert!((normalize_degrees(3600.0 + 45.0) - 45.0).abs() < 1e-6);
        assert!((normalize_degrees(-3600.0 - 45.0) + 45.0).abs() < 1e-6);
    }
}
