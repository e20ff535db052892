//! Float canonicalization and fixed-decimal quantization.
//!
//! Cache keys must not depend on `-0.0` vs `0.0` or on which NaN payload a
//! computation produced.

/// Canonicalize a floating-point value for deterministic ordering.
///
/// Rules:
/// - `-0.0` becomes `0.0`
/// - all NaNs become a single canonical NaN
pub fn canonical_f64(v: f64) -> f64 {
    if v == 0.0 {
        // Handles +0.0 and -0.0.
        0.0
    } else if v.is_nan() {
        f64::NAN
    } else {
        v
    }
}

/// Round `v` to `decimals` places and return the scaled integer.
///
/// `quantize(41.12345, 3) == 41123`. Non-finite input maps to `0` so that a
/// key built from a bad value is still stable.
pub fn quantize(v: f64, decimals: u32) -> i64 {
    let v = canonical_f64(v);
    if !v.is_finite() {
        return 0;
    }
    let scale = 10f64.powi(decimals as i32);
    (v * scale).round() as i64
}

#[cfg(test)]
mod tests {
    use super::{canonical_f64, quantize};

    #[test]
    fn zero_and_nan_have_one_representation() {
        assert!(canonical_f64(-0.0).is_sign_positive());
        assert!(canonical_f64(f64::NAN).is_nan());
        assert_eq!(canonical_f64(-1.5), -1.5);
    }

    #[test]
    fn quantize_rounds_to_three_decimals() {
        assert_eq!(quantize(41.12345, 3), 41123);
        assert_eq!(quantize(41.1237, 3), 41124);
        assert_eq!(quantize(-105.0004, 3), -105000);
        assert_eq!(quantize(-0.0001, 3), 0);
        assert_eq!(quantize(f64::NAN, 3), 0);
    }
}
