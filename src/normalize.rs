//! Final value cleanup before serialization

use crate::field::Field;

/// Decimal places kept in the output.
pub const PRECISION: i32 = 2;

/// Round to `decimals` places, ties to even.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    let scaled = value * factor;
    if !scaled.is_finite() {
        return value;
    }
    scaled.round_ties_even() / factor
}

/// Map one raw value to its JSON form.
///
/// The sentinel comparison happens on the raw value, before rounding can
/// perturb it.
pub fn normalize_value(value: f64, nan_value: f64) -> Option<f64> {
    if value == nan_value || !value.is_finite() {
        None
    } else {
        Some(round_to(value, PRECISION))
    }
}

/// Row-major (north to south) JSON-ready data for a field.
pub fn normalize_field(field: &Field, nan_value: f64) -> Vec<Option<f64>> {
    field
        .data
        .iter()
        .map(|&v| normalize_value(v, nan_value))
        .collect()
}

/// Round already-nullable data, leaving nulls in place.
pub fn round_nullable(values: &mut [Option<f64>]) {
    for v in values.iter_mut().flatten() {
        *v = round_to(*v, PRECISION);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::CivilTime;
    use crate::config::DEFAULT_NAN_VALUE;
    use ndarray::array;

    #[test]
    fn test_rounding() {
        assert_eq!(round_to(0.123456, 2), 0.12);
        assert_eq!(round_to(-1.005001, 2), -1.01);
        assert_eq!(round_to(2.0, 2), 2.0);
        assert_eq!(round_to(0.125, 2), 0.12);
        assert_eq!(round_to(0.375, 2), 0.38);
        assert_eq!(round_to(-2.5, 0), -2.0);
        assert_eq!(round_to(f64::MAX, 2), f64::MAX);
    }

    #[test]
    fn test_sentinel_becomes_null_and_nothing_else() {
        let field = Field {
            name: "u".into(),
            x: vec![0.0, 1.0, 2.0],
            y: vec![1.0, 0.0],
            data: array![[0.111, DEFAULT_NAN_VALUE, -0.5], [f64::NAN, 3.456, DEFAULT_NAN_VALUE]],
            dx: 1.0,
            dy: 1.0,
            time: CivilTime::new(2021, 1, 1, 0, 0, 0),
        };
        let out = normalize_field(&field, DEFAULT_NAN_VALUE);
        assert_eq!(out.len(), field.nx() * field.ny());
        assert_eq!(
            out,
            vec![Some(0.11), None, Some(-0.5), None, Some(3.46), None]
        );
    }

    #[test]
    fn test_sentinel_that_rounding_would_change() {
        // A sentinel with more than two decimals must still be recognized.
        assert_eq!(normalize_value(-999.999, -999.999), None);
        assert_eq!(normalize_value(-999.99, -999.999), Some(-999.99));
    }

    #[test]
    fn test_round_nullable() {
        let mut values = vec![Some(1.234), None, Some(-0.006)];
        round_nullable(&mut values);
        assert_eq!(values, vec![Some(1.23), None, Some(-0.01)]);
    }
}
