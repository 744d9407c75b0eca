//! Approximate equality of numeric outputs.
//!
//! Float values are compared by ULP distance on the bit pattern of the
//! operand type's float width, or by absolute difference. Integer operand
//! types use the plain integer difference as their ULP distance.

use half::f16;
use webnn_core::{MetricKind, OperandType, Result, WebnnError};

/// Map a float32 bit pattern to an integer line where adjacent floats are
/// adjacent integers, including across zero.
fn ordered_f32(v: f64) -> i64 {
    let bits = (v as f32).to_bits() as i32;
    if bits < 0 {
        i64::from(i32::MIN) - i64::from(bits)
    } else {
        i64::from(bits)
    }
}

fn ordered_f16(v: f64) -> i64 {
    let bits = f16::from_f64(v).to_bits() as i16;
    if bits < 0 {
        i64::from(i16::MIN) - i64::from(bits)
    } else {
        i64::from(bits)
    }
}

/// ULP distance between two values of `data_type`.
pub fn ulp_distance(actual: f64, expected: f64, data_type: OperandType) -> u64 {
    match data_type {
        OperandType::Float32 => ordered_f32(actual).abs_diff(ordered_f32(expected)),
        OperandType::Float16 => ordered_f16(actual).abs_diff(ordered_f16(expected)),
        OperandType::Int32
        | OperandType::Uint32
        | OperandType::Int8
        | OperandType::Uint8 => (actual - expected).abs() as u64,
    }
}

/// Check that `actual` matches `expected` within `tolerance` under `metric`.
///
/// Stops at the first position out of bounds. Equal values always pass.
pub fn assert_approx_equal(
    actual: &[f64],
    expected: &[f64],
    tolerance: f64,
    data_type: OperandType,
    metric: MetricKind,
) -> Result<()> {
    if actual.len() != expected.len() {
        return Err(WebnnError::LengthMismatch {
            actual: actual.len(),
            expected: expected.len(),
        });
    }
    for (index, (&a, &e)) in actual.iter().zip(expected).enumerate() {
        if a == e {
            continue;
        }
        let distance = match metric {
            MetricKind::Ulp => ulp_distance(a, e, data_type) as f64,
            MetricKind::Atol => (a - e).abs(),
        };
        // NaN distances fail.
        if !(distance <= tolerance) {
            return Err(WebnnError::ToleranceExceeded {
                index,
                actual: a,
                expected: e,
                distance,
                tolerance,
                metric,
            });
        }
    }
    Ok(())
}

/// Panicking form of [`assert_approx_equal`] for tests.
#[track_caller]
pub fn assert_approx_eq(
    actual: &[f64],
    expected: &[f64],
    tolerance: f64,
    data_type: OperandType,
    metric: MetricKind,
) {
    if let Err(e) = assert_approx_equal(actual, expected, tolerance, data_type, metric) {
        panic!("{e}");
    }
}
