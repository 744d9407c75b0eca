//! Element-wise binary reference evaluator with broadcasting.
//!
//! Produces the expected output of `add`, `sub`, `mul`, `div`, `max`, `min`
//! and `pow` for any pair of broadcast-compatible tensors.

use tracing::trace;
use webnn_core::strides::{compute_strides, coordinates_to_flat_index, flat_index_to_coordinates};
use webnn_core::{BinaryOp, Result, Tensor, WebnnError};

use crate::broadcast::{BroadcastDims, broadcast_dimensions, resolve_broadcast_shape};

/// Apply one binary operation to two scalars.
///
/// `max` and `min` propagate NaN.
pub fn compute_binary(a: f64, b: f64, op: BinaryOp) -> f64 {
    match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Max => {
            if a.is_nan() || b.is_nan() {
                f64::NAN
            } else {
                a.max(b)
            }
        }
        BinaryOp::Min => {
            if a.is_nan() || b.is_nan() {
                f64::NAN
            } else {
                a.min(b)
            }
        }
        BinaryOp::Pow => a.powf(b),
    }
}

/// Evaluate `a <op> b` where `op_name` is one of the seven binary op names.
///
/// Fails with `UnsupportedOperation` for any other name and with
/// `IncompatibleShapes` when the operands cannot broadcast.
pub fn evaluate_binary(a: &Tensor, b: &Tensor, op_name: &str) -> Result<Tensor> {
    let op: BinaryOp = op_name.parse()?;
    evaluate_binary_op(a, b, op)
}

/// Typed form of [`evaluate_binary`].
pub fn evaluate_binary_op(a: &Tensor, b: &Tensor, op: BinaryOp) -> Result<Tensor> {
    check_len(a)?;
    check_len(b)?;
    let out_shape = resolve_broadcast_shape(&a.dimensions, &b.dimensions)?;
    let a_dims = broadcast_dimensions(&a.dimensions, &out_shape);
    let b_dims = broadcast_dimensions(&b.dimensions, &out_shape);
    let out_size = out_shape.size();
    let fast = a_dims.is_empty() && b_dims.is_empty();
    trace!(op = op.name(), out = %out_shape, fast, "evaluate binary");

    let value = if fast {
        // Equal shapes, or one shape a trailing suffix of the other: modular
        // indexing repeats the smaller operand correctly.
        (0..out_size)
            .map(|i| compute_binary(a.value[i % a.len()], b.value[i % b.len()], op))
            .collect()
    } else {
        strided_values(a, b, op, &out_shape.0, &a_dims, &b_dims)
    };

    Ok(Tensor {
        dimensions: out_shape,
        value,
    })
}

/// Evaluate through per-element coordinate mapping only, never the modular
/// fast path.
pub fn evaluate_binary_strided(a: &Tensor, b: &Tensor, op: BinaryOp) -> Result<Tensor> {
    check_len(a)?;
    check_len(b)?;
    let out_shape = resolve_broadcast_shape(&a.dimensions, &b.dimensions)?;
    let a_dims = broadcast_dimensions(&a.dimensions, &out_shape);
    let b_dims = broadcast_dimensions(&b.dimensions, &out_shape);
    let value = strided_values(a, b, op, &out_shape.0, &a_dims, &b_dims);
    Ok(Tensor {
        dimensions: out_shape,
        value,
    })
}

fn strided_values(
    a: &Tensor,
    b: &Tensor,
    op: BinaryOp,
    out_dims: &[usize],
    a_dims: &BroadcastDims,
    b_dims: &BroadcastDims,
) -> Vec<f64> {
    let out_rank = out_dims.len();
    let out_strides = compute_strides(out_dims);
    let a_strides = compute_strides(&a.dimensions.0);
    let b_strides = compute_strides(&b.dimensions.0);
    let out_size: usize = out_dims.iter().product();

    (0..out_size)
        .map(|i| {
            let loc = flat_index_to_coordinates(i, out_rank, &out_strides);
            let x = broadcast_value(a, &loc, a_dims, &a_strides);
            let y = broadcast_value(b, &loc, b_dims, &b_strides);
            compute_binary(x, y, op)
        })
        .collect()
}

/// Read `x` at an output coordinate: keep the trailing `rank(x)` coordinates
/// and pin every stretched dimension to 0.
fn broadcast_value(x: &Tensor, out_coords: &[usize], dims: &BroadcastDims, strides: &[usize]) -> f64 {
    let rank = x.rank();
    let mut coords: smallvec::SmallVec<[usize; 6]> =
        smallvec::SmallVec::from_slice(&out_coords[out_coords.len() - rank..]);
    for &d in dims {
        coords[d] = 0;
    }
    x.value[coordinates_to_flat_index(&coords, rank, strides)]
}

fn check_len(t: &Tensor) -> Result<()> {
    let expected = t.dimensions.size();
    if t.value.len() != expected {
        return Err(WebnnError::InvalidArgument(format!(
            "data length {} does not match shape {} (expected {})",
            t.value.len(),
            t.dimensions,
            expected,
        )));
    }
    Ok(())
}
