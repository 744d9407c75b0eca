//! Per-node CPU kernels.
//!
//! Straightforward safe Rust implementations of every graph operation,
//! computed in `f64`. The caller rounds each result to the node's operand
//! type.

use webnn_core::graph::{
    BatchNormOptions, ClampOptions, Conv2dOptions, GemmBias, GemmOptions, InputLayout,
    InstanceNormOptions, LeakyReluOptions, Pool2dOptions, PoolKind, ReduceOp, ReduceOptions,
    UnaryOp,
};
use webnn_core::strides::{compute_strides, coordinates_to_flat_index, flat_index_to_coordinates};
use webnn_core::{BinaryOp, OperandDescriptor, Operation, Result, Shape, Tensor, WebnnError};
use webnn_ops::{compute_binary, evaluate_binary_op, resolve_broadcast_shape};

/// A materialized node input.
#[derive(Clone, Copy, Debug)]
pub struct NodeInput<'a> {
    pub data: &'a [f64],
    pub shape: &'a Shape,
}

impl NodeInput<'_> {
    fn to_tensor(self) -> Tensor {
        Tensor {
            dimensions: self.shape.clone(),
            value: self.data.to_vec(),
        }
    }
}

/// Evaluate one operation node.
pub fn eval_node(
    op: &Operation,
    inputs: &[NodeInput<'_>],
    output: &OperandDescriptor,
) -> Result<Vec<f64>> {
    let data = match op {
        Operation::Binary(op) => binary(inputs, *op)?,
        Operation::Unary(op) => {
            let a = require_input(inputs, 0)?;
            a.data.iter().map(|&x| unary(*op, x)).collect()
        }
        Operation::Clamp(options) => clamp(inputs, options)?,
        Operation::LeakyRelu(options) => leaky_relu(inputs, options)?,
        Operation::Softmax => softmax(inputs)?,
        Operation::Matmul => matmul(inputs)?,
        Operation::Gemm(options) => gemm(inputs, options)?,
        Operation::Reshape { .. } | Operation::Squeeze { .. } => {
            require_input(inputs, 0)?.data.to_vec()
        }
        Operation::Transpose(options) => transpose(inputs, &options.permutation)?,
        Operation::Concat { axis } => concat(inputs, *axis)?,
        Operation::Slice { starts, sizes } => slice(inputs, starts, sizes)?,
        Operation::Reduce(op, options) => reduce(inputs, *op, options)?,
        Operation::BatchNormalization(options) => batch_normalization(inputs, options)?,
        Operation::InstanceNormalization(options) => instance_normalization(inputs, options)?,
        Operation::Conv2d(options) => conv2d(inputs, options, output)?,
        Operation::Pool2d(kind, options) => pool2d(inputs, *kind, options, output)?,
    };
    if data.len() != output.size() {
        return Err(WebnnError::LengthMismatch {
            actual: data.len(),
            expected: output.size(),
        });
    }
    Ok(data)
}

fn require_input<'a>(inputs: &'a [NodeInput<'a>], idx: usize) -> Result<&'a NodeInput<'a>> {
    inputs
        .get(idx)
        .ok_or_else(|| WebnnError::InvalidArgument(format!("expected input at index {idx}")))
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn unary(op: UnaryOp, x: f64) -> f64 {
    match op {
        UnaryOp::Abs => x.abs(),
        UnaryOp::Ceil => x.ceil(),
        UnaryOp::Cos => x.cos(),
        UnaryOp::Exp => x.exp(),
        UnaryOp::Floor => x.floor(),
        UnaryOp::Log => x.ln(),
        UnaryOp::Neg => -x,
        UnaryOp::Sin => x.sin(),
        UnaryOp::Tan => x.tan(),
        UnaryOp::Tanh => x.tanh(),
        UnaryOp::Sigmoid => sigmoid(x),
        UnaryOp::Relu => x.max(0.0),
    }
}

fn binary(inputs: &[NodeInput<'_>], op: BinaryOp) -> Result<Vec<f64>> {
    let a = require_input(inputs, 0)?;
    let b = require_input(inputs, 1)?;
    Ok(evaluate_binary_op(&a.to_tensor(), &b.to_tensor(), op)?.value)
}

fn clamp(inputs: &[NodeInput<'_>], options: &ClampOptions) -> Result<Vec<f64>> {
    let a = require_input(inputs, 0)?;
    Ok(a.data
        .iter()
        .map(|&x| x.max(options.min_value).min(options.max_value))
        .collect())
}

fn leaky_relu(inputs: &[NodeInput<'_>], options: &LeakyReluOptions) -> Result<Vec<f64>> {
    let a = require_input(inputs, 0)?;
    Ok(a.data
        .iter()
        .map(|&x| if x >= 0.0 { x } else { options.alpha * x })
        .collect())
}

/// Softmax over the last axis of a 2-D input.
fn softmax(inputs: &[NodeInput<'_>]) -> Result<Vec<f64>> {
    let a = require_input(inputs, 0)?;
    if a.shape.ndim() != 2 {
        return Err(WebnnError::InvalidArgument(format!(
            "softmax requires a 2-D input, got {}",
            a.shape
        )));
    }
    let dim = a.shape.0[1];
    let mut data = a.data.to_vec();
    if dim == 0 {
        return Ok(data);
    }
    for row in data.chunks_mut(dim) {
        let max_val = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mut sum_exp = 0.0;
        for x in row.iter_mut() {
            *x = (*x - max_val).exp();
            sum_exp += *x;
        }
        for x in row.iter_mut() {
            *x /= sum_exp;
        }
    }
    Ok(data)
}

/// Broadcasting batched matmul; 1-D operands are promoted and the promoted
/// dimension dropped from the output.
fn matmul(inputs: &[NodeInput<'_>]) -> Result<Vec<f64>> {
    let a = require_input(inputs, 0)?;
    let b = require_input(inputs, 1)?;

    let a_dims = if a.shape.ndim() == 1 {
        vec![1, a.shape.0[0]]
    } else {
        a.shape.0.clone()
    };
    let b_dims = if b.shape.ndim() == 1 {
        vec![b.shape.0[0], 1]
    } else {
        b.shape.0.clone()
    };
    if a_dims.len() < 2 || b_dims.len() < 2 {
        return Err(WebnnError::InvalidArgument(
            "matmul requires operands of rank 1 or more".into(),
        ));
    }

    let (ar, br) = (a_dims.len(), b_dims.len());
    let (m, k) = (a_dims[ar - 2], a_dims[ar - 1]);
    let (k2, n) = (b_dims[br - 2], b_dims[br - 1]);
    if k != k2 {
        return Err(WebnnError::InvalidArgument(format!(
            "matmul inner dimensions mismatch: {k} vs {k2}"
        )));
    }

    let a_batch = Shape::new(a_dims[..ar - 2].to_vec());
    let b_batch = Shape::new(b_dims[..br - 2].to_vec());
    let batch = resolve_broadcast_shape(&a_batch, &b_batch)?;
    let batch_strides = compute_strides(&batch.0);
    let a_batch_strides = compute_strides(&a_batch.0);
    let b_batch_strides = compute_strides(&b_batch.0);

    let mut data = Vec::with_capacity(batch.size() * m * n);
    for bi in 0..batch.size() {
        let coords = flat_index_to_coordinates(bi, batch.ndim(), &batch_strides);
        let a_off = batch_offset(&coords, &a_batch, &a_batch_strides) * m * k;
        let b_off = batch_offset(&coords, &b_batch, &b_batch_strides) * k * n;
        for i in 0..m {
            for j in 0..n {
                let mut sum = 0.0;
                for p in 0..k {
                    sum += a.data[a_off + i * k + p] * b.data[b_off + p * n + j];
                }
                data.push(sum);
            }
        }
    }
    Ok(data)
}

/// Flat batch index of a broadcast operand at output batch `coords`.
fn batch_offset(coords: &[usize], batch: &Shape, strides: &[usize]) -> usize {
    let rank = batch.ndim();
    let mut own: Vec<usize> = coords[coords.len() - rank..].to_vec();
    for (c, &d) in own.iter_mut().zip(&batch.0) {
        if d == 1 {
            *c = 0;
        }
    }
    coordinates_to_flat_index(&own, rank, strides)
}

fn gemm(inputs: &[NodeInput<'_>], options: &GemmOptions) -> Result<Vec<f64>> {
    let a = require_input(inputs, 0)?;
    let b = require_input(inputs, 1)?;
    if a.shape.ndim() != 2 || b.shape.ndim() != 2 {
        return Err(WebnnError::InvalidArgument(format!(
            "gemm requires 2-D operands, got {} and {}",
            a.shape, b.shape
        )));
    }
    let a = if options.a_transpose {
        transpose_2d(a)?
    } else {
        a.to_tensor()
    };
    let b = if options.b_transpose {
        transpose_2d(b)?
    } else {
        b.to_tensor()
    };
    let a_view = NodeInput {
        data: &a.value,
        shape: &a.dimensions,
    };
    let b_view = NodeInput {
        data: &b.value,
        shape: &b.dimensions,
    };
    let (m, n) = (a.dimensions.0[0], b.dimensions.0[1]);
    let out_shape = Shape::new(vec![m, n]);
    let mut product = matmul(&[a_view, b_view])?;
    for x in product.iter_mut() {
        *x *= options.alpha;
    }

    match options.c {
        None => Ok(product),
        Some(GemmBias::Scalar(c)) => Ok(product.into_iter().map(|x| x + options.beta * c).collect()),
        Some(GemmBias::Operand) => {
            let c = require_input(inputs, 2)?;
            let scaled = Tensor {
                dimensions: c.shape.clone(),
                value: c.data.iter().map(|&x| options.beta * x).collect(),
            };
            let product = Tensor {
                dimensions: out_shape,
                value: product,
            };
            Ok(evaluate_binary_op(&product, &scaled, BinaryOp::Add)?.value)
        }
    }
}

fn transpose_2d(a: &NodeInput<'_>) -> Result<Tensor> {
    if a.shape.ndim() != 2 {
        return Err(WebnnError::InvalidArgument(format!(
            "gemm requires 2-D operands, got {}",
            a.shape
        )));
    }
    Ok(Tensor {
        dimensions: Shape::new(vec![a.shape.0[1], a.shape.0[0]]),
        value: transpose(std::slice::from_ref(a), &[1, 0])?,
    })
}

fn transpose(inputs: &[NodeInput<'_>], perm: &[usize]) -> Result<Vec<f64>> {
    let a = require_input(inputs, 0)?;
    let ndim = a.shape.ndim();
    if perm.len() != ndim {
        return Err(WebnnError::InvalidArgument(
            "transpose permutation length must match rank".into(),
        ));
    }

    let old_shape = &a.shape.0;
    let new_shape: Vec<usize> = perm.iter().map(|&ax| old_shape[ax]).collect();
    let old_strides = compute_strides(old_shape);
    let new_strides = compute_strides(&new_shape);

    let mut result = vec![0.0; a.data.len()];
    let mut old_coords = vec![0; ndim];
    for (flat, out) in result.iter_mut().enumerate() {
        let coords = flat_index_to_coordinates(flat, ndim, &new_strides);
        // Output axis i reads input axis perm[i].
        for (i, &c) in coords.iter().enumerate() {
            old_coords[perm[i]] = c;
        }
        *out = a.data[coordinates_to_flat_index(&old_coords, ndim, &old_strides)];
    }
    Ok(result)
}

fn concat(inputs: &[NodeInput<'_>], axis: usize) -> Result<Vec<f64>> {
    let first = require_input(inputs, 0)?;
    let outer: usize = first.shape.0[..axis].iter().product();
    let inner: usize = first.shape.0[axis + 1..].iter().product();

    let mut data = Vec::with_capacity(inputs.iter().map(|x| x.data.len()).sum());
    for o in 0..outer {
        for x in inputs {
            let chunk = x.shape.0[axis] * inner;
            data.extend_from_slice(&x.data[o * chunk..(o + 1) * chunk]);
        }
    }
    Ok(data)
}

fn slice(inputs: &[NodeInput<'_>], starts: &[usize], sizes: &[usize]) -> Result<Vec<f64>> {
    let a = require_input(inputs, 0)?;
    let rank = a.shape.ndim();
    let in_strides = compute_strides(&a.shape.0);
    let out_strides = compute_strides(sizes);
    let total: usize = sizes.iter().product();

    let mut data = Vec::with_capacity(total);
    for flat in 0..total {
        let mut coords = flat_index_to_coordinates(flat, rank, &out_strides);
        for (c, &s) in coords.iter_mut().zip(starts) {
            *c += s;
        }
        data.push(a.data[coordinates_to_flat_index(&coords, rank, &in_strides)]);
    }
    Ok(data)
}

fn reduce(inputs: &[NodeInput<'_>], op: ReduceOp, options: &ReduceOptions) -> Result<Vec<f64>> {
    let a = require_input(inputs, 0)?;
    let rank = a.shape.ndim();
    if let Some(&bad) = options.axes.iter().find(|&&axis| axis >= rank) {
        return Err(WebnnError::InvalidArgument(format!(
            "axis {bad} out of range for rank {rank}"
        )));
    }

    // Accumulate into the keep-dimensions shape; dropping the reduced unit
    // dims afterwards does not change the flat layout.
    let kept: Vec<usize> = a
        .shape
        .0
        .iter()
        .enumerate()
        .map(|(i, &d)| if options.axes.contains(&i) { 1 } else { d })
        .collect();
    let out_size: usize = kept.iter().product();
    let count: usize = options.axes.iter().map(|&ax| a.shape.0[ax]).product();

    let init = match op {
        ReduceOp::Sum | ReduceOp::Mean => 0.0,
        ReduceOp::Product => 1.0,
        ReduceOp::Max => f64::NEG_INFINITY,
        ReduceOp::Min => f64::INFINITY,
    };
    let mut acc = vec![init; out_size];

    let in_strides = compute_strides(&a.shape.0);
    let out_strides = compute_strides(&kept);
    for (flat, &x) in a.data.iter().enumerate() {
        let mut coords = flat_index_to_coordinates(flat, rank, &in_strides);
        for &ax in &options.axes {
            coords[ax] = 0;
        }
        let o = coordinates_to_flat_index(&coords, rank, &out_strides);
        acc[o] = match op {
            ReduceOp::Sum | ReduceOp::Mean => acc[o] + x,
            ReduceOp::Product => acc[o] * x,
            ReduceOp::Max => compute_binary(acc[o], x, BinaryOp::Max),
            ReduceOp::Min => compute_binary(acc[o], x, BinaryOp::Min),
        };
    }

    if op == ReduceOp::Mean {
        for x in acc.iter_mut() {
            *x /= count as f64;
        }
    }
    Ok(acc)
}

/// Optional trailing per-channel operands, starting at node input `first`.
fn scale_and_bias<'a>(
    inputs: &'a [NodeInput<'a>],
    first: usize,
    has_scale: bool,
    has_bias: bool,
) -> Result<(Option<&'a [f64]>, Option<&'a [f64]>)> {
    let scale = if has_scale {
        Some(require_input(inputs, first)?.data)
    } else {
        None
    };
    let bias = if has_bias {
        Some(require_input(inputs, first + usize::from(has_scale))?.data)
    } else {
        None
    };
    Ok((scale, bias))
}

fn batch_normalization(inputs: &[NodeInput<'_>], options: &BatchNormOptions) -> Result<Vec<f64>> {
    let x = require_input(inputs, 0)?;
    let mean = require_input(inputs, 1)?.data;
    let variance = require_input(inputs, 2)?.data;
    let (scale, bias) = scale_and_bias(inputs, 3, options.has_scale, options.has_bias)?;
    let channels = *x.shape.0.get(options.axis).ok_or_else(|| {
        WebnnError::InvalidArgument(format!("axis {} out of range for {}", options.axis, x.shape))
    })?;
    let inner: usize = x.shape.0[options.axis + 1..].iter().product();

    Ok(x.data
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            let c = (i / inner) % channels;
            let mut y = (v - mean[c]) / (variance[c] + options.epsilon).sqrt();
            if let Some(scale) = scale {
                y *= scale[c];
            }
            if let Some(bias) = bias {
                y += bias[c];
            }
            y
        })
        .collect())
}

fn image_dims(shape: &Shape, layout: InputLayout) -> Result<[usize; 4]> {
    if shape.ndim() != 4 {
        return Err(WebnnError::InvalidArgument(format!(
            "expected a 4-D operand, got {shape}"
        )));
    }
    Ok(layout.nchw(&shape.0))
}

/// Population mean and variance over each `(batch, channel)` plane.
fn instance_normalization(inputs: &[NodeInput<'_>], options: &InstanceNormOptions) -> Result<Vec<f64>> {
    let x = require_input(inputs, 0)?;
    let (scale, bias) = scale_and_bias(inputs, 1, options.has_scale, options.has_bias)?;
    let dims = image_dims(x.shape, options.layout)?;
    let [batches, channels, height, width] = dims;
    let plane = (height * width) as f64;

    let mut out = vec![0.0; x.data.len()];
    for n in 0..batches {
        for c in 0..channels {
            let positions: Vec<usize> = (0..height)
                .flat_map(|y| (0..width).map(move |w| options.layout.index(dims, n, c, y, w)))
                .collect();
            let mean = positions.iter().map(|&i| x.data[i]).sum::<f64>() / plane;
            let variance = positions
                .iter()
                .map(|&i| (x.data[i] - mean).powi(2))
                .sum::<f64>()
                / plane;
            let denom = (variance + options.epsilon).sqrt();
            let s = scale.map_or(1.0, |s| s[c]);
            let b = bias.map_or(0.0, |b| b[c]);
            for i in positions {
                out[i] = s * (x.data[i] - mean) / denom + b;
            }
        }
    }
    Ok(out)
}

/// Input position read by output position `out` at window offset `k`, or
/// `None` when it falls in the padding.
fn source_index(out: usize, k: usize, stride: usize, dilation: usize, pad_begin: usize, len: usize) -> Option<usize> {
    (out * stride + k * dilation)
        .checked_sub(pad_begin)
        .filter(|&i| i < len)
}

fn conv2d(inputs: &[NodeInput<'_>], options: &Conv2dOptions, output: &OperandDescriptor) -> Result<Vec<f64>> {
    let x = require_input(inputs, 0)?;
    let filter = require_input(inputs, 1)?;
    let bias = if options.has_bias {
        Some(require_input(inputs, 2)?.data)
    } else {
        None
    };
    let layout = options.input_layout;
    let in_dims = image_dims(x.shape, layout)?;
    let out_dims = image_dims(&output.dimensions, layout)?;
    if filter.shape.ndim() != 4 {
        return Err(WebnnError::InvalidArgument(format!(
            "conv2d requires a 4-D filter, got {}",
            filter.shape
        )));
    }
    let f_dims = options.filter_layout.oihw(&filter.shape.0);
    let [batches, _, height, width] = in_dims;
    let [_, out_channels, out_h, out_w] = out_dims;
    let [_, group_channels, kh, kw] = f_dims;
    let per_group = out_channels / options.groups.max(1);
    let window = &options.window;

    let mut out = vec![0.0; output.size()];
    for n in 0..batches {
        for oc in 0..out_channels {
            let first_channel = (oc / per_group.max(1)) * group_channels;
            for oy in 0..out_h {
                for ox in 0..out_w {
                    let mut sum = bias.map_or(0.0, |b| b[oc]);
                    for ic in 0..group_channels {
                        for ky in 0..kh {
                            let Some(iy) = source_index(oy, ky, window.strides[0], window.dilations[0], window.padding[0], height)
                            else {
                                continue;
                            };
                            for kx in 0..kw {
                                let Some(ix) = source_index(ox, kx, window.strides[1], window.dilations[1], window.padding[2], width)
                                else {
                                    continue;
                                };
                                let v = x.data[layout.index(in_dims, n, first_channel + ic, iy, ix)];
                                let w = filter.data[options.filter_layout.index(f_dims, oc, ic, ky, kx)];
                                sum += v * w;
                            }
                        }
                    }
                    out[layout.index(out_dims, n, oc, oy, ox)] = sum;
                }
            }
        }
    }
    Ok(out)
}

/// Average pooling divides by the number of in-bounds elements; padding is
/// not counted.
fn pool2d(
    inputs: &[NodeInput<'_>],
    kind: PoolKind,
    options: &Pool2dOptions,
    output: &OperandDescriptor,
) -> Result<Vec<f64>> {
    let x = require_input(inputs, 0)?;
    let layout = options.layout;
    let in_dims = image_dims(x.shape, layout)?;
    let out_dims = image_dims(&output.dimensions, layout)?;
    let [batches, channels, height, width] = in_dims;
    let [_, _, out_h, out_w] = out_dims;
    let [wh, ww] = options.window_dimensions;
    let window = &options.window;

    let mut out = vec![0.0; output.size()];
    for n in 0..batches {
        for c in 0..channels {
            for oy in 0..out_h {
                for ox in 0..out_w {
                    let mut acc = match kind {
                        PoolKind::Average => 0.0,
                        PoolKind::Max => f64::NEG_INFINITY,
                    };
                    let mut count = 0usize;
                    for ky in 0..wh {
                        let Some(iy) = source_index(oy, ky, window.strides[0], window.dilations[0], window.padding[0], height)
                        else {
                            continue;
                        };
                        for kx in 0..ww {
                            let Some(ix) = source_index(ox, kx, window.strides[1], window.dilations[1], window.padding[2], width)
                            else {
                                continue;
                            };
                            let v = x.data[layout.index(in_dims, n, c, iy, ix)];
                            acc = match kind {
                                PoolKind::Average => acc + v,
                                PoolKind::Max => compute_binary(acc, v, BinaryOp::Max),
                            };
                            count += 1;
                        }
                    }
                    out[layout.index(out_dims, n, c, oy, ox)] = match kind {
                        PoolKind::Average if count > 0 => acc / count as f64,
                        PoolKind::Average => 0.0,
                        PoolKind::Max => acc,
                    };
                }
            }
        }
    }
    Ok(out)
}
