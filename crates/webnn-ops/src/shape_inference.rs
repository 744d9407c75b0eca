//! Shape inference for graph ops.
//!
//! Given an `Operation` and input descriptors, computes the output descriptor.
//! This is used by the graph builder to validate each node before it is added.

use webnn_core::graph::{GemmBias, InputLayout, Operation, Window2d};
use webnn_core::{OperandDescriptor, Shape, WebnnError};

use crate::broadcast::resolve_broadcast_shape;

/// Error returned when operands are invalid for an op.
#[derive(Debug, thiserror::Error)]
pub enum ShapeError {
    #[error("shape mismatch: {0}")]
    Mismatch(String),

    #[error("cannot broadcast {a} with {b}")]
    Broadcast { a: Shape, b: Shape },

    #[error("invalid axis {axis} for ndim {ndim}")]
    InvalidAxis { axis: i64, ndim: usize },

    #[error("{op} inner dimensions mismatch: {k1} vs {k2}")]
    InnerMismatch { op: &'static str, k1: usize, k2: usize },

    #[error("operand type mismatch: {0}")]
    DataType(String),
}

impl From<ShapeError> for WebnnError {
    fn from(e: ShapeError) -> Self {
        match e {
            ShapeError::Broadcast { a, b } => WebnnError::IncompatibleShapes { a, b },
            other => WebnnError::InvalidArgument(other.to_string()),
        }
    }
}

/// Infer the output descriptor for a given op and input descriptors.
pub fn infer_descriptor(
    op: &Operation,
    inputs: &[&OperandDescriptor],
) -> Result<OperandDescriptor, ShapeError> {
    let first = input(inputs, 0)?;
    if let Some(other) = inputs.iter().find(|d| d.data_type != first.data_type) {
        return Err(ShapeError::DataType(format!(
            "{} expects a single operand type, got {} and {}",
            op.name(),
            first.data_type,
            other.data_type
        )));
    }
    let shape = infer_shape(op, &inputs.iter().map(|d| &d.dimensions).collect::<Vec<_>>())?;
    Ok(OperandDescriptor::new(first.data_type, shape))
}

/// Infer the output shape for a given op and input shapes.
pub fn infer_shape(op: &Operation, inputs: &[&Shape]) -> Result<Shape, ShapeError> {
    match op {
        // Binary elementwise ops broadcast their operands.
        Operation::Binary(_) => {
            let a = input(inputs, 0)?;
            let b = input(inputs, 1)?;
            resolve_broadcast_shape(a, b).map_err(|_| ShapeError::Broadcast {
                a: (*a).clone(),
                b: (*b).clone(),
            })
        }

        // Unary ops and activations preserve shape.
        Operation::Unary(_) | Operation::Clamp(_) | Operation::LeakyRelu(_) => {
            Ok((*input(inputs, 0)?).clone())
        }

        Operation::Softmax => {
            let a = input(inputs, 0)?;
            if a.ndim() != 2 {
                return Err(ShapeError::Mismatch(format!(
                    "softmax requires a 2-D input, got {a}"
                )));
            }
            Ok((*a).clone())
        }

        Operation::Matmul => matmul_shape(input(inputs, 0)?, input(inputs, 1)?),

        Operation::Gemm(options) => {
            let a = input(inputs, 0)?;
            let b = input(inputs, 1)?;
            if a.ndim() != 2 || b.ndim() != 2 {
                return Err(ShapeError::Mismatch(format!(
                    "gemm requires 2-D operands, got {a} and {b}"
                )));
            }
            let (m, k1) = if options.a_transpose {
                (a.0[1], a.0[0])
            } else {
                (a.0[0], a.0[1])
            };
            let (k2, n) = if options.b_transpose {
                (b.0[1], b.0[0])
            } else {
                (b.0[0], b.0[1])
            };
            if k1 != k2 {
                return Err(ShapeError::InnerMismatch { op: "gemm", k1, k2 });
            }
            let out = Shape::new(vec![m, n]);
            if let Some(GemmBias::Operand) = options.c {
                let c = input(inputs, 2)?;
                // c broadcasts unidirectionally: it may never grow the output.
                match resolve_broadcast_shape(c, &out) {
                    Ok(s) if s == out => {}
                    _ => {
                        return Err(ShapeError::Broadcast {
                            a: (*c).clone(),
                            b: out,
                        });
                    }
                }
            }
            Ok(out)
        }

        Operation::Reshape { new_shape } => {
            let a = input(inputs, 0)?;
            if a.size() != new_shape.size() {
                return Err(ShapeError::Mismatch(format!(
                    "cannot reshape {a} ({} elements) into {new_shape} ({} elements)",
                    a.size(),
                    new_shape.size()
                )));
            }
            Ok(new_shape.clone())
        }

        Operation::Transpose(options) => {
            let a = input(inputs, 0)?;
            let perm = &options.permutation;
            let mut seen = vec![false; a.ndim()];
            if perm.len() != a.ndim() {
                return Err(ShapeError::Mismatch(format!(
                    "permutation {perm:?} does not match rank {}",
                    a.ndim()
                )));
            }
            for &p in perm {
                if p >= a.ndim() || seen[p] {
                    return Err(ShapeError::Mismatch(format!(
                        "{perm:?} is not a permutation of 0..{}",
                        a.ndim()
                    )));
                }
                seen[p] = true;
            }
            Ok(Shape::new(perm.iter().map(|&p| a.0[p]).collect::<Vec<_>>()))
        }

        Operation::Concat { axis } => {
            let first = input(inputs, 0)?;
            let ndim = first.ndim();
            if *axis >= ndim {
                return Err(ShapeError::InvalidAxis {
                    axis: *axis as i64,
                    ndim,
                });
            }
            let mut dims = first.0.clone();
            for s in &inputs[1..] {
                let compatible = s.ndim() == ndim
                    && s.0.iter().zip(&first.0).enumerate().all(|(i, (x, y))| i == *axis || x == y);
                if !compatible {
                    return Err(ShapeError::Mismatch(format!(
                        "cannot concat {s} with {first} along axis {axis}"
                    )));
                }
                dims[*axis] += s.0[*axis];
            }
            Ok(Shape::new(dims))
        }

        Operation::Slice { starts, sizes } => {
            let a = input(inputs, 0)?;
            if starts.len() != a.ndim() || sizes.len() != a.ndim() {
                return Err(ShapeError::Mismatch(format!(
                    "slice of {a} needs {} starts and sizes",
                    a.ndim()
                )));
            }
            for (i, ((&start, &size), &dim)) in starts.iter().zip(sizes).zip(&a.0).enumerate() {
                if start + size > dim {
                    return Err(ShapeError::Mismatch(format!(
                        "slice [{start}, {}) exceeds dimension {i} of {a}",
                        start + size
                    )));
                }
            }
            Ok(Shape::new(sizes.clone()))
        }

        Operation::Squeeze { axes } => {
            let a = input(inputs, 0)?;
            for &axis in axes {
                if axis >= a.ndim() {
                    return Err(ShapeError::InvalidAxis {
                        axis: axis as i64,
                        ndim: a.ndim(),
                    });
                }
                if a.0[axis] != 1 {
                    return Err(ShapeError::Mismatch(format!(
                        "cannot squeeze axis {axis} of {a}"
                    )));
                }
            }
            let dims: Vec<usize> = a
                .0
                .iter()
                .enumerate()
                .filter(|(i, _)| !axes.contains(i))
                .map(|(_, &d)| d)
                .collect();
            Ok(Shape::new(dims))
        }

        Operation::Reduce(_, options) => {
            let a = input(inputs, 0)?;
            let mut dims = Vec::with_capacity(a.ndim());
            for (i, &d) in a.0.iter().enumerate() {
                if options.axes.contains(&i) {
                    if options.keep_dimensions {
                        dims.push(1);
                    }
                } else {
                    dims.push(d);
                }
            }
            if let Some(&axis) = options.axes.iter().find(|&&axis| axis >= a.ndim()) {
                return Err(ShapeError::InvalidAxis {
                    axis: axis as i64,
                    ndim: a.ndim(),
                });
            }
            Ok(Shape::new(dims))
        }

        Operation::BatchNormalization(options) => {
            let a = input(inputs, 0)?;
            if options.axis >= a.ndim() {
                return Err(ShapeError::InvalidAxis {
                    axis: options.axis as i64,
                    ndim: a.ndim(),
                });
            }
            let expected = 3 + usize::from(options.has_scale) + usize::from(options.has_bias);
            per_channel_inputs("batchNormalization", inputs, 1, expected, a.0[options.axis])?;
            Ok((*a).clone())
        }

        Operation::InstanceNormalization(options) => {
            let a = input(inputs, 0)?;
            let [_, channels, _, _] = image_dims("instanceNormalization", a, options.layout)?;
            let expected = 1 + usize::from(options.has_scale) + usize::from(options.has_bias);
            per_channel_inputs("instanceNormalization", inputs, 1, expected, channels)?;
            Ok((*a).clone())
        }

        Operation::Conv2d(options) => {
            let a = input(inputs, 0)?;
            let filter = input(inputs, 1)?;
            let [batches, channels, height, width] = image_dims("conv2d", a, options.input_layout)?;
            if filter.ndim() != 4 {
                return Err(ShapeError::Mismatch(format!(
                    "conv2d requires a 4-D filter, got {filter}"
                )));
            }
            let [out_channels, group_channels, kh, kw] = options.filter_layout.oihw(&filter.0);
            if options.groups == 0
                || channels != group_channels * options.groups
                || out_channels % options.groups != 0
            {
                return Err(ShapeError::Mismatch(format!(
                    "conv2d filter {filter} does not fit {channels} input channels in {} groups",
                    options.groups
                )));
            }
            let expected = 2 + usize::from(options.has_bias);
            per_channel_inputs("conv2d", inputs, 2, expected, out_channels)?;
            let [out_h, out_w] = window_output_sizes([height, width], [kh, kw], &options.window, false)?;
            Ok(Shape::new(options.input_layout.shape([batches, out_channels, out_h, out_w])))
        }

        Operation::Pool2d(kind, options) => {
            let a = input(inputs, 0)?;
            let [batches, channels, height, width] = image_dims(kind.name(), a, options.layout)?;
            let floor = window_output_sizes([height, width], options.window_dimensions, &options.window, false)?;
            let ceil = window_output_sizes([height, width], options.window_dimensions, &options.window, true)?;
            for i in 0..2 {
                if !(floor[i]..=ceil[i]).contains(&options.output_sizes[i]) {
                    return Err(ShapeError::Mismatch(format!(
                        "{} output sizes {:?} do not match window over {a}",
                        kind.name(),
                        options.output_sizes
                    )));
                }
            }
            let [out_h, out_w] = options.output_sizes;
            Ok(Shape::new(options.layout.shape([batches, channels, out_h, out_w])))
        }
    }
}

/// `[batches, channels, height, width]` of a 4-D image operand.
fn image_dims(op: &str, a: &Shape, layout: InputLayout) -> Result<[usize; 4], ShapeError> {
    if a.ndim() != 4 {
        return Err(ShapeError::Mismatch(format!(
            "{op} requires a 4-D input, got {a}"
        )));
    }
    Ok(layout.nchw(&a.0))
}

/// Checks that `inputs[first..]` are `expected - first` 1-D operands of
/// length `channels`.
fn per_channel_inputs(
    op: &str,
    inputs: &[&Shape],
    first: usize,
    expected: usize,
    channels: usize,
) -> Result<(), ShapeError> {
    if inputs.len() != expected {
        return Err(ShapeError::Mismatch(format!(
            "{op} expects {expected} operands, got {}",
            inputs.len()
        )));
    }
    for s in &inputs[first..] {
        if s.0 != [channels] {
            return Err(ShapeError::Mismatch(format!(
                "{op} expects per-channel operands of shape [{channels}], got {s}"
            )));
        }
    }
    Ok(())
}

/// Output length of a sliding window along one spatial axis.
pub fn window_output_size(
    input: usize,
    window: usize,
    padding: (usize, usize),
    stride: usize,
    dilation: usize,
    ceil: bool,
) -> Result<usize, ShapeError> {
    if window == 0 || stride == 0 || dilation == 0 {
        return Err(ShapeError::Mismatch(format!(
            "window {window}, stride {stride} and dilation {dilation} must be positive"
        )));
    }
    let effective = dilation * (window - 1) + 1;
    let padded = input + padding.0 + padding.1;
    if padded < effective {
        return Err(ShapeError::Mismatch(format!(
            "window of extent {effective} does not fit padded length {padded}"
        )));
    }
    let span = padded - effective;
    let steps = if ceil { span.div_ceil(stride) } else { span / stride };
    Ok(steps + 1)
}

fn window_output_sizes(
    input: [usize; 2],
    window: [usize; 2],
    placement: &Window2d,
    ceil: bool,
) -> Result<[usize; 2], ShapeError> {
    let p = placement.padding;
    Ok([
        window_output_size(input[0], window[0], (p[0], p[1]), placement.strides[0], placement.dilations[0], ceil)?,
        window_output_size(input[1], window[1], (p[2], p[3]), placement.strides[1], placement.dilations[1], ceil)?,
    ])
}

/// `(begin, end)` padding giving an output of `ceil(input / stride)`.
///
/// An odd total puts the extra element at the end when `upper`, else at the
/// beginning.
pub fn same_padding(input: usize, window: usize, stride: usize, dilation: usize, upper: bool) -> (usize, usize) {
    let output = input.div_ceil(stride.max(1));
    let effective = dilation * window.saturating_sub(1) + 1;
    let total = (output.saturating_sub(1) * stride + effective).saturating_sub(input);
    let small = total / 2;
    let large = total - small;
    if upper { (small, large) } else { (large, small) }
}

/// `matmul` output shape.
///
/// 1-D operands are promoted (a: prepend 1, b: append 1) and the promoted
/// dimension is removed again; batch dimensions broadcast.
fn matmul_shape(a: &Shape, b: &Shape) -> Result<Shape, ShapeError> {
    if a.ndim() == 0 || b.ndim() == 0 {
        return Err(ShapeError::Mismatch(
            "matmul requires operands of rank 1 or more".into(),
        ));
    }
    let a2 = if a.ndim() == 1 {
        Shape::new(vec![1, a.0[0]])
    } else {
        a.clone()
    };
    let b2 = if b.ndim() == 1 {
        Shape::new(vec![b.0[0], 1])
    } else {
        b.clone()
    };
    let (ar, br) = (a2.ndim(), b2.ndim());
    let (m, k1) = (a2.0[ar - 2], a2.0[ar - 1]);
    let (k2, n) = (b2.0[br - 2], b2.0[br - 1]);
    if k1 != k2 {
        return Err(ShapeError::InnerMismatch { op: "matmul", k1, k2 });
    }
    let a_batch = Shape::new(a2.0[..ar - 2].to_vec());
    let b_batch = Shape::new(b2.0[..br - 2].to_vec());
    let mut dims = resolve_broadcast_shape(&a_batch, &b_batch)
        .map_err(|_| ShapeError::Broadcast {
            a: a.clone(),
            b: b.clone(),
        })?
        .0;
    if a.ndim() > 1 {
        dims.push(m);
    }
    if b.ndim() > 1 {
        dims.push(n);
    }
    Ok(Shape::new(dims))
}

/// Resolve a possibly negative axis against `ndim`.
pub fn resolve_axis(axis: i64, ndim: usize) -> Result<usize, ShapeError> {
    let ndim_i = ndim as i64;
    let resolved = if axis < 0 { ndim_i + axis } else { axis };
    if resolved < 0 || resolved >= ndim_i {
        return Err(ShapeError::InvalidAxis { axis, ndim });
    }
    Ok(resolved as usize)
}

fn input<'a, T>(inputs: &[&'a T], i: usize) -> Result<&'a T, ShapeError> {
    inputs
        .get(i)
        .copied()
        .ok_or_else(|| ShapeError::Mismatch(format!("missing input {i}")))
}
