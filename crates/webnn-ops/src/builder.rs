//! Graph builder.
//!
//! Every method validates its operands through shape inference before the
//! node is added, so a built [`Graph`] only holds well-formed nodes. Axis and
//! shape arguments arrive in their WebNN form (negative axes, `-1` in a
//! reshape target, optional permutations) and are resolved here.

use std::str::FromStr;

use smallvec::SmallVec;
use webnn_core::graph::{
    BatchNormOptions, ClampOptions, Conv2dOptions, FilterLayout, GemmBias, GemmOptions,
    InputLayout, InstanceNormOptions, LeakyReluOptions, NodeKind, Pool2dOptions, PoolKind,
    ReduceOp, ReduceOptions, TransposeOptions, UnaryOp, Window2d,
};
use webnn_core::{
    BinaryOp, Graph, OperandDescriptor, OperandId, Operation, Result, Shape, TensorBuffer,
    WebnnError,
};

use crate::shape_inference::{infer_descriptor, resolve_axis, same_padding, window_output_size};

/// How `split` divides an axis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Split {
    /// Equal parts; the axis length must be divisible by the count.
    Count(usize),
    /// Explicit part sizes summing to the axis length.
    Sizes(Vec<usize>),
}

/// Activation applied to the result of conv2d or a normalization.
///
/// Lowered to a separate element-wise node after the operation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FusedActivation {
    Relu,
    /// `clamp(x, 0, 6)`.
    Relu6,
    Sigmoid,
    LeakyRelu(LeakyReluOptions),
}

impl FromStr for FusedActivation {
    type Err = WebnnError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "relu" => Ok(FusedActivation::Relu),
            "relu6" => Ok(FusedActivation::Relu6),
            "sigmoid" => Ok(FusedActivation::Sigmoid),
            "leakyRelu" => Ok(FusedActivation::LeakyRelu(LeakyReluOptions::default())),
            other => Err(WebnnError::UnsupportedOperation(other.to_string())),
        }
    }
}

/// How conv2d and pooling pad their input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AutoPad {
    /// Use the given padding as is.
    #[default]
    Explicit,
    SameUpper,
    SameLower,
}

impl FromStr for AutoPad {
    type Err = WebnnError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "explicit" => Ok(AutoPad::Explicit),
            "same-upper" => Ok(AutoPad::SameUpper),
            "same-lower" => Ok(AutoPad::SameLower),
            other => Err(WebnnError::InvalidArgument(format!("unknown autoPad '{other}'"))),
        }
    }
}

/// Rounding of pooling output sizes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RoundingType {
    #[default]
    Floor,
    Ceil,
}

impl FromStr for RoundingType {
    type Err = WebnnError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "floor" => Ok(RoundingType::Floor),
            "ceil" => Ok(RoundingType::Ceil),
            other => Err(WebnnError::InvalidArgument(format!(
                "unknown roundingType '{other}'"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BatchNormArgs {
    pub scale: Option<OperandId>,
    pub bias: Option<OperandId>,
    /// Channel axis; may be negative.
    pub axis: i64,
    pub epsilon: f64,
    pub activation: Option<FusedActivation>,
}

impl Default for BatchNormArgs {
    fn default() -> Self {
        Self {
            scale: None,
            bias: None,
            axis: 1,
            epsilon: 1e-5,
            activation: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InstanceNormArgs {
    pub scale: Option<OperandId>,
    pub bias: Option<OperandId>,
    pub epsilon: f64,
    pub layout: InputLayout,
}

impl Default for InstanceNormArgs {
    fn default() -> Self {
        Self {
            scale: None,
            bias: None,
            epsilon: 1e-5,
            layout: InputLayout::Nchw,
        }
    }
}

/// Padding, strides and dilations as given to conv2d or pooling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowArgs {
    /// `[beginning height, ending height, beginning width, ending width]`;
    /// ignored unless `auto_pad` is explicit.
    pub padding: [usize; 4],
    pub strides: [usize; 2],
    pub dilations: [usize; 2],
    pub auto_pad: AutoPad,
}

impl Default for WindowArgs {
    fn default() -> Self {
        Self {
            padding: [0; 4],
            strides: [1, 1],
            dilations: [1, 1],
            auto_pad: AutoPad::Explicit,
        }
    }
}

impl WindowArgs {
    /// Explicit padding for a `window` sliding over `input` (height, width).
    fn resolve(&self, input: [usize; 2], window: [usize; 2]) -> Window2d {
        let upper = match self.auto_pad {
            AutoPad::Explicit => {
                return Window2d {
                    padding: self.padding,
                    strides: self.strides,
                    dilations: self.dilations,
                };
            }
            AutoPad::SameUpper => true,
            AutoPad::SameLower => false,
        };
        let (top, bottom) = same_padding(input[0], window[0], self.strides[0], self.dilations[0], upper);
        let (left, right) = same_padding(input[1], window[1], self.strides[1], self.dilations[1], upper);
        Window2d {
            padding: [top, bottom, left, right],
            strides: self.strides,
            dilations: self.dilations,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Conv2dArgs {
    pub window: WindowArgs,
    pub groups: usize,
    pub input_layout: InputLayout,
    pub filter_layout: FilterLayout,
    pub bias: Option<OperandId>,
    pub activation: Option<FusedActivation>,
}

impl Default for Conv2dArgs {
    fn default() -> Self {
        Self {
            window: WindowArgs::default(),
            groups: 1,
            input_layout: InputLayout::Nchw,
            filter_layout: FilterLayout::Oihw,
            bias: None,
            activation: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Pool2dArgs {
    /// Defaults to the whole spatial extent.
    pub window_dimensions: Option<[usize; 2]>,
    pub window: WindowArgs,
    pub layout: InputLayout,
    pub rounding_type: RoundingType,
    /// Overrides `rounding_type` when given.
    pub output_sizes: Option<[usize; 2]>,
}

#[derive(Debug, Default)]
pub struct GraphBuilder {
    graph: Graph,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a named input bound at compute time.
    pub fn input(&mut self, name: &str, desc: OperandDescriptor) -> Result<OperandId> {
        if self.graph.inputs().any(|(n, _)| n == name) {
            return Err(WebnnError::InvalidArgument(format!(
                "duplicate input name '{name}'"
            )));
        }
        Ok(self.graph.add_node(
            NodeKind::Input {
                name: name.to_string(),
            },
            desc,
        ))
    }

    /// Bake `buffer` into the graph.
    pub fn constant(&mut self, desc: OperandDescriptor, buffer: TensorBuffer) -> Result<OperandId> {
        if buffer.data_type() != desc.data_type {
            return Err(WebnnError::InvalidArgument(format!(
                "constant buffer is {} but the descriptor says {}",
                buffer.data_type(),
                desc.data_type
            )));
        }
        if buffer.len() != desc.size() {
            return Err(WebnnError::LengthMismatch {
                actual: buffer.len(),
                expected: desc.size(),
            });
        }
        Ok(self.graph.add_node(NodeKind::Constant(buffer), desc))
    }

    /// Descriptor of an operand created by this builder.
    pub fn descriptor(&self, id: OperandId) -> Result<&OperandDescriptor> {
        self.graph
            .get(id)
            .map(|n| &n.desc)
            .ok_or_else(|| WebnnError::InvalidArgument(format!("unknown operand {id:?}")))
    }

    fn push_op(&mut self, op: Operation, inputs: &[OperandId]) -> Result<OperandId> {
        let descs = inputs
            .iter()
            .map(|&id| self.descriptor(id))
            .collect::<Result<Vec<_>>>()?;
        let desc = infer_descriptor(&op, &descs)?;
        Ok(self.graph.add_node(
            NodeKind::Op {
                op,
                inputs: SmallVec::from_slice(inputs),
            },
            desc,
        ))
    }

    // ── Element-wise ────────────────────────────────────────────────────

    pub fn binary(&mut self, op: BinaryOp, a: OperandId, b: OperandId) -> Result<OperandId> {
        self.push_op(Operation::Binary(op), &[a, b])
    }

    pub fn unary(&mut self, op: UnaryOp, x: OperandId) -> Result<OperandId> {
        self.push_op(Operation::Unary(op), &[x])
    }

    pub fn clamp(&mut self, x: OperandId, options: ClampOptions) -> Result<OperandId> {
        if options.min_value > options.max_value {
            return Err(WebnnError::InvalidArgument(format!(
                "clamp minValue {} exceeds maxValue {}",
                options.min_value, options.max_value
            )));
        }
        self.push_op(Operation::Clamp(options), &[x])
    }

    pub fn leaky_relu(&mut self, x: OperandId, options: LeakyReluOptions) -> Result<OperandId> {
        self.push_op(Operation::LeakyRelu(options), &[x])
    }

    pub fn softmax(&mut self, x: OperandId) -> Result<OperandId> {
        self.push_op(Operation::Softmax, &[x])
    }

    // ── Linear algebra ──────────────────────────────────────────────────

    pub fn matmul(&mut self, a: OperandId, b: OperandId) -> Result<OperandId> {
        self.push_op(Operation::Matmul, &[a, b])
    }

    /// `alpha * op(a) x op(b) + beta * c`.
    ///
    /// An operand `c` overrides any scalar bias in `options.c`.
    pub fn gemm(
        &mut self,
        a: OperandId,
        b: OperandId,
        c: Option<OperandId>,
        mut options: GemmOptions,
    ) -> Result<OperandId> {
        match c {
            Some(c) => {
                options.c = Some(GemmBias::Operand);
                self.push_op(Operation::Gemm(options), &[a, b, c])
            }
            None => {
                if options.c == Some(GemmBias::Operand) {
                    return Err(WebnnError::InvalidArgument(
                        "gemm bias declared as an operand but none was given".into(),
                    ));
                }
                self.push_op(Operation::Gemm(options), &[a, b])
            }
        }
    }

    // ── Shape manipulation ──────────────────────────────────────────────

    /// Reshape to `new_shape`; at most one entry may be `-1` and is inferred.
    pub fn reshape(&mut self, x: OperandId, new_shape: &[i64]) -> Result<OperandId> {
        let size = self.descriptor(x)?.size();
        let new_shape = resolve_reshape(size, new_shape)?;
        self.push_op(Operation::Reshape { new_shape }, &[x])
    }

    /// Permute dimensions; `None` reverses them.
    pub fn transpose(&mut self, x: OperandId, permutation: Option<&[usize]>) -> Result<OperandId> {
        let rank = self.descriptor(x)?.dimensions.ndim();
        let permutation = match permutation {
            Some(p) => p.to_vec(),
            None => (0..rank).rev().collect(),
        };
        self.push_op(Operation::Transpose(TransposeOptions { permutation }), &[x])
    }

    pub fn concat(&mut self, inputs: &[OperandId], axis: i64) -> Result<OperandId> {
        let first = inputs.first().ok_or_else(|| {
            WebnnError::InvalidArgument("concat requires at least one input".into())
        })?;
        let axis = resolve_axis(axis, self.descriptor(*first)?.dimensions.ndim())?;
        self.push_op(Operation::Concat { axis }, inputs)
    }

    pub fn slice(&mut self, x: OperandId, starts: &[usize], sizes: &[usize]) -> Result<OperandId> {
        self.push_op(
            Operation::Slice {
                starts: starts.to_vec(),
                sizes: sizes.to_vec(),
            },
            &[x],
        )
    }

    /// Remove size-1 dimensions; `None` removes all of them.
    pub fn squeeze(&mut self, x: OperandId, axes: Option<&[i64]>) -> Result<OperandId> {
        let dims = &self.descriptor(x)?.dimensions;
        let axes = match axes {
            Some(axes) => resolve_axes(axes, dims.ndim())?,
            None => dims
                .0
                .iter()
                .enumerate()
                .filter(|(_, d)| **d == 1)
                .map(|(i, _)| i)
                .collect(),
        };
        self.push_op(Operation::Squeeze { axes }, &[x])
    }

    /// Split along `axis`, one slice node per part.
    pub fn split(&mut self, x: OperandId, splits: &Split, axis: i64) -> Result<Vec<OperandId>> {
        let dims = self.descriptor(x)?.dimensions.clone();
        let axis = resolve_axis(axis, dims.ndim())?;
        let len = dims.0[axis];
        let sizes = match splits {
            Split::Count(0) => {
                return Err(WebnnError::InvalidArgument(
                    "split count must be positive".into(),
                ));
            }
            Split::Count(n) => {
                if len % n != 0 {
                    return Err(WebnnError::InvalidArgument(format!(
                        "axis {axis} of {dims} cannot be split into {n} equal parts"
                    )));
                }
                vec![len / n; *n]
            }
            Split::Sizes(sizes) => {
                if sizes.iter().sum::<usize>() != len {
                    return Err(WebnnError::InvalidArgument(format!(
                        "split sizes {sizes:?} do not sum to axis {axis} of {dims}"
                    )));
                }
                sizes.clone()
            }
        };

        let mut outputs = Vec::with_capacity(sizes.len());
        let mut offset = 0;
        for size in sizes {
            let mut starts = vec![0; dims.ndim()];
            let mut part = dims.0.clone();
            starts[axis] = offset;
            part[axis] = size;
            outputs.push(self.slice(x, &starts, &part)?);
            offset += size;
        }
        Ok(outputs)
    }

    // ── Reductions ──────────────────────────────────────────────────────

    /// Reduce over `axes`; `None` reduces every axis.
    pub fn reduce(
        &mut self,
        op: ReduceOp,
        x: OperandId,
        axes: Option<&[i64]>,
        keep_dimensions: bool,
    ) -> Result<OperandId> {
        let rank = self.descriptor(x)?.dimensions.ndim();
        let axes = match axes {
            Some(axes) => resolve_axes(axes, rank)?,
            None => (0..rank).collect(),
        };
        self.push_op(
            Operation::Reduce(
                op,
                ReduceOptions {
                    axes,
                    keep_dimensions,
                },
            ),
            &[x],
        )
    }

    // ── Normalization ───────────────────────────────────────────────────

    /// `(x - mean) / sqrt(variance + epsilon) * scale + bias` per channel.
    pub fn batch_normalization(
        &mut self,
        x: OperandId,
        mean: OperandId,
        variance: OperandId,
        args: BatchNormArgs,
    ) -> Result<OperandId> {
        let rank = self.descriptor(x)?.dimensions.ndim();
        let options = BatchNormOptions {
            axis: resolve_axis(args.axis, rank)?,
            epsilon: args.epsilon,
            has_scale: args.scale.is_some(),
            has_bias: args.bias.is_some(),
        };
        let mut inputs = vec![x, mean, variance];
        inputs.extend(args.scale);
        inputs.extend(args.bias);
        let y = self.push_op(Operation::BatchNormalization(options), &inputs)?;
        self.fuse(y, args.activation)
    }

    pub fn instance_normalization(&mut self, x: OperandId, args: InstanceNormArgs) -> Result<OperandId> {
        let options = InstanceNormOptions {
            epsilon: args.epsilon,
            layout: args.layout,
            has_scale: args.scale.is_some(),
            has_bias: args.bias.is_some(),
        };
        let mut inputs = vec![x];
        inputs.extend(args.scale);
        inputs.extend(args.bias);
        self.push_op(Operation::InstanceNormalization(options), &inputs)
    }

    // ── Convolution and pooling ─────────────────────────────────────────

    pub fn conv2d(&mut self, x: OperandId, filter: OperandId, args: Conv2dArgs) -> Result<OperandId> {
        let [_, _, height, width] = self.image_dims(x, args.input_layout)?;
        let filter_dims = &self.descriptor(filter)?.dimensions;
        if filter_dims.ndim() != 4 {
            return Err(WebnnError::InvalidArgument(format!(
                "conv2d requires a 4-D filter, got {filter_dims}"
            )));
        }
        let [_, _, kh, kw] = args.filter_layout.oihw(&filter_dims.0);
        let options = Conv2dOptions {
            window: args.window.resolve([height, width], [kh, kw]),
            groups: args.groups,
            input_layout: args.input_layout,
            filter_layout: args.filter_layout,
            has_bias: args.bias.is_some(),
        };
        let mut inputs = vec![x, filter];
        inputs.extend(args.bias);
        let y = self.push_op(Operation::Conv2d(options), &inputs)?;
        self.fuse(y, args.activation)
    }

    pub fn pool2d(&mut self, kind: PoolKind, x: OperandId, args: Pool2dArgs) -> Result<OperandId> {
        let [_, _, height, width] = self.image_dims(x, args.layout)?;
        let window_dimensions = args.window_dimensions.unwrap_or([height, width]);
        let window = args.window.resolve([height, width], window_dimensions);
        let output_sizes = match args.output_sizes {
            Some(sizes) => sizes,
            None => {
                let ceil = args.rounding_type == RoundingType::Ceil;
                let p = window.padding;
                [
                    window_output_size(height, window_dimensions[0], (p[0], p[1]), window.strides[0], window.dilations[0], ceil)?,
                    window_output_size(width, window_dimensions[1], (p[2], p[3]), window.strides[1], window.dilations[1], ceil)?,
                ]
            }
        };
        let options = Pool2dOptions {
            window_dimensions,
            window,
            layout: args.layout,
            output_sizes,
        };
        self.push_op(Operation::Pool2d(kind, options), &[x])
    }

    /// Append `activation` after `x`.
    pub fn activation(&mut self, x: OperandId, activation: FusedActivation) -> Result<OperandId> {
        match activation {
            FusedActivation::Relu => self.unary(UnaryOp::Relu, x),
            FusedActivation::Relu6 => self.clamp(
                x,
                ClampOptions {
                    min_value: 0.0,
                    max_value: 6.0,
                },
            ),
            FusedActivation::Sigmoid => self.unary(UnaryOp::Sigmoid, x),
            FusedActivation::LeakyRelu(options) => self.leaky_relu(x, options),
        }
    }

    fn fuse(&mut self, x: OperandId, activation: Option<FusedActivation>) -> Result<OperandId> {
        match activation {
            Some(activation) => self.activation(x, activation),
            None => Ok(x),
        }
    }

    fn image_dims(&self, x: OperandId, layout: InputLayout) -> Result<[usize; 4]> {
        let dims = &self.descriptor(x)?.dimensions;
        if dims.ndim() != 4 {
            return Err(WebnnError::InvalidArgument(format!(
                "expected a 4-D input, got {dims}"
            )));
        }
        Ok(layout.nchw(&dims.0))
    }

    /// Finish the graph with the given named outputs.
    pub fn build(mut self, outputs: &[(&str, OperandId)]) -> Result<Graph> {
        if outputs.is_empty() {
            return Err(WebnnError::InvalidArgument(
                "a graph needs at least one output".into(),
            ));
        }
        for &(name, id) in outputs {
            match self.graph.get(id).map(|n| &n.kind) {
                Some(NodeKind::Op { .. }) => self.graph.set_output(name, id),
                Some(_) => {
                    return Err(WebnnError::InvalidArgument(format!(
                        "output '{name}' must be produced by an operation"
                    )));
                }
                None => {
                    return Err(WebnnError::InvalidArgument(format!(
                        "unknown operand {id:?} for output '{name}'"
                    )));
                }
            }
        }
        Ok(self.graph)
    }
}

/// Resolve a reshape target against an operand of `size` elements.
pub fn resolve_reshape(size: usize, new_shape: &[i64]) -> Result<Shape> {
    let mut inferred = None;
    let mut known = 1usize;
    for (i, &d) in new_shape.iter().enumerate() {
        match d {
            -1 if inferred.is_none() => inferred = Some(i),
            d if d >= 0 => known *= d as usize,
            _ => {
                return Err(WebnnError::InvalidArgument(format!(
                    "invalid reshape target {new_shape:?}"
                )));
            }
        }
    }
    let mut dims: Vec<usize> = new_shape.iter().map(|&d| d.max(0) as usize).collect();
    if let Some(i) = inferred {
        if known == 0 || size % known != 0 {
            return Err(WebnnError::InvalidArgument(format!(
                "cannot infer reshape target {new_shape:?} for {size} elements"
            )));
        }
        dims[i] = size / known;
    }
    Ok(Shape::new(dims))
}

fn resolve_axes(axes: &[i64], ndim: usize) -> Result<Vec<usize>> {
    let mut resolved = axes
        .iter()
        .map(|&a| resolve_axis(a, ndim))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    resolved.sort_unstable();
    resolved.dedup();
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use webnn_core::OperandType;

    fn f32_desc(dims: &[usize]) -> OperandDescriptor {
        OperandDescriptor::new(OperandType::Float32, dims.to_vec())
    }

    #[test]
    fn test_build_binary_graph() {
        let mut b = GraphBuilder::new();
        let x = b.input("a", f32_desc(&[2, 3])).unwrap();
        let y = b.input("b", f32_desc(&[3])).unwrap();
        let z = b.binary(BinaryOp::Mul, x, y).unwrap();
        assert_eq!(b.descriptor(z).unwrap().dimensions, Shape::new(vec![2, 3]));
        let g = b.build(&[("output", z)]).unwrap();
        assert_eq!(g.outputs()["output"], z);
        assert_eq!(g.len(), 3);
    }

    #[test]
    fn test_duplicate_input_rejected() {
        let mut b = GraphBuilder::new();
        b.input("a", f32_desc(&[1])).unwrap();
        assert!(b.input("a", f32_desc(&[1])).is_err());
    }

    #[test]
    fn test_incompatible_binary() {
        let mut b = GraphBuilder::new();
        let x = b.input("a", f32_desc(&[2, 3])).unwrap();
        let y = b.input("b", f32_desc(&[2, 4])).unwrap();
        assert!(matches!(
            b.binary(BinaryOp::Add, x, y),
            Err(WebnnError::IncompatibleShapes { .. })
        ));
    }

    #[test]
    fn test_constant_length_checked() {
        let mut b = GraphBuilder::new();
        let err = b
            .constant(f32_desc(&[2, 2]), TensorBuffer::Float32(vec![1.0; 3]))
            .unwrap_err();
        assert!(matches!(err, WebnnError::LengthMismatch { actual: 3, expected: 4 }));
    }

    #[test]
    fn test_reshape_infers_minus_one() {
        assert_eq!(resolve_reshape(24, &[2, -1, 4]).unwrap(), Shape::new(vec![2, 3, 4]));
        assert_eq!(resolve_reshape(6, &[6]).unwrap(), Shape::new(vec![6]));
        assert!(resolve_reshape(24, &[-1, -1]).is_err());
        assert!(resolve_reshape(24, &[5, -1]).is_err());
    }

    #[test]
    fn test_split_lowers_to_slices() {
        let mut b = GraphBuilder::new();
        let x = b.input("x", f32_desc(&[2, 6])).unwrap();
        let parts = b.split(x, &Split::Sizes(vec![1, 2, 3]), -1).unwrap();
        let dims: Vec<_> = parts
            .iter()
            .map(|&p| b.descriptor(p).unwrap().dimensions.clone())
            .collect();
        assert_eq!(
            dims,
            vec![
                Shape::new(vec![2, 1]),
                Shape::new(vec![2, 2]),
                Shape::new(vec![2, 3])
            ]
        );
        assert!(b.split(x, &Split::Count(4), 1).is_err());
        assert_eq!(b.split(x, &Split::Count(2), 0).unwrap().len(), 2);
    }

    #[test]
    fn test_squeeze_defaults_to_all_unit_dims() {
        let mut b = GraphBuilder::new();
        let x = b.input("x", f32_desc(&[1, 3, 1, 2])).unwrap();
        let y = b.squeeze(x, None).unwrap();
        assert_eq!(b.descriptor(y).unwrap().dimensions, Shape::new(vec![3, 2]));
    }

    #[test]
    fn test_gemm_operand_bias() {
        let mut b = GraphBuilder::new();
        let x = b.input("a", f32_desc(&[2, 3])).unwrap();
        let w = b.input("b", f32_desc(&[3, 4])).unwrap();
        let c = b.input("c", f32_desc(&[4])).unwrap();
        let y = b.gemm(x, w, Some(c), GemmOptions::default()).unwrap();
        assert_eq!(b.descriptor(y).unwrap().dimensions, Shape::new(vec![2, 4]));

        let bad = GemmOptions {
            c: Some(GemmBias::Operand),
            ..Default::default()
        };
        assert!(b.gemm(x, w, None, bad).is_err());
    }

    #[test]
    fn test_output_must_be_an_operation() {
        let mut b = GraphBuilder::new();
        let x = b.input("x", f32_desc(&[2])).unwrap();
        assert!(b.build(&[("output", x)]).is_err());
    }

    #[test]
    fn test_batch_normalization_with_activation() {
        let mut b = GraphBuilder::new();
        let x = b.input("input", f32_desc(&[1, 2, 3])).unwrap();
        let mean = b.input("mean", f32_desc(&[3])).unwrap();
        let variance = b.input("variance", f32_desc(&[3])).unwrap();
        let args = BatchNormArgs {
            axis: -1,
            activation: Some("relu6".parse().unwrap()),
            ..Default::default()
        };
        let y = b.batch_normalization(x, mean, variance, args).unwrap();
        assert_eq!(b.descriptor(y).unwrap().dimensions, Shape::new(vec![1, 2, 3]));
        let graph = b.build(&[("output", y)]).unwrap();
        // input, mean, variance, batchNormalization, clamp
        assert_eq!(graph.len(), 5);
        assert!(matches!(
            graph.get(y).map(|n| &n.kind),
            Some(NodeKind::Op { op: Operation::Clamp(_), .. })
        ));
    }

    #[test]
    fn test_conv2d_same_padding() {
        let mut b = GraphBuilder::new();
        let x = b.input("input", f32_desc(&[1, 1, 4, 4])).unwrap();
        let w = b.input("filter", f32_desc(&[2, 1, 3, 3])).unwrap();
        let args = Conv2dArgs {
            window: WindowArgs {
                strides: [2, 2],
                auto_pad: AutoPad::SameLower,
                ..Default::default()
            },
            ..Default::default()
        };
        let y = b.conv2d(x, w, args).unwrap();
        assert_eq!(b.descriptor(y).unwrap().dimensions, Shape::new(vec![1, 2, 2, 2]));
        let graph = b.build(&[("output", y)]).unwrap();
        match graph.get(y).map(|n| &n.kind) {
            Some(NodeKind::Op {
                op: Operation::Conv2d(options),
                ..
            }) => assert_eq!(options.window.padding, [1, 0, 1, 0]),
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn test_pool2d_defaults_to_global_window() {
        let mut b = GraphBuilder::new();
        let x = b.input("input", f32_desc(&[1, 3, 5, 5])).unwrap();
        let y = b.pool2d(PoolKind::Average, x, Pool2dArgs::default()).unwrap();
        assert_eq!(b.descriptor(y).unwrap().dimensions, Shape::new(vec![1, 3, 1, 1]));

        let ceil = Pool2dArgs {
            window_dimensions: Some([2, 2]),
            window: WindowArgs {
                strides: [2, 2],
                ..Default::default()
            },
            rounding_type: RoundingType::Ceil,
            ..Default::default()
        };
        let y = b.pool2d(PoolKind::Max, x, ceil).unwrap();
        assert_eq!(b.descriptor(y).unwrap().dimensions, Shape::new(vec![1, 3, 3, 3]));
    }

    #[test]
    fn test_unknown_activation() {
        assert!(matches!(
            "gelu".parse::<FusedActivation>(),
            Err(WebnnError::UnsupportedOperation(name)) if name == "gelu"
        ));
    }

    #[test]
    fn test_reduce_resolves_negative_axes() {
        let mut b = GraphBuilder::new();
        let x = b.input("x", f32_desc(&[2, 3, 4])).unwrap();
        let y = b.reduce(ReduceOp::Sum, x, Some(&[-1, 0]), false).unwrap();
        assert_eq!(b.descriptor(y).unwrap().dimensions, Shape::new(vec![3]));
    }
}
