//! Graph IR handed to a compute context.
//!
//! A graph is an arena of nodes: named inputs, constants, and operations over
//! earlier nodes. Operations are a closed set; each variant carries its own
//! already-validated options. Named outputs mark which nodes a caller reads
//! back after `compute`.

use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;

use smallvec::SmallVec;

use crate::buffer::TensorBuffer;
use crate::types::{OperandType, Shape};
use crate::WebnnError;

/// Unique identifier for an operand (node) in a graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OperandId(pub(crate) u32);

impl OperandId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Type and shape of an operand, known before execution.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OperandDescriptor {
    pub data_type: OperandType,
    pub dimensions: Shape,
}

impl OperandDescriptor {
    pub fn new(data_type: OperandType, dimensions: impl Into<Shape>) -> Self {
        Self {
            data_type,
            dimensions: dimensions.into(),
        }
    }

    /// Number of elements a buffer for this operand holds.
    pub fn size(&self) -> usize {
        self.dimensions.size()
    }
}

/// Element-wise binary operations with broadcasting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Max,
    Min,
    Pow,
}

impl BinaryOp {
    pub const ALL: [BinaryOp; 7] = [
        BinaryOp::Add,
        BinaryOp::Sub,
        BinaryOp::Mul,
        BinaryOp::Div,
        BinaryOp::Max,
        BinaryOp::Min,
        BinaryOp::Pow,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::Max => "max",
            BinaryOp::Min => "min",
            BinaryOp::Pow => "pow",
        }
    }
}

impl FromStr for BinaryOp {
    type Err = WebnnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BinaryOp::ALL
            .into_iter()
            .find(|op| op.name() == s)
            .ok_or_else(|| WebnnError::UnsupportedOperation(s.to_string()))
    }
}

/// Element-wise unary operations and activations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Abs,
    Ceil,
    Cos,
    Exp,
    Floor,
    Log,
    Neg,
    Sin,
    Tan,
    Tanh,
    Sigmoid,
    Relu,
}

impl UnaryOp {
    pub const ALL: [UnaryOp; 12] = [
        UnaryOp::Abs,
        UnaryOp::Ceil,
        UnaryOp::Cos,
        UnaryOp::Exp,
        UnaryOp::Floor,
        UnaryOp::Log,
        UnaryOp::Neg,
        UnaryOp::Sin,
        UnaryOp::Tan,
        UnaryOp::Tanh,
        UnaryOp::Sigmoid,
        UnaryOp::Relu,
    ];

    pub fn name(self) -> &'static str {
        match self {
            UnaryOp::Abs => "abs",
            UnaryOp::Ceil => "ceil",
            UnaryOp::Cos => "cos",
            UnaryOp::Exp => "exp",
            UnaryOp::Floor => "floor",
            UnaryOp::Log => "log",
            UnaryOp::Neg => "neg",
            UnaryOp::Sin => "sin",
            UnaryOp::Tan => "tan",
            UnaryOp::Tanh => "tanh",
            UnaryOp::Sigmoid => "sigmoid",
            UnaryOp::Relu => "relu",
        }
    }
}

impl FromStr for UnaryOp {
    type Err = WebnnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UnaryOp::ALL
            .into_iter()
            .find(|op| op.name() == s)
            .ok_or_else(|| WebnnError::UnsupportedOperation(s.to_string()))
    }
}

/// Reductions over a set of axes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReduceOp {
    Max,
    Mean,
    Min,
    Product,
    Sum,
}

impl ReduceOp {
    pub const ALL: [ReduceOp; 5] = [
        ReduceOp::Max,
        ReduceOp::Mean,
        ReduceOp::Min,
        ReduceOp::Product,
        ReduceOp::Sum,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ReduceOp::Max => "reduceMax",
            ReduceOp::Mean => "reduceMean",
            ReduceOp::Min => "reduceMin",
            ReduceOp::Product => "reduceProduct",
            ReduceOp::Sum => "reduceSum",
        }
    }
}

impl FromStr for ReduceOp {
    type Err = WebnnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReduceOp::ALL
            .into_iter()
            .find(|op| op.name() == s)
            .ok_or_else(|| WebnnError::UnsupportedOperation(s.to_string()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClampOptions {
    pub min_value: f64,
    pub max_value: f64,
}

impl Default for ClampOptions {
    fn default() -> Self {
        Self {
            min_value: f64::NEG_INFINITY,
            max_value: f64::INFINITY,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LeakyReluOptions {
    pub alpha: f64,
}

impl Default for LeakyReluOptions {
    fn default() -> Self {
        Self { alpha: 0.01 }
    }
}

/// Where a gemm bias comes from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GemmBias {
    /// The third node input, broadcast to the output shape.
    Operand,
    /// A single value added to every output element.
    Scalar(f64),
}

/// `alpha * op(A) x op(B) + beta * C`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GemmOptions {
    pub c: Option<GemmBias>,
    pub alpha: f64,
    pub beta: f64,
    pub a_transpose: bool,
    pub b_transpose: bool,
}

impl Default for GemmOptions {
    fn default() -> Self {
        Self {
            c: None,
            alpha: 1.0,
            beta: 1.0,
            a_transpose: false,
            b_transpose: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransposeOptions {
    /// Resolved permutation; `output[i] = input[permutation[i]]`.
    pub permutation: Vec<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReduceOptions {
    /// Resolved, sorted, de-duplicated axes.
    pub axes: Vec<usize>,
    pub keep_dimensions: bool,
}

/// Dimension order of a 4-D image operand.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum InputLayout {
    #[default]
    Nchw,
    Nhwc,
}

impl InputLayout {
    /// `[batches, channels, height, width]` of a 4-D `shape`.
    pub fn nchw(self, shape: &[usize]) -> [usize; 4] {
        match self {
            InputLayout::Nchw => [shape[0], shape[1], shape[2], shape[3]],
            InputLayout::Nhwc => [shape[0], shape[3], shape[1], shape[2]],
        }
    }

    /// The shape holding `[n, c, h, w]` in this layout.
    pub fn shape(self, [n, c, h, w]: [usize; 4]) -> Vec<usize> {
        match self {
            InputLayout::Nchw => vec![n, c, h, w],
            InputLayout::Nhwc => vec![n, h, w, c],
        }
    }

    /// Flat offset of element `(n, c, y, x)` in an operand of logical size `dims`.
    pub fn index(self, dims: [usize; 4], n: usize, c: usize, y: usize, x: usize) -> usize {
        let [_, channels, height, width] = dims;
        match self {
            InputLayout::Nchw => ((n * channels + c) * height + y) * width + x,
            InputLayout::Nhwc => ((n * height + y) * width + x) * channels + c,
        }
    }
}

impl FromStr for InputLayout {
    type Err = WebnnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nchw" => Ok(InputLayout::Nchw),
            "nhwc" => Ok(InputLayout::Nhwc),
            other => Err(WebnnError::InvalidArgument(format!(
                "unknown input layout '{other}'"
            ))),
        }
    }
}

/// Dimension order of a conv2d filter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FilterLayout {
    #[default]
    Oihw,
    Hwio,
    Ohwi,
    Ihwo,
}

impl FilterLayout {
    /// `[output channels, input channels, height, width]` of a 4-D `shape`.
    pub fn oihw(self, shape: &[usize]) -> [usize; 4] {
        match self {
            FilterLayout::Oihw => [shape[0], shape[1], shape[2], shape[3]],
            FilterLayout::Hwio => [shape[3], shape[2], shape[0], shape[1]],
            FilterLayout::Ohwi => [shape[0], shape[3], shape[1], shape[2]],
            FilterLayout::Ihwo => [shape[3], shape[0], shape[1], shape[2]],
        }
    }

    /// Flat offset of weight `(o, i, y, x)` in a filter of logical size `dims`.
    pub fn index(self, dims: [usize; 4], o: usize, i: usize, y: usize, x: usize) -> usize {
        let [outputs, inputs, height, width] = dims;
        match self {
            FilterLayout::Oihw => ((o * inputs + i) * height + y) * width + x,
            FilterLayout::Hwio => ((y * width + x) * inputs + i) * outputs + o,
            FilterLayout::Ohwi => ((o * height + y) * width + x) * inputs + i,
            FilterLayout::Ihwo => ((i * height + y) * width + x) * outputs + o,
        }
    }
}

impl FromStr for FilterLayout {
    type Err = WebnnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "oihw" => Ok(FilterLayout::Oihw),
            "hwio" => Ok(FilterLayout::Hwio),
            "ohwi" => Ok(FilterLayout::Ohwi),
            "ihwo" => Ok(FilterLayout::Ihwo),
            other => Err(WebnnError::InvalidArgument(format!(
                "unknown filter layout '{other}'"
            ))),
        }
    }
}

/// Spatial window placement shared by conv2d and pooling, with padding
/// already resolved to explicit values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Window2d {
    /// `[beginning height, ending height, beginning width, ending width]`.
    pub padding: [usize; 4],
    pub strides: [usize; 2],
    pub dilations: [usize; 2],
}

impl Default for Window2d {
    fn default() -> Self {
        Self {
            padding: [0; 4],
            strides: [1, 1],
            dilations: [1, 1],
        }
    }
}

/// `axis` selects the channel dimension that `mean`, `variance`, `scale` and
/// `bias` index.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BatchNormOptions {
    pub axis: usize,
    pub epsilon: f64,
    /// Node inputs are `[input, mean, variance, scale?, bias?]`.
    pub has_scale: bool,
    pub has_bias: bool,
}

/// Normalizes each `(batch, channel)` plane over its spatial extent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InstanceNormOptions {
    pub epsilon: f64,
    pub layout: InputLayout,
    /// Node inputs are `[input, scale?, bias?]`.
    pub has_scale: bool,
    pub has_bias: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Conv2dOptions {
    pub window: Window2d,
    pub groups: usize,
    pub input_layout: InputLayout,
    pub filter_layout: FilterLayout,
    /// Node inputs are `[input, filter, bias?]`.
    pub has_bias: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PoolKind {
    Average,
    Max,
}

impl PoolKind {
    pub fn name(self) -> &'static str {
        match self {
            PoolKind::Average => "averagePool2d",
            PoolKind::Max => "maxPool2d",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Pool2dOptions {
    pub window_dimensions: [usize; 2],
    pub window: Window2d,
    pub layout: InputLayout,
    /// Output height and width, fixed by the builder.
    pub output_sizes: [usize; 2],
}

/// The set of operations a graph can contain.
#[derive(Clone, Debug, PartialEq)]
pub enum Operation {
    // ── Element-wise ────────────────────────────────────────────────────
    Binary(BinaryOp),
    Unary(UnaryOp),
    Clamp(ClampOptions),
    LeakyRelu(LeakyReluOptions),

    // ── Activations over an axis ────────────────────────────────────────
    /// Softmax over the last axis of a 2-D input.
    Softmax,

    // ── Linear algebra ──────────────────────────────────────────────────
    Matmul,
    Gemm(GemmOptions),

    // ── Shape manipulation ──────────────────────────────────────────────
    Reshape {
        new_shape: Shape,
    },
    Transpose(TransposeOptions),
    Concat {
        axis: usize,
    },
    Slice {
        starts: Vec<usize>,
        sizes: Vec<usize>,
    },
    Squeeze {
        axes: Vec<usize>,
    },

    // ── Reductions ──────────────────────────────────────────────────────
    Reduce(ReduceOp, ReduceOptions),

    // ── Normalization ───────────────────────────────────────────────────
    BatchNormalization(BatchNormOptions),
    InstanceNormalization(InstanceNormOptions),

    // ── Convolution and pooling ─────────────────────────────────────────
    Conv2d(Conv2dOptions),
    Pool2d(PoolKind, Pool2dOptions),
}

impl Operation {
    /// The WebNN builder method name for this operation.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Binary(op) => op.name(),
            Operation::Unary(op) => op.name(),
            Operation::Clamp(_) => "clamp",
            Operation::LeakyRelu(_) => "leakyRelu",
            Operation::Softmax => "softmax",
            Operation::Matmul => "matmul",
            Operation::Gemm(_) => "gemm",
            Operation::Reshape { .. } => "reshape",
            Operation::Transpose(_) => "transpose",
            Operation::Concat { .. } => "concat",
            Operation::Slice { .. } => "slice",
            Operation::Squeeze { .. } => "squeeze",
            Operation::Reduce(op, _) => op.name(),
            Operation::BatchNormalization(_) => "batchNormalization",
            Operation::InstanceNormalization(_) => "instanceNormalization",
            Operation::Conv2d(_) => "conv2d",
            Operation::Pool2d(kind, _) => kind.name(),
        }
    }
}

/// What a node produces its value from.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    /// Bound by name to a caller-supplied input buffer at compute time.
    Input { name: String },
    /// Data baked into the graph.
    Constant(TensorBuffer),
    Op {
        op: Operation,
        inputs: SmallVec<[OperandId; 2]>,
    },
}

#[derive(Clone, Debug)]
pub struct Node {
    pub id: OperandId,
    pub kind: NodeKind,
    pub desc: OperandDescriptor,
}

/// The graph arena plus its named outputs.
#[derive(Clone, Debug, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    outputs: BTreeMap<String, OperandId>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node and return its ID. Inputs of `kind` must already exist.
    pub fn add_node(&mut self, kind: NodeKind, desc: OperandDescriptor) -> OperandId {
        let id = OperandId(self.nodes.len() as u32);
        self.nodes.push(Node { id, kind, desc });
        id
    }

    /// Mark `id` as a named graph output.
    pub fn set_output(&mut self, name: impl Into<String>, id: OperandId) {
        self.outputs.insert(name.into(), id);
    }

    /// Get a node by ID.
    pub fn get(&self, id: OperandId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn outputs(&self) -> &BTreeMap<String, OperandId> {
        &self.outputs
    }

    /// Named input nodes in creation order.
    pub fn inputs(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.nodes.iter().filter_map(|n| match &n.kind {
            NodeKind::Input { name } => Some((name.as_str(), n)),
            _ => None,
        })
    }

    /// Topological sort of the subgraph rooted at `outputs`.
    pub fn topo_sort(&self, outputs: &[OperandId]) -> Vec<OperandId> {
        let mut visited = HashSet::new();
        let mut order = Vec::new();

        for &out in outputs {
            self.topo_visit(out, &mut visited, &mut order);
        }

        order
    }

    fn topo_visit(&self, id: OperandId, visited: &mut HashSet<OperandId>, order: &mut Vec<OperandId>) {
        if !visited.insert(id) {
            return;
        }
        if let Some(Node {
            kind: NodeKind::Op { inputs, .. },
            ..
        }) = self.get(id)
        {
            for &input in inputs {
                self.topo_visit(input, visited, order);
            }
        }
        order.push(id);
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f32_desc(dims: &[usize]) -> OperandDescriptor {
        OperandDescriptor::new(OperandType::Float32, dims.to_vec())
    }

    #[test]
    fn test_graph_topo_sort() {
        let mut g = Graph::new();
        let a = g.add_node(NodeKind::Input { name: "a".into() }, f32_desc(&[2, 3]));
        let b = g.add_node(
            NodeKind::Constant(TensorBuffer::zeros(OperandType::Float32, 6)),
            f32_desc(&[2, 3]),
        );
        let c = g.add_node(
            NodeKind::Op {
                op: Operation::Binary(BinaryOp::Add),
                inputs: SmallVec::from_slice(&[a, b]),
            },
            f32_desc(&[2, 3]),
        );

        let order = g.topo_sort(&[c]);
        assert_eq!(order.len(), 3);
        // a and b before c
        let pos_a = order.iter().position(|&id| id == a).unwrap();
        let pos_b = order.iter().position(|&id| id == b).unwrap();
        let pos_c = order.iter().position(|&id| id == c).unwrap();
        assert!(pos_a < pos_c);
        assert!(pos_b < pos_c);
    }

    #[test]
    fn test_topo_sort_skips_unreachable() {
        let mut g = Graph::new();
        let a = g.add_node(NodeKind::Input { name: "a".into() }, f32_desc(&[2]));
        let _unused = g.add_node(NodeKind::Input { name: "b".into() }, f32_desc(&[2]));
        let r = g.add_node(
            NodeKind::Op {
                op: Operation::Unary(UnaryOp::Relu),
                inputs: SmallVec::from_slice(&[a]),
            },
            f32_desc(&[2]),
        );
        assert_eq!(g.topo_sort(&[r]), vec![a, r]);
        assert_eq!(g.inputs().count(), 2);
    }

    #[test]
    fn test_op_names_round_trip() {
        for op in BinaryOp::ALL {
            assert_eq!(op.name().parse::<BinaryOp>().unwrap(), op);
        }
        for op in UnaryOp::ALL {
            assert_eq!(op.name().parse::<UnaryOp>().unwrap(), op);
        }
        for op in ReduceOp::ALL {
            assert_eq!(op.name().parse::<ReduceOp>().unwrap(), op);
        }
        assert_eq!("nhwc".parse::<InputLayout>().unwrap(), InputLayout::Nhwc);
        assert_eq!("ihwo".parse::<FilterLayout>().unwrap(), FilterLayout::Ihwo);
        assert!("chwn".parse::<InputLayout>().is_err());
        assert!(matches!(
            "mod".parse::<BinaryOp>(),
            Err(WebnnError::UnsupportedOperation(name)) if name == "mod"
        ));
    }

    #[test]
    fn test_layout_index_matches_shape() {
        // Walking (n, c, y, x) in logical order must visit each flat offset once.
        let dims = [2, 3, 2, 4];
        for layout in [InputLayout::Nchw, InputLayout::Nhwc] {
            let shape = layout.shape(dims);
            assert_eq!(layout.nchw(&shape), dims);
            let mut seen = vec![false; 48];
            for n in 0..2 {
                for c in 0..3 {
                    for y in 0..2 {
                        for x in 0..4 {
                            let i = layout.index(dims, n, c, y, x);
                            assert!(!seen[i]);
                            seen[i] = true;
                        }
                    }
                }
            }
        }
        assert_eq!(InputLayout::Nhwc.index(dims, 0, 1, 0, 0), 1);
        assert_eq!(InputLayout::Nchw.index(dims, 0, 1, 0, 0), 8);
    }

    #[test]
    fn test_filter_layouts() {
        // Filter [o=4, i=3, h=2, w=1] in each layout.
        let oihw = [4, 3, 2, 1];
        assert_eq!(FilterLayout::Hwio.oihw(&[2, 1, 3, 4]), oihw);
        assert_eq!(FilterLayout::Ohwi.oihw(&[4, 2, 1, 3]), oihw);
        assert_eq!(FilterLayout::Ihwo.oihw(&[3, 2, 1, 4]), oihw);
        assert_eq!(FilterLayout::Oihw.index(oihw, 1, 0, 0, 0), 6);
        assert_eq!(FilterLayout::Hwio.index(oihw, 1, 0, 0, 0), 1);
        assert_eq!(FilterLayout::Ihwo.index(oihw, 0, 1, 0, 0), 8);
    }
}
