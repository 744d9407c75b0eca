//! Foundational types for the WebNN conformance suite.
//!
//! `webnn-core` provides shapes and operand types, the strided index math the
//! reference evaluator is built on, reference-side tensors, typed operand
//! buffers, the graph IR handed to a compute context, and the `MlContext`
//! capability itself.
//!
//! # Layout
//!
//! - [`types`]: `OperandType`, `Shape`, `MetricKind`
//! - [`strides`]: flat index <-> coordinate conversions
//! - [`tensor`]: `{dimensions, value}` reference tensors
//! - [`buffer`]: fixed-width typed buffers exchanged with a context
//! - [`graph`]: operations, nodes and the graph arena
//! - [`context`]: blocking and future-returning compute

pub mod buffer;
pub mod context;
pub mod graph;
pub mod strides;
pub mod tensor;
pub mod types;

pub use buffer::{NamedBuffers, TensorBuffer};
pub use context::{ExecutionMode, MlContext, compute_with_mode};
pub use graph::{BinaryOp, Graph, OperandDescriptor, OperandId, Operation};
pub use tensor::Tensor;
pub use types::{MetricKind, OperandType, Shape};

pub type Result<T> = std::result::Result<T, WebnnError>;

#[derive(thiserror::Error, Debug)]
pub enum WebnnError {
    #[error("Operands could not be broadcast together with shapes {a} and {b}")]
    IncompatibleShapes { a: Shape, b: Shape },

    #[error("'{0}' is not supported")]
    UnsupportedOperation(String),

    /// `metric` is `None` when the operation has no entry at all.
    #[error(
        "No {}tolerance registered for '{op}' with {data_type}",
        .metric.map(|m| format!("{m} ")).unwrap_or_default()
    )]
    UnknownOperation {
        op: String,
        metric: Option<MetricKind>,
        data_type: OperandType,
    },

    #[error("Length mismatch: actual {actual} vs expected {expected}")]
    LengthMismatch { actual: usize, expected: usize },

    #[error(
        "actual {actual} should be close enough to expected {expected} at index {index} \
         by the acceptable {tolerance} {metric} distance, but they have {distance} {metric} distance"
    )]
    ToleranceExceeded {
        index: usize,
        actual: f64,
        expected: f64,
        distance: f64,
        tolerance: f64,
        metric: MetricKind,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Fixture error: {0}")]
    Fixture(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
