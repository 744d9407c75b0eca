//! Broadcasting rules, the element-wise reference evaluator, shape inference
//! and the graph builder.

pub mod binary;
pub mod broadcast;
pub mod builder;
pub mod shape_inference;

pub use binary::{compute_binary, evaluate_binary, evaluate_binary_op, evaluate_binary_strided};
pub use broadcast::{BroadcastDims, broadcast_dimensions, resolve_broadcast_shape};
pub use builder::{
    AutoPad, BatchNormArgs, Conv2dArgs, FusedActivation, GraphBuilder, InstanceNormArgs,
    Pool2dArgs, RoundingType, Split, WindowArgs,
};
pub use shape_inference::{
    ShapeError, infer_descriptor, infer_shape, resolve_axis, same_padding, window_output_size,
};
