//! Fixture operation names and the graph each one builds.

use std::fmt;
use std::str::FromStr;

use webnn_core::graph::{
    ClampOptions, GemmBias, GemmOptions, LeakyReluOptions, PoolKind, ReduceOp, UnaryOp,
};
use webnn_core::{BinaryOp, OperandId, Result, WebnnError};
use webnn_ops::{
    BatchNormArgs, Conv2dArgs, GraphBuilder, InstanceNormArgs, Pool2dArgs, Split, WindowArgs,
};

use crate::fixture::{BiasResource, CaseOptions, Operand, TestCase};

/// Operations the runner knows how to build from a fixture case.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationKind {
    Binary(BinaryOp),
    Unary(UnaryOp),
    Clamp,
    LeakyRelu,
    Softmax,
    Matmul,
    Gemm,
    Reshape,
    Transpose,
    Concat,
    Slice,
    Squeeze,
    Split,
    Reduce(ReduceOp),
    BatchNormalization,
    InstanceNormalization,
    Conv2d,
    Pool2d(PoolKind),
}

impl FromStr for OperationKind {
    type Err = WebnnError;

    fn from_str(s: &str) -> Result<Self> {
        let kind = match s {
            "clamp" => OperationKind::Clamp,
            "leakyRelu" => OperationKind::LeakyRelu,
            "softmax" => OperationKind::Softmax,
            "matmul" => OperationKind::Matmul,
            "gemm" => OperationKind::Gemm,
            "reshape" => OperationKind::Reshape,
            "transpose" => OperationKind::Transpose,
            "concat" => OperationKind::Concat,
            "slice" => OperationKind::Slice,
            "squeeze" => OperationKind::Squeeze,
            "split" => OperationKind::Split,
            "batchNormalization" => OperationKind::BatchNormalization,
            "instanceNormalization" => OperationKind::InstanceNormalization,
            "conv2d" => OperationKind::Conv2d,
            "averagePool2d" => OperationKind::Pool2d(PoolKind::Average),
            "maxPool2d" => OperationKind::Pool2d(PoolKind::Max),
            _ => {
                if let Ok(op) = s.parse::<BinaryOp>() {
                    OperationKind::Binary(op)
                } else if let Ok(op) = s.parse::<UnaryOp>() {
                    OperationKind::Unary(op)
                } else {
                    OperationKind::Reduce(s.parse::<ReduceOp>()?)
                }
            }
        };
        Ok(kind)
    }
}

impl OperationKind {
    pub fn name(self) -> &'static str {
        match self {
            OperationKind::Binary(op) => op.name(),
            OperationKind::Unary(op) => op.name(),
            OperationKind::Clamp => "clamp",
            OperationKind::LeakyRelu => "leakyRelu",
            OperationKind::Softmax => "softmax",
            OperationKind::Matmul => "matmul",
            OperationKind::Gemm => "gemm",
            OperationKind::Reshape => "reshape",
            OperationKind::Transpose => "transpose",
            OperationKind::Concat => "concat",
            OperationKind::Slice => "slice",
            OperationKind::Squeeze => "squeeze",
            OperationKind::Split => "split",
            OperationKind::Reduce(op) => op.name(),
            OperationKind::BatchNormalization => "batchNormalization",
            OperationKind::InstanceNormalization => "instanceNormalization",
            OperationKind::Conv2d => "conv2d",
            OperationKind::Pool2d(kind) => kind.name(),
        }
    }

    /// Declare the case's inputs on `builder` and add this operation.
    ///
    /// Returns the graph outputs paired with the names of the case's
    /// expected operands, in order.
    pub fn build(self, builder: &mut GraphBuilder, case: &TestCase) -> Result<Vec<(String, OperandId)>> {
        let mut inputs = Vec::with_capacity(case.inputs.len());
        for operand in case.inputs.iter() {
            inputs.push(builder.input(&operand.name, case.descriptor(operand))?);
        }
        let arg = |index: usize| {
            inputs.get(index).copied().ok_or_else(|| {
                WebnnError::Fixture(format!(
                    "{} case '{}' needs at least {} inputs",
                    self.name(),
                    case.name,
                    index + 1
                ))
            })
        };
        let options = &case.options;

        let outputs = match self {
            OperationKind::Binary(op) => vec![builder.binary(op, arg(0)?, arg(1)?)?],
            OperationKind::Unary(op) => vec![builder.unary(op, arg(0)?)?],
            OperationKind::Clamp => {
                let defaults = ClampOptions::default();
                let clamp = ClampOptions {
                    min_value: options.min_value.unwrap_or(defaults.min_value),
                    max_value: options.max_value.unwrap_or(defaults.max_value),
                };
                vec![builder.clamp(arg(0)?, clamp)?]
            }
            OperationKind::LeakyRelu => {
                let alpha = options.alpha.unwrap_or(LeakyReluOptions::default().alpha);
                vec![builder.leaky_relu(arg(0)?, LeakyReluOptions { alpha })?]
            }
            OperationKind::Softmax => vec![builder.softmax(arg(0)?)?],
            OperationKind::Matmul => vec![builder.matmul(arg(0)?, arg(1)?)?],
            OperationKind::Gemm => vec![build_gemm(builder, case, &inputs)?],
            OperationKind::Reshape => {
                let new_shape = case.new_shape.as_deref().ok_or_else(|| missing(case, "newShape"))?;
                vec![builder.reshape(arg(0)?, new_shape)?]
            }
            OperationKind::Transpose => {
                vec![builder.transpose(arg(0)?, options.permutation.as_deref())?]
            }
            OperationKind::Concat => {
                let axis = case.axis.or(options.axis).ok_or_else(|| missing(case, "axis"))?;
                vec![builder.concat(&inputs, axis)?]
            }
            OperationKind::Slice => {
                let starts = case.starts.as_deref().ok_or_else(|| missing(case, "starts"))?;
                let sizes = case.sizes.as_deref().ok_or_else(|| missing(case, "sizes"))?;
                vec![builder.slice(arg(0)?, starts, sizes)?]
            }
            OperationKind::Squeeze => vec![builder.squeeze(arg(0)?, options.axes.as_deref())?],
            OperationKind::Split => {
                let splits = case.splits.as_ref().ok_or_else(|| missing(case, "splits"))?;
                let axis = options.axis.or(case.axis).unwrap_or(0);
                builder.split(arg(0)?, &Split::from(splits), axis)?
            }
            OperationKind::Reduce(op) => vec![builder.reduce(
                op,
                arg(0)?,
                options.axes.as_deref(),
                options.keep_dimensions.unwrap_or(false),
            )?],
            OperationKind::BatchNormalization => {
                let defaults = BatchNormArgs::default();
                let args = BatchNormArgs {
                    scale: constant(builder, case, options.scale.as_ref())?,
                    bias: constant(builder, case, options.bias.as_ref())?,
                    axis: options.axis.unwrap_or(defaults.axis),
                    epsilon: options.epsilon.unwrap_or(defaults.epsilon),
                    activation: parse_option(options.activation.as_deref())?,
                };
                vec![builder.batch_normalization(arg(0)?, arg(1)?, arg(2)?, args)?]
            }
            OperationKind::InstanceNormalization => {
                let defaults = InstanceNormArgs::default();
                let args = InstanceNormArgs {
                    scale: constant(builder, case, options.scale.as_ref())?,
                    bias: constant(builder, case, options.bias.as_ref())?,
                    epsilon: options.epsilon.unwrap_or(defaults.epsilon),
                    layout: parse_option(options.layout.as_deref())?.unwrap_or(defaults.layout),
                };
                vec![builder.instance_normalization(arg(0)?, args)?]
            }
            OperationKind::Conv2d => {
                let defaults = Conv2dArgs::default();
                let args = Conv2dArgs {
                    window: window_args(options)?,
                    groups: options.groups.unwrap_or(defaults.groups),
                    input_layout: parse_option(options.input_layout.as_deref())?
                        .unwrap_or(defaults.input_layout),
                    filter_layout: parse_option(options.filter_layout.as_deref())?
                        .unwrap_or(defaults.filter_layout),
                    bias: constant(builder, case, options.bias.as_ref())?,
                    activation: parse_option(options.activation.as_deref())?,
                };
                vec![builder.conv2d(arg(0)?, arg(1)?, args)?]
            }
            OperationKind::Pool2d(kind) => {
                let args = Pool2dArgs {
                    window_dimensions: options.window_dimensions,
                    window: window_args(options)?,
                    layout: parse_option(options.layout.as_deref())?.unwrap_or_default(),
                    rounding_type: parse_option(options.rounding_type.as_deref())?.unwrap_or_default(),
                    output_sizes: options.output_sizes,
                };
                vec![builder.pool2d(kind, arg(0)?, args)?]
            }
        };

        if outputs.len() != case.expected.len() {
            return Err(WebnnError::Fixture(format!(
                "{} case '{}' produces {} outputs but expects {}",
                self.name(),
                case.name,
                outputs.len(),
                case.expected.len()
            )));
        }
        Ok(case
            .expected
            .iter()
            .zip(outputs)
            .map(|(expected, id)| (expected.name.clone(), id))
            .collect())
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parse an optional string option.
fn parse_option<T: FromStr<Err = WebnnError>>(value: Option<&str>) -> Result<Option<T>> {
    value.map(str::parse).transpose()
}

/// Bake an optional operand from the case's options into the graph.
fn constant(builder: &mut GraphBuilder, case: &TestCase, operand: Option<&Operand>) -> Result<Option<OperandId>> {
    operand
        .map(|o| builder.constant(case.descriptor(o), case.buffer(o)?))
        .transpose()
}

fn window_args(options: &CaseOptions) -> Result<WindowArgs> {
    let defaults = WindowArgs::default();
    Ok(WindowArgs {
        padding: options.padding.unwrap_or(defaults.padding),
        strides: options.strides.unwrap_or(defaults.strides),
        dilations: options.dilations.unwrap_or(defaults.dilations),
        auto_pad: parse_option(options.auto_pad.as_deref())?.unwrap_or(defaults.auto_pad),
    })
}

fn missing(case: &TestCase, field: &str) -> WebnnError {
    WebnnError::Fixture(format!("case '{}' is missing '{field}'", case.name))
}

/// gemm bias: a third declared input, or `options.c` as a scalar or a
/// constant operand.
fn build_gemm(builder: &mut GraphBuilder, case: &TestCase, inputs: &[OperandId]) -> Result<OperandId> {
    let (a, b) = match inputs {
        [a, b, ..] => (*a, *b),
        _ => {
            return Err(WebnnError::Fixture(format!(
                "gemm case '{}' needs inputs a and b",
                case.name
            )));
        }
    };
    let o = &case.options;
    let defaults = GemmOptions::default();
    let mut options = GemmOptions {
        c: None,
        alpha: o.alpha.unwrap_or(defaults.alpha),
        beta: o.beta.unwrap_or(defaults.beta),
        a_transpose: o.a_transpose.unwrap_or(defaults.a_transpose),
        b_transpose: o.b_transpose.unwrap_or(defaults.b_transpose),
    };
    let c = match (inputs.get(2), &o.c) {
        (Some(&c), _) => Some(c),
        (None, Some(BiasResource::Scalar(v))) => {
            options.c = Some(GemmBias::Scalar(*v));
            None
        }
        (None, Some(BiasResource::Operand(operand))) => constant(builder, case, Some(operand))?,
        (None, None) => None,
    };
    builder.gemm(a, b, c, options)
}
