//! Pure Rust CPU context, the reference executor for conformance runs.
//!
//! `CpuContext` evaluates a built graph node by node in topological order,
//! rounding every intermediate to its operand type the way a device with
//! native element types would.

pub mod kernels;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, trace};
use webnn_core::buffer::quantize;
use webnn_core::graph::NodeKind;
use webnn_core::{Graph, MlContext, NamedBuffers, OperandId, Result, TensorBuffer, WebnnError};

pub use kernels::{NodeInput, eval_node};

/// Reference CPU context.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpuContext;

impl MlContext for CpuContext {
    fn compute(
        &self,
        graph: &Graph,
        inputs: &NamedBuffers,
        outputs: &mut NamedBuffers,
    ) -> Result<()> {
        validate_inputs(graph, inputs)?;
        validate_outputs(graph, outputs)?;

        let roots: Vec<OperandId> = graph.outputs().values().copied().collect();
        let order = graph.topo_sort(&roots);
        debug!(nodes = order.len(), outputs = roots.len(), "cpu compute");

        let mut values: HashMap<OperandId, Vec<f64>> = HashMap::with_capacity(order.len());
        for &id in &order {
            let node = graph
                .get(id)
                .ok_or_else(|| WebnnError::InvalidArgument("missing graph node".into()))?;
            let data = match &node.kind {
                NodeKind::Input { name } => inputs
                    .get(name)
                    .map(TensorBuffer::to_f64_vec)
                    .ok_or_else(|| missing("input", name))?,
                NodeKind::Constant(buffer) => buffer.to_f64_vec(),
                NodeKind::Op { op, inputs: ids } => {
                    let mut node_inputs = Vec::with_capacity(ids.len());
                    for input_id in ids {
                        let data = values.get(input_id).ok_or_else(|| {
                            WebnnError::InvalidArgument(format!(
                                "input {input_id:?} of node {id:?} not evaluated"
                            ))
                        })?;
                        let shape = &graph
                            .get(*input_id)
                            .ok_or_else(|| {
                                WebnnError::InvalidArgument("missing graph node".into())
                            })?
                            .desc
                            .dimensions;
                        node_inputs.push(NodeInput { data, shape });
                    }
                    let data_type = node.desc.data_type;
                    let out = eval_node(op, &node_inputs, &node.desc)?;
                    trace!(node = id.index(), op = op.name(), %data_type, "evaluated node");
                    out.into_iter().map(|v| quantize(data_type, v)).collect()
                }
            };
            values.insert(id, data);
        }

        for (name, id) in graph.outputs() {
            let data = values
                .get(id)
                .ok_or_else(|| missing("output value", name))?;
            let buffer = outputs.get_mut(name).ok_or_else(|| missing("output", name))?;
            buffer.write_f64(data)?;
        }
        Ok(())
    }
}

/// Create a shared CPU reference context.
pub fn cpu_context() -> Arc<CpuContext> {
    Arc::new(CpuContext)
}

fn missing(what: &str, name: &str) -> WebnnError {
    WebnnError::InvalidArgument(format!("missing {what} '{name}'"))
}

fn validate_inputs(graph: &Graph, inputs: &NamedBuffers) -> Result<()> {
    for (name, node) in graph.inputs() {
        let buffer = inputs.get(name).ok_or_else(|| missing("input", name))?;
        check_buffer(name, buffer, node.desc.data_type, node.desc.size())?;
    }
    if let Some(extra) = inputs.keys().find(|k| !graph.inputs().any(|(n, _)| n == k.as_str())) {
        return Err(WebnnError::InvalidArgument(format!(
            "'{extra}' is not a graph input"
        )));
    }
    Ok(())
}

fn validate_outputs(graph: &Graph, outputs: &NamedBuffers) -> Result<()> {
    for (name, id) in graph.outputs() {
        let desc = &graph
            .get(*id)
            .ok_or_else(|| missing("output node", name))?
            .desc;
        let buffer = outputs.get(name).ok_or_else(|| missing("output", name))?;
        check_buffer(name, buffer, desc.data_type, desc.size())?;
    }
    if let Some(extra) = outputs.keys().find(|k| !graph.outputs().contains_key(k.as_str())) {
        return Err(WebnnError::InvalidArgument(format!(
            "'{extra}' is not a graph output"
        )));
    }
    Ok(())
}

fn check_buffer(
    name: &str,
    buffer: &TensorBuffer,
    data_type: webnn_core::OperandType,
    len: usize,
) -> Result<()> {
    if buffer.data_type() != data_type {
        return Err(WebnnError::InvalidArgument(format!(
            "buffer '{name}' is {} but the operand is {data_type}",
            buffer.data_type()
        )));
    }
    if buffer.len() != len {
        return Err(WebnnError::LengthMismatch {
            actual: buffer.len(),
            expected: len,
        });
    }
    Ok(())
}
