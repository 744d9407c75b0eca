//! The compute capability a graph is executed on.
//!
//! A context accepts a built [`Graph`], named input buffers, and
//! caller-supplied named output buffers that it fills in. It is offered in
//! two forms, blocking and future-returning; everything downstream of a
//! context only ever sees finished buffers.

use futures::future::BoxFuture;
use tracing::debug;

use crate::Result;
use crate::buffer::NamedBuffers;
use crate::graph::Graph;

/// Environment variable selecting the default [`ExecutionMode`].
pub const EXECUTION_MODE_ENV: &str = "WEBNN_EXECUTION_MODE";

/// Pluggable compute context.
pub trait MlContext: Send + Sync {
    /// Execute `graph`, blocking until every output buffer is written.
    fn compute(&self, graph: &Graph, inputs: &NamedBuffers, outputs: &mut NamedBuffers)
    -> Result<()>;

    /// Execute `graph` asynchronously.
    ///
    /// The default wraps [`MlContext::compute`]; contexts with a real
    /// asynchronous queue override it.
    fn compute_async<'a>(
        &'a self,
        graph: &'a Graph,
        inputs: &'a NamedBuffers,
        outputs: &'a mut NamedBuffers,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { self.compute(graph, inputs, outputs) })
    }
}

/// Which compute entry point a test drives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutionMode {
    #[default]
    Sync,
    Async,
}

impl ExecutionMode {
    /// Parse `"sync"` or `"async"`, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sync" => Some(ExecutionMode::Sync),
            "async" => Some(ExecutionMode::Async),
            _ => None,
        }
    }

    /// Determine the mode via env var, falling back to `Sync`.
    ///
    /// Unrecognized values of `WEBNN_EXECUTION_MODE` are ignored.
    pub fn from_env() -> Self {
        std::env::var(EXECUTION_MODE_ENV)
            .ok()
            .and_then(|v| Self::parse(&v))
            .unwrap_or_default()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionMode::Sync => "sync",
            ExecutionMode::Async => "async",
        }
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run `graph` on `context` through the entry point selected by `mode`.
///
/// The async form is driven to completion on the calling thread.
pub fn compute_with_mode(
    context: &dyn MlContext,
    mode: ExecutionMode,
    graph: &Graph,
    inputs: &NamedBuffers,
    outputs: &mut NamedBuffers,
) -> Result<()> {
    debug!(%mode, nodes = graph.len(), outputs = outputs.len(), "dispatching compute");
    match mode {
        ExecutionMode::Sync => context.compute(graph, inputs, outputs),
        ExecutionMode::Async => {
            futures::executor::block_on(context.compute_async(graph, inputs, outputs))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::TensorBuffer;
    use crate::types::OperandType;

    /// Writes ones into every output buffer.
    struct FillOnes;

    impl MlContext for FillOnes {
        fn compute(
            &self,
            _graph: &Graph,
            _inputs: &NamedBuffers,
            outputs: &mut NamedBuffers,
        ) -> Result<()> {
            for buf in outputs.values_mut() {
                let ones = vec![1.0; buf.len()];
                buf.write_f64(&ones)?;
            }
            Ok(())
        }
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!(ExecutionMode::parse("SYNC"), Some(ExecutionMode::Sync));
        assert_eq!(ExecutionMode::parse("async"), Some(ExecutionMode::Async));
        assert_eq!(ExecutionMode::parse("threads"), None);
    }

    #[test]
    fn test_both_modes_write_outputs() {
        for mode in [ExecutionMode::Sync, ExecutionMode::Async] {
            let mut outputs = NamedBuffers::new();
            outputs.insert("y".into(), TensorBuffer::zeros(OperandType::Float32, 3));
            compute_with_mode(&FillOnes, mode, &Graph::new(), &NamedBuffers::new(), &mut outputs)
                .unwrap();
            assert_eq!(outputs["y"], TensorBuffer::Float32(vec![1.0; 3]));
        }
    }
}
