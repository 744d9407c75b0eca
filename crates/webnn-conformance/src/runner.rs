//! Drives fixture cases through a compute context and checks the results.

use std::fmt;
use std::path::Path;

use tracing::{debug, info, warn};
use webnn_core::{
    ExecutionMode, MlContext, NamedBuffers, Result, TensorBuffer, WebnnError, compute_with_mode,
};
use webnn_ops::GraphBuilder;

use crate::assert::assert_approx_equal;
use crate::fixture::{Fixture, TestCase, load_fixture};
use crate::operations::OperationKind;
use crate::tolerance::{BUILTIN_TOLERANCES, ToleranceTable};

/// How a runner executes and judges cases.
#[derive(Clone, Debug)]
pub struct RunnerConfig {
    pub mode: ExecutionMode,
    pub tolerances: ToleranceTable,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::default(),
            tolerances: BUILTIN_TOLERANCES.clone(),
        }
    }
}

impl RunnerConfig {
    /// Built-in tolerances; mode from `WEBNN_EXECUTION_MODE`.
    pub fn from_env() -> Self {
        Self {
            mode: ExecutionMode::from_env(),
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }
}

/// A case that did not pass.
#[derive(Debug)]
pub struct CaseFailure {
    pub case: String,
    pub error: WebnnError,
}

/// Outcome of one fixture run.
#[derive(Debug)]
pub struct SuiteReport {
    pub operation: String,
    pub mode: ExecutionMode,
    pub passed: usize,
    pub failures: Vec<CaseFailure>,
}

impl SuiteReport {
    pub fn total(&self) -> usize {
        self.passed + self.failures.len()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for SuiteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}]: {}/{} passed",
            self.operation,
            self.mode,
            self.passed,
            self.total()
        )?;
        for failure in &self.failures {
            write!(f, "\n  FAIL {}: {}", failure.case, failure.error)?;
        }
        Ok(())
    }
}

/// Runs fixture cases against a borrowed context.
pub struct TestRunner<'a> {
    context: &'a dyn MlContext,
    config: RunnerConfig,
}

impl<'a> TestRunner<'a> {
    pub fn new(context: &'a dyn MlContext, config: RunnerConfig) -> Self {
        Self { context, config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Build the case's graph, compute it, and return its named outputs.
    pub fn execute(&self, operation: &str, case: &TestCase) -> Result<NamedBuffers> {
        let kind: OperationKind = operation.parse()?;
        let mut builder = GraphBuilder::new();
        let named = kind.build(&mut builder, case)?;

        let mut outputs = NamedBuffers::new();
        for (name, id) in &named {
            let desc = builder.descriptor(*id)?;
            outputs.insert(name.clone(), TensorBuffer::zeros(desc.data_type, desc.size()));
        }
        let refs: Vec<(&str, _)> = named.iter().map(|(name, id)| (name.as_str(), *id)).collect();
        let graph = builder.build(&refs)?;

        let mut inputs = NamedBuffers::new();
        for operand in case.inputs.iter() {
            inputs.insert(operand.name.clone(), case.buffer(operand)?);
        }

        compute_with_mode(self.context, self.config.mode, &graph, &inputs, &mut outputs)?;
        Ok(outputs)
    }

    /// Run one case and check every expected output.
    pub fn run_case(&self, operation: &str, case: &TestCase) -> Result<()> {
        let tolerances = &self.config.tolerances;
        let metric = tolerances.metric_for(operation, case.data_type)?;
        let tolerance = tolerances.get(operation, metric, case)?;
        debug!(operation, case = %case.name, %metric, tolerance, "running case");

        let outputs = self.execute(operation, case)?;
        for expected in &case.expected {
            expected.check_len()?;
            let actual = outputs.get(&expected.name).ok_or_else(|| {
                WebnnError::Fixture(format!(
                    "case '{}' has no output named '{}'",
                    case.name, expected.name
                ))
            })?;
            assert_approx_equal(
                &actual.to_f64_vec(),
                &expected.data,
                tolerance,
                case.operand_type(expected),
                metric,
            )?;
        }
        Ok(())
    }

    /// Run every case, collecting failures instead of stopping at the first.
    pub fn run_fixture(&self, operation: &str, fixture: &Fixture) -> SuiteReport {
        let mut report = SuiteReport {
            operation: operation.to_string(),
            mode: self.config.mode,
            passed: 0,
            failures: Vec::new(),
        };
        for case in &fixture.tests {
            match self.run_case(operation, case) {
                Ok(()) => report.passed += 1,
                Err(error) => {
                    warn!(operation, case = %case.name, %error, "case failed");
                    report.failures.push(CaseFailure {
                        case: case.name.clone(),
                        error,
                    });
                }
            }
        }
        info!(
            operation,
            mode = %report.mode,
            passed = report.passed,
            failed = report.failures.len(),
            "fixture complete"
        );
        report
    }

    pub fn run_fixture_file(&self, operation: &str, path: impl AsRef<Path>) -> Result<SuiteReport> {
        let fixture = load_fixture(path)?;
        Ok(self.run_fixture(operation, &fixture))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::parse_fixture;
    use webnn_core::MetricKind;
    use webnn_cpu::CpuContext;

    const ADD: &str = r#"{"tests": [
        {"name": "add 1D", "inputs": {
            "a": {"shape": [2], "data": [1, 2]},
            "b": {"shape": [2], "data": [10, 20]}},
         "expected": {"name": "output", "shape": [2], "data": [11, 22]}},
        {"name": "add wrong", "inputs": {
            "a": {"shape": [2], "data": [1, 2]},
            "b": {"shape": [2], "data": [10, 20]}},
         "expected": {"name": "output", "shape": [2], "data": [11, 23]}}
    ]}"#;

    #[test]
    fn test_report_counts_failures() {
        let fixture = parse_fixture(ADD).unwrap();
        for mode in [ExecutionMode::Sync, ExecutionMode::Async] {
            let runner = TestRunner::new(&CpuContext, RunnerConfig::default().with_mode(mode));
            let report = runner.run_fixture("add", &fixture);
            assert_eq!(report.passed, 1);
            assert_eq!(report.failures.len(), 1);
            assert_eq!(report.failures[0].case, "add wrong");
            assert!(matches!(
                report.failures[0].error,
                WebnnError::ToleranceExceeded { index: 1, .. }
            ));
            assert!(!report.is_success());
            assert!(report.to_string().starts_with(&format!("add [{mode}]: 1/2 passed")));
        }
    }

    #[test]
    fn test_unknown_tolerance_fails_case() {
        let fixture = parse_fixture(
            r#"{"tests": [{"name": "softmax", "inputs": {"x": {"shape": [1, 2], "data": [0, 0]}},
                "expected": {"name": "output", "shape": [1, 2], "data": [0.5, 0.5]}}]}"#,
        )
        .unwrap();
        let runner = TestRunner::new(&CpuContext, RunnerConfig::default());
        let err = runner.run_case("softmax", &fixture.tests[0]).unwrap_err();
        assert!(matches!(err, WebnnError::UnknownOperation { .. }));

        let config = RunnerConfig {
            tolerances: ToleranceTable::builtin().with_bound("softmax", MetricKind::Ulp, 4.0, 4.0),
            ..RunnerConfig::default()
        };
        let runner = TestRunner::new(&CpuContext, config);
        runner.run_case("softmax", &fixture.tests[0]).unwrap();
    }

    #[test]
    fn test_execute_uses_expected_names() {
        let fixture = parse_fixture(
            r#"{"tests": [{"name": "relu", "inputs": {"x": {"shape": [1], "data": [-1]}},
                "expected": {"name": "y", "shape": [1], "data": [0]}}]}"#,
        )
        .unwrap();
        let runner = TestRunner::new(&CpuContext, RunnerConfig::default());
        let outputs = runner.execute("relu", &fixture.tests[0]).unwrap();
        assert_eq!(outputs["y"].to_f64_vec(), vec![0.0]);
    }
}
