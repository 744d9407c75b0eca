//! Per-operation accuracy bounds.
//!
//! Each operation is checked under one metric, ULP or ATOL, with either a
//! constant bound per float width or a bound computed from the case's shapes
//! and options. Integer operand types use the float32 bound.

use std::collections::HashMap;
use std::sync::LazyLock;

use webnn_core::{MetricKind, OperandType, Result, WebnnError};

use crate::fixture::TestCase;

/// Computes a bound from a test case.
pub type ToleranceFn = fn(&TestCase) -> Result<f64>;

#[derive(Clone, Copy, Debug)]
pub enum Bound {
    Fixed { float32: f64, float16: f64 },
    Formula(ToleranceFn),
}

#[derive(Clone, Copy, Debug)]
struct Entry {
    metric: MetricKind,
    bound: Bound,
}

/// Operation name -> metric and bound.
#[derive(Clone, Debug, Default)]
pub struct ToleranceTable {
    entries: HashMap<String, Entry>,
}

/// The built-in table, shared read-only.
pub static BUILTIN_TOLERANCES: LazyLock<ToleranceTable> = LazyLock::new(ToleranceTable::builtin);

const ZERO_ULP_OPS: &[&str] = &[
    "clamp",
    "concat",
    "relu",
    "reshape",
    "slice",
    "split",
    "squeeze",
    "transpose",
    "abs",
    "ceil",
    "floor",
    "neg",
    "max",
    "min",
    "maxPool2d",
    "reduceMax",
    "reduceMin",
];

impl ToleranceTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard bounds.
    pub fn builtin() -> Self {
        let mut table = Self::new();
        for &op in ZERO_ULP_OPS {
            table = table.with_bound(op, MetricKind::Ulp, 0.0, 0.0);
        }
        for op in ["add", "sub", "mul", "leakyRelu"] {
            table = table.with_bound(op, MetricKind::Ulp, 1.0, 1.0);
        }
        for op in ["cos", "sin", "tan", "tanh"] {
            table = table.with_bound(op, MetricKind::Atol, 1.0 / 1024.0, 1.0 / 512.0);
        }
        table
            .with_bound("batchNormalization", MetricKind::Ulp, 6.0, 6.0)
            .with_bound("div", MetricKind::Ulp, 2.0, 2.0)
            .with_bound("pow", MetricKind::Ulp, 32.0, 2.0)
            .with_bound("exp", MetricKind::Ulp, 32.0, 1.0)
            .with_bound("sigmoid", MetricKind::Ulp, 34.0, 3.0)
            .with_bound("log", MetricKind::Atol, 1.0 / 1024.0, 1.0 / 1024.0)
            .with_formula("gemm", MetricKind::Ulp, gemm_tolerance)
            .with_formula("matmul", MetricKind::Ulp, matmul_tolerance)
    }

    /// Register (or replace) a constant bound for `op`.
    pub fn with_bound(mut self, op: &str, metric: MetricKind, float32: f64, float16: f64) -> Self {
        self.entries.insert(
            op.to_string(),
            Entry {
                metric,
                bound: Bound::Fixed { float32, float16 },
            },
        );
        self
    }

    /// Register (or replace) a computed bound for `op`.
    pub fn with_formula(mut self, op: &str, metric: MetricKind, formula: ToleranceFn) -> Self {
        self.entries.insert(
            op.to_string(),
            Entry {
                metric,
                bound: Bound::Formula(formula),
            },
        );
        self
    }

    /// The metric `op` is checked under.
    pub fn metric_for(&self, op: &str, data_type: OperandType) -> Result<MetricKind> {
        self.entries
            .get(op)
            .map(|e| e.metric)
            .ok_or_else(|| WebnnError::UnknownOperation {
                op: op.to_string(),
                metric: None,
                data_type,
            })
    }

    /// Bound for `op` under `metric` for `case`.
    pub fn get(&self, op: &str, metric: MetricKind, case: &TestCase) -> Result<f64> {
        let unknown = || WebnnError::UnknownOperation {
            op: op.to_string(),
            metric: Some(metric),
            data_type: case.data_type,
        };
        let entry = self.entries.get(op).ok_or_else(unknown)?;
        if entry.metric != metric {
            return Err(unknown());
        }
        match entry.bound {
            Bound::Fixed { float16, .. } if case.data_type == OperandType::Float16 => Ok(float16),
            Bound::Fixed { float32, .. } => Ok(float32),
            Bound::Formula(f) => f(case),
        }
    }

    pub fn contains(&self, op: &str) -> bool {
        self.entries.contains_key(op)
    }

    /// Registered operation names, sorted.
    pub fn operations(&self) -> Vec<&str> {
        let mut ops: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        ops.sort_unstable();
        ops
    }
}

/// Bound from the built-in table.
pub fn get_tolerance(op: &str, metric: MetricKind, case: &TestCase) -> Result<f64> {
    BUILTIN_TOLERANCES.get(op, metric, case)
}

fn first_input_dims(case: &TestCase) -> Result<&[usize]> {
    Ok(&case.input(0)?.shape)
}

/// Twice the inner dimension of A, plus one ULP for each non-trivial scale.
///
/// The bias counts whether it is given in `options.c` or as a third input.
pub fn gemm_tolerance(case: &TestCase) -> Result<f64> {
    let a = first_input_dims(case)?;
    if a.len() != 2 {
        return Err(WebnnError::Fixture(format!(
            "gemm case '{}' needs a 2-D first input, got {a:?}",
            case.name
        )));
    }
    let options = &case.options;
    let width = if options.a_transpose.unwrap_or(false) {
        a[0]
    } else {
        a[1]
    };
    let mut tolerance = width as f64 * 2.0;
    if options.alpha.is_some_and(|alpha| alpha != 1.0) {
        tolerance += 1.0;
    }
    let has_bias = options.c.is_some() || case.inputs.len() > 2;
    if has_bias && options.beta != Some(0.0) {
        tolerance += 1.0;
        if options.beta.is_some_and(|beta| beta != 1.0) {
            tolerance += 1.0;
        }
    }
    Ok(tolerance)
}

/// Twice the last dimension of A.
pub fn matmul_tolerance(case: &TestCase) -> Result<f64> {
    let a = first_input_dims(case)?;
    let width = a.last().ok_or_else(|| {
        WebnnError::Fixture(format!("matmul case '{}' has a scalar first input", case.name))
    })?;
    Ok(*width as f64 * 2.0)
}

/// Twice the filter taps feeding one output element, plus one for a bias.
///
/// Not in the built-in table; register it with
/// [`ToleranceTable::with_formula`].
pub fn conv2d_tolerance(case: &TestCase) -> Result<f64> {
    let filter = case.input(1)?;
    let channel_axis = match case.options.input_layout.as_deref() {
        Some("nhwc") => 3,
        _ => 1,
    };
    let out_channels = case
        .expected
        .first()
        .and_then(|expected| expected.shape.get(channel_axis))
        .copied()
        .filter(|&c| c > 0)
        .ok_or_else(|| {
            WebnnError::Fixture(format!("conv2d case '{}' needs a 4-D expected output", case.name))
        })?;
    let taps = filter.shape.iter().product::<usize>() / out_channels;
    let mut tolerance = taps as f64 * 2.0;
    if case.options.bias.is_some() || case.inputs.len() > 2 {
        tolerance += 1.0;
    }
    Ok(tolerance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::parse_fixture;

    fn case(json: &str) -> TestCase {
        let mut fixture = parse_fixture(&format!(r#"{{"tests": [{json}]}}"#)).unwrap();
        fixture.tests.remove(0)
    }

    fn unary_case(data_type: &str) -> TestCase {
        case(&format!(
            r#"{{"name": "t", "type": "{data_type}",
                "inputs": {{"x": {{"shape": [1], "data": [1]}}}},
                "expected": {{"name": "output", "shape": [1], "data": [1]}}}}"#
        ))
    }

    #[test]
    fn test_fixed_bounds() {
        let f32_case = unary_case("float32");
        let f16_case = unary_case("float16");
        assert_eq!(get_tolerance("add", MetricKind::Ulp, &f32_case).unwrap(), 1.0);
        assert_eq!(get_tolerance("pow", MetricKind::Ulp, &f32_case).unwrap(), 32.0);
        assert_eq!(get_tolerance("pow", MetricKind::Ulp, &f16_case).unwrap(), 2.0);
        assert_eq!(get_tolerance("sigmoid", MetricKind::Ulp, &f16_case).unwrap(), 3.0);
        assert_eq!(get_tolerance("tanh", MetricKind::Atol, &f32_case).unwrap(), 1.0 / 1024.0);
        assert_eq!(get_tolerance("tanh", MetricKind::Atol, &f16_case).unwrap(), 1.0 / 512.0);
        assert_eq!(get_tolerance("log", MetricKind::Atol, &f16_case).unwrap(), 1.0 / 1024.0);
        assert_eq!(get_tolerance("reshape", MetricKind::Ulp, &f32_case).unwrap(), 0.0);
    }

    #[test]
    fn test_integer_types_use_float32_bound() {
        let int_case = unary_case("int32");
        assert_eq!(get_tolerance("exp", MetricKind::Ulp, &int_case).unwrap(), 32.0);
    }

    #[test]
    fn test_unknown_operation_and_metric() {
        let c = unary_case("float32");
        assert!(matches!(
            get_tolerance("conv2d", MetricKind::Ulp, &c),
            Err(WebnnError::UnknownOperation { .. })
        ));
        assert!(matches!(
            get_tolerance("add", MetricKind::Atol, &c),
            Err(WebnnError::UnknownOperation { .. })
        ));
        assert!(BUILTIN_TOLERANCES.metric_for("softmax", OperandType::Float32).is_err());
    }

    #[test]
    fn test_matmul_formula() {
        let c = case(
            r#"{"name": "mm", "inputs": {
                "a": {"shape": [1, 8], "data": [0, 0, 0, 0, 0, 0, 0, 0]},
                "b": {"shape": [8, 1], "data": [0, 0, 0, 0, 0, 0, 0, 0]}},
                "expected": {"name": "output", "shape": [1, 1], "data": [0]}}"#,
        );
        assert_eq!(get_tolerance("matmul", MetricKind::Ulp, &c).unwrap(), 16.0);
    }

    #[test]
    fn test_gemm_formula() {
        let zeros = "[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]";
        let gemm = |options: &str| {
            case(&format!(
                r#"{{"name": "gemm", "inputs": {{
                    "a": {{"shape": [4, 4], "data": {zeros}}},
                    "b": {{"shape": [4, 4], "data": {zeros}}}}},
                    "options": {options},
                    "expected": {{"name": "output", "shape": [4, 4], "data": {zeros}}}}}"#
            ))
        };
        let tol = |options: &str| get_tolerance("gemm", MetricKind::Ulp, &gemm(options)).unwrap();
        assert_eq!(tol(r#"{"alpha": 2, "c": 1, "beta": 1}"#), 10.0);
        assert_eq!(tol("{}"), 8.0);
        assert_eq!(tol(r#"{"c": 1}"#), 9.0);
        assert_eq!(tol(r#"{"c": 1, "beta": 0}"#), 8.0);
        assert_eq!(tol(r#"{"c": 1, "beta": 3, "alpha": 1}"#), 10.0);
    }

    #[test]
    fn test_gemm_formula_counts_bias_input() {
        let zeros = "[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]";
        let with_input = case(&format!(
            r#"{{"name": "gemm c input", "inputs": {{
                "a": {{"shape": [4, 4], "data": {zeros}}},
                "b": {{"shape": [4, 4], "data": {zeros}}},
                "c": {{"shape": [4], "data": [1, 2, 3, 4]}}}},
                "options": {{"beta": 2}},
                "expected": {{"name": "output", "shape": [4, 4], "data": {zeros}}}}}"#
        ));
        let with_option = case(&format!(
            r#"{{"name": "gemm c option", "inputs": {{
                "a": {{"shape": [4, 4], "data": {zeros}}},
                "b": {{"shape": [4, 4], "data": {zeros}}}}},
                "options": {{"beta": 2, "c": {{"shape": [4], "data": [1, 2, 3, 4]}}}},
                "expected": {{"name": "output", "shape": [4, 4], "data": {zeros}}}}}"#
        ));
        let tol = |c: &TestCase| get_tolerance("gemm", MetricKind::Ulp, c).unwrap();
        assert_eq!(tol(&with_input), 10.0);
        assert_eq!(tol(&with_input), tol(&with_option));
    }

    #[test]
    fn test_conv2d_formula_per_output_taps() {
        let conv = |options: &str, output: &str| {
            case(&format!(
                r#"{{"name": "conv2d", "inputs": {{
                    "input": {{"shape": [1, 2, 3, 3], "data": 0}},
                    "filter": {{"shape": [4, 2, 2, 2], "data": 0}}}},
                    "options": {options},
                    "expected": {{"name": "output", "shape": {output}, "data": 0}}}}"#
            ))
        };
        let table = ToleranceTable::builtin().with_formula("conv2d", MetricKind::Ulp, conv2d_tolerance);
        let tol = |c: &TestCase| table.get("conv2d", MetricKind::Ulp, c).unwrap();
        assert_eq!(tol(&conv("{}", "[1, 4, 2, 2]")), 16.0);
        assert_eq!(
            tol(&conv(r#"{"bias": {"shape": [4], "data": [1, 2, 3, 4]}}"#, "[1, 4, 2, 2]")),
            17.0
        );
        assert_eq!(tol(&conv(r#"{"inputLayout": "nhwc"}"#, "[1, 2, 2, 4]")), 16.0);
    }

    #[test]
    fn test_unknown_operation_message() {
        let c = unary_case("float32");
        let miss = BUILTIN_TOLERANCES
            .metric_for("cosh", OperandType::Float32)
            .unwrap_err();
        assert!(matches!(miss, WebnnError::UnknownOperation { metric: None, .. }));
        assert_eq!(
            miss.to_string(),
            "No tolerance registered for 'cosh' with float32"
        );

        let wrong_metric = get_tolerance("sin", MetricKind::Ulp, &c).unwrap_err();
        assert!(wrong_metric.to_string().starts_with("No ULP tolerance"), "{wrong_metric}");
    }

    #[test]
    fn test_extension_points_register() {
        let c = unary_case("float32");
        let table = ToleranceTable::builtin().with_bound("softmax", MetricKind::Ulp, 10.0, 4.0);
        assert_eq!(table.metric_for("softmax", OperandType::Float32).unwrap(), MetricKind::Ulp);
        assert_eq!(table.get("softmax", MetricKind::Ulp, &c).unwrap(), 10.0);
        assert!(!BUILTIN_TOLERANCES.contains("softmax"));

        fn always_three(_: &TestCase) -> Result<f64> {
            Ok(3.0)
        }
        let table = table.with_formula("reduceSum", MetricKind::Ulp, always_three);
        assert_eq!(table.get("reduceSum", MetricKind::Ulp, &c).unwrap(), 3.0);
    }
}
