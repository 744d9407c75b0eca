//! Every JSON fixture under `tests/data`, against the CPU reference context
//! in both execution modes. The file stem names the operation.
//!
//! conv2d, averagePool2d and instanceNormalization have no built-in bound and
//! are registered here.

use std::path::{Path, PathBuf};

use webnn_conformance::tolerance::conv2d_tolerance;
use webnn_conformance::{RunnerConfig, TestRunner, ToleranceTable, load_fixture};
use webnn_core::{ExecutionMode, MetricKind, OperandType, WebnnError};
use webnn_cpu::CpuContext;

fn fixture_files() -> Vec<PathBuf> {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/data");
    let mut files: Vec<PathBuf> = std::fs::read_dir(&dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    files
}

fn tolerances() -> ToleranceTable {
    ToleranceTable::builtin()
        .with_bound("averagePool2d", MetricKind::Ulp, 2.0, 2.0)
        .with_bound("instanceNormalization", MetricKind::Atol, 1.0 / 1024.0, 1.0 / 512.0)
        .with_formula("conv2d", MetricKind::Ulp, conv2d_tolerance)
}

fn run_all(mode: ExecutionMode) {
    let _ = tracing_subscriber::fmt::try_init();
    let config = RunnerConfig {
        tolerances: tolerances(),
        ..RunnerConfig::default()
    };
    let runner = TestRunner::new(&CpuContext, config.with_mode(mode));
    let files = fixture_files();
    assert!(!files.is_empty());

    let mut failed = Vec::new();
    for path in &files {
        let operation = path.file_stem().unwrap().to_str().unwrap();
        let report = runner.run_fixture_file(operation, path).unwrap();
        assert!(report.total() > 0, "{} has no cases", path.display());
        if !report.is_success() {
            failed.push(report.to_string());
        }
    }
    assert!(failed.is_empty(), "{}", failed.join("\n"));
}

#[test]
fn fixtures_sync() {
    run_all(ExecutionMode::Sync);
}

#[test]
fn fixtures_async() {
    run_all(ExecutionMode::Async);
}

#[test]
fn fixtures_parse() {
    for path in fixture_files() {
        let fixture = load_fixture(&path).unwrap();
        for case in &fixture.tests {
            for operand in case.inputs.iter().chain(&case.expected) {
                operand.check_len().unwrap();
            }
        }
    }
}

#[test]
fn integer_cases_are_present() {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/data");
    for (file, data_type) in [
        ("add.json", OperandType::Int32),
        ("max.json", OperandType::Int32),
        ("max.json", OperandType::Uint8),
    ] {
        let fixture = load_fixture(dir.join(file)).unwrap();
        assert!(
            fixture.tests.iter().any(|case| case.data_type == data_type),
            "{file} has no {} case",
            data_type.as_str()
        );
    }
}

#[test]
fn extension_operations_need_registered_bounds() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/data/conv2d.json");
    let builtin = TestRunner::new(&CpuContext, RunnerConfig::default())
        .run_fixture_file("conv2d", &path)
        .unwrap();
    assert_eq!(builtin.passed, 0);
    assert!(
        builtin
            .failures
            .iter()
            .all(|f| matches!(f.error, WebnnError::UnknownOperation { .. }))
    );

    let config = RunnerConfig {
        tolerances: tolerances(),
        ..RunnerConfig::default()
    };
    let report = TestRunner::new(&CpuContext, config)
        .run_fixture_file("conv2d", &path)
        .unwrap();
    assert!(report.is_success(), "{report}");
}

#[test]
fn wrong_operation_fails_every_case() {
    let runner = TestRunner::new(&CpuContext, RunnerConfig::default());
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/data/add.json");
    let report = runner.run_fixture_file("sub", &path).unwrap();
    assert_eq!(report.passed, 0);
    assert_eq!(report.failures.len(), report.total());
}
