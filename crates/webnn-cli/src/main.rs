use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tracing::Level;
use webnn_conformance::{
    BUILTIN_TOLERANCES, RunnerConfig, TestRunner, assert_approx_equal, load_fixture,
};
use webnn_core::{ExecutionMode, MetricKind, OperandType, Result, Shape, Tensor};
use webnn_cpu::CpuContext;
use webnn_ops::{evaluate_binary, resolve_broadcast_shape};

#[derive(Parser)]
#[command(name = "webnn-cli")]
#[command(about = "WebNN conformance runner")]
struct Args {
    /// Raise the log level (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run a fixture file against the CPU reference context.
    Run {
        operation: String,
        fixture: PathBuf,
        /// Overrides WEBNN_EXECUTION_MODE.
        #[arg(long, value_enum)]
        mode: Option<Mode>,
    },
    /// Print the metric and bound each case of a fixture is checked with.
    Tolerance { operation: String, fixture: PathBuf },
    /// Quick sanity run of the evaluator and the checker.
    Smoke,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Sync,
    Async,
}

impl From<Mode> for ExecutionMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Sync => ExecutionMode::Sync,
            Mode::Async => ExecutionMode::Async,
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    let level = match args.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let outcome = match args.cmd {
        Cmd::Run {
            operation,
            fixture,
            mode,
        } => run(&operation, &fixture, mode),
        Cmd::Tolerance { operation, fixture } => tolerance(&operation, &fixture).map(|()| true),
        Cmd::Smoke => smoke().map(|()| true),
    };
    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(operation: &str, fixture: &Path, mode: Option<Mode>) -> Result<bool> {
    let mut config = RunnerConfig::from_env();
    if let Some(mode) = mode {
        config.mode = mode.into();
    }
    let runner = TestRunner::new(&CpuContext, config);
    let report = runner.run_fixture_file(operation, fixture)?;
    println!("{report}");
    Ok(report.is_success())
}

fn tolerance(operation: &str, fixture: &Path) -> Result<()> {
    let fixture = load_fixture(fixture)?;
    for case in &fixture.tests {
        let metric = BUILTIN_TOLERANCES.metric_for(operation, case.data_type)?;
        let bound = BUILTIN_TOLERANCES.get(operation, metric, case)?;
        println!("{} ({}): {bound} {metric}", case.name, case.data_type);
    }
    Ok(())
}

fn smoke() -> Result<()> {
    let shape = resolve_broadcast_shape(&Shape::new(vec![2, 3]), &Shape::new(vec![3]))?;
    println!("broadcast [2,3] with [3] = {shape}");

    let a = Tensor::new(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])?;
    let b = Tensor::new(vec![3], vec![10.0, 20.0, 30.0])?;
    for op in ["add", "sub", "mul", "div", "max", "min", "pow"] {
        let c = evaluate_binary(&a, &b, op)?;
        println!("{op} [2,3] x [3] = {:?}", c.value);
    }

    let one = 1.0f32;
    let next = f32::from_bits(one.to_bits() + 1);
    assert_approx_equal(
        &[f64::from(next)],
        &[f64::from(one)],
        1.0,
        OperandType::Float32,
        MetricKind::Ulp,
    )?;
    println!("1.0 vs next float32 within 1 ULP");

    println!("\nAll smoke tests passed.");
    Ok(())
}
