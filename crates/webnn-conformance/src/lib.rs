//! WebNN operation conformance suite.
//!
//! Loads JSON fixtures, builds one graph per case, runs it on a compute
//! context, and checks each output against the expected values under the
//! operation's ULP or ATOL bound.

pub mod assert;
pub mod data;
pub mod fixture;
pub mod layout;
pub mod operations;
pub mod runner;
pub mod tolerance;

pub use assert::{assert_approx_eq, assert_approx_equal, ulp_distance};
pub use data::{gen_data, gen_positive_data};
pub use fixture::{Fixture, Operand, TestCase, load_fixture, parse_fixture};
pub use operations::OperationKind;
pub use runner::{CaseFailure, RunnerConfig, SuiteReport, TestRunner};
pub use tolerance::{BUILTIN_TOLERANCES, ToleranceTable, get_tolerance};
