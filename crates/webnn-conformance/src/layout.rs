//! Generated reshape and squeeze suites.
//!
//! Layout operations never touch values, so each case feeds random data in
//! and expects the same flat data back under the new shape.

use webnn_core::OperandType;

use crate::data::gen_data;
use crate::fixture::{CaseOptions, Fixture, NamedOperands, Operand, TestCase};
use crate::runner::{SuiteReport, TestRunner};

#[derive(Clone, Copy, Debug)]
pub struct ReshapeCase {
    pub name: &'static str,
    pub old_shape: &'static [usize],
    pub new_shape: &'static [i64],
    pub expected_shape: &'static [usize],
}

#[derive(Clone, Copy, Debug)]
pub struct SqueezeCase {
    pub old_shape: &'static [usize],
    /// `None` squeezes every size-1 axis.
    pub axes: Option<&'static [i64]>,
    pub expected_shape: &'static [usize],
}

const fn reshape(
    name: &'static str,
    old_shape: &'static [usize],
    new_shape: &'static [i64],
    expected_shape: &'static [usize],
) -> ReshapeCase {
    ReshapeCase {
        name,
        old_shape,
        new_shape,
        expected_shape,
    }
}

const fn squeeze(
    old_shape: &'static [usize],
    axes: Option<&'static [i64]>,
    expected_shape: &'static [usize],
) -> SqueezeCase {
    SqueezeCase {
        old_shape,
        axes,
        expected_shape,
    }
}

pub const RESHAPE_CASES: &[ReshapeCase] = &[
    // reorder all dimensions
    reshape("2D to 2D", &[2, 3], &[3, 2], &[3, 2]),
    reshape("3D to 3D", &[2, 3, 4], &[4, 2, 3], &[4, 2, 3]),
    reshape("4D to 4D", &[2, 3, 4, 5], &[5, 4, 3, 2], &[5, 4, 3, 2]),
    reshape("5D to 5D", &[2, 3, 4, 5, 6], &[6, 4, 5, 3, 2], &[6, 4, 5, 3, 2]),
    // reduce dimensions
    reshape("2D to 1D", &[2, 3], &[6], &[6]),
    reshape("3D to 2D", &[2, 3, 4], &[4, 6], &[4, 6]),
    reshape("4D to 3D", &[2, 3, 4, 5], &[4, 5, 6], &[4, 5, 6]),
    reshape("5D to 1D", &[2, 3, 4, 5, 6], &[720], &[720]),
    reshape("5D to 4D", &[2, 3, 4, 5, 6], &[3, 5, 6, 8], &[3, 5, 6, 8]),
    // extend dimensions
    reshape("1D to 2D", &[6], &[2, 3], &[2, 3]),
    reshape("1D to 5D", &[720], &[2, 3, 4, 5, 6], &[2, 3, 4, 5, 6]),
    reshape("2D to 4D", &[8, 15], &[2, 3, 4, 5], &[2, 3, 4, 5]),
    reshape("3D to 5D", &[6, 10, 12], &[2, 3, 4, 5, 6], &[2, 3, 4, 5, 6]),
    // one inferred dimension
    reshape("2D to 1D / -1", &[2, 3], &[-1], &[6]),
    reshape("2D to 2D / -1 first", &[2, 3], &[-1, 2], &[3, 2]),
    reshape("2D to 2D / -1 last", &[2, 3], &[3, -1], &[3, 2]),
    reshape("2D to 3D / -1 middle", &[4, 6], &[2, -1, 4], &[2, 3, 4]),
    reshape("2D to 5D / -1 last", &[20, 36], &[2, 3, 4, 5, -1], &[2, 3, 4, 5, 6]),
    reshape("3D to 4D / -1 third", &[4, 5, 6], &[2, 3, -1, 5], &[2, 3, 4, 5]),
    reshape("4D to 2D / -1 first", &[2, 3, 4, 5], &[-1, 15], &[8, 15]),
    reshape("4D to 4D / -1 second", &[2, 3, 4, 5], &[5, -1, 3, 2], &[5, 4, 3, 2]),
    reshape("5D to 4D / -1 last", &[2, 3, 4, 5, 6], &[3, 5, 6, -1], &[3, 5, 6, 8]),
    reshape("5D to 5D / -1 middle", &[2, 3, 4, 5, 6], &[6, 4, -1, 3, 2], &[6, 4, 5, 3, 2]),
];

pub const SQUEEZE_CASES: &[SqueezeCase] = &[
    // default axes
    squeeze(&[1, 3], None, &[3]),
    squeeze(&[3, 1], None, &[3]),
    squeeze(&[1, 3, 1], None, &[3]),
    squeeze(&[3, 1, 4], None, &[3, 4]),
    squeeze(&[1, 1, 3, 4], None, &[3, 4]),
    squeeze(&[3, 4, 5, 1], None, &[3, 4, 5]),
    squeeze(&[1, 3, 1, 4, 1], None, &[3, 4]),
    squeeze(&[3, 4, 5, 6, 1], None, &[3, 4, 5, 6]),
    // explicit axes
    squeeze(&[1, 3], Some(&[0]), &[3]),
    squeeze(&[3, 1, 1], Some(&[1, 2]), &[3]),
    squeeze(&[1, 3, 4], Some(&[0]), &[3, 4]),
    squeeze(&[1, 1, 3, 1], Some(&[0, 1, 3]), &[3]),
    squeeze(&[3, 4, 1, 5], Some(&[2]), &[3, 4, 5]),
    squeeze(&[1, 3, 1, 1, 1], Some(&[0, 2, 3, 4]), &[3]),
    squeeze(&[1, 3, 1, 4, 5], Some(&[0, 2]), &[3, 4, 5]),
    squeeze(&[3, 4, 5, 1, 6], Some(&[3]), &[3, 4, 5, 6]),
];

/// A float32 case whose expected output is its own random input.
fn identity_case(name: String, old_shape: &[usize], expected_shape: &[usize], seed: u64) -> TestCase {
    let data = gen_data(old_shape.iter().product(), seed);
    TestCase {
        name,
        data_type: OperandType::Float32,
        inputs: NamedOperands(vec![Operand {
            name: "x".into(),
            shape: old_shape.to_vec(),
            data: data.clone(),
            data_type: None,
        }]),
        options: CaseOptions::default(),
        axis: None,
        new_shape: None,
        starts: None,
        sizes: None,
        splits: None,
        expected: vec![Operand {
            name: "y".into(),
            shape: expected_shape.to_vec(),
            data,
            data_type: None,
        }],
    }
}

pub fn reshape_fixture(seed: u64) -> Fixture {
    let tests = RESHAPE_CASES
        .iter()
        .zip(seed..)
        .map(|(c, seed)| {
            let mut case = identity_case(
                format!("reshape {}", c.name),
                c.old_shape,
                c.expected_shape,
                seed,
            );
            case.new_shape = Some(c.new_shape.to_vec());
            case
        })
        .collect();
    Fixture { tests }
}

pub fn squeeze_fixture(seed: u64) -> Fixture {
    let tests = SQUEEZE_CASES
        .iter()
        .zip(seed..)
        .map(|(c, seed)| {
            let name = match c.axes {
                Some(axes) => format!("squeeze {:?} axes {axes:?}", c.old_shape),
                None => format!("squeeze {:?}", c.old_shape),
            };
            let mut case = identity_case(name, c.old_shape, c.expected_shape, seed);
            case.options.axes = c.axes.map(<[i64]>::to_vec);
            case
        })
        .collect();
    Fixture { tests }
}

/// Every reshape case, at the reshape ULP bound.
pub fn reshape_suite(runner: &TestRunner<'_>, seed: u64) -> SuiteReport {
    runner.run_fixture("reshape", &reshape_fixture(seed))
}

/// Every squeeze case, at the squeeze ULP bound.
pub fn squeeze_suite(runner: &TestRunner<'_>, seed: u64) -> SuiteReport {
    runner.run_fixture("squeeze", &squeeze_fixture(seed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_are_consistent() {
        for c in RESHAPE_CASES {
            let old: usize = c.old_shape.iter().product();
            let new: usize = c.expected_shape.iter().product();
            assert_eq!(old, new, "{}", c.name);
            assert_eq!(c.new_shape.len(), c.expected_shape.len(), "{}", c.name);
        }
        for c in SQUEEZE_CASES {
            let old: usize = c.old_shape.iter().product();
            let new: usize = c.expected_shape.iter().product();
            assert_eq!(old, new, "{:?}", c.old_shape);
        }
    }

    #[test]
    fn test_fixture_generation() {
        let fixture = squeeze_fixture(11);
        assert_eq!(fixture.tests.len(), SQUEEZE_CASES.len());
        let case = &fixture.tests[0];
        assert_eq!(case.inputs.0[0].data, case.expected[0].data);
        assert_eq!(case.expected[0].shape, vec![3]);
        assert!(case.options.axes.is_none());
        assert_eq!(fixture.tests[8].options.axes, Some(vec![0]));
    }
}
