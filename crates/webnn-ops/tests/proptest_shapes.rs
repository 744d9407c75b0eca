//! Property tests for index math, broadcasting, and the reference evaluator.
//!
//! These tests use proptest to generate random shapes and verify invariants
//! that must hold for any valid input.

use proptest::prelude::*;
use webnn_core::strides::{compute_strides, coordinates_to_flat_index, flat_index_to_coordinates};
use webnn_core::{BinaryOp, Shape, Tensor, WebnnError};
use webnn_ops::{
    broadcast_dimensions, evaluate_binary_op, evaluate_binary_strided, resolve_broadcast_shape,
};

// ── Strategies ───────────────────────────────────────────────────────────

/// Generate a random dimension value (1..=6 to keep tests fast).
fn dim() -> impl Strategy<Value = usize> {
    1usize..=6
}

/// Generate a random shape with rank 0..=4.
fn arb_shape() -> impl Strategy<Value = Shape> {
    prop::collection::vec(dim(), 0..=4).prop_map(Shape::new)
}

/// Generate a broadcastable pair of shapes.
fn broadcastable_pair() -> impl Strategy<Value = (Shape, Shape)> {
    prop::collection::vec(dim(), 1..=4).prop_flat_map(|target| {
        let len = target.len();
        (
            0..=len,
            prop::collection::vec(prop::bool::ANY, len),
            prop::collection::vec(prop::bool::ANY, len),
            Just(target),
        )
            .prop_map(|(skip, a_masks, b_masks, t)| {
                // `a` is a masked suffix of the target, `b` a masked full-rank copy;
                // both rank extension and per-dimension stretching are exercised.
                let a_dims: Vec<usize> = t[skip..]
                    .iter()
                    .zip(a_masks[skip..].iter())
                    .map(|(&d, &keep)| if keep { d } else { 1 })
                    .collect();
                let b_dims: Vec<usize> = t
                    .iter()
                    .zip(b_masks.iter())
                    .map(|(&d, &keep)| if keep { d } else { 1 })
                    .collect();
                (Shape::new(a_dims), Shape::new(b_dims))
            })
    })
}

fn arb_op() -> impl Strategy<Value = BinaryOp> {
    prop::sample::select(BinaryOp::ALL.to_vec())
}

/// Positive, non-integral values so `div` and `pow` stay finite.
fn fill(shape: &Shape, seed: f64) -> Tensor {
    let value = (0..shape.size())
        .map(|i| 1.25 + ((i as f64 + seed) * 0.37).sin().abs())
        .collect();
    Tensor {
        dimensions: shape.clone(),
        value,
    }
}

// ── Index math ───────────────────────────────────────────────────────────

proptest! {
    /// Flat index -> coordinates -> flat index is the identity.
    #[test]
    fn flat_index_round_trip(a in arb_shape()) {
        let strides = compute_strides(&a.0);
        for index in 0..a.size() {
            let coords = flat_index_to_coordinates(index, a.ndim(), &strides);
            prop_assert_eq!(coords.len(), a.ndim());
            for (c, d) in coords.iter().zip(&a.0) {
                prop_assert!(c < d);
            }
            prop_assert_eq!(coordinates_to_flat_index(&coords, a.ndim(), &strides), index);
        }
    }

    /// Strides always have rank-1 entries.
    #[test]
    fn strides_length(a in arb_shape()) {
        prop_assert_eq!(compute_strides(&a.0).len(), a.ndim().saturating_sub(1));
    }
}

// ── Broadcasting ─────────────────────────────────────────────────────────

proptest! {
    /// Broadcasting is commutative.
    #[test]
    fn broadcast_commutative(a in arb_shape(), b in arb_shape()) {
        let ab = resolve_broadcast_shape(&a, &b).ok();
        let ba = resolve_broadcast_shape(&b, &a).ok();
        prop_assert_eq!(ab, ba);
    }

    /// A shape broadcasts with itself to itself.
    #[test]
    fn broadcast_self_identity(a in arb_shape()) {
        prop_assert_eq!(resolve_broadcast_shape(&a, &a).ok(), Some(a.clone()));
        prop_assert!(broadcast_dimensions(&a, &a).is_empty());
    }

    /// Broadcasting with a scalar returns the other shape.
    #[test]
    fn broadcast_scalar(a in arb_shape()) {
        prop_assert_eq!(resolve_broadcast_shape(&a, &Shape::scalar()).ok(), Some(a));
    }

    /// Known-broadcastable pairs resolve, with rank max(rank(a), rank(b)).
    #[test]
    fn broadcast_valid_pairs((a, b) in broadcastable_pair()) {
        let result = resolve_broadcast_shape(&a, &b).unwrap();
        prop_assert_eq!(result.ndim(), a.ndim().max(b.ndim()));
        for &d in &broadcast_dimensions(&a, &result) {
            prop_assert_eq!(a.0[d], 1);
        }
    }

    /// A trailing mismatch between two non-unit dims always fails.
    #[test]
    fn broadcast_mismatch_fails(x in 2usize..=6, y in 2usize..=6, lead in arb_shape()) {
        prop_assume!(x != y);
        let mut a = lead.0.clone();
        a.push(x);
        let mut b = lead.0.clone();
        b.push(y);
        let err = resolve_broadcast_shape(&Shape::new(a), &Shape::new(b)).unwrap_err();
        let incompatible = matches!(err, WebnnError::IncompatibleShapes { .. });
        prop_assert!(incompatible, "unexpected error: {}", err);
    }
}

// ── Evaluator ────────────────────────────────────────────────────────────

proptest! {
    /// The modular fast path and the strided path produce identical outputs.
    #[test]
    fn fast_and_strided_paths_agree(a in arb_shape(), op in arb_op()) {
        // Same-shape and suffix-shape pairs both qualify for the fast path.
        let suffix = Shape::new(a.0[a.ndim() / 2..].to_vec());
        for (x, y) in [(&a, &a), (&a, &suffix), (&suffix, &a)] {
            let lhs = fill(x, 0.0);
            let rhs = fill(y, 3.0);
            let fast = evaluate_binary_op(&lhs, &rhs, op).unwrap();
            let strided = evaluate_binary_strided(&lhs, &rhs, op).unwrap();
            prop_assert_eq!(fast, strided);
        }
    }

    /// Broadcast outputs have the resolved shape and matching length.
    #[test]
    fn output_size_matches_shape((a, b) in broadcastable_pair(), op in arb_op()) {
        let out = evaluate_binary_op(&fill(&a, 1.0), &fill(&b, 2.0), op).unwrap();
        prop_assert_eq!(&out.dimensions, &resolve_broadcast_shape(&a, &b).unwrap());
        prop_assert_eq!(out.value.len(), out.dimensions.size());
        prop_assert_eq!(out, evaluate_binary_strided(&fill(&a, 1.0), &fill(&b, 2.0), op).unwrap());
    }
}

#[test]
fn incompatible_pair_is_rejected() {
    let a = Shape::new(vec![2, 3]);
    let b = Shape::new(vec![2, 4]);
    assert!(resolve_broadcast_shape(&a, &b).is_err());
}
