//! Broadcasting rules following NumPy semantics for two operands.

use smallvec::SmallVec;
use webnn_core::{Result, Shape, WebnnError};

/// Input dimensions (0-indexed from the left) stretched from size 1.
pub type BroadcastDims = SmallVec<[usize; 4]>;

/// Compute the broadcast shape of two shapes.
///
/// Rules (NumPy-style):
/// 1. Align shapes from the trailing dimension, padding the shorter with 1s.
/// 2. For each dimension pair: must be equal, or one must be 1.
/// 3. The output dimension is the one that is not 1.
pub fn resolve_broadcast_shape(a: &Shape, b: &Shape) -> Result<Shape> {
    let a_dims = &a.0;
    let b_dims = &b.0;
    let max_ndim = a_dims.len().max(b_dims.len());

    let mut result = Vec::with_capacity(max_ndim);

    for i in 0..max_ndim {
        let da = if i < a_dims.len() {
            a_dims[a_dims.len() - 1 - i]
        } else {
            1
        };
        let db = if i < b_dims.len() {
            b_dims[b_dims.len() - 1 - i]
        } else {
            1
        };

        if da == 1 {
            result.push(db);
        } else if db == 1 || da == db {
            result.push(da);
        } else {
            return Err(WebnnError::IncompatibleShapes {
                a: a.clone(),
                b: b.clone(),
            });
        }
    }

    result.reverse();
    Ok(Shape::new(result))
}

/// Dimensions of `input` that must be pinned to 0 when reading it at an
/// `output` coordinate.
///
/// For input `[3, 1, 1, 3]` against output `[3, 224, 224, 3]` this is
/// `[1, 2]`.
pub fn broadcast_dimensions(input: &Shape, output: &Shape) -> BroadcastDims {
    let in_rank = input.ndim();
    let out_rank = output.ndim();
    let mut dims = BroadcastDims::new();
    for (index, &d) in input.0.iter().enumerate() {
        let from_end = in_rank - 1 - index;
        let out = if from_end < out_rank {
            output.0[out_rank - 1 - from_end]
        } else {
            1
        };
        if d == 1 && out > 1 {
            dims.push(index);
        }
    }
    dims
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(dims: &[usize]) -> Shape {
        Shape::new(dims.to_vec())
    }

    #[test]
    fn test_same_shapes() {
        assert_eq!(resolve_broadcast_shape(&s(&[2, 3]), &s(&[2, 3])).unwrap(), s(&[2, 3]));
    }

    #[test]
    fn test_scalar_broadcast() {
        assert_eq!(
            resolve_broadcast_shape(&s(&[2, 3]), &Shape::scalar()).unwrap(),
            s(&[2, 3])
        );
    }

    #[test]
    fn test_one_broadcast() {
        assert_eq!(resolve_broadcast_shape(&s(&[2, 1]), &s(&[1, 3])).unwrap(), s(&[2, 3]));
    }

    #[test]
    fn test_rank_extension() {
        assert_eq!(resolve_broadcast_shape(&s(&[3]), &s(&[2, 3])).unwrap(), s(&[2, 3]));
    }

    #[test]
    fn test_incompatible() {
        let err = resolve_broadcast_shape(&s(&[2, 3]), &s(&[2, 4])).unwrap_err();
        assert!(matches!(err, WebnnError::IncompatibleShapes { .. }));
        assert_eq!(
            err.to_string(),
            "Operands could not be broadcast together with shapes [2, 3] and [2, 4]"
        );
    }

    #[test]
    fn test_higher_rank() {
        assert_eq!(
            resolve_broadcast_shape(&s(&[1, 3, 1]), &s(&[2, 1, 4])).unwrap(),
            s(&[2, 3, 4])
        );
    }

    #[test]
    fn test_zero_sized_dims() {
        assert_eq!(resolve_broadcast_shape(&s(&[0, 3]), &s(&[1, 3])).unwrap(), s(&[0, 3]));
        assert!(resolve_broadcast_shape(&s(&[0]), &s(&[2])).is_err());
    }

    #[test]
    fn test_broadcast_dims_image() {
        let dims = broadcast_dimensions(&s(&[3, 1, 1, 3]), &s(&[3, 224, 224, 3]));
        assert_eq!(dims.as_slice(), &[1, 2]);
    }

    #[test]
    fn test_broadcast_dims_lower_rank() {
        // Input [2, 1] right-aligned against [4, 2, 5]: only the trailing 1 stretches.
        let dims = broadcast_dimensions(&s(&[2, 1]), &s(&[4, 2, 5]));
        assert_eq!(dims.as_slice(), &[1]);
    }

    #[test]
    fn test_broadcast_dims_none() {
        assert!(broadcast_dimensions(&s(&[3]), &s(&[2, 3])).is_empty());
        assert!(broadcast_dimensions(&s(&[2, 1]), &s(&[2, 1])).is_empty());
        assert!(broadcast_dimensions(&Shape::scalar(), &s(&[2, 3])).is_empty());
    }
}
