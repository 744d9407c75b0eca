//! Row-major stride math.
//!
//! Strides here are compacted: a rank-`n` shape has `n - 1` strides and the
//! last dimension's stride of 1 is implicit. Ranks 0 and 1 have no strides.

use smallvec::SmallVec;

/// Coordinates of one element in an N-dimensional tensor.
pub type Coords = SmallVec<[usize; 6]>;

/// Compute the strides of a row-major shape, omitting the last dimension.
///
/// For `[2, 3, 4]` this is `[12, 4]`.
pub fn compute_strides(shape: &[usize]) -> Vec<usize> {
    let rank = shape.len();
    if rank < 2 {
        return Vec::new();
    }
    let mut strides = vec![0; rank - 1];
    strides[rank - 2] = shape[rank - 1];
    for i in (0..rank - 2).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}

/// Flat index of the element at `coords` in a tensor of the given rank.
pub fn coordinates_to_flat_index(coords: &[usize], rank: usize, strides: &[usize]) -> usize {
    match rank {
        0 => 0,
        1 => coords[0],
        _ => {
            let last = coords[rank - 1];
            coords[..rank - 1]
                .iter()
                .zip(strides)
                .fold(last, |acc, (&c, &s)| acc + c * s)
        }
    }
}

/// Coordinates of the element at flat `index`; inverse of
/// [`coordinates_to_flat_index`].
pub fn flat_index_to_coordinates(index: usize, rank: usize, strides: &[usize]) -> Coords {
    match rank {
        0 => Coords::new(),
        1 => SmallVec::from_slice(&[index]),
        _ => {
            let mut coords = Coords::with_capacity(rank);
            let mut rem = index;
            for &stride in &strides[..rank - 1] {
                // Zero strides only occur for empty tensors, which have no valid index.
                let c = if stride == 0 { 0 } else { rem / stride };
                rem -= c * stride;
                coords.push(c);
            }
            coords.push(rem);
            coords
        }
    }
}
