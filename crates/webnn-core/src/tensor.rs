//! Reference-side tensor: a shape plus a flat row-major value sequence.
//!
//! Values are carried as `f64`, which holds every element of every
//! [`OperandType`](crate::OperandType) exactly.

use serde::{Deserialize, Serialize};

use crate::{Result, Shape, WebnnError};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub dimensions: Shape,
    pub value: Vec<f64>,
}

impl Tensor {
    /// Create a tensor, checking that the value count matches the shape.
    pub fn new(dimensions: impl Into<Shape>, value: Vec<f64>) -> Result<Self> {
        let dimensions = dimensions.into();
        let expected = dimensions.size();
        if value.len() != expected {
            return Err(WebnnError::InvalidArgument(format!(
                "data length {} does not match shape {} (expected {})",
                value.len(),
                dimensions,
                expected,
            )));
        }
        Ok(Self { dimensions, value })
    }

    /// Rank-0 tensor holding one value.
    pub fn scalar(value: f64) -> Self {
        Self {
            dimensions: Shape::scalar(),
            value: vec![value],
        }
    }

    pub fn shape(&self) -> &Shape {
        &self.dimensions
    }

    pub fn rank(&self) -> usize {
        self.dimensions.ndim()
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}
