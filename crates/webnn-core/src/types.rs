//! Core type definitions: OperandType, Shape, MetricKind.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::WebnnError;

/// Element types an operand buffer can hold.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperandType {
    #[default]
    Float32,
    Float16,
    Int32,
    Uint32,
    Int8,
    Uint8,
}

impl OperandType {
    /// Size in bytes of a single element.
    pub fn size_bytes(self) -> usize {
        match self {
            OperandType::Float32 | OperandType::Int32 | OperandType::Uint32 => 4,
            OperandType::Float16 => 2,
            OperandType::Int8 | OperandType::Uint8 => 1,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, OperandType::Float32 | OperandType::Float16)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OperandType::Float32 => "float32",
            OperandType::Float16 => "float16",
            OperandType::Int32 => "int32",
            OperandType::Uint32 => "uint32",
            OperandType::Int8 => "int8",
            OperandType::Uint8 => "uint8",
        }
    }
}

impl std::fmt::Display for OperandType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperandType {
    type Err = WebnnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "float32" => Ok(OperandType::Float32),
            "float16" => Ok(OperandType::Float16),
            "int32" => Ok(OperandType::Int32),
            "uint32" => Ok(OperandType::Uint32),
            "int8" => Ok(OperandType::Int8),
            "uint8" => Ok(OperandType::Uint8),
            other => Err(WebnnError::InvalidArgument(format!(
                "unknown operand type '{other}'"
            ))),
        }
    }
}

/// How closeness between actual and expected values is measured.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricKind {
    /// Distance in representable steps between the two bit patterns.
    #[serde(rename = "ULP")]
    Ulp,
    /// Plain absolute difference.
    #[serde(rename = "ATOL")]
    Atol,
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricKind::Ulp => write!(f, "ULP"),
            MetricKind::Atol => write!(f, "ATOL"),
        }
    }
}

impl FromStr for MetricKind {
    type Err = WebnnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ulp" => Ok(MetricKind::Ulp),
            "atol" | "absolute" => Ok(MetricKind::Atol),
            other => Err(WebnnError::InvalidArgument(format!(
                "unknown metric kind '{other}'"
            ))),
        }
    }
}

/// Tensor shape (dimensions).
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Shape(pub Vec<usize>);

impl Shape {
    pub fn new(dims: impl Into<Vec<usize>>) -> Self {
        Self(dims.into())
    }

    /// Scalar (rank-0) shape.
    pub fn scalar() -> Self {
        Self(vec![])
    }

    /// Number of dimensions (rank).
    pub fn ndim(&self) -> usize {
        self.0.len()
    }

    /// Total number of elements. An empty shape holds one element.
    pub fn size(&self) -> usize {
        size_of_shape(&self.0)
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Strides for flat index conversion; see [`crate::strides::compute_strides`].
    pub fn strides(&self) -> Vec<usize> {
        crate::strides::compute_strides(&self.0)
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Self(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Self(dims.to_vec())
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}

/// Product of all dimension sizes; 1 for a scalar, 0 if any dimension is 0.
pub fn size_of_shape(dims: &[usize]) -> usize {
    dims.iter().product()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_size() {
        assert_eq!(Shape::new(vec![2, 3, 4]).size(), 24);
        assert_eq!(Shape::scalar().size(), 1);
        assert_eq!(Shape::new(vec![0, 5]).size(), 0);
    }

    #[test]
    fn test_operand_type_size() {
        assert_eq!(OperandType::Float32.size_bytes(), 4);
        assert_eq!(OperandType::Float16.size_bytes(), 2);
        assert_eq!(OperandType::Uint8.size_bytes(), 1);
    }

    #[test]
    fn test_operand_type_parse() {
        for ty in [
            OperandType::Float32,
            OperandType::Float16,
            OperandType::Int32,
            OperandType::Uint32,
            OperandType::Int8,
            OperandType::Uint8,
        ] {
            assert_eq!(ty.as_str().parse::<OperandType>().unwrap(), ty);
        }
        assert!("float64".parse::<OperandType>().is_err());
    }

    #[test]
    fn test_metric_kind_parse() {
        assert_eq!("ULP".parse::<MetricKind>().unwrap(), MetricKind::Ulp);
        assert_eq!("absolute".parse::<MetricKind>().unwrap(), MetricKind::Atol);
        assert_eq!("ATOL".parse::<MetricKind>().unwrap(), MetricKind::Atol);
        assert!("rtol".parse::<MetricKind>().is_err());
    }

    #[test]
    fn test_shape_display() {
        assert_eq!(Shape::new(vec![2, 3]).to_string(), "[2, 3]");
        assert_eq!(Shape::scalar().to_string(), "[]");
    }
}
