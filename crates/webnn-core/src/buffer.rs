//! Fixed-width typed buffers exchanged with a compute context.

use std::collections::BTreeMap;

use half::f16;

use crate::{OperandType, Result, WebnnError};

/// Named buffers, keyed by graph input or output name.
pub type NamedBuffers = BTreeMap<String, TensorBuffer>;

/// A flat element buffer of one [`OperandType`].
#[derive(Clone, Debug, PartialEq)]
pub enum TensorBuffer {
    Float32(Vec<f32>),
    Float16(Vec<f16>),
    Int32(Vec<i32>),
    Uint32(Vec<u32>),
    Int8(Vec<i8>),
    Uint8(Vec<u8>),
}

impl TensorBuffer {
    /// Buffer of `len` zeros.
    pub fn zeros(data_type: OperandType, len: usize) -> Self {
        match data_type {
            OperandType::Float32 => TensorBuffer::Float32(vec![0.0; len]),
            OperandType::Float16 => TensorBuffer::Float16(vec![f16::ZERO; len]),
            OperandType::Int32 => TensorBuffer::Int32(vec![0; len]),
            OperandType::Uint32 => TensorBuffer::Uint32(vec![0; len]),
            OperandType::Int8 => TensorBuffer::Int8(vec![0; len]),
            OperandType::Uint8 => TensorBuffer::Uint8(vec![0; len]),
        }
    }

    /// Convert `f64` values into a buffer of `data_type`, rounding floats to
    /// nearest and saturating integers.
    pub fn from_f64(data_type: OperandType, values: &[f64]) -> Self {
        match data_type {
            OperandType::Float32 => {
                TensorBuffer::Float32(values.iter().map(|&v| v as f32).collect())
            }
            OperandType::Float16 => {
                TensorBuffer::Float16(values.iter().map(|&v| f16::from_f64(v)).collect())
            }
            OperandType::Int32 => TensorBuffer::Int32(values.iter().map(|&v| v as i32).collect()),
            OperandType::Uint32 => {
                TensorBuffer::Uint32(values.iter().map(|&v| v as u32).collect())
            }
            OperandType::Int8 => TensorBuffer::Int8(values.iter().map(|&v| v as i8).collect()),
            OperandType::Uint8 => TensorBuffer::Uint8(values.iter().map(|&v| v as u8).collect()),
        }
    }

    pub fn data_type(&self) -> OperandType {
        match self {
            TensorBuffer::Float32(_) => OperandType::Float32,
            TensorBuffer::Float16(_) => OperandType::Float16,
            TensorBuffer::Int32(_) => OperandType::Int32,
            TensorBuffer::Uint32(_) => OperandType::Uint32,
            TensorBuffer::Int8(_) => OperandType::Int8,
            TensorBuffer::Uint8(_) => OperandType::Uint8,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TensorBuffer::Float32(v) => v.len(),
            TensorBuffer::Float16(v) => v.len(),
            TensorBuffer::Int32(v) => v.len(),
            TensorBuffer::Uint32(v) => v.len(),
            TensorBuffer::Int8(v) => v.len(),
            TensorBuffer::Uint8(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Widen every element to `f64` (exact for all element types).
    pub fn to_f64_vec(&self) -> Vec<f64> {
        match self {
            TensorBuffer::Float32(v) => v.iter().map(|&x| f64::from(x)).collect(),
            TensorBuffer::Float16(v) => v.iter().map(|&x| x.to_f64()).collect(),
            TensorBuffer::Int32(v) => v.iter().map(|&x| f64::from(x)).collect(),
            TensorBuffer::Uint32(v) => v.iter().map(|&x| f64::from(x)).collect(),
            TensorBuffer::Int8(v) => v.iter().map(|&x| f64::from(x)).collect(),
            TensorBuffer::Uint8(v) => v.iter().map(|&x| f64::from(x)).collect(),
        }
    }

    /// Overwrite the buffer in place. Type and length stay fixed.
    pub fn write_f64(&mut self, values: &[f64]) -> Result<()> {
        if values.len() != self.len() {
            return Err(WebnnError::LengthMismatch {
                actual: values.len(),
                expected: self.len(),
            });
        }
        *self = TensorBuffer::from_f64(self.data_type(), values);
        Ok(())
    }
}

impl From<Vec<f32>> for TensorBuffer {
    fn from(v: Vec<f32>) -> Self {
        TensorBuffer::Float32(v)
    }
}

/// Round a value to what an element of `data_type` can hold.
pub fn quantize(data_type: OperandType, v: f64) -> f64 {
    match data_type {
        OperandType::Float32 => f64::from(v as f32),
        OperandType::Float16 => f16::from_f64(v).to_f64(),
        OperandType::Int32 => f64::from(v as i32),
        OperandType::Uint32 => f64::from(v as u32),
        OperandType::Int8 => f64::from(v as i8),
        OperandType::Uint8 => f64::from(v as u8),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_f64_rounds_per_type() {
        let b = TensorBuffer::from_f64(OperandType::Float32, &[0.1]);
        assert_eq!(b.to_f64_vec(), vec![f64::from(0.1f32)]);

        let b = TensorBuffer::from_f64(OperandType::Uint8, &[-3.0, 300.0, 7.9]);
        assert_eq!(b, TensorBuffer::Uint8(vec![0, 255, 7]));

        let b = TensorBuffer::from_f64(OperandType::Float16, &[1.0, 65504.0]);
        assert_eq!(b.to_f64_vec(), vec![1.0, 65504.0]);
    }

    #[test]
    fn test_write_keeps_type_and_length() {
        let mut b = TensorBuffer::zeros(OperandType::Int32, 2);
        b.write_f64(&[3.0, -4.0]).unwrap();
        assert_eq!(b, TensorBuffer::Int32(vec![3, -4]));
        assert!(matches!(
            b.write_f64(&[1.0]),
            Err(WebnnError::LengthMismatch { actual: 1, expected: 2 })
        ));
    }

    #[test]
    fn test_quantize() {
        assert_eq!(quantize(OperandType::Int8, 200.0), 127.0);
        assert_eq!(quantize(OperandType::Float32, 1.5), 1.5);
        assert_eq!(quantize(OperandType::Float16, 1.0 / 3.0), f16::from_f64(1.0 / 3.0).to_f64());
    }
}
