//! JSON test fixtures.
//!
//! A fixture file holds `{"tests": [...]}`; each case names its inputs, the
//! op-specific resources the build step needs, and the expected outputs.

use std::fmt;
use std::path::Path;

use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::Deserialize;
use webnn_core::{OperandDescriptor, OperandType, Result, TensorBuffer, WebnnError};
use webnn_ops::Split;

#[derive(Clone, Debug, Deserialize)]
pub struct Fixture {
    pub tests: Vec<TestCase>,
}

/// One test case.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub name: String,
    /// Operand type for every operand that does not carry its own.
    #[serde(rename = "type", default)]
    pub data_type: OperandType,
    pub inputs: NamedOperands,
    #[serde(default)]
    pub options: CaseOptions,
    /// concat axis.
    #[serde(default)]
    pub axis: Option<i64>,
    /// reshape target; may contain one `-1`.
    #[serde(default)]
    pub new_shape: Option<Vec<i64>>,
    #[serde(default)]
    pub starts: Option<Vec<usize>>,
    #[serde(default)]
    pub sizes: Option<Vec<usize>>,
    #[serde(default)]
    pub splits: Option<Splits>,
    #[serde(deserialize_with = "one_or_many")]
    pub expected: Vec<Operand>,
}

impl TestCase {
    /// Operand type of `operand` within this case.
    pub fn operand_type(&self, operand: &Operand) -> OperandType {
        operand.data_type.unwrap_or(self.data_type)
    }

    /// The `index`-th declared input.
    pub fn input(&self, index: usize) -> Result<&Operand> {
        self.inputs.0.get(index).ok_or_else(|| {
            WebnnError::Fixture(format!("case '{}' has no input #{index}", self.name))
        })
    }

    pub fn descriptor(&self, operand: &Operand) -> OperandDescriptor {
        OperandDescriptor::new(self.operand_type(operand), operand.shape.clone())
    }

    /// Typed buffer holding `operand`'s data.
    pub fn buffer(&self, operand: &Operand) -> Result<TensorBuffer> {
        operand.check_len()?;
        Ok(TensorBuffer::from_f64(self.operand_type(operand), &operand.data))
    }
}

/// A named tensor `{name, shape, data, type?}`.
#[derive(Clone, Debug, Deserialize)]
pub struct Operand {
    #[serde(default)]
    pub name: String,
    pub shape: Vec<usize>,
    #[serde(deserialize_with = "scalar_or_values")]
    pub data: Vec<f64>,
    #[serde(rename = "type", default)]
    pub data_type: Option<OperandType>,
}

impl Operand {
    pub fn check_len(&self) -> Result<()> {
        let expected: usize = self.shape.iter().product();
        if self.data.len() != expected {
            return Err(WebnnError::Fixture(format!(
                "operand '{}' has {} values for shape {:?}",
                self.name,
                self.data.len(),
                self.shape
            )));
        }
        Ok(())
    }
}

/// Inputs in declaration order.
///
/// Accepts a map `name -> operand` or an array of operands carrying their
/// own `name`.
#[derive(Clone, Debug, Default)]
pub struct NamedOperands(pub Vec<Operand>);

impl NamedOperands {
    pub fn iter(&self) -> std::slice::Iter<'_, Operand> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for NamedOperands {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct OperandsVisitor;

        impl<'de> Visitor<'de> for OperandsVisitor {
            type Value = NamedOperands;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of named operands or an array of operands")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Self::Value, A::Error> {
                let mut operands = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((name, mut operand)) = map.next_entry::<String, Operand>()? {
                    operand.name = name;
                    operands.push(operand);
                }
                Ok(NamedOperands(operands))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error> {
                let mut operands = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(operand) = seq.next_element::<Operand>()? {
                    if operand.name.is_empty() {
                        return Err(de::Error::custom("array operands must carry a name"));
                    }
                    operands.push(operand);
                }
                Ok(NamedOperands(operands))
            }
        }

        deserializer.deserialize_any(OperandsVisitor)
    }
}

/// Op-specific options; every field is optional so that "given" can be told
/// apart from "defaulted".
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseOptions {
    pub alpha: Option<f64>,
    pub beta: Option<f64>,
    pub c: Option<BiasResource>,
    pub a_transpose: Option<bool>,
    pub b_transpose: Option<bool>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub permutation: Option<Vec<usize>>,
    pub axes: Option<Vec<i64>>,
    pub keep_dimensions: Option<bool>,
    /// split or batchNormalization axis.
    pub axis: Option<i64>,
    // normalization
    pub scale: Option<Operand>,
    /// Per-channel bias of batchNormalization, instanceNormalization or conv2d.
    pub bias: Option<Operand>,
    pub epsilon: Option<f64>,
    /// Fused activation name: relu, relu6, sigmoid or leakyRelu.
    pub activation: Option<String>,
    // conv2d and pooling
    pub padding: Option<[usize; 4]>,
    pub strides: Option<[usize; 2]>,
    pub dilations: Option<[usize; 2]>,
    pub auto_pad: Option<String>,
    pub groups: Option<usize>,
    pub input_layout: Option<String>,
    pub filter_layout: Option<String>,
    /// Pooling and instanceNormalization layout.
    pub layout: Option<String>,
    pub window_dimensions: Option<[usize; 2]>,
    pub rounding_type: Option<String>,
    pub output_sizes: Option<[usize; 2]>,
}

/// gemm `c`: a single value or a constant operand.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum BiasResource {
    Scalar(f64),
    Operand(Operand),
}

/// split `splits`: a part count or explicit sizes.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum Splits {
    Count(usize),
    Sizes(Vec<usize>),
}

impl From<&Splits> for Split {
    fn from(s: &Splits) -> Self {
        match s {
            Splits::Count(n) => Split::Count(*n),
            Splits::Sizes(sizes) => Split::Sizes(sizes.clone()),
        }
    }
}

fn scalar_or_values<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<f64>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Data {
        Scalar(f64),
        Values(Vec<f64>),
    }

    Ok(match Data::deserialize(deserializer)? {
        Data::Scalar(v) => vec![v],
        Data::Values(v) => v,
    })
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<Operand>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Expected {
        One(Operand),
        Many(Vec<Operand>),
    }

    Ok(match Expected::deserialize(deserializer)? {
        Expected::One(o) => vec![o],
        Expected::Many(v) => v,
    })
}

/// Parse fixture JSON.
pub fn parse_fixture(json: &str) -> Result<Fixture> {
    serde_json::from_str(json).map_err(|e| WebnnError::Fixture(e.to_string()))
}

/// Read and parse a fixture file.
pub fn load_fixture(path: impl AsRef<Path>) -> Result<Fixture> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path)?;
    serde_json::from_str(&json)
        .map_err(|e| WebnnError::Fixture(format!("{}: {e}", path.display())))
}
