//! Scalar element types and the logical value types built on top of them.

use std::fmt;

use half::f16;
use serde::{Deserialize, Serialize};

use super::tensor::TensorData;

/// Element type of a dense tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ElementType {
    Bool,
    F16,
    F32,
    F64,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    String,
}

impl ElementType {
    pub const ALL: [ElementType; 13] = [
        ElementType::Bool,
        ElementType::F16,
        ElementType::F32,
        ElementType::F64,
        ElementType::I8,
        ElementType::I16,
        ElementType::I32,
        ElementType::I64,
        ElementType::U8,
        ElementType::U16,
        ElementType::U32,
        ElementType::U64,
        ElementType::String,
    ];

    /// Name used inside type strings such as `tensor(float)`.
    pub fn name(self) -> &'static str {
        match self {
            ElementType::Bool => "bool",
            ElementType::F16 => "float16",
            ElementType::F32 => "float",
            ElementType::F64 => "double",
            ElementType::I8 => "int8",
            ElementType::I16 => "int16",
            ElementType::I32 => "int32",
            ElementType::I64 => "int64",
            ElementType::U8 => "uint8",
            ElementType::U16 => "uint16",
            ElementType::U32 => "uint32",
            ElementType::U64 => "uint64",
            ElementType::String => "string",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| ty.name() == name)
    }

    /// Bytes per element, or `None` for variable-width strings.
    pub fn size_in_bytes(self) -> Option<usize> {
        match self {
            ElementType::Bool | ElementType::I8 | ElementType::U8 => Some(1),
            ElementType::F16 | ElementType::I16 | ElementType::U16 => Some(2),
            ElementType::F32 | ElementType::I32 | ElementType::U32 => Some(4),
            ElementType::F64 | ElementType::I64 | ElementType::U64 => Some(8),
            ElementType::String => None,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, ElementType::F16 | ElementType::F32 | ElementType::F64)
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Logical type of a value flowing along a graph edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DataType {
    Tensor(ElementType),
    /// `seq(map(string, float))`, produced by classifier post-processing.
    SeqMapStringToFloat,
    /// `seq(map(int64, float))`.
    SeqMapInt64ToFloat,
}

impl DataType {
    pub fn tensor(element: ElementType) -> Self {
        DataType::Tensor(element)
    }

    pub fn element_type(self) -> Option<ElementType> {
        match self {
            DataType::Tensor(element) => Some(element),
            _ => None,
        }
    }

    pub fn is_tensor(self) -> bool {
        matches!(self, DataType::Tensor(_))
    }

    /// Parses a concrete type string such as `tensor(float)` or `seq(map(int64,float))`.
    pub fn parse(type_str: &str) -> Option<Self> {
        let compact: String = type_str.chars().filter(|c| !c.is_whitespace()).collect();
        match compact.as_str() {
            "seq(map(string,float))" => Some(DataType::SeqMapStringToFloat),
            "seq(map(int64,float))" => Some(DataType::SeqMapInt64ToFloat),
            other => other
                .strip_prefix("tensor(")
                .and_then(|rest| rest.strip_suffix(')'))
                .and_then(ElementType::from_name)
                .map(DataType::Tensor),
        }
    }

    /// All tensor types whose element type is floating point.
    pub fn float_tensors() -> Vec<DataType> {
        vec![
            DataType::Tensor(ElementType::F16),
            DataType::Tensor(ElementType::F32),
            DataType::Tensor(ElementType::F64),
        ]
    }

    /// Every tensor type.
    pub fn all_tensors() -> Vec<DataType> {
        ElementType::ALL.into_iter().map(DataType::Tensor).collect()
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Tensor(element) => write!(f, "tensor({element})"),
            DataType::SeqMapStringToFloat => f.write_str("seq(map(string,float))"),
            DataType::SeqMapInt64ToFloat => f.write_str("seq(map(int64,float))"),
        }
    }
}

/// Rust scalar that can be stored in a [`TensorData`] buffer.
pub trait TensorElement: Clone + Send + Sync + 'static {
    const ELEMENT_TYPE: ElementType;

    fn wrap(values: Vec<Self>) -> TensorData;
    fn view(data: &TensorData) -> Option<&[Self]>;
    fn view_mut(data: &mut TensorData) -> Option<&mut [Self]>;
}

macro_rules! tensor_element {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl TensorElement for $ty {
                const ELEMENT_TYPE: ElementType = ElementType::$variant;

                fn wrap(values: Vec<Self>) -> TensorData {
                    TensorData::$variant(values)
                }

                fn view(data: &TensorData) -> Option<&[Self]> {
                    match data {
                        TensorData::$variant(values) => Some(values),
                        _ => None,
                    }
                }

                fn view_mut(data: &mut TensorData) -> Option<&mut [Self]> {
                    match data {
                        TensorData::$variant(values) => Some(values),
                        _ => None,
                    }
                }
            }
        )*
    };
}

tensor_element! {
    bool => Bool,
    f16 => F16,
    f32 => F32,
    f64 => F64,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    String => String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_strings_parse_back() {
        for ty in DataType::all_tensors() {
            assert_eq!(DataType::parse(&ty.to_string()), Some(ty));
        }
        assert_eq!(
            DataType::parse("seq(map(int64, float))"),
            Some(DataType::SeqMapInt64ToFloat)
        );
        assert_eq!(DataType::parse("tensor(complex64)"), None);
        assert_eq!(DataType::parse("T"), None);
    }
}
