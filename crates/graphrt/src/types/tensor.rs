//! Dense tensors with typed host buffers.

use std::sync::Arc;

use half::f16;
use serde::{Deserialize, Serialize};

use super::element::{ElementType, TensorElement};
use crate::error::ValueError;
use crate::memory::{AllocationRecord, MemoryInfo};

/// Typed element buffer of a tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TensorData {
    Bool(Vec<bool>),
    F16(Vec<f16>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    U64(Vec<u64>),
    String(Vec<String>),
}

macro_rules! for_each_variant {
    ($data:expr, $values:ident => $body:expr) => {
        match $data {
            TensorData::Bool($values) => $body,
            TensorData::F16($values) => $body,
            TensorData::F32($values) => $body,
            TensorData::F64($values) => $body,
            TensorData::I8($values) => $body,
            TensorData::I16($values) => $body,
            TensorData::I32($values) => $body,
            TensorData::I64($values) => $body,
            TensorData::U8($values) => $body,
            TensorData::U16($values) => $body,
            TensorData::U32($values) => $body,
            TensorData::U64($values) => $body,
            TensorData::String($values) => $body,
        }
    };
}

impl TensorData {
    pub fn element_type(&self) -> ElementType {
        match self {
            TensorData::Bool(_) => ElementType::Bool,
            TensorData::F16(_) => ElementType::F16,
            TensorData::F32(_) => ElementType::F32,
            TensorData::F64(_) => ElementType::F64,
            TensorData::I8(_) => ElementType::I8,
            TensorData::I16(_) => ElementType::I16,
            TensorData::I32(_) => ElementType::I32,
            TensorData::I64(_) => ElementType::I64,
            TensorData::U8(_) => ElementType::U8,
            TensorData::U16(_) => ElementType::U16,
            TensorData::U32(_) => ElementType::U32,
            TensorData::U64(_) => ElementType::U64,
            TensorData::String(_) => ElementType::String,
        }
    }

    pub fn len(&self) -> usize {
        for_each_variant!(self, values => values.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Zero-initialized buffer (`false`, `0`, empty strings).
    pub fn zeros(element_type: ElementType, len: usize) -> Self {
        match element_type {
            ElementType::Bool => TensorData::Bool(vec![false; len]),
            ElementType::F16 => TensorData::F16(vec![f16::ZERO; len]),
            ElementType::F32 => TensorData::F32(vec![0.0; len]),
            ElementType::F64 => TensorData::F64(vec![0.0; len]),
            ElementType::I8 => TensorData::I8(vec![0; len]),
            ElementType::I16 => TensorData::I16(vec![0; len]),
            ElementType::I32 => TensorData::I32(vec![0; len]),
            ElementType::I64 => TensorData::I64(vec![0; len]),
            ElementType::U8 => TensorData::U8(vec![0; len]),
            ElementType::U16 => TensorData::U16(vec![0; len]),
            ElementType::U32 => TensorData::U32(vec![0; len]),
            ElementType::U64 => TensorData::U64(vec![0; len]),
            ElementType::String => TensorData::String(vec![String::new(); len]),
        }
    }

    /// Bytes occupied by the element payload. Strings count their UTF-8 length.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            TensorData::String(values) => values.iter().map(String::len).sum(),
            other => {
                other.len() * other.element_type().size_in_bytes().unwrap_or_default()
            }
        }
    }
}

/// Dense row-major tensor together with the memory space it was allocated in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tensor {
    dims: Vec<usize>,
    data: TensorData,
    #[serde(skip, default)]
    location: MemoryInfo,
    #[serde(skip, default)]
    allocation: Option<Arc<AllocationRecord>>,
}

impl Tensor {
    /// Builds a host tensor, checking that `data` matches the element count of `dims`.
    pub fn new(dims: Vec<usize>, data: TensorData) -> Result<Self, ValueError> {
        let expected: usize = dims.iter().product();
        if expected != data.len() {
            return Err(ValueError::ElementCount {
                dims,
                expected,
                actual: data.len(),
            });
        }
        Ok(Tensor {
            dims,
            data,
            location: MemoryInfo::default(),
            allocation: None,
        })
    }

    pub fn from_vec<T: TensorElement>(dims: &[usize], values: Vec<T>) -> Result<Self, ValueError> {
        Tensor::new(dims.to_vec(), T::wrap(values))
    }

    pub fn scalar<T: TensorElement>(value: T) -> Self {
        Tensor {
            dims: Vec::new(),
            data: T::wrap(vec![value]),
            location: MemoryInfo::default(),
            allocation: None,
        }
    }

    pub fn zeros(element_type: ElementType, dims: &[usize]) -> Self {
        let len = dims.iter().product();
        Tensor {
            dims: dims.to_vec(),
            data: TensorData::zeros(element_type, len),
            location: MemoryInfo::default(),
            allocation: None,
        }
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn element_type(&self) -> ElementType {
        self.data.element_type()
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    pub fn into_data(self) -> TensorData {
        self.data
    }

    /// Memory space that owns the buffer.
    pub fn location(&self) -> &MemoryInfo {
        &self.location
    }

    pub fn as_slice<T: TensorElement>(&self) -> Result<&[T], ValueError> {
        T::view(&self.data).ok_or(ValueError::ElementType {
            expected: T::ELEMENT_TYPE,
            actual: self.element_type(),
        })
    }

    pub fn as_mut_slice<T: TensorElement>(&mut self) -> Result<&mut [T], ValueError> {
        let actual = self.element_type();
        T::view_mut(&mut self.data).ok_or(ValueError::ElementType {
            expected: T::ELEMENT_TYPE,
            actual,
        })
    }

    /// Moves the tensor into another memory space, tracking its bytes with `record`.
    pub(crate) fn placed(mut self, location: MemoryInfo, record: Option<AllocationRecord>) -> Self {
        self.location = location;
        self.allocation = record.map(Arc::new);
        self
    }
}

impl PartialEq for Tensor {
    fn eq(&self, other: &Self) -> bool {
        self.dims == other.dims && self.data == other.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_count_must_match_dims() {
        let err = Tensor::from_vec(&[2, 2], vec![1.0f32, 2.0, 3.0]).unwrap_err();
        assert_eq!(
            err,
            ValueError::ElementCount {
                dims: vec![2, 2],
                expected: 4,
                actual: 3
            }
        );
    }

    #[test]
    fn typed_views_check_the_element_type() {
        let tensor = Tensor::from_vec(&[2], vec![1i64, 2]).unwrap();
        assert_eq!(tensor.as_slice::<i64>().unwrap(), &[1, 2]);
        assert!(matches!(
            tensor.as_slice::<f32>(),
            Err(ValueError::ElementType {
                expected: ElementType::F32,
                actual: ElementType::I64
            })
        ));
    }

    #[test]
    fn scalars_have_rank_zero() {
        let tensor = Tensor::scalar(3.5f64);
        assert_eq!(tensor.rank(), 0);
        assert_eq!(tensor.len(), 1);
        assert_eq!(tensor.data().size_in_bytes(), 8);
    }
}
