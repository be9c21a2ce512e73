//! Tagged value container passed between nodes, feeds and fetches.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use super::element::DataType;
use super::fence::Fence;
use super::tensor::Tensor;
use crate::error::ValueError;

/// Payload of a [`Value`].
#[derive(Debug, Clone, PartialEq)]
pub enum ValueData {
    Tensor(Tensor),
    SeqMapStringToFloat(Vec<BTreeMap<String, f32>>),
    SeqMapInt64ToFloat(Vec<BTreeMap<i64, f32>>),
}

impl ValueData {
    pub fn data_type(&self) -> DataType {
        match self {
            ValueData::Tensor(tensor) => DataType::Tensor(tensor.element_type()),
            ValueData::SeqMapStringToFloat(_) => DataType::SeqMapStringToFloat,
            ValueData::SeqMapInt64ToFloat(_) => DataType::SeqMapInt64ToFloat,
        }
    }
}

impl From<Tensor> for ValueData {
    fn from(tensor: Tensor) -> Self {
        ValueData::Tensor(tensor)
    }
}

struct ValueCell {
    data_type: DataType,
    slot: OnceLock<ValueData>,
    fence: Option<Arc<dyn Fence>>,
}

/// Shared handle to a tensor or non-tensor value with an optional fence.
///
/// Cloning is cheap and shares the payload and the fence, so the fence lives exactly as long as
/// the value that carries it. A value can be created *pending*: its type is fixed up front while
/// the payload is written later, exactly once, through the paired [`ValueWriter`].
#[derive(Clone)]
pub struct Value {
    cell: Arc<ValueCell>,
}

impl Value {
    pub fn new(data: impl Into<ValueData>) -> Self {
        Self::build(data.into(), None)
    }

    pub fn with_fence(data: impl Into<ValueData>, fence: Arc<dyn Fence>) -> Self {
        Self::build(data.into(), Some(fence))
    }

    pub fn from_tensor(tensor: Tensor) -> Self {
        Self::build(ValueData::Tensor(tensor), None)
    }

    /// Creates a value whose payload will be supplied later by the returned writer.
    pub fn pending(data_type: DataType, fence: Arc<dyn Fence>) -> (Value, ValueWriter) {
        let cell = Arc::new(ValueCell {
            data_type,
            slot: OnceLock::new(),
            fence: Some(fence),
        });
        (
            Value {
                cell: Arc::clone(&cell),
            },
            ValueWriter { cell },
        )
    }

    fn build(data: ValueData, fence: Option<Arc<dyn Fence>>) -> Self {
        let slot = OnceLock::new();
        let data_type = data.data_type();
        let _ = slot.set(data);
        Value {
            cell: Arc::new(ValueCell {
                data_type,
                slot,
                fence,
            }),
        }
    }

    pub fn data_type(&self) -> DataType {
        self.cell.data_type
    }

    pub fn is_tensor(&self) -> bool {
        self.cell.data_type.is_tensor()
    }

    /// Whether the payload has been written.
    pub fn is_ready(&self) -> bool {
        self.cell.slot.get().is_some()
    }

    pub fn fence(&self) -> Option<&Arc<dyn Fence>> {
        self.cell.fence.as_ref()
    }

    pub fn data(&self) -> Result<&ValueData, ValueError> {
        self.cell
            .slot
            .get()
            .ok_or(ValueError::NotReady(self.cell.data_type))
    }

    pub fn tensor(&self) -> Result<&Tensor, ValueError> {
        match self.data()? {
            ValueData::Tensor(tensor) => Ok(tensor),
            other => Err(mismatch("tensor", other)),
        }
    }

    pub fn seq_map_string_to_float(&self) -> Result<&[BTreeMap<String, f32>], ValueError> {
        match self.data()? {
            ValueData::SeqMapStringToFloat(maps) => Ok(maps),
            other => Err(mismatch("seq(map(string,float))", other)),
        }
    }

    pub fn seq_map_int64_to_float(&self) -> Result<&[BTreeMap<i64, f32>], ValueError> {
        match self.data()? {
            ValueData::SeqMapInt64ToFloat(maps) => Ok(maps),
            other => Err(mismatch("seq(map(int64,float))", other)),
        }
    }

    /// Returns true when both handles share the same payload.
    pub fn ptr_eq(&self, other: &Value) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

fn mismatch(expected: &str, actual: &ValueData) -> ValueError {
    ValueError::TypeMismatch {
        expected: expected.to_string(),
        actual: actual.data_type(),
    }
}

impl From<Tensor> for Value {
    fn from(tensor: Tensor) -> Self {
        Value::from_tensor(tensor)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Value")
            .field("data_type", &self.cell.data_type)
            .field("data", &self.cell.slot.get())
            .field("fenced", &self.cell.fence.is_some())
            .finish()
    }
}

/// Write side of a pending [`Value`].
pub struct ValueWriter {
    cell: Arc<ValueCell>,
}

impl ValueWriter {
    pub fn data_type(&self) -> DataType {
        self.cell.data_type
    }

    /// Publishes the payload. The payload type must match the type the value was created with.
    pub fn fulfill(self, data: ValueData) -> Result<(), ValueError> {
        let actual = data.data_type();
        if actual != self.cell.data_type {
            return Err(ValueError::TypeMismatch {
                expected: self.cell.data_type.to_string(),
                actual,
            });
        }
        self.cell
            .slot
            .set(data)
            .map_err(|_| ValueError::AlreadyFulfilled(self.cell.data_type))
    }
}
