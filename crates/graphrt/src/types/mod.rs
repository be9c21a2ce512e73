//! Values, tensors and the type system shared by graphs and kernels.

pub mod element;
pub mod fence;
pub mod shape;
pub mod tensor;
pub mod value;

pub use element::{DataType, ElementType, TensorElement};
pub use fence::Fence;
pub use shape::{Dim, TensorShape};
pub use tensor::{Tensor, TensorData};
pub use value::{Value, ValueData, ValueWriter};
