//! Binary arithmetic (`Add`, `Sub`, `Mul`, `Div`) and float activations.

use graphrt::types::{ElementType, Tensor, TensorData, TensorElement};
use graphrt::{KernelContext, KernelError, KernelResult, OpKernel, OpKernelInfo};

use super::broadcast::broadcast_zip;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn op_type(self) -> &'static str {
        match self {
            BinaryOp::Add => "Add",
            BinaryOp::Sub => "Sub",
            BinaryOp::Mul => "Mul",
            BinaryOp::Div => "Div",
        }
    }

    pub fn apply<T: Arithmetic>(self, lhs: T, rhs: T) -> KernelResult<T> {
        match self {
            BinaryOp::Add => Ok(lhs.add(rhs)),
            BinaryOp::Sub => Ok(lhs.sub(rhs)),
            BinaryOp::Mul => Ok(lhs.mul(rhs)),
            BinaryOp::Div => lhs.div(rhs),
        }
    }
}

/// Element types the binary kernels compute on. Integer arithmetic wraps; integer division by
/// zero is an error.
pub trait Arithmetic: TensorElement + Copy {
    fn add(self, rhs: Self) -> Self;
    fn sub(self, rhs: Self) -> Self;
    fn mul(self, rhs: Self) -> Self;
    fn div(self, rhs: Self) -> KernelResult<Self>;
}

macro_rules! float_arithmetic {
    ($($ty:ty),*) => {$(
        impl Arithmetic for $ty {
            fn add(self, rhs: Self) -> Self { self + rhs }
            fn sub(self, rhs: Self) -> Self { self - rhs }
            fn mul(self, rhs: Self) -> Self { self * rhs }
            fn div(self, rhs: Self) -> KernelResult<Self> { Ok(self / rhs) }
        }
    )*};
}

macro_rules! int_arithmetic {
    ($($ty:ty),*) => {$(
        impl Arithmetic for $ty {
            fn add(self, rhs: Self) -> Self { self.wrapping_add(rhs) }
            fn sub(self, rhs: Self) -> Self { self.wrapping_sub(rhs) }
            fn mul(self, rhs: Self) -> Self { self.wrapping_mul(rhs) }
            fn div(self, rhs: Self) -> KernelResult<Self> {
                if rhs == 0 {
                    return Err(KernelError::execution("integer division by zero"));
                }
                Ok(self.wrapping_div(rhs))
            }
        }
    )*};
}

float_arithmetic!(f32, f64);
int_arithmetic!(i32, i64, u32, u64);

/// Element types registered for the binary kernels.
pub const BINARY_TYPES: [ElementType; 6] = [
    ElementType::F32,
    ElementType::F64,
    ElementType::I32,
    ElementType::I64,
    ElementType::U32,
    ElementType::U64,
];

/// Broadcasting rule of opset 1 through 6: with `broadcast = 1` the right operand must match a
/// contiguous run of the left operand's dimensions starting at `axis`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LegacyBroadcast {
    enabled: bool,
    axis: Option<i64>,
}

impl LegacyBroadcast {
    /// Right operand dims padded with ones to the left operand's rank.
    fn expand(&self, lhs: &[usize], rhs: &[usize]) -> KernelResult<Vec<usize>> {
        if lhs == rhs {
            return Ok(rhs.to_vec());
        }
        if !self.enabled {
            return Err(KernelError::invalid_argument(format!(
                "shapes {lhs:?} and {rhs:?} differ and broadcasting is disabled"
            )));
        }
        if rhs.iter().product::<usize>() == 1 {
            return Ok(vec![1; lhs.len()]);
        }
        if rhs.len() > lhs.len() {
            return Err(KernelError::invalid_argument(format!(
                "cannot broadcast {rhs:?} onto {lhs:?}"
            )));
        }
        let start = match self.axis {
            Some(axis) if axis < 0 => lhs.len() as i64 + axis,
            Some(axis) => axis,
            None => (lhs.len() - rhs.len()) as i64,
        };
        let start = usize::try_from(start)
            .ok()
            .filter(|start| start + rhs.len() <= lhs.len())
            .ok_or_else(|| {
                KernelError::invalid_argument(format!(
                    "axis {start} does not place {rhs:?} inside {lhs:?}"
                ))
            })?;
        if lhs[start..start + rhs.len()] != *rhs {
            return Err(KernelError::invalid_argument(format!(
                "{rhs:?} does not match {lhs:?} at axis {start}"
            )));
        }
        let mut expanded = vec![1; lhs.len()];
        expanded[start..start + rhs.len()].copy_from_slice(rhs);
        Ok(expanded)
    }
}

pub struct BinaryKernel {
    op: BinaryOp,
    legacy: Option<LegacyBroadcast>,
}

impl BinaryKernel {
    /// Multidirectional broadcasting, opset 7 and later.
    pub fn new(op: BinaryOp) -> Self {
        BinaryKernel { op, legacy: None }
    }

    pub fn legacy(op: BinaryOp, info: &OpKernelInfo<'_>) -> KernelResult<Self> {
        let axis = match info.attribute("axis") {
            Some(_) => Some(info.int_or("axis", 0)?),
            None => None,
        };
        Ok(BinaryKernel {
            op,
            legacy: Some(LegacyBroadcast {
                enabled: info.int_or("broadcast", 0)? != 0,
                axis,
            }),
        })
    }

    fn compute_typed<T: Arithmetic>(&self, lhs: &Tensor, rhs: &Tensor) -> KernelResult<(Vec<usize>, TensorData)> {
        let rhs_dims = match &self.legacy {
            Some(legacy) => legacy.expand(lhs.dims(), rhs.dims())?,
            None => rhs.dims().to_vec(),
        };
        let op = self.op;
        let (dims, values) = broadcast_zip(
            lhs.as_slice::<T>()?,
            lhs.dims(),
            rhs.as_slice::<T>()?,
            &rhs_dims,
            |a, b| op.apply(a, b),
        )?;
        Ok((dims, T::wrap(values)))
    }
}

impl OpKernel for BinaryKernel {
    fn compute(&self, ctx: &mut KernelContext<'_>) -> KernelResult<()> {
        let lhs = ctx.input_tensor(0)?;
        let rhs = ctx.input_tensor(1)?;
        let (dims, data) = match lhs.element_type() {
            ElementType::F32 => self.compute_typed::<f32>(lhs, rhs)?,
            ElementType::F64 => self.compute_typed::<f64>(lhs, rhs)?,
            ElementType::I32 => self.compute_typed::<i32>(lhs, rhs)?,
            ElementType::I64 => self.compute_typed::<i64>(lhs, rhs)?,
            ElementType::U32 => self.compute_typed::<u32>(lhs, rhs)?,
            ElementType::U64 => self.compute_typed::<u64>(lhs, rhs)?,
            other => {
                return Err(KernelError::unimplemented(
                    self.op.op_type(),
                    format!("element type {other} is not supported"),
                ))
            }
        };
        ctx.set_output_tensor(0, dims, data)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Relu,
    Sigmoid,
    Tanh,
    Exp,
    Abs,
    Neg,
}

impl UnaryOp {
    pub fn op_type(self) -> &'static str {
        match self {
            UnaryOp::Relu => "Relu",
            UnaryOp::Sigmoid => "Sigmoid",
            UnaryOp::Tanh => "Tanh",
            UnaryOp::Exp => "Exp",
            UnaryOp::Abs => "Abs",
            UnaryOp::Neg => "Neg",
        }
    }

    pub fn apply_f32(self, x: f32) -> f32 {
        match self {
            UnaryOp::Relu => x.max(0.0),
            UnaryOp::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            UnaryOp::Tanh => x.tanh(),
            UnaryOp::Exp => x.exp(),
            UnaryOp::Abs => x.abs(),
            UnaryOp::Neg => -x,
        }
    }

    pub fn apply_f64(self, x: f64) -> f64 {
        match self {
            UnaryOp::Relu => x.max(0.0),
            UnaryOp::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            UnaryOp::Tanh => x.tanh(),
            UnaryOp::Exp => x.exp(),
            UnaryOp::Abs => x.abs(),
            UnaryOp::Neg => -x,
        }
    }

    /// Whether the op is also defined on signed integers.
    pub fn supports_integers(self) -> bool {
        matches!(self, UnaryOp::Abs | UnaryOp::Neg)
    }

    fn apply_int<T>(self, values: &[T], abs: fn(T) -> T, neg: fn(T) -> T) -> KernelResult<Vec<T>>
    where
        T: Copy,
    {
        let f = match self {
            UnaryOp::Abs => abs,
            UnaryOp::Neg => neg,
            other => {
                return Err(KernelError::unimplemented(
                    other.op_type(),
                    "integer inputs are not supported",
                ))
            }
        };
        Ok(values.iter().map(|&x| f(x)).collect())
    }
}

pub struct UnaryKernel {
    op: UnaryOp,
}

impl UnaryKernel {
    pub fn new(op: UnaryOp) -> Self {
        UnaryKernel { op }
    }
}

impl OpKernel for UnaryKernel {
    fn compute(&self, ctx: &mut KernelContext<'_>) -> KernelResult<()> {
        let input = ctx.input_tensor(0)?;
        let op = self.op;
        let data = match input.data() {
            TensorData::F32(values) => TensorData::F32(values.iter().map(|&x| op.apply_f32(x)).collect()),
            TensorData::F64(values) => TensorData::F64(values.iter().map(|&x| op.apply_f64(x)).collect()),
            TensorData::I32(values) => TensorData::I32(op.apply_int(values, i32::wrapping_abs, i32::wrapping_neg)?),
            TensorData::I64(values) => TensorData::I64(op.apply_int(values, i64::wrapping_abs, i64::wrapping_neg)?),
            other => {
                return Err(KernelError::unimplemented(
                    op.op_type(),
                    format!("element type {} is not supported", other.element_type()),
                ))
            }
        };
        ctx.set_output_tensor(0, input.dims().to_vec(), data)
    }
}
