//! `MatMul` with numpy batching semantics and `Gemm`.

use graphrt::types::{ElementType, Tensor, TensorData, TensorElement};
use graphrt::{KernelContext, KernelError, KernelResult, OpKernel, OpKernelInfo};

use super::broadcast::{broadcast_shape, BroadcastOffsets};

/// Scalar the naive matrix product accumulates in. Integer products wrap.
pub trait MatElement: TensorElement + Copy + Default {
    fn mul_acc(acc: Self, lhs: Self, rhs: Self) -> Self;
}

macro_rules! float_mat {
    ($($ty:ty),*) => {$(
        impl MatElement for $ty {
            fn mul_acc(acc: Self, lhs: Self, rhs: Self) -> Self { acc + lhs * rhs }
        }
    )*};
}

macro_rules! int_mat {
    ($($ty:ty),*) => {$(
        impl MatElement for $ty {
            fn mul_acc(acc: Self, lhs: Self, rhs: Self) -> Self {
                acc.wrapping_add(lhs.wrapping_mul(rhs))
            }
        }
    )*};
}

float_mat!(f32, f64);
int_mat!(i32, i64, u32, u64);

pub const MATMUL_TYPES: [ElementType; 6] = [
    ElementType::F32,
    ElementType::F64,
    ElementType::I32,
    ElementType::I64,
    ElementType::U32,
    ElementType::U64,
];

/// Row-major `out[m, n] = lhs[m, k] * rhs[k, n]`.
pub fn gemm_naive<T: MatElement>(lhs: &[T], rhs: &[T], out: &mut [T], m: usize, k: usize, n: usize) {
    for row in 0..m {
        for col in 0..n {
            let mut acc = T::default();
            for inner in 0..k {
                acc = T::mul_acc(acc, lhs[row * k + inner], rhs[inner * n + col]);
            }
            out[row * n + col] = acc;
        }
    }
}

/// Batched matrix product with numpy semantics.
///
/// A 1-D left operand is treated as a row vector and a 1-D right operand as a column vector;
/// the added axis is removed from the result. Leading batch dimensions broadcast. `gemm`
/// computes one row-major `[m, k] x [k, n]` product into a zeroed `[m, n]` buffer.
pub fn batched_matmul_with<T, G>(
    lhs: &[T],
    lhs_dims: &[usize],
    rhs: &[T],
    rhs_dims: &[usize],
    mut gemm: G,
) -> KernelResult<(Vec<usize>, Vec<T>)>
where
    T: Copy + Default,
    G: FnMut(&[T], &[T], &mut [T], usize, usize, usize),
{
    if lhs_dims.is_empty() || rhs_dims.is_empty() {
        return Err(KernelError::invalid_argument("MatMul operands must have rank >= 1"));
    }
    let lhs_matrix: Vec<usize> = if lhs_dims.len() == 1 {
        vec![1, lhs_dims[0]]
    } else {
        lhs_dims.to_vec()
    };
    let rhs_matrix: Vec<usize> = if rhs_dims.len() == 1 {
        vec![rhs_dims[0], 1]
    } else {
        rhs_dims.to_vec()
    };
    let (lhs_batch, lhs_mk) = lhs_matrix.split_at(lhs_matrix.len() - 2);
    let (rhs_batch, rhs_kn) = rhs_matrix.split_at(rhs_matrix.len() - 2);
    let (m, k) = (lhs_mk[0], lhs_mk[1]);
    let (k_rhs, n) = (rhs_kn[0], rhs_kn[1]);
    if k != k_rhs {
        return Err(KernelError::invalid_argument(format!(
            "MatMul inner dimensions differ: {lhs_dims:?} x {rhs_dims:?}"
        )));
    }

    let batch = broadcast_shape(lhs_batch, rhs_batch)?;
    let batches: usize = batch.iter().product();
    let mut out = vec![T::default(); batches * m * n];
    let (lhs_size, rhs_size, out_size) = (m * k, k * n, m * n);
    for (index, (lhs_batch_idx, rhs_batch_idx)) in
        BroadcastOffsets::new(lhs_batch, rhs_batch, &batch).enumerate()
    {
        let lhs_start = lhs_batch_idx * lhs_size;
        let rhs_start = rhs_batch_idx * rhs_size;
        gemm(
            &lhs[lhs_start..lhs_start + lhs_size],
            &rhs[rhs_start..rhs_start + rhs_size],
            &mut out[index * out_size..(index + 1) * out_size],
            m,
            k,
            n,
        );
    }

    let mut dims = batch;
    if lhs_dims.len() > 1 {
        dims.push(m);
    }
    if rhs_dims.len() > 1 {
        dims.push(n);
    }
    Ok((dims, out))
}

pub struct MatMulKernel;

fn matmul_typed<T: MatElement>(lhs: &Tensor, rhs: &Tensor) -> KernelResult<(Vec<usize>, TensorData)> {
    let (dims, values) = batched_matmul_with(
        lhs.as_slice::<T>()?,
        lhs.dims(),
        rhs.as_slice::<T>()?,
        rhs.dims(),
        gemm_naive::<T>,
    )?;
    Ok((dims, T::wrap(values)))
}

impl OpKernel for MatMulKernel {
    fn compute(&self, ctx: &mut KernelContext<'_>) -> KernelResult<()> {
        let lhs = ctx.input_tensor(0)?;
        let rhs = ctx.input_tensor(1)?;
        let (dims, data) = match lhs.element_type() {
            ElementType::F32 => matmul_typed::<f32>(lhs, rhs)?,
            ElementType::F64 => matmul_typed::<f64>(lhs, rhs)?,
            ElementType::I32 => matmul_typed::<i32>(lhs, rhs)?,
            ElementType::I64 => matmul_typed::<i64>(lhs, rhs)?,
            ElementType::U32 => matmul_typed::<u32>(lhs, rhs)?,
            ElementType::U64 => matmul_typed::<u64>(lhs, rhs)?,
            other => {
                return Err(KernelError::unimplemented(
                    "MatMul",
                    format!("element type {other} is not supported"),
                ))
            }
        };
        ctx.set_output_tensor(0, dims, data)
    }
}

/// `Gemm` attributes read once at kernel creation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GemmParams {
    pub alpha: f32,
    pub beta: f32,
    pub trans_a: bool,
    pub trans_b: bool,
}

impl GemmParams {
    pub fn from_info(info: &OpKernelInfo<'_>) -> KernelResult<Self> {
        Ok(GemmParams {
            alpha: info.float_or("alpha", 1.0)?,
            beta: info.float_or("beta", 1.0)?,
            trans_a: info.int_or("transA", 0)? != 0,
            trans_b: info.int_or("transB", 0)? != 0,
        })
    }

    /// `(m, k, n)` of the product after applying the transpose flags.
    pub fn dims(&self, a: &[usize], b: &[usize]) -> KernelResult<(usize, usize, usize)> {
        if a.len() != 2 || b.len() != 2 {
            return Err(KernelError::invalid_argument(format!(
                "Gemm expects 2-D operands, got {a:?} and {b:?}"
            )));
        }
        let (m, k) = if self.trans_a { (a[1], a[0]) } else { (a[0], a[1]) };
        let (k_b, n) = if self.trans_b { (b[1], b[0]) } else { (b[0], b[1]) };
        if k != k_b {
            return Err(KernelError::invalid_argument(format!(
                "Gemm inner dimensions differ: {a:?} x {b:?} (transA={}, transB={})",
                self.trans_a, self.trans_b
            )));
        }
        Ok((m, k, n))
    }
}

/// Copies `values` viewed as `[rows, cols]` into row-major transposed order.
pub fn transpose<T: Copy>(values: &[T], rows: usize, cols: usize) -> Vec<T> {
    let mut out = Vec::with_capacity(values.len());
    for col in 0..cols {
        for row in 0..rows {
            out.push(values[row * cols + col]);
        }
    }
    out
}

/// Floats `Gemm` is computed on.
pub trait GemmElement: MatElement + std::ops::Mul<Output = Self> + std::ops::Add<Output = Self> + From<f32> {}

impl GemmElement for f32 {}
impl GemmElement for f64 {}

/// `alpha * A' * B' + beta * C` with `C` unidirectionally broadcast to `[m, n]`.
pub fn gemm_with<T, G>(
    params: &GemmParams,
    a: &Tensor,
    b: &Tensor,
    c: Option<&Tensor>,
    gemm: G,
) -> KernelResult<(Vec<usize>, Vec<T>)>
where
    T: GemmElement,
    G: FnOnce(&[T], &[T], &mut [T], usize, usize, usize),
{
    let (m, k, n) = params.dims(a.dims(), b.dims())?;
    let a_values = a.as_slice::<T>()?;
    let b_values = b.as_slice::<T>()?;
    let a_values = if params.trans_a {
        transpose(a_values, k, m)
    } else {
        a_values.to_vec()
    };
    let b_values = if params.trans_b {
        transpose(b_values, n, k)
    } else {
        b_values.to_vec()
    };

    let mut out = vec![T::default(); m * n];
    gemm(&a_values, &b_values, &mut out, m, k, n);

    let alpha = T::from(params.alpha);
    let beta = T::from(params.beta);
    let out_dims = vec![m, n];
    match c {
        Some(c) => {
            let bias_dims = broadcast_shape(c.dims(), &out_dims)?;
            if bias_dims != out_dims {
                return Err(KernelError::invalid_argument(format!(
                    "Gemm bias {:?} does not broadcast to {out_dims:?}",
                    c.dims()
                )));
            }
            let bias = c.as_slice::<T>()?;
            for (value, (_, bias_idx)) in out
                .iter_mut()
                .zip(BroadcastOffsets::new(&out_dims, c.dims(), &out_dims))
            {
                *value = alpha * *value + beta * bias[bias_idx];
            }
        }
        None => {
            for value in &mut out {
                *value = alpha * *value;
            }
        }
    }
    Ok((out_dims, out))
}

pub struct GemmKernel {
    params: GemmParams,
}

impl GemmKernel {
    pub fn new(info: &OpKernelInfo<'_>) -> KernelResult<Self> {
        Ok(GemmKernel {
            params: GemmParams::from_info(info)?,
        })
    }
}

impl OpKernel for GemmKernel {
    fn compute(&self, ctx: &mut KernelContext<'_>) -> KernelResult<()> {
        let a = ctx.input_tensor(0)?;
        let b = ctx.input_tensor(1)?;
        let c = ctx.optional_input_tensor(2)?;
        let (dims, data) = match a.element_type() {
            ElementType::F32 => {
                let (dims, values) = gemm_with::<f32, _>(&self.params, a, b, c, gemm_naive::<f32>)?;
                (dims, TensorData::F32(values))
            }
            ElementType::F64 => {
                let (dims, values) = gemm_with::<f64, _>(&self.params, a, b, c, gemm_naive::<f64>)?;
                (dims, TensorData::F64(values))
            }
            other => {
                return Err(KernelError::unimplemented(
                    "Gemm",
                    format!("element type {other} is not supported"),
                ))
            }
        };
        ctx.set_output_tensor(0, dims, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vectors_drop_their_added_axis() {
        let (dims, values) =
            batched_matmul_with(&[1.0f32, 2.0], &[2], &[3.0, 4.0], &[2], gemm_naive::<f32>).unwrap();
        assert!(dims.is_empty());
        assert_eq!(values, vec![11.0]);

        let (dims, values) = batched_matmul_with(
            &[1.0f32, 2.0],
            &[2],
            &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            &[2, 3],
            gemm_naive::<f32>,
        )
        .unwrap();
        assert_eq!(dims, vec![3]);
        assert_eq!(values, vec![9.0, 12.0, 15.0]);
    }

    #[test]
    fn batch_dimensions_broadcast() {
        // [2, 1, 2] x [2, 2] -> [2, 1, 2]
        let lhs = [1i64, 0, 0, 1];
        let rhs = [1i64, 2, 3, 4];
        let (dims, values) =
            batched_matmul_with(&lhs, &[2, 1, 2], &rhs, &[2, 2], gemm_naive::<i64>).unwrap();
        assert_eq!(dims, vec![2, 1, 2]);
        assert_eq!(values, vec![1, 2, 3, 4]);
    }

    #[test]
    fn mismatched_inner_dimensions_fail() {
        assert!(batched_matmul_with(&[0.0f32; 6], &[2, 3], &[0.0; 6], &[2, 3], gemm_naive::<f32>).is_err());
    }

    #[test]
    fn transpose_swaps_rows_and_columns() {
        assert_eq!(transpose(&[1, 2, 3, 4, 5, 6], 2, 3), vec![1, 4, 2, 5, 3, 6]);
    }
}
