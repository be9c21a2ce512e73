use faer::linalg::matmul::matmul;
use faer::mat::{MatMut, MatRef};
use faer::{Accum, Par};
use graphrt::error::RegistryError;
use graphrt::types::{DataType, ElementType, TensorData};
use graphrt::{KernelContext, KernelDef, KernelError, KernelRegistry, KernelResult, OpKernel, OpKernelInfo};
use graphrt_provider_cpu::{batched_matmul_with, gemm_with, GemmParams};

/// Row-major `out[m, n] = lhs[m, k] * rhs[k, n]` through faer.
///
/// faer prefers column-major output, so this computes `C^T = B^T * A^T` into an `n x m`
/// column-major view whose buffer is exactly the row-major `m x n` result.
pub fn faer_gemm(par: Par) -> impl FnMut(&[f32], &[f32], &mut [f32], usize, usize, usize) {
    move |lhs: &[f32], rhs: &[f32], out: &mut [f32], m: usize, k: usize, n: usize| {
        if m == 0 || n == 0 {
            return;
        }
        if k == 0 {
            out.fill(0.0);
            return;
        }
        let lhs_view = MatRef::from_row_major_slice(lhs, m, k);
        let rhs_view = MatRef::from_row_major_slice(rhs, k, n);
        let mut out_view = MatMut::from_column_major_slice_mut(out, n, m);
        matmul(
            &mut out_view,
            Accum::Replace,
            rhs_view.transpose(),
            lhs_view.transpose(),
            1.0f32,
            par,
        );
    }
}

fn expect_f32(op: &str, ctx: &KernelContext<'_>) -> KernelResult<()> {
    let element_type = ctx.input_tensor(0)?.element_type();
    if element_type != ElementType::F32 {
        return Err(KernelError::unimplemented(
            op,
            format!("faer kernels handle f32 only, got {element_type}"),
        ));
    }
    Ok(())
}

struct FaerMatMul {
    par: Par,
}

impl OpKernel for FaerMatMul {
    fn compute(&self, ctx: &mut KernelContext<'_>) -> KernelResult<()> {
        expect_f32("MatMul", ctx)?;
        let lhs = ctx.input_tensor(0)?;
        let rhs = ctx.input_tensor(1)?;
        let (dims, values) = batched_matmul_with(
            lhs.as_slice::<f32>()?,
            lhs.dims(),
            rhs.as_slice::<f32>()?,
            rhs.dims(),
            faer_gemm(self.par),
        )?;
        ctx.set_output_tensor(0, dims, TensorData::F32(values))
    }
}

struct FaerGemm {
    params: GemmParams,
    par: Par,
}

impl FaerGemm {
    fn new(info: &OpKernelInfo<'_>, par: Par) -> KernelResult<Self> {
        Ok(FaerGemm {
            params: GemmParams::from_info(info)?,
            par,
        })
    }
}

impl OpKernel for FaerGemm {
    fn compute(&self, ctx: &mut KernelContext<'_>) -> KernelResult<()> {
        expect_f32("Gemm", ctx)?;
        let a = ctx.input_tensor(0)?;
        let b = ctx.input_tensor(1)?;
        let c = ctx.optional_input_tensor(2)?;
        let (dims, values) = gemm_with::<f32, _>(&self.params, a, b, c, faer_gemm(self.par))?;
        ctx.set_output_tensor(0, dims, TensorData::F32(values))
    }
}

/// Registers the faer `MatMul` and `Gemm` kernels under `provider`.
pub fn register_kernels(registry: &mut KernelRegistry, provider: &str, par: Par) -> Result<(), RegistryError> {
    let float = vec![DataType::Tensor(ElementType::F32)];
    registry.register(
        KernelDef::builder("MatMul")
            .provider(provider)
            .type_constraint("T", float.clone())
            .build()?,
        move |_info| Ok(Box::new(FaerMatMul { par }) as Box<dyn OpKernel>),
    )?;
    registry.register(
        KernelDef::builder("Gemm")
            .since_version(7)
            .provider(provider)
            .type_constraint("T", float)
            .build()?,
        move |info| Ok(Box::new(FaerGemm::new(info, par)?) as Box<dyn OpKernel>),
    )?;
    Ok(())
}
