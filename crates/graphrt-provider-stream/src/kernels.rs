//! Kernels that queue their work on the provider's compute stream.

use std::sync::Arc;

use graphrt::error::RegistryError;
use graphrt::types::{DataType, ElementType, TensorData, ValueData};
use graphrt::{
    Allocator, Fence, KernelContext, KernelDef, KernelError, KernelRegistry, KernelResult,
    OpKernel, Tensor, Value,
};
use graphrt_provider_cpu::kernels::broadcast::broadcast_zip;
use graphrt_provider_cpu::{BinaryOp, UnaryOp};

use crate::fence::StreamFence;
use crate::stream::ComputeStream;

#[derive(Debug, Clone, Copy)]
enum StreamOp {
    Binary(BinaryOp),
    Unary(UnaryOp),
}

/// Input `index` of a queued job. Values produced earlier on the same stream are complete by
/// the time the job runs, so this only surfaces their failures.
fn ready_input<'v>(inputs: &'v [Value], index: usize, provider: &str) -> KernelResult<&'v Tensor> {
    let value = inputs
        .get(index)
        .ok_or_else(|| KernelError::invalid_argument(format!("missing input {index}")))?;
    if let Some(fence) = value.fence() {
        fence.before_using_as_input(provider, 0)?;
    }
    Ok(value.tensor()?)
}

impl StreamOp {
    fn evaluate(self, inputs: &[Value], provider: &str) -> KernelResult<(Vec<usize>, Vec<f32>)> {
        let tensor = |index| ready_input(inputs, index, provider);
        match self {
            StreamOp::Binary(op) => {
                let (lhs, rhs) = (tensor(0)?, tensor(1)?);
                broadcast_zip(
                    lhs.as_slice::<f32>()?,
                    lhs.dims(),
                    rhs.as_slice::<f32>()?,
                    rhs.dims(),
                    |a, b| op.apply(a, b),
                )
            }
            StreamOp::Unary(op) => {
                let input = tensor(0)?;
                let values = input
                    .as_slice::<f32>()?
                    .iter()
                    .map(|&x| op.apply_f32(x))
                    .collect();
                Ok((input.dims().to_vec(), values))
            }
        }
    }
}

/// Returns a pending output immediately and fills it in once the stream reaches the job.
struct StreamKernel {
    op: StreamOp,
    stream: Arc<ComputeStream>,
    provider: String,
}

impl OpKernel for StreamKernel {
    fn compute(&self, ctx: &mut KernelContext<'_>) -> KernelResult<()> {
        let inputs = (0..ctx.input_count())
            .map(|index| {
                ctx.input(index)
                    .cloned()
                    .ok_or_else(|| KernelError::invalid_argument(format!("missing input {index}")))
            })
            .collect::<KernelResult<Vec<Value>>>()?;
        let fence = StreamFence::new(self.stream.name(), &self.provider);
        let (output, writer) = Value::pending(
            DataType::Tensor(ElementType::F32),
            Arc::clone(&fence) as Arc<dyn Fence>,
        );
        let allocator: Arc<dyn Allocator> = Arc::clone(ctx.allocator());
        let (op, provider) = (self.op, self.provider.clone());

        self.stream.submit(move || {
            let produced = op
                .evaluate(&inputs, &provider)
                .and_then(|(dims, values)| allocator.adopt(dims, TensorData::F32(values)))
                .and_then(|tensor| Ok(writer.fulfill(ValueData::Tensor(tensor))?));
            match produced {
                Ok(()) => fence.complete(),
                Err(err) => fence.fail(err.to_string()),
            }
        })?;
        ctx.set_output(0, output)
    }
}

const BINARY_OPS: [BinaryOp; 4] = [BinaryOp::Add, BinaryOp::Sub, BinaryOp::Mul, BinaryOp::Div];
const UNARY_OPS: [UnaryOp; 5] = [
    UnaryOp::Relu,
    UnaryOp::Neg,
    UnaryOp::Abs,
    UnaryOp::Sigmoid,
    UnaryOp::Tanh,
];

/// Registers the stream kernels under `provider`, all feeding `stream`.
pub fn register_kernels(
    registry: &mut KernelRegistry,
    provider: &str,
    stream: &Arc<ComputeStream>,
) -> Result<(), RegistryError> {
    let float = vec![DataType::Tensor(ElementType::F32)];
    let ops = BINARY_OPS
        .into_iter()
        .map(|op| (op.op_type(), 7, StreamOp::Binary(op)))
        .chain(UNARY_OPS.into_iter().map(|op| (op.op_type(), 6, StreamOp::Unary(op))));
    for (op_type, since, op) in ops {
        let stream = Arc::clone(stream);
        let owner = provider.to_string();
        registry.register(
            KernelDef::builder(op_type)
                .since_version(since)
                .provider(provider)
                .type_constraint("T", float.clone())
                .build()?,
            move |_info| {
                Ok(Box::new(StreamKernel {
                    op,
                    stream: Arc::clone(&stream),
                    provider: owner.clone(),
                }) as Box<dyn OpKernel>)
            },
        )?;
    }
    Ok(())
}
