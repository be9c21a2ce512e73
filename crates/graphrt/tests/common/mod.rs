#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use graphrt::graph::{Model, NodeArg};
use graphrt::kernel::{KernelContext, KernelDef, KernelRegistry, OpKernel};
use graphrt::memory::{Allocator, HostAllocator, MemoryType};
use graphrt::types::{DataType, ElementType, TensorData};
use graphrt::{ExecutionProvider, KernelError, KernelResult};

pub const HOST_PROVIDER: &str = "TestHostProvider";

/// Minimal host provider with float `Add` and `Relu` kernels.
pub struct HostProvider {
    name: String,
    registry: KernelRegistry,
    allocator: Arc<HostAllocator>,
    pub executed: Arc<AtomicUsize>,
}

struct AddF32 {
    executed: Arc<AtomicUsize>,
}

impl OpKernel for AddF32 {
    fn compute(&self, ctx: &mut KernelContext<'_>) -> KernelResult<()> {
        let lhs = ctx.input_tensor(0)?;
        let rhs = ctx.input_tensor(1)?;
        if lhs.dims() != rhs.dims() {
            return Err(KernelError::invalid_argument("test Add needs equal shapes"));
        }
        let sum = lhs
            .as_slice::<f32>()?
            .iter()
            .zip(rhs.as_slice::<f32>()?)
            .map(|(a, b)| a + b)
            .collect();
        self.executed.fetch_add(1, Ordering::SeqCst);
        ctx.set_output_tensor(0, lhs.dims().to_vec(), TensorData::F32(sum))
    }
}

struct ReluF32 {
    executed: Arc<AtomicUsize>,
}

impl OpKernel for ReluF32 {
    fn compute(&self, ctx: &mut KernelContext<'_>) -> KernelResult<()> {
        let input = ctx.input_tensor(0)?;
        let out = input.as_slice::<f32>()?.iter().map(|v| v.max(0.0)).collect();
        self.executed.fetch_add(1, Ordering::SeqCst);
        ctx.set_output_tensor(0, input.dims().to_vec(), TensorData::F32(out))
    }
}

impl HostProvider {
    pub fn new() -> Self {
        Self::named(HOST_PROVIDER)
    }

    pub fn named(name: &str) -> Self {
        let executed = Arc::new(AtomicUsize::new(0));
        let float = vec![DataType::Tensor(ElementType::F32)];
        let mut registry = KernelRegistry::new();
        let counter = Arc::clone(&executed);
        registry
            .register(
                KernelDef::builder("Add")
                    .since_version(7)
                    .provider(name)
                    .type_constraint("T", float.clone())
                    .build()
                    .unwrap(),
                move |_info| {
                    Ok(Box::new(AddF32 {
                        executed: Arc::clone(&counter),
                    }) as Box<dyn OpKernel>)
                },
            )
            .unwrap();
        let counter = Arc::clone(&executed);
        registry
            .register(
                KernelDef::builder("Relu")
                    .since_version(6)
                    .provider(name)
                    .type_constraint("T", float)
                    .build()
                    .unwrap(),
                move |_info| {
                    Ok(Box::new(ReluF32 {
                        executed: Arc::clone(&counter),
                    }) as Box<dyn OpKernel>)
                },
            )
            .unwrap();
        HostProvider {
            name: name.to_string(),
            registry,
            allocator: Arc::new(HostAllocator::cpu()),
            executed,
        }
    }
}

impl ExecutionProvider for HostProvider {
    fn provider_type(&self) -> &str {
        &self.name
    }

    fn kernel_registry(&self) -> &KernelRegistry {
        &self.registry
    }

    fn allocator(&self, _mem_type: MemoryType) -> Option<Arc<dyn Allocator>> {
        Some(Arc::clone(&self.allocator) as Arc<dyn Allocator>)
    }
}

pub fn f32_arg(name: &str, dims: &[usize]) -> NodeArg {
    NodeArg::tensor(name, ElementType::F32, dims)
}

/// `y = Add(Relu(x), b)` over `[2]` floats.
pub fn relu_add_model() -> Model {
    let mut model = Model::new("relu_add", BTreeMap::from([(String::new(), 9)]));
    let graph = model.main_graph_mut();
    graph
        .add_node("relu", "Relu", "", &[f32_arg("x", &[2])], &[NodeArg::new("h", None)], None, "")
        .unwrap();
    graph
        .add_node(
            "add",
            "Add",
            "",
            &[NodeArg::new("h", None), f32_arg("b", &[2])],
            &[NodeArg::new("y", None)],
            None,
            "",
        )
        .unwrap();
    model
}
