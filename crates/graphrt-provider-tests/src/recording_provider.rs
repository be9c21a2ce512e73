use std::sync::{Arc, Mutex};

use graphrt::error::RegistryError;
use graphrt::types::{DataType, ValueData};
use graphrt::{
    Allocator, DeviceKind, ExecutionProvider, HostAllocator, KernelContext, KernelDef,
    KernelRegistry, KernelResult, MemoryInfo, MemoryType, OpKernel, Value,
};

use crate::strict_fence::StrictFence;

/// One kernel invocation seen by a [`RecordingProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedNode {
    pub provider: String,
    pub node: String,
    pub op_type: String,
}

pub type ExecutionLog = Arc<Mutex<Vec<ExecutedNode>>>;

/// Test-only provider whose kernels forward their first input to every output and record the
/// node they ran.
///
/// With [`RecordingProvider::deferred`] outputs are published behind a [`StrictFence`], so a
/// consumer that reads them without waiting first fails.
pub struct RecordingProvider {
    name: String,
    registry: KernelRegistry,
    allocator: Arc<HostAllocator>,
    log: ExecutionLog,
}

struct ForwardKernel {
    provider: String,
    log: ExecutionLog,
    deferred: bool,
}

impl OpKernel for ForwardKernel {
    fn compute(&self, ctx: &mut KernelContext<'_>) -> KernelResult<()> {
        let node = ctx.node();
        self.log
            .lock()
            .expect("provider mutex poisoned")
            .push(ExecutedNode {
                provider: self.provider.clone(),
                node: node.name().to_string(),
                op_type: node.op_type().to_string(),
            });
        let input = ctx.input_tensor(0)?.clone();
        for index in 0..ctx.output_count() {
            if !ctx.output_exists(index) {
                continue;
            }
            let tensor = ctx
                .allocator()
                .adopt(input.dims().to_vec(), input.data().clone())?;
            let value = if self.deferred {
                StrictFence::fenced_value(ValueData::Tensor(tensor)).0
            } else {
                Value::from_tensor(tensor)
            };
            ctx.set_output(index, value)?;
        }
        Ok(())
    }
}

impl RecordingProvider {
    /// Provider claiming `ops` (default domain, every version) for all tensor types.
    pub fn new(name: &str, ops: &[&str]) -> Result<Self, RegistryError> {
        Self::build(name, ops, false)
    }

    /// Like [`RecordingProvider::new`], but every output is fenced.
    pub fn deferred(name: &str, ops: &[&str]) -> Result<Self, RegistryError> {
        Self::build(name, ops, true)
    }

    fn build(name: &str, ops: &[&str], deferred: bool) -> Result<Self, RegistryError> {
        let log = ExecutionLog::default();
        let mut registry = KernelRegistry::new();
        for op in ops {
            let def = KernelDef::builder(op)
                .provider(name)
                .type_constraint("T", DataType::all_tensors())
                .build()?;
            let provider = name.to_string();
            let kernel_log = Arc::clone(&log);
            registry.register(def, move |_info| {
                Ok(Box::new(ForwardKernel {
                    provider: provider.clone(),
                    log: Arc::clone(&kernel_log),
                    deferred,
                }) as Box<dyn OpKernel>)
            })?;
        }
        Ok(RecordingProvider {
            name: name.to_string(),
            registry,
            allocator: Arc::new(HostAllocator::new(MemoryInfo::new(
                name,
                DeviceKind::Cpu,
                0,
                MemoryType::Default,
            ))),
            log,
        })
    }

    /// Shared handle to the execution log; stays valid after the provider moves into a session.
    pub fn log(&self) -> ExecutionLog {
        Arc::clone(&self.log)
    }

    pub fn executed(log: &ExecutionLog) -> Vec<ExecutedNode> {
        log.lock().expect("provider mutex poisoned").clone()
    }
}

impl ExecutionProvider for RecordingProvider {
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
