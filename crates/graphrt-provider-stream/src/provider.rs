use std::sync::Arc;

use graphrt::{Allocator, DeviceKind, ExecutionProvider, HostAllocator, KernelRegistry, MemoryInfo, MemoryType};
use tracing::debug;

use crate::error::StreamError;
use crate::kernels::register_kernels;
use crate::stream::ComputeStream;

pub const STREAM_PROVIDER: &str = "StreamExecutionProvider";

/// Provider emulating an asynchronous device with its own memory.
///
/// Kernels return immediately with pending outputs and the work runs later on a single
/// in-order [`ComputeStream`]. Device memory is not host accessible, so the session copies
/// values in through the default allocator and out through the `CpuOutput` one.
pub struct StreamExecutionProvider {
    registry: KernelRegistry,
    stream: Arc<ComputeStream>,
    device: Arc<HostAllocator>,
    pinned_input: Arc<HostAllocator>,
    pinned_output: Arc<HostAllocator>,
}

impl StreamExecutionProvider {
    pub fn try_new() -> Result<Self, StreamError> {
        let stream = Arc::new(ComputeStream::spawn("graphrt-stream-0")?);
        let mut registry = KernelRegistry::new();
        register_kernels(&mut registry, STREAM_PROVIDER, &stream)?;
        debug!(kernels = registry.len(), stream = %stream.name(), "created stream execution provider");
        let memory = |mem_type| {
            Arc::new(HostAllocator::new(MemoryInfo::new(
                "Stream",
                DeviceKind::Gpu,
                0,
                mem_type,
            )))
        };
        Ok(StreamExecutionProvider {
            registry,
            stream,
            device: memory(MemoryType::Default),
            pinned_input: memory(MemoryType::CpuInput),
            pinned_output: memory(MemoryType::CpuOutput),
        })
    }

    pub fn new() -> Self {
        Self::try_new().expect("stream provider starts its worker")
    }

    pub fn stream(&self) -> &Arc<ComputeStream> {
        &self.stream
    }
}

impl Default for StreamExecutionProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionProvider for StreamExecutionProvider {
    fn provider_type(&self) -> &str {
        STREAM_PROVIDER
    }

    fn kernel_registry(&self) -> &KernelRegistry {
        &self.registry
    }

    fn allocator(&self, mem_type: MemoryType) -> Option<Arc<dyn Allocator>> {
        let allocator = match mem_type {
            MemoryType::Default => &self.device,
            MemoryType::CpuInput => &self.pinned_input,
            MemoryType::CpuOutput => &self.pinned_output,
        };
        Some(Arc::clone(allocator) as Arc<dyn Allocator>)
    }

    fn reduced_precision(&self) -> bool {
        true
    }
}
