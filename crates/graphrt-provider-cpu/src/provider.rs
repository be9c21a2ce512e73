use std::sync::Arc;

use graphrt::error::RegistryError;
use graphrt::provider::CPU_PROVIDER;
use graphrt::{Allocator, ExecutionProvider, HostAllocator, KernelRegistry, MemoryType};
use tracing::debug;

use crate::kernels::register_kernels;

/// Reference provider executing every kernel on the host.
///
/// All three memory types share one host allocator, so values produced here never need a copy
/// before another host provider reads them.
pub struct CpuExecutionProvider {
    registry: KernelRegistry,
    allocator: Arc<HostAllocator>,
}

impl CpuExecutionProvider {
    pub fn try_new() -> Result<Self, RegistryError> {
        let mut registry = KernelRegistry::new();
        register_kernels(&mut registry, CPU_PROVIDER)?;
        debug!(kernels = registry.len(), "created CPU execution provider");
        Ok(CpuExecutionProvider {
            registry,
            allocator: Arc::new(HostAllocator::cpu()),
        })
    }

    pub fn new() -> Self {
        Self::try_new().expect("reference kernels register without conflicts")
    }

    pub fn host_allocator(&self) -> &Arc<HostAllocator> {
        &self.allocator
    }
}

impl Default for CpuExecutionProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionProvider for CpuExecutionProvider {
    fn provider_type(&self) -> &str {
        CPU_PROVIDER
    }

    fn kernel_registry(&self) -> &KernelRegistry {
        &self.registry
    }

    fn allocator(&self, _mem_type: MemoryType) -> Option<Arc<dyn Allocator>> {
        Some(Arc::clone(&self.allocator) as Arc<dyn Allocator>)
    }
}
