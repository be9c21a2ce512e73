use std::sync::Arc;

use faer::Par;
use graphrt::error::RegistryError;
use graphrt::{Allocator, DeviceKind, ExecutionProvider, HostAllocator, KernelRegistry, MemoryInfo, MemoryType};
use tracing::debug;

use crate::kernels::register_kernels;

pub const FAER_PROVIDER: &str = "FaerExecutionProvider";

fn parallelism(threads: usize) -> Par {
    match threads {
        0 => {
            let par = faer::get_global_parallelism();
            if par.degree() == 1 {
                Par::Seq
            } else {
                par
            }
        }
        1 => Par::Seq,
        threads => Par::rayon(threads),
    }
}

/// Host provider that runs `MatMul` and `Gemm` on faer's blocked matrix kernels.
///
/// Its memory is host memory under its own name, so values cross to and from the CPU provider
/// without copies.
pub struct FaerExecutionProvider {
    registry: KernelRegistry,
    allocator: Arc<HostAllocator>,
    threads: usize,
}

impl FaerExecutionProvider {
    /// Uses faer's global parallelism setting.
    pub fn new() -> Self {
        Self::with_threads(0)
    }

    /// Runs products on `threads` threads; `0` defers to faer's global setting.
    pub fn with_threads(threads: usize) -> Self {
        Self::try_with_threads(threads).expect("faer kernels register without conflicts")
    }

    pub fn try_with_threads(threads: usize) -> Result<Self, RegistryError> {
        let mut registry = KernelRegistry::new();
        register_kernels(&mut registry, FAER_PROVIDER, parallelism(threads))?;
        debug!(threads, kernels = registry.len(), "created faer execution provider");
        Ok(FaerExecutionProvider {
            registry,
            allocator: Arc::new(HostAllocator::new(MemoryInfo::new(
                "Faer",
                DeviceKind::Cpu,
                0,
                MemoryType::Default,
            ))),
            threads,
        })
    }

    pub fn threads(&self) -> usize {
        self.threads
    }
}

impl Default for FaerExecutionProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionProvider for FaerExecutionProvider {
    fn provider_type(&self) -> &str {
        FAER_PROVIDER
    }

    fn kernel_registry(&self) -> &KernelRegistry {
        &self.registry
    }

    fn allocator(&self, _mem_type: MemoryType) -> Option<Arc<dyn Allocator>> {
        Some(Arc::clone(&self.allocator) as Arc<dyn Allocator>)
    }
}
