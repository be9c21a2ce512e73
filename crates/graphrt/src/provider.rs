//! Execution provider abstraction.
//!
//! A provider advertises what it can run only through its kernel registry. The session never
//! inspects a provider beyond this trait.

use std::sync::Arc;

use crate::error::{KernelError, KernelResult};
use crate::kernel::KernelRegistry;
use crate::memory::{Allocator, MemoryType};
use crate::types::Tensor;

/// Identity of the reference CPU provider. Fetched values are always fenced against it.
pub const CPU_PROVIDER: &str = "CPUExecutionProvider";

/// Backend that owns kernels and memory for one kind of device.
pub trait ExecutionProvider: Send + Sync {
    /// Unique identifier, e.g. `"CPUExecutionProvider"`.
    fn provider_type(&self) -> &str;

    fn kernel_registry(&self) -> &KernelRegistry;

    /// Allocator for `mem_type`, if the provider has one.
    fn allocator(&self, mem_type: MemoryType) -> Option<Arc<dyn Allocator>>;

    /// Copies `src` into this provider's `target` memory.
    fn copy_tensor(&self, src: &Tensor, target: MemoryType) -> KernelResult<Tensor> {
        let allocator = self.allocator(target).ok_or_else(|| {
            KernelError::execution(format!(
                "{} has no allocator for {target:?}",
                self.provider_type()
            ))
        })?;
        allocator.adopt(src.dims().to_vec(), src.data().clone())
    }

    /// Providers whose arithmetic is expected to drift further from the CPU reference.
    fn reduced_precision(&self) -> bool {
        false
    }
}
