//! Memory spaces and allocators exposed by execution providers.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::KernelResult;
use crate::types::{ElementType, Tensor, TensorData};

/// Which of a provider's allocators a buffer comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MemoryType {
    /// Device-default memory of the provider.
    #[default]
    Default,
    /// Host memory the device reads inputs from.
    CpuInput,
    /// Host memory the device writes host-visible outputs to.
    CpuOutput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DeviceKind {
    #[default]
    Cpu,
    Gpu,
    Accelerator,
}

/// Identifies the allocator a tensor lives in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemoryInfo {
    pub name: String,
    pub device: DeviceKind,
    pub device_id: u32,
    pub mem_type: MemoryType,
}

impl MemoryInfo {
    pub fn new(name: impl Into<String>, device: DeviceKind, device_id: u32, mem_type: MemoryType) -> Self {
        MemoryInfo {
            name: name.into(),
            device,
            device_id,
            mem_type,
        }
    }

    pub fn cpu() -> Self {
        MemoryInfo::new("Cpu", DeviceKind::Cpu, 0, MemoryType::Default)
    }

    /// Whether host code may read the buffer directly.
    pub fn is_host_accessible(&self) -> bool {
        self.device == DeviceKind::Cpu || self.mem_type != MemoryType::Default
    }

    /// Whether two buffers can be exchanged without a copy.
    pub fn same_space(&self, other: &MemoryInfo) -> bool {
        if self.is_host_accessible() && other.is_host_accessible() {
            return true;
        }
        self.device == other.device && self.device_id == other.device_id
    }
}

impl Default for MemoryInfo {
    fn default() -> Self {
        MemoryInfo::cpu()
    }
}

impl fmt::Display for MemoryInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{:?}:{} ({:?})",
            self.name, self.device, self.device_id, self.mem_type
        )
    }
}

/// Snapshot of an allocator's accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AllocatorStats {
    pub in_use_bytes: usize,
    pub peak_bytes: usize,
    pub total_allocations: usize,
}

#[derive(Debug, Default)]
struct Counters {
    in_use: AtomicUsize,
    peak: AtomicUsize,
    allocations: AtomicUsize,
}

impl Counters {
    fn acquire(&self, bytes: usize) {
        let now = self.in_use.fetch_add(bytes, Ordering::AcqRel) + bytes;
        self.peak.fetch_max(now, Ordering::AcqRel);
        self.allocations.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> AllocatorStats {
        AllocatorStats {
            in_use_bytes: self.in_use.load(Ordering::Acquire),
            peak_bytes: self.peak.load(Ordering::Acquire),
            total_allocations: self.allocations.load(Ordering::Relaxed),
        }
    }
}

/// Bytes charged to an allocator for as long as the owning buffer is alive.
#[derive(Debug)]
pub struct AllocationRecord {
    bytes: usize,
    counters: Arc<Counters>,
}

impl Drop for AllocationRecord {
    fn drop(&mut self) {
        self.counters.in_use.fetch_sub(self.bytes, Ordering::AcqRel);
    }
}

/// Hands out tensors in one memory space.
pub trait Allocator: Send + Sync {
    fn info(&self) -> &MemoryInfo;

    /// Places freshly computed `data` with shape `dims` in this memory space.
    fn adopt(&self, dims: Vec<usize>, data: TensorData) -> KernelResult<Tensor>;

    /// Allocates a zero-filled tensor.
    fn alloc(&self, element_type: ElementType, dims: &[usize]) -> KernelResult<Tensor> {
        let len = dims.iter().product();
        self.adopt(dims.to_vec(), TensorData::zeros(element_type, len))
    }

    fn stats(&self) -> AllocatorStats;
}

/// Allocator backed by host memory. Devices that share host memory reuse it with their own
/// [`MemoryInfo`].
#[derive(Debug)]
pub struct HostAllocator {
    info: MemoryInfo,
    counters: Arc<Counters>,
}

impl HostAllocator {
    pub fn new(info: MemoryInfo) -> Self {
        HostAllocator {
            info,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn cpu() -> Self {
        HostAllocator::new(MemoryInfo::cpu())
    }
}

impl Default for HostAllocator {
    fn default() -> Self {
        HostAllocator::cpu()
    }
}

impl Allocator for HostAllocator {
    fn info(&self) -> &MemoryInfo {
        &self.info
    }

    fn adopt(&self, dims: Vec<usize>, data: TensorData) -> KernelResult<Tensor> {
        let bytes = data.size_in_bytes();
        let tensor = Tensor::new(dims, data)?;
        self.counters.acquire(bytes);
        let record = AllocationRecord {
            bytes,
            counters: Arc::clone(&self.counters),
        };
        Ok(tensor.placed(self.info.clone(), Some(record)))
    }

    fn stats(&self) -> AllocatorStats {
        self.counters.snapshot()
    }
}
