//! Reference CPU execution provider.
//!
//! Besides the provider itself this crate exposes the kernel math (broadcasting, batched
//! matrix products, activations) so other host-side providers can reuse it.

pub mod kernels;
mod provider;

pub use kernels::elementwise::{Arithmetic, BinaryOp, UnaryOp};
pub use kernels::matmul::{batched_matmul_with, gemm_with, GemmParams};
pub use kernels::register_kernels;
pub use provider::CpuExecutionProvider;
