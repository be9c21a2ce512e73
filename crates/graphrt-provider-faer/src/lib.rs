//! graphrt execution provider backed by the faer linear-algebra crate.
//!
//! Only the matrix products are claimed here. Register it ahead of the CPU provider so that
//! `MatMul` and `Gemm` nodes land on faer while everything else falls through to the CPU.

pub mod kernels;
mod provider;

pub use kernels::faer_gemm;
pub use provider::{FaerExecutionProvider, FAER_PROVIDER};
