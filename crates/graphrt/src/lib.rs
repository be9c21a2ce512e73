//! Graph model execution engine.
//!
//! A [`Model`] holds a computation graph whose nodes are operators and whose edges are typed
//! values. An [`InferenceSession`] resolves the graph, partitions its nodes across the
//! registered [`ExecutionProvider`]s and runs it.

extern crate self as graphrt;

pub mod config;
mod env;
pub mod environment;
pub mod error;
pub mod graph;
pub mod kernel;
pub mod logging;
pub mod memory;
pub mod provider;
pub mod schema;
pub mod session;
pub mod types;

pub use config::{RunOptions, SessionOptions};
pub use environment::Environment;
pub use error::{EngineError, ErrorKind, KernelError, KernelResult, Result};
pub use graph::{AttributeValue, Graph, Model, Node, NodeArg, NodeAttributes};
pub use kernel::{
    CustomRegistry, KernelContext, KernelCreateInfo, KernelDef, KernelRegistry, OpKernel,
    OpKernelInfo,
};
pub use memory::{Allocator, DeviceKind, HostAllocator, MemoryInfo, MemoryType};
pub use provider::{ExecutionProvider, CPU_PROVIDER};
pub use session::{
    AllocationPlanEntry, InferenceSession, ModelMeta, ModelSource, NodeArgMeta, ProfileReport,
    SessionState, TraceEvent,
};
pub use types::{DataType, ElementType, Fence, Tensor, TensorData, TensorShape, Value, ValueData};
