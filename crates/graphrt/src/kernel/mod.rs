//! Kernel definitions, the per-provider kernel registry and the kernel execution interface.

mod context;
mod def;
mod registry;

pub use context::{KernelContext, OpKernel, OpKernelInfo};
pub use def::{KernelDef, KernelDefBuilder};
pub use registry::{KernelCreateInfo, KernelFactory, KernelRegistry};

use std::sync::Arc;

use crate::error::{RegistryError, SchemaError};
use crate::schema::{OpSchema, OpSchemaRegistry};

/// Caller-supplied kernels and schemas attached to a session.
///
/// Schemas extend the operator set the graph resolves against. Kernels are consulted before a
/// provider's own registry when nodes are assigned.
#[derive(Debug, Default)]
pub struct CustomRegistry {
    kernels: KernelRegistry,
    schemas: Arc<OpSchemaRegistry>,
}

impl CustomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_kernel<F>(&mut self, def: KernelDef, factory: F) -> Result<(), RegistryError>
    where
        F: Fn(&OpKernelInfo<'_>) -> crate::KernelResult<Box<dyn OpKernel>> + Send + Sync + 'static,
    {
        self.kernels.register(def, factory)
    }

    pub fn register_schema(&mut self, schema: OpSchema) -> Result<(), SchemaError> {
        Arc::make_mut(&mut self.schemas).register(schema)
    }

    pub fn kernel_registry(&self) -> &KernelRegistry {
        &self.kernels
    }

    pub fn schema_registry(&self) -> &Arc<OpSchemaRegistry> {
        &self.schemas
    }
}
