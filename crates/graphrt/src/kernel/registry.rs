use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::{KernelDef, OpKernel, OpKernelInfo};
use crate::error::{KernelResult, RegistryError};
use crate::graph::Node;
use crate::schema::canonical_domain;

/// Builds a kernel instance for a node.
pub type KernelFactory =
    Arc<dyn Fn(&OpKernelInfo<'_>) -> KernelResult<Box<dyn OpKernel>> + Send + Sync>;

/// Kernel definition paired with its factory.
#[derive(Clone)]
pub struct KernelCreateInfo {
    pub def: KernelDef,
    pub factory: KernelFactory,
}

impl KernelCreateInfo {
    pub fn create(&self, info: &OpKernelInfo<'_>) -> KernelResult<Box<dyn OpKernel>> {
        (self.factory)(info)
    }
}

impl fmt::Debug for KernelCreateInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelCreateInfo")
            .field("def", &self.def)
            .finish_non_exhaustive()
    }
}

/// Catalog of kernels keyed by `(domain, op type)`.
#[derive(Clone, Default)]
pub struct KernelRegistry {
    kernels: HashMap<(String, String), Vec<KernelCreateInfo>>,
}

impl KernelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, def: KernelDef, factory: F) -> Result<(), RegistryError>
    where
        F: Fn(&OpKernelInfo<'_>) -> KernelResult<Box<dyn OpKernel>> + Send + Sync + 'static,
    {
        let candidates = self
            .kernels
            .entry((def.domain().to_string(), def.op_type().to_string()))
            .or_default();
        if candidates.iter().any(|existing| existing.def.same_slot(&def)) {
            return Err(RegistryError::DuplicateKernel {
                op_type: def.op_type().to_string(),
                domain: def.domain().to_string(),
                provider: def.provider().to_string(),
                since_version: def.since_version(),
            });
        }
        candidates.push(KernelCreateInfo {
            def,
            factory: Arc::new(factory),
        });
        Ok(())
    }

    /// Kernel for `node` on the provider the node has been assigned to.
    pub fn find_kernel(&self, node: &Node) -> Option<&KernelCreateInfo> {
        self.find_kernel_for(node, node.execution_provider()?)
    }

    /// Kernel that would execute `node` on `provider_type`.
    ///
    /// A kernel matches when its provider is `provider_type`, its version range covers the
    /// node's resolved schema version and every type constraint admits the node's argument
    /// types. Among matches the one with the highest starting version wins. Unresolved nodes
    /// never match.
    pub fn find_kernel_for(&self, node: &Node, provider_type: &str) -> Option<&KernelCreateInfo> {
        let version = node.since_version()?;
        let candidates = self.kernels.get(&(
            canonical_domain(node.domain()).to_string(),
            node.op_type().to_string(),
        ))?;
        candidates
            .iter()
            .filter(|candidate| {
                candidate.def.provider() == provider_type
                    && candidate.def.covers(version)
                    && type_constraints_hold(&candidate.def, node)
            })
            .max_by_key(|candidate| candidate.def.since_version())
    }

    pub fn len(&self) -> usize {
        self.kernels.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.kernels.is_empty()
    }

    pub fn kernel_defs(&self) -> impl Iterator<Item = &KernelDef> {
        self.kernels.values().flatten().map(|info| &info.def)
    }
}

impl fmt::Debug for KernelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelRegistry")
            .field("kernels", &self.len())
            .finish()
    }
}

fn type_constraints_hold(def: &KernelDef, node: &Node) -> bool {
    let Some(schema) = node.schema() else {
        return def.type_constraints().is_empty();
    };
    def.type_constraints().iter().all(|(type_param, allowed)| {
        let inputs = (0..node.inputs().len()).filter_map(|position| {
            let formal = schema.formal_for_input(position)?;
            (formal.type_str == *type_param).then(|| node.input_type(position))?
        });
        let outputs = (0..node.outputs().len()).filter_map(|position| {
            let formal = schema.formal_for_output(position)?;
            (formal.type_str == *type_param).then(|| node.output_type(position))?
        });
        inputs.chain(outputs).all(|ty| allowed.contains(&ty))
    })
}
