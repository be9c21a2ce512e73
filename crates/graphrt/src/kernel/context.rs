use std::sync::Arc;

use super::KernelDef;
use crate::error::{KernelError, KernelResult};
use crate::graph::{AttributeValue, Node};
use crate::memory::Allocator;
use crate::types::{Tensor, TensorData, Value};

/// Executable operator instance bound to one node.
///
/// Kernels are shared by every concurrent `run` of a session, so `compute` takes `&self` and
/// implementations keep any mutable scratch state behind their own synchronization.
pub trait OpKernel: Send + Sync {
    fn compute(&self, ctx: &mut KernelContext<'_>) -> KernelResult<()>;
}

/// Construction-time view of the node a kernel is created for.
pub struct OpKernelInfo<'a> {
    node: &'a Node,
    def: &'a KernelDef,
    provider_type: &'a str,
}

impl<'a> OpKernelInfo<'a> {
    pub fn new(node: &'a Node, def: &'a KernelDef, provider_type: &'a str) -> Self {
        OpKernelInfo {
            node,
            def,
            provider_type,
        }
    }

    pub fn node(&self) -> &'a Node {
        self.node
    }

    pub fn kernel_def(&self) -> &'a KernelDef {
        self.def
    }

    pub fn provider_type(&self) -> &'a str {
        self.provider_type
    }

    pub fn attribute(&self, name: &str) -> Option<&'a AttributeValue> {
        self.node.attribute(name)
    }

    pub fn int_or(&self, name: &str, default: i64) -> KernelResult<i64> {
        match self.attribute(name) {
            None => Ok(default),
            Some(AttributeValue::Int(value)) => Ok(*value),
            Some(_) => Err(self.wrong_kind(name, "an int")),
        }
    }

    pub fn float_or(&self, name: &str, default: f32) -> KernelResult<f32> {
        match self.attribute(name) {
            None => Ok(default),
            Some(AttributeValue::Float(value)) => Ok(*value),
            Some(_) => Err(self.wrong_kind(name, "a float")),
        }
    }

    pub fn ints(&self, name: &str) -> KernelResult<Option<&'a [i64]>> {
        match self.attribute(name) {
            None => Ok(None),
            Some(AttributeValue::Ints(values)) => Ok(Some(values)),
            Some(_) => Err(self.wrong_kind(name, "a list of ints")),
        }
    }

    pub fn strings(&self, name: &str) -> KernelResult<Option<&'a [String]>> {
        match self.attribute(name) {
            None => Ok(None),
            Some(AttributeValue::Strings(values)) => Ok(Some(values)),
            Some(_) => Err(self.wrong_kind(name, "a list of strings")),
        }
    }

    fn wrong_kind(&self, name: &str, expected: &str) -> KernelError {
        KernelError::invalid_argument(format!(
            "attribute `{name}` of node `{}` must be {expected}",
            self.node.name()
        ))
    }
}

/// Per-invocation state handed to [`OpKernel::compute`].
pub struct KernelContext<'a> {
    node: &'a Node,
    provider_type: &'a str,
    inputs: &'a [Option<Value>],
    outputs: Vec<Option<Value>>,
    allocator: Arc<dyn Allocator>,
}

impl<'a> KernelContext<'a> {
    pub fn new(
        node: &'a Node,
        provider_type: &'a str,
        inputs: &'a [Option<Value>],
        allocator: Arc<dyn Allocator>,
    ) -> Self {
        KernelContext {
            node,
            provider_type,
            inputs,
            outputs: vec![None; node.outputs().len()],
            allocator,
        }
    }

    pub fn node(&self) -> &'a Node {
        self.node
    }

    pub fn provider_type(&self) -> &'a str {
        self.provider_type
    }

    /// Default allocator of the executing provider.
    pub fn allocator(&self) -> &Arc<dyn Allocator> {
        &self.allocator
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn input(&self, index: usize) -> Option<&'a Value> {
        self.inputs.get(index).and_then(Option::as_ref)
    }

    /// Tensor at `index`, which must be present.
    pub fn input_tensor(&self, index: usize) -> KernelResult<&'a Tensor> {
        self.optional_input_tensor(index)?.ok_or_else(|| {
            KernelError::invalid_argument(format!(
                "node `{}` is missing input {index}",
                self.node.name()
            ))
        })
    }

    pub fn optional_input_tensor(&self, index: usize) -> KernelResult<Option<&'a Tensor>> {
        match self.input(index) {
            None => Ok(None),
            Some(value) => Ok(Some(value.tensor()?)),
        }
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    /// Whether the output at `index` is requested by the graph.
    pub fn output_exists(&self, index: usize) -> bool {
        self.node
            .outputs()
            .get(index)
            .is_some_and(|name| !name.is_empty())
    }

    pub fn set_output(&mut self, index: usize, value: Value) -> KernelResult<()> {
        let slot = self.outputs.get_mut(index).ok_or_else(|| {
            KernelError::invalid_argument(format!(
                "node `{}` has no output {index}",
                self.node.name()
            ))
        })?;
        *slot = Some(value);
        Ok(())
    }

    /// Places `data` in the provider's default memory and publishes it as output `index`.
    pub fn set_output_tensor(&mut self, index: usize, dims: Vec<usize>, data: TensorData) -> KernelResult<()> {
        let tensor = self.allocator.adopt(dims, data)?;
        self.set_output(index, Value::from_tensor(tensor))
    }

    pub(crate) fn into_outputs(self) -> Vec<Option<Value>> {
        self.outputs
    }
}
