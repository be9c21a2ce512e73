//! Computation graph: nodes, node args, initializers and resolution.
//!
//! A graph is editable until [`Graph::resolve`] succeeds. After that only the execution
//! provider tag of a node may change, and only through session initialization.

mod model;
mod node;
mod resolve;
mod topology;

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::types::{DataType, Tensor, TensorShape};

pub use model::{Model, ModelMetadata};
pub(crate) use node::ResolvedNode;
pub use node::{AttributeValue, Node, NodeArg, NodeAttributes};
pub use topology::topological_order;

/// Facts computed by a successful resolve.
#[derive(Debug, Clone)]
struct ResolvedGraph {
    order: Vec<usize>,
    inputs: Vec<String>,
    outputs: Vec<String>,
}

/// Directed acyclic graph of operator nodes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Graph {
    name: String,
    nodes: Vec<Node>,
    node_args: BTreeMap<String, NodeArg>,
    initializers: BTreeMap<String, Tensor>,
    declared_inputs: Option<Vec<String>>,
    declared_outputs: Option<Vec<String>>,
    #[serde(skip)]
    resolved: Option<ResolvedGraph>,
}

impl Graph {
    pub fn new(name: impl Into<String>) -> Self {
        Graph {
            name: name.into(),
            ..Graph::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn ensure_editable(&self) -> Result<(), GraphError> {
        if self.resolved.is_some() {
            Err(GraphError::AlreadyResolved)
        } else {
            Ok(())
        }
    }

    /// Appends a node. Absent optional args are passed as [`NodeArg::missing`].
    #[allow(clippy::too_many_arguments)]
    pub fn add_node(
        &mut self,
        name: &str,
        op_type: &str,
        description: &str,
        inputs: &[NodeArg],
        outputs: &[NodeArg],
        attributes: Option<&NodeAttributes>,
        domain: &str,
    ) -> Result<&mut Node, GraphError> {
        self.ensure_editable()?;
        if self.nodes.iter().any(|node| node.name() == name) {
            return Err(GraphError::DuplicateNode(name.to_string()));
        }
        for arg in inputs.iter().chain(outputs) {
            self.check_arg(arg)?;
        }
        for arg in inputs.iter().chain(outputs) {
            self.register_arg(arg);
        }

        let index = self.nodes.len();
        let node = Node::new(
            index,
            name,
            op_type,
            description,
            domain,
            inputs.iter().map(|arg| arg.name().to_string()).collect(),
            outputs.iter().map(|arg| arg.name().to_string()).collect(),
            attributes.cloned().unwrap_or_default(),
        );
        self.nodes.push(node);
        Ok(&mut self.nodes[index])
    }

    fn check_arg(&self, arg: &NodeArg) -> Result<(), GraphError> {
        if !arg.exists() {
            return Ok(());
        }
        if let (Some(existing), Some(requested)) = (
            self.node_args.get(arg.name()).and_then(NodeArg::data_type),
            arg.data_type(),
        ) {
            if existing != requested {
                return Err(GraphError::ArgTypeConflict {
                    name: arg.name().to_string(),
                    existing,
                    requested,
                });
            }
        }
        Ok(())
    }

    fn register_arg(&mut self, arg: &NodeArg) {
        if !arg.exists() {
            return;
        }
        match self.node_args.get_mut(arg.name()) {
            Some(existing) => {
                if let (None, Some(ty)) = (existing.data_type(), arg.data_type()) {
                    existing.set_data_type(ty);
                }
                existing.merge_shape(arg.shape());
            }
            None => {
                self.node_args.insert(arg.name().to_string(), arg.clone());
            }
        }
    }

    /// Adds a constant tensor that nodes may consume by name.
    pub fn add_initializer(&mut self, name: &str, tensor: Tensor) -> Result<(), GraphError> {
        self.ensure_editable()?;
        let arg = NodeArg::new(name, Some(DataType::Tensor(tensor.element_type())))
            .with_shape(TensorShape::fixed(tensor.dims()));
        self.check_arg(&arg)?;
        self.register_arg(&arg);
        self.initializers.insert(name.to_string(), tensor);
        Ok(())
    }

    /// Declares the graph inputs explicitly instead of deriving them during resolve.
    pub fn set_inputs(&mut self, inputs: &[NodeArg]) -> Result<(), GraphError> {
        self.ensure_editable()?;
        for arg in inputs {
            self.check_arg(arg)?;
        }
        for arg in inputs {
            self.register_arg(arg);
        }
        self.declared_inputs = Some(inputs.iter().map(|arg| arg.name().to_string()).collect());
        Ok(())
    }

    /// Declares the graph outputs explicitly instead of deriving them during resolve.
    pub fn set_outputs(&mut self, outputs: &[NodeArg]) -> Result<(), GraphError> {
        self.ensure_editable()?;
        for arg in outputs {
            self.check_arg(arg)?;
        }
        for arg in outputs {
            self.register_arg(arg);
        }
        self.declared_outputs = Some(outputs.iter().map(|arg| arg.name().to_string()).collect());
        Ok(())
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> Option<&Node> {
        self.nodes.get(index)
    }

    pub fn node_by_name(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.name() == name)
    }

    /// Mutable access to a node, only before resolve.
    pub fn node_mut(&mut self, index: usize) -> Result<&mut Node, GraphError> {
        self.ensure_editable()?;
        self.nodes.get_mut(index).ok_or(GraphError::UnknownNode(index))
    }

    pub fn node_arg(&self, name: &str) -> Option<&NodeArg> {
        self.node_args.get(name)
    }

    pub fn node_args(&self) -> impl Iterator<Item = &NodeArg> {
        self.node_args.values()
    }

    pub fn initializers(&self) -> &BTreeMap<String, Tensor> {
        &self.initializers
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.is_some()
    }

    /// Node indices in execution order.
    pub fn topological_order(&self) -> Result<&[usize], GraphError> {
        self.resolved
            .as_ref()
            .map(|resolved| resolved.order.as_slice())
            .ok_or(GraphError::NotResolved)
    }

    /// Graph inputs, in declaration order or first-use order when derived.
    pub fn inputs(&self) -> Result<Vec<&NodeArg>, GraphError> {
        let resolved = self.resolved.as_ref().ok_or(GraphError::NotResolved)?;
        Ok(self.lookup_args(&resolved.inputs))
    }

    pub fn outputs(&self) -> Result<Vec<&NodeArg>, GraphError> {
        let resolved = self.resolved.as_ref().ok_or(GraphError::NotResolved)?;
        Ok(self.lookup_args(&resolved.outputs))
    }

    fn lookup_args(&self, names: &[String]) -> Vec<&NodeArg> {
        names
            .iter()
            .filter_map(|name| self.node_args.get(name))
            .collect()
    }

    /// Index of the node producing each value.
    pub fn producers(&self) -> HashMap<&str, usize> {
        let mut producers = HashMap::new();
        for node in &self.nodes {
            for output in node.existing_outputs() {
                producers.entry(output).or_insert(node.index());
            }
        }
        producers
    }

    pub(crate) fn set_execution_provider(&mut self, index: usize, provider: &str) -> Result<(), GraphError> {
        self.nodes
            .get_mut(index)
            .ok_or(GraphError::UnknownNode(index))?
            .set_execution_provider(provider);
        Ok(())
    }
}
