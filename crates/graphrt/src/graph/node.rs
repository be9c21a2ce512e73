//! Nodes, node args and attribute values.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::schema::{canonical_domain, AttributeKind, OpSchema};
use crate::types::{DataType, ElementType, Tensor, TensorShape};

/// Attribute attached to a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Float(f32),
    Int(i64),
    String(String),
    Tensor(Tensor),
    Floats(Vec<f32>),
    Ints(Vec<i64>),
    Strings(Vec<String>),
}

impl AttributeValue {
    pub fn kind(&self) -> AttributeKind {
        match self {
            AttributeValue::Float(_) => AttributeKind::Float,
            AttributeValue::Int(_) => AttributeKind::Int,
            AttributeValue::String(_) => AttributeKind::String,
            AttributeValue::Tensor(_) => AttributeKind::Tensor,
            AttributeValue::Floats(_) => AttributeKind::Floats,
            AttributeValue::Ints(_) => AttributeKind::Ints,
            AttributeValue::Strings(_) => AttributeKind::Strings,
        }
    }
}

pub type NodeAttributes = BTreeMap<String, AttributeValue>;

/// Named edge of the graph with optional declared type and shape.
///
/// An arg with an empty name does not exist: it marks an optional input or output that is
/// declared positionally but absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeArg {
    name: String,
    data_type: Option<DataType>,
    shape: Option<TensorShape>,
}

impl NodeArg {
    pub fn new(name: impl Into<String>, data_type: Option<DataType>) -> Self {
        NodeArg {
            name: name.into(),
            data_type,
            shape: None,
        }
    }

    /// Tensor arg with a fully known shape.
    pub fn tensor(name: impl Into<String>, element: ElementType, dims: &[usize]) -> Self {
        NodeArg {
            name: name.into(),
            data_type: Some(DataType::Tensor(element)),
            shape: Some(TensorShape::fixed(dims)),
        }
    }

    /// Placeholder for an absent optional argument.
    pub fn missing() -> Self {
        NodeArg::new("", None)
    }

    pub fn with_shape(mut self, shape: TensorShape) -> Self {
        self.shape = Some(shape);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn exists(&self) -> bool {
        !self.name.is_empty()
    }

    pub fn data_type(&self) -> Option<DataType> {
        self.data_type
    }

    pub fn shape(&self) -> Option<&TensorShape> {
        self.shape.as_ref()
    }

    pub(crate) fn set_data_type(&mut self, data_type: DataType) {
        self.data_type = Some(data_type);
    }

    pub(crate) fn merge_shape(&mut self, shape: Option<&TensorShape>) {
        if self.shape.is_none() {
            self.shape = shape.cloned();
        }
    }
}

/// Facts recorded on a node by a successful resolve.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedNode {
    pub(crate) since_version: u32,
    pub(crate) schema: Arc<OpSchema>,
    pub(crate) input_types: Vec<Option<DataType>>,
    pub(crate) output_types: Vec<Option<DataType>>,
}

/// Operator invocation inside a graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    index: usize,
    name: String,
    op_type: String,
    description: String,
    domain: String,
    inputs: Vec<String>,
    outputs: Vec<String>,
    attributes: NodeAttributes,
    #[serde(skip)]
    execution_provider: Option<String>,
    #[serde(skip)]
    resolved: Option<ResolvedNode>,
}

impl Node {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        index: usize,
        name: &str,
        op_type: &str,
        description: &str,
        domain: &str,
        inputs: Vec<String>,
        outputs: Vec<String>,
        attributes: NodeAttributes,
    ) -> Self {
        Node {
            index,
            name: name.to_string(),
            op_type: op_type.to_string(),
            description: description.to_string(),
            domain: canonical_domain(domain).to_string(),
            inputs,
            outputs,
            attributes,
            execution_provider: None,
            resolved: None,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn op_type(&self) -> &str {
        &self.op_type
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Input arg names in positional order. Absent optional inputs are empty strings.
    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    pub fn existing_inputs(&self) -> impl Iterator<Item = &str> {
        self.inputs.iter().map(String::as_str).filter(|name| !name.is_empty())
    }

    pub fn existing_outputs(&self) -> impl Iterator<Item = &str> {
        self.outputs.iter().map(String::as_str).filter(|name| !name.is_empty())
    }

    pub fn attributes(&self) -> &NodeAttributes {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    pub fn add_attribute(&mut self, name: impl Into<String>, value: AttributeValue) {
        self.attributes.insert(name.into(), value);
    }

    /// Provider assigned by session initialization.
    pub fn execution_provider(&self) -> Option<&str> {
        self.execution_provider.as_deref()
    }

    /// Version of the schema the node resolved against.
    pub fn since_version(&self) -> Option<u32> {
        self.resolved.as_ref().map(|resolved| resolved.since_version)
    }

    pub fn schema(&self) -> Option<&Arc<OpSchema>> {
        self.resolved.as_ref().map(|resolved| &resolved.schema)
    }

    /// Resolved type of the input at `position`, if it exists and is known.
    pub fn input_type(&self, position: usize) -> Option<DataType> {
        self.resolved
            .as_ref()
            .and_then(|resolved| resolved.input_types.get(position).copied().flatten())
    }

    pub fn output_type(&self, position: usize) -> Option<DataType> {
        self.resolved
            .as_ref()
            .and_then(|resolved| resolved.output_types.get(position).copied().flatten())
    }

    pub(crate) fn set_execution_provider(&mut self, provider: &str) {
        self.execution_provider = Some(provider.to_string());
    }

    pub(crate) fn set_resolved(&mut self, resolved: ResolvedNode) {
        self.resolved = Some(resolved);
    }
}
