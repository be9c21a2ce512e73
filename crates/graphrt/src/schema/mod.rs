//! Operator schemas: formal parameters, type constraints and attributes per opset version.
//!
//! Registries are explicit objects. The standard one lives in an
//! [`Environment`](crate::Environment); custom registries are attached to a session.

mod standard;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::error::SchemaError;
use crate::graph::NodeAttributes;
use crate::types::DataType;

/// Default operator domain.
pub const ONNX_DOMAIN: &str = "ai.onnx";
/// Classical machine learning operator domain.
pub const ML_DOMAIN: &str = "ai.onnx.ml";

/// Maps the empty domain to [`ONNX_DOMAIN`].
pub fn canonical_domain(domain: &str) -> &str {
    if domain.is_empty() {
        ONNX_DOMAIN
    } else {
        domain
    }
}

/// Looks up the opset version of `domain`, treating `""` and `ai.onnx` as the same domain.
pub fn opset_version(domain_to_version: &BTreeMap<String, u32>, domain: &str) -> Option<u32> {
    let canonical = canonical_domain(domain);
    domain_to_version
        .iter()
        .find(|(key, _)| canonical_domain(key) == canonical)
        .map(|(_, version)| *version)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormalParameterOption {
    Single,
    Optional,
    /// Consumes every remaining argument; must be last and receives at least one.
    Variadic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormalParameter {
    pub name: String,
    /// Either a type parameter declared in the schema's constraints or a concrete type string.
    pub type_str: String,
    pub option: FormalParameterOption,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    Float,
    Int,
    String,
    Tensor,
    Floats,
    Ints,
    Strings,
}

impl AttributeKind {
    pub fn name(self) -> &'static str {
        match self {
            AttributeKind::Float => "a float",
            AttributeKind::Int => "an int",
            AttributeKind::String => "a string",
            AttributeKind::Tensor => "a tensor",
            AttributeKind::Floats => "a list of floats",
            AttributeKind::Ints => "a list of ints",
            AttributeKind::Strings => "a list of strings",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDef {
    pub name: String,
    pub kind: AttributeKind,
    pub required: bool,
}

/// Derives output types from node attributes when no input binds them.
pub type OutputTypeFn = fn(&NodeAttributes) -> Vec<Option<DataType>>;

/// Signature of one version of an operator.
#[derive(Debug, Clone)]
pub struct OpSchema {
    name: String,
    domain: String,
    since_version: u32,
    inputs: Vec<FormalParameter>,
    outputs: Vec<FormalParameter>,
    type_constraints: BTreeMap<String, Vec<DataType>>,
    attributes: Vec<AttributeDef>,
    output_types: Option<OutputTypeFn>,
}

impl OpSchema {
    pub fn builder(name: &str, domain: &str, since_version: u32) -> OpSchemaBuilder {
        OpSchemaBuilder {
            schema: OpSchema {
                name: name.to_string(),
                domain: canonical_domain(domain).to_string(),
                since_version,
                inputs: Vec::new(),
                outputs: Vec::new(),
                type_constraints: BTreeMap::new(),
                attributes: Vec::new(),
                output_types: None,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn since_version(&self) -> u32 {
        self.since_version
    }

    pub fn inputs(&self) -> &[FormalParameter] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[FormalParameter] {
        &self.outputs
    }

    pub fn type_constraints(&self) -> &BTreeMap<String, Vec<DataType>> {
        &self.type_constraints
    }

    pub fn attributes(&self) -> &[AttributeDef] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDef> {
        self.attributes.iter().find(|attr| attr.name == name)
    }

    pub fn output_type_fn(&self) -> Option<OutputTypeFn> {
        self.output_types
    }

    /// Types accepted for `type_str`: the constraint's list for a type parameter, or the single
    /// concrete type the string names.
    pub fn allowed_types(&self, type_str: &str) -> Vec<DataType> {
        match self.type_constraints.get(type_str) {
            Some(types) => types.clone(),
            None => DataType::parse(type_str).into_iter().collect(),
        }
    }

    pub fn is_type_parameter(&self, type_str: &str) -> bool {
        self.type_constraints.contains_key(type_str)
    }

    /// Maps argument positions to formal parameters, expanding a trailing variadic parameter.
    pub fn formal_for_input(&self, position: usize) -> Option<&FormalParameter> {
        formal_at(&self.inputs, position)
    }

    pub fn formal_for_output(&self, position: usize) -> Option<&FormalParameter> {
        formal_at(&self.outputs, position)
    }
}

fn formal_at(formals: &[FormalParameter], position: usize) -> Option<&FormalParameter> {
    formals.get(position).or_else(|| {
        formals
            .last()
            .filter(|last| last.option == FormalParameterOption::Variadic)
    })
}

/// Fluent construction of an [`OpSchema`].
#[derive(Debug, Clone)]
pub struct OpSchemaBuilder {
    schema: OpSchema,
}

impl OpSchemaBuilder {
    fn parameter(name: &str, type_str: &str, option: FormalParameterOption) -> FormalParameter {
        FormalParameter {
            name: name.to_string(),
            type_str: type_str.to_string(),
            option,
        }
    }

    pub fn input(mut self, name: &str, type_str: &str) -> Self {
        self.schema
            .inputs
            .push(Self::parameter(name, type_str, FormalParameterOption::Single));
        self
    }

    pub fn optional_input(mut self, name: &str, type_str: &str) -> Self {
        self.schema
            .inputs
            .push(Self::parameter(name, type_str, FormalParameterOption::Optional));
        self
    }

    pub fn variadic_input(mut self, name: &str, type_str: &str) -> Self {
        self.schema
            .inputs
            .push(Self::parameter(name, type_str, FormalParameterOption::Variadic));
        self
    }

    pub fn output(mut self, name: &str, type_str: &str) -> Self {
        self.schema
            .outputs
            .push(Self::parameter(name, type_str, FormalParameterOption::Single));
        self
    }

    pub fn optional_output(mut self, name: &str, type_str: &str) -> Self {
        self.schema
            .outputs
            .push(Self::parameter(name, type_str, FormalParameterOption::Optional));
        self
    }

    pub fn type_constraint(mut self, type_str: &str, allowed: Vec<DataType>) -> Self {
        self.schema
            .type_constraints
            .insert(type_str.to_string(), allowed);
        self
    }

    pub fn attribute(mut self, name: &str, kind: AttributeKind, required: bool) -> Self {
        self.schema.attributes.push(AttributeDef {
            name: name.to_string(),
            kind,
            required,
        });
        self
    }

    pub fn output_types(mut self, infer: OutputTypeFn) -> Self {
        self.schema.output_types = Some(infer);
        self
    }

    /// Finishes the schema, rejecting type strings that are neither declared parameters nor
    /// concrete types.
    pub fn build(self) -> Result<OpSchema, SchemaError> {
        let schema = self.schema;
        for formal in schema.inputs.iter().chain(schema.outputs.iter()) {
            if !schema.is_type_parameter(&formal.type_str)
                && DataType::parse(&formal.type_str).is_none()
            {
                return Err(SchemaError::UnknownTypeParameter {
                    op_type: schema.name.clone(),
                    type_str: formal.type_str.clone(),
                });
            }
        }
        Ok(schema)
    }
}

/// Schemas keyed by `(domain, op type)` and ordered by `since_version`.
#[derive(Debug, Clone, Default)]
pub struct OpSchemaRegistry {
    schemas: HashMap<(String, String), BTreeMap<u32, Arc<OpSchema>>>,
}

impl OpSchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in operator set.
    pub fn standard() -> Self {
        standard::build()
    }

    pub fn register(&mut self, schema: OpSchema) -> Result<(), SchemaError> {
        let versions = self
            .schemas
            .entry((schema.domain.clone(), schema.name.clone()))
            .or_default();
        if versions.contains_key(&schema.since_version) {
            return Err(SchemaError::Duplicate {
                op_type: schema.name.clone(),
                domain: schema.domain.clone(),
                version: schema.since_version,
            });
        }
        versions.insert(schema.since_version, Arc::new(schema));
        Ok(())
    }

    /// Returns the schema with the highest `since_version` not above `max_version`.
    pub fn get_schema(&self, op_type: &str, domain: &str, max_version: u32) -> Option<Arc<OpSchema>> {
        self.schemas
            .get(&(canonical_domain(domain).to_string(), op_type.to_string()))
            .and_then(|versions| versions.range(..=max_version).next_back())
            .map(|(_, schema)| Arc::clone(schema))
    }

    pub fn len(&self) -> usize {
        self.schemas.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

/// Ordered set of registries; the first registry that knows an operator answers.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistryList {
    registries: Vec<Arc<OpSchemaRegistry>>,
}

impl SchemaRegistryList {
    pub fn new(registries: Vec<Arc<OpSchemaRegistry>>) -> Self {
        SchemaRegistryList { registries }
    }

    pub fn push(&mut self, registry: Arc<OpSchemaRegistry>) {
        self.registries.push(registry);
    }

    pub fn get_schema(&self, op_type: &str, domain: &str, max_version: u32) -> Option<Arc<OpSchema>> {
        self.registries
            .iter()
            .find_map(|registry| registry.get_schema(op_type, domain, max_version))
    }
}
