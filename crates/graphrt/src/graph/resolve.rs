use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use super::{topological_order, Graph, Node, ResolvedGraph, ResolvedNode};
use crate::error::GraphError;
use crate::schema::{opset_version, FormalParameter, FormalParameterOption, OpSchema, SchemaRegistryList};
use crate::types::DataType;

impl Graph {
    /// Validates the graph and freezes its structure.
    ///
    /// Every check runs against scratch state; the graph is only updated when all of them pass,
    /// so a failed resolve leaves it untouched and still editable. Resolving a resolved graph is
    /// a no-op.
    pub fn resolve(
        &mut self,
        schemas: &SchemaRegistryList,
        domain_to_version: &BTreeMap<String, u32>,
    ) -> Result<(), GraphError> {
        if self.resolved.is_some() {
            return Ok(());
        }

        let (order, inputs, outputs, resolved_nodes, value_types) = {
            let producers = self.collect_producers()?;
            self.check_references(&producers)?;
            let order = topological_order(&self.nodes, &producers)?;

            let mut value_types: HashMap<String, DataType> = self
                .node_args
                .values()
                .filter_map(|arg| arg.data_type().map(|ty| (arg.name().to_string(), ty)))
                .collect();
            let mut resolved_nodes = vec![None; self.nodes.len()];
            for &index in &order {
                let node = &self.nodes[index];
                let resolved = resolve_node(node, schemas, domain_to_version, &mut value_types)?;
                resolved_nodes[index] = Some(resolved);
            }

            let inputs = self.derive_inputs(&producers)?;
            let outputs = self.derive_outputs(&producers, &inputs)?;
            (order, inputs, outputs, resolved_nodes, value_types)
        };

        for (node, resolved) in self.nodes.iter_mut().zip(resolved_nodes) {
            if let Some(resolved) = resolved {
                node.set_resolved(resolved);
            }
        }
        for (name, ty) in value_types {
            if let Some(arg) = self.node_args.get_mut(&name) {
                if arg.data_type().is_none() {
                    arg.set_data_type(ty);
                }
            }
        }
        self.resolved = Some(ResolvedGraph {
            order,
            inputs,
            outputs,
        });
        Ok(())
    }

    fn collect_producers(&self) -> Result<HashMap<&str, usize>, GraphError> {
        let declared: HashSet<&str> = self
            .declared_inputs
            .iter()
            .flatten()
            .map(String::as_str)
            .collect();
        let mut producers: HashMap<&str, usize> = HashMap::new();
        for node in &self.nodes {
            for output in node.existing_outputs() {
                let clash = if self.initializers.contains_key(output) {
                    Some("initializer".to_string())
                } else if declared.contains(output) {
                    Some("graph input".to_string())
                } else {
                    producers
                        .get(output)
                        .map(|&previous| self.nodes[previous].name().to_string())
                };
                if let Some(first) = clash {
                    return Err(GraphError::MultipleProducers {
                        arg: output.to_string(),
                        first,
                        second: node.name().to_string(),
                    });
                }
                producers.insert(output, node.index());
            }
        }
        Ok(producers)
    }

    fn check_references(&self, producers: &HashMap<&str, usize>) -> Result<(), GraphError> {
        let declared: Option<HashSet<&str>> = self
            .declared_inputs
            .as_ref()
            .map(|names| names.iter().map(String::as_str).collect());
        for node in &self.nodes {
            for input in node.existing_inputs() {
                if producers.contains_key(input) || self.initializers.contains_key(input) {
                    continue;
                }
                let fed = match &declared {
                    Some(declared) => declared.contains(input),
                    // An undeclared graph input must carry a type to be fed.
                    None => self
                        .node_args
                        .get(input)
                        .is_some_and(|arg| arg.data_type().is_some()),
                };
                if !fed {
                    return Err(GraphError::DanglingInput {
                        node: node.name().to_string(),
                        arg: input.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn derive_inputs(&self, producers: &HashMap<&str, usize>) -> Result<Vec<String>, GraphError> {
        if let Some(declared) = &self.declared_inputs {
            if let Some(unknown) = declared
                .iter()
                .find(|name| !self.node_args.contains_key(name.as_str()))
            {
                return Err(GraphError::UnknownGraphInput(unknown.clone()));
            }
            return Ok(declared.clone());
        }

        let mut seen = HashSet::new();
        let mut inputs = Vec::new();
        for node in &self.nodes {
            for input in node.existing_inputs() {
                if !producers.contains_key(input)
                    && !self.initializers.contains_key(input)
                    && seen.insert(input)
                {
                    inputs.push(input.to_string());
                }
            }
        }
        Ok(inputs)
    }

    fn derive_outputs(
        &self,
        producers: &HashMap<&str, usize>,
        inputs: &[String],
    ) -> Result<Vec<String>, GraphError> {
        if let Some(declared) = &self.declared_outputs {
            for name in declared {
                let known = producers.contains_key(name.as_str())
                    || self.initializers.contains_key(name)
                    || inputs.contains(name);
                if !known {
                    return Err(GraphError::UnknownGraphOutput(name.clone()));
                }
            }
            return Ok(declared.clone());
        }

        let consumed: HashSet<&str> = self.nodes.iter().flat_map(Node::existing_inputs).collect();
        Ok(self
            .nodes
            .iter()
            .flat_map(Node::existing_outputs)
            .filter(|output| !consumed.contains(output))
            .map(str::to_string)
            .collect())
    }
}

fn resolve_node(
    node: &Node,
    schemas: &SchemaRegistryList,
    domain_to_version: &BTreeMap<String, u32>,
    value_types: &mut HashMap<String, DataType>,
) -> Result<ResolvedNode, GraphError> {
    let version =
        opset_version(domain_to_version, node.domain()).ok_or_else(|| GraphError::MissingOpset {
            node: node.name().to_string(),
            domain: node.domain().to_string(),
        })?;
    let schema = schemas
        .get_schema(node.op_type(), node.domain(), version)
        .ok_or_else(|| GraphError::UnknownOperator {
            node: node.name().to_string(),
            op_type: node.op_type().to_string(),
            domain: node.domain().to_string(),
            version,
        })?;

    check_arity(node, schema.inputs(), node.inputs(), "input")?;
    check_arity(node, schema.outputs(), node.outputs(), "output")?;
    check_attributes(node, &schema)?;

    let mut bindings: HashMap<&str, DataType> = HashMap::new();
    let mut input_types = Vec::with_capacity(node.inputs().len());
    for (position, arg) in node.inputs().iter().enumerate() {
        let formal = match schema.formal_for_input(position) {
            Some(formal) if !arg.is_empty() => formal,
            _ => {
                input_types.push(None);
                continue;
            }
        };
        let ty = value_types.get(arg).copied();
        if let Some(ty) = ty {
            bind(node, &schema, formal, arg, ty, &mut bindings)?;
        }
        input_types.push(ty);
    }

    let attribute_types = schema
        .output_type_fn()
        .map(|infer| infer(node.attributes()))
        .unwrap_or_default();
    let mut output_types = Vec::with_capacity(node.outputs().len());
    for (position, arg) in node.outputs().iter().enumerate() {
        let formal = match schema.formal_for_output(position) {
            Some(formal) if !arg.is_empty() => formal,
            _ => {
                output_types.push(None);
                continue;
            }
        };
        let inferred = if schema.is_type_parameter(&formal.type_str) {
            bindings
                .get(formal.type_str.as_str())
                .copied()
                .or_else(|| attribute_types.get(position).copied().flatten())
        } else {
            DataType::parse(&formal.type_str)
        };
        let declared = value_types.get(arg).copied();
        let ty = match (declared, inferred) {
            (Some(declared), Some(inferred)) if declared != inferred => {
                return Err(type_error(
                    node,
                    format!("output `{arg}` is declared as {declared} but the operator produces {inferred}"),
                ));
            }
            (Some(declared), _) => Some(declared),
            (None, inferred) => inferred,
        };
        if let Some(ty) = ty {
            bind(node, &schema, formal, arg, ty, &mut bindings)?;
            value_types.insert(arg.clone(), ty);
        }
        output_types.push(ty);
    }

    Ok(ResolvedNode {
        since_version: schema.since_version(),
        schema: Arc::clone(&schema),
        input_types,
        output_types,
    })
}

fn check_arity(
    node: &Node,
    formals: &[FormalParameter],
    args: &[String],
    direction: &str,
) -> Result<(), GraphError> {
    let arity_error = |message: String| GraphError::Arity {
        node: node.name().to_string(),
        op_type: node.op_type().to_string(),
        message,
    };

    for (position, formal) in formals.iter().enumerate() {
        match formal.option {
            FormalParameterOption::Single => {
                if args.get(position).map_or(true, String::is_empty) {
                    return Err(arity_error(format!(
                        "required {direction} `{}` (position {position}) is missing",
                        formal.name
                    )));
                }
            }
            FormalParameterOption::Optional => {}
            FormalParameterOption::Variadic => {
                if args.iter().skip(position).all(String::is_empty) {
                    return Err(arity_error(format!(
                        "variadic {direction} `{}` needs at least one argument",
                        formal.name
                    )));
                }
            }
        }
    }

    let variadic = formals
        .last()
        .is_some_and(|last| last.option == FormalParameterOption::Variadic);
    if !variadic && args.len() > formals.len() {
        return Err(arity_error(format!(
            "{} {direction}s supplied but at most {} are accepted",
            args.len(),
            formals.len()
        )));
    }
    Ok(())
}

fn check_attributes(node: &Node, schema: &OpSchema) -> Result<(), GraphError> {
    if let Some(missing) = schema
        .attributes()
        .iter()
        .find(|def| def.required && node.attribute(&def.name).is_none())
    {
        return Err(GraphError::MissingAttribute {
            node: node.name().to_string(),
            op_type: node.op_type().to_string(),
            attribute: missing.name.clone(),
        });
    }
    for (name, value) in node.attributes() {
        match schema.attribute(name) {
            None => {
                return Err(GraphError::UnknownAttribute {
                    node: node.name().to_string(),
                    op_type: node.op_type().to_string(),
                    attribute: name.clone(),
                });
            }
            Some(def) if def.kind != value.kind() => {
                return Err(GraphError::AttributeType {
                    node: node.name().to_string(),
                    op_type: node.op_type().to_string(),
                    attribute: name.clone(),
                    expected: def.kind.name(),
                });
            }
            Some(_) => {}
        }
    }
    Ok(())
}

fn bind<'s>(
    node: &Node,
    schema: &'s OpSchema,
    formal: &'s FormalParameter,
    arg: &str,
    ty: DataType,
    bindings: &mut HashMap<&'s str, DataType>,
) -> Result<(), GraphError> {
    let allowed = schema.allowed_types(&formal.type_str);
    if !allowed.contains(&ty) {
        let allowed: Vec<String> = allowed.iter().map(DataType::to_string).collect();
        return Err(type_error(
            node,
            format!(
                "`{arg}` has type {ty} which is not allowed for {} (allowed: {})",
                formal.type_str,
                allowed.join(", ")
            ),
        ));
    }
    if schema.is_type_parameter(&formal.type_str) {
        match bindings.get(formal.type_str.as_str()) {
            Some(bound) if *bound != ty => {
                return Err(type_error(
                    node,
                    format!(
                        "`{arg}` binds {} to {ty} but it is already bound to {bound}",
                        formal.type_str
                    ),
                ));
            }
            Some(_) => {}
            None => {
                bindings.insert(formal.type_str.as_str(), ty);
            }
        }
    }
    Ok(())
}

fn type_error(node: &Node, message: String) -> GraphError {
    GraphError::TypeConstraint {
        node: node.name().to_string(),
        op_type: node.op_type().to_string(),
        message,
    }
}
