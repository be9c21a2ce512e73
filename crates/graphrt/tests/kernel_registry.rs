use std::collections::BTreeMap;
use std::sync::Arc;

use graphrt::error::RegistryError;
use graphrt::graph::{Graph, NodeArg};
use graphrt::kernel::{KernelContext, KernelDef, KernelRegistry, OpKernel, OpKernelInfo};
use graphrt::schema::{OpSchemaRegistry, SchemaRegistryList};
use graphrt::types::{DataType, ElementType};
use graphrt::KernelResult;

struct Noop;

impl OpKernel for Noop {
    fn compute(&self, _ctx: &mut KernelContext<'_>) -> KernelResult<()> {
        Ok(())
    }
}

fn noop(_info: &OpKernelInfo<'_>) -> KernelResult<Box<dyn OpKernel>> {
    Ok(Box::new(Noop))
}

fn add_graph(opset: u32, element: ElementType) -> Graph {
    let ty = Some(DataType::Tensor(element));
    let mut graph = Graph::new("add");
    graph
        .add_node(
            "add",
            "Add",
            "",
            &[NodeArg::new("a", ty), NodeArg::new("b", ty)],
            &[NodeArg::new("y", None)],
            None,
            "",
        )
        .unwrap();
    let schemas = SchemaRegistryList::new(vec![Arc::new(OpSchemaRegistry::standard())]);
    graph
        .resolve(&schemas, &BTreeMap::from([(String::new(), opset)]))
        .unwrap();
    graph
}

fn def(since: u32, end: Option<u32>, provider: &str) -> KernelDef {
    let builder = KernelDef::builder("Add").provider(provider);
    let builder = match end {
        Some(end) => builder.version_range(since, end),
        None => builder.since_version(since),
    };
    builder.build().unwrap()
}

#[test]
fn version_ranges_are_inclusive() {
    let mut registry = KernelRegistry::new();
    registry.register(def(1, Some(6), "p"), noop).unwrap();

    let v6 = add_graph(6, ElementType::F32);
    let found = registry.find_kernel_for(v6.node_by_name("add").unwrap(), "p").unwrap();
    assert_eq!(found.def.end_version(), Some(6));

    let v7 = add_graph(7, ElementType::F32);
    assert!(registry.find_kernel_for(v7.node_by_name("add").unwrap(), "p").is_none());
}

#[test]
fn highest_matching_start_version_wins() {
    let mut registry = KernelRegistry::new();
    registry.register(def(1, None, "p"), noop).unwrap();
    registry.register(def(7, None, "p"), noop).unwrap();
    registry.register(def(6, Some(6), "p"), noop).unwrap();

    let graph = add_graph(9, ElementType::F32);
    let found = registry.find_kernel_for(graph.node_by_name("add").unwrap(), "p").unwrap();
    assert_eq!(found.def.since_version(), 7);

    let graph = add_graph(6, ElementType::F32);
    let found = registry.find_kernel_for(graph.node_by_name("add").unwrap(), "p").unwrap();
    assert_eq!(found.def.since_version(), 6);
}

#[test]
fn kernels_only_match_their_provider() {
    let mut registry = KernelRegistry::new();
    registry.register(def(7, None, "gpu"), noop).unwrap();
    let graph = add_graph(7, ElementType::F32);
    let node = graph.node_by_name("add").unwrap();
    assert!(registry.find_kernel_for(node, "cpu").is_none());
    assert!(registry.find_kernel_for(node, "gpu").is_some());
    // An unassigned node has no provider to look up.
    assert!(registry.find_kernel(node).is_none());
}

#[test]
fn type_constraints_filter_candidates() {
    let mut registry = KernelRegistry::new();
    let float_only = KernelDef::builder("Add")
        .provider("p")
        .since_version(7)
        .type_constraint("T", vec![DataType::Tensor(ElementType::F32)])
        .build()
        .unwrap();
    registry.register(float_only, noop).unwrap();

    let floats = add_graph(7, ElementType::F32);
    assert!(registry
        .find_kernel_for(floats.node_by_name("add").unwrap(), "p")
        .is_some());
    let ints = add_graph(7, ElementType::I64);
    assert!(registry
        .find_kernel_for(ints.node_by_name("add").unwrap(), "p")
        .is_none());
}

#[test]
fn duplicate_registrations_are_rejected() {
    let mut registry = KernelRegistry::new();
    registry.register(def(7, None, "p"), noop).unwrap();
    let err = registry.register(def(7, None, "p"), noop).unwrap_err();
    assert!(matches!(err, RegistryError::DuplicateKernel { since_version: 7, .. }));
    registry.register(def(7, None, "q"), noop).unwrap();
    assert_eq!(registry.len(), 2);
}

#[test]
fn kernel_defs_need_a_provider() {
    let err = KernelDef::builder("Add").since_version(7).build().unwrap_err();
    assert_eq!(err, RegistryError::MissingProvider("Add".to_string()));
}

#[test]
fn unresolved_nodes_never_match() {
    let mut registry = KernelRegistry::new();
    registry.register(def(1, None, "p"), noop).unwrap();
    let mut graph = Graph::new("g");
    let node = graph
        .add_node("add", "Add", "", &[NodeArg::new("a", None)], &[NodeArg::new("y", None)], None, "")
        .unwrap();
    assert!(registry.find_kernel_for(node, "p").is_none());
}
