use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use super::Node;
use crate::error::GraphError;

/// Orders `nodes` so every producer precedes its consumers.
///
/// Kahn's algorithm always picks the lowest ready node index, so the order is deterministic and
/// matches insertion order wherever the dependencies allow it.
pub fn topological_order(
    nodes: &[Node],
    producers: &HashMap<&str, usize>,
) -> Result<Vec<usize>, GraphError> {
    let mut pending = vec![0usize; nodes.len()];
    let mut consumers: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for node in nodes {
        for input in node.existing_inputs() {
            if let Some(&producer) = producers.get(input) {
                pending[node.index()] += 1;
                consumers[producer].push(node.index());
            }
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = pending
        .iter()
        .enumerate()
        .filter(|(_, count)| **count == 0)
        .map(|(index, _)| Reverse(index))
        .collect();
    let mut order = Vec::with_capacity(nodes.len());
    while let Some(Reverse(index)) = ready.pop() {
        order.push(index);
        for &consumer in &consumers[index] {
            pending[consumer] -= 1;
            if pending[consumer] == 0 {
                ready.push(Reverse(consumer));
            }
        }
    }

    if order.len() < nodes.len() {
        let stuck = pending
            .iter()
            .position(|count| *count > 0)
            .unwrap_or_default();
        return Err(GraphError::Cycle {
            node: nodes[stuck].name().to_string(),
        });
    }
    Ok(order)
}
