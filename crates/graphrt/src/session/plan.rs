//! Execution plan: kernel order, value slots and the lifetime of every intermediate value.

use std::collections::HashMap;

use smallvec::SmallVec;

use crate::error::{EngineError, GraphError, Result};
use crate::graph::Graph;
use crate::kernel::OpKernel;
use crate::memory::{DeviceKind, MemoryInfo, MemoryType};
use crate::provider::ExecutionProvider;
use crate::types::{DataType, TensorShape, Value};

/// Node selected for a provider, with its instantiated kernel.
pub(crate) struct Assignment {
    pub(crate) node_index: usize,
    pub(crate) provider: usize,
    pub(crate) kernel: Box<dyn OpKernel>,
}

pub(crate) struct ValueSlot {
    pub(crate) name: String,
    pub(crate) location: MemoryInfo,
    pub(crate) producer: Option<usize>,
    pub(crate) last_consumer: Option<usize>,
    /// Graph outputs are never released during a run.
    pub(crate) persistent: bool,
}

pub(crate) struct PlanStep {
    pub(crate) node_index: usize,
    pub(crate) provider: usize,
    pub(crate) kernel: Box<dyn OpKernel>,
    pub(crate) inputs: SmallVec<[Option<usize>; 4]>,
    pub(crate) outputs: SmallVec<[Option<usize>; 2]>,
    /// Slots whose last reader is this step.
    pub(crate) release_after: Vec<usize>,
}

pub(crate) struct FeedBinding {
    pub(crate) name: String,
    pub(crate) slot: usize,
    pub(crate) data_type: Option<DataType>,
    pub(crate) shape: Option<TensorShape>,
    /// Initializers may be overridden by a feed but need not be.
    pub(crate) required: bool,
}

/// Placement and lifetime of one value, as reported by
/// [`InferenceSession::memory_plan`](super::InferenceSession::memory_plan).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationPlanEntry {
    pub value: String,
    pub location: MemoryInfo,
    pub producer: Option<String>,
    pub last_consumer: Option<String>,
    pub released_after_use: bool,
}

pub(crate) struct ExecutionPlan {
    pub(crate) slots: Vec<ValueSlot>,
    pub(crate) steps: Vec<PlanStep>,
    pub(crate) feeds: Vec<FeedBinding>,
    pub(crate) initializers: Vec<(usize, Value)>,
    pub(crate) outputs: Vec<(String, usize)>,
}

struct SlotTable {
    slots: Vec<ValueSlot>,
    by_name: HashMap<String, usize>,
}

impl SlotTable {
    fn intern(&mut self, name: &str) -> usize {
        if let Some(&slot) = self.by_name.get(name) {
            return slot;
        }
        let slot = self.slots.len();
        self.slots.push(ValueSlot {
            name: name.to_string(),
            location: MemoryInfo::new("Cpu", DeviceKind::Cpu, 0, MemoryType::CpuInput),
            producer: None,
            last_consumer: None,
            persistent: false,
        });
        self.by_name.insert(name.to_string(), slot);
        slot
    }
}

impl ExecutionPlan {
    pub(crate) fn build(
        graph: &Graph,
        assignments: Vec<Assignment>,
        providers: &[Box<dyn ExecutionProvider>],
    ) -> Result<Self> {
        let mut table = SlotTable {
            slots: Vec::new(),
            by_name: HashMap::new(),
        };

        let mut feeds = Vec::new();
        for arg in graph.inputs()? {
            let slot = table.intern(arg.name());
            feeds.push(FeedBinding {
                name: arg.name().to_string(),
                slot,
                data_type: arg.data_type(),
                shape: arg.shape().cloned(),
                required: !graph.initializers().contains_key(arg.name()),
            });
        }
        let mut initializers = Vec::new();
        for (name, tensor) in graph.initializers() {
            let slot = table.intern(name);
            initializers.push((slot, Value::from_tensor(tensor.clone())));
            if !feeds.iter().any(|feed| feed.slot == slot) {
                let arg = graph.node_arg(name);
                feeds.push(FeedBinding {
                    name: name.clone(),
                    slot,
                    data_type: arg.and_then(|arg| arg.data_type()),
                    shape: arg.and_then(|arg| arg.shape().cloned()),
                    required: false,
                });
            }
        }

        let mut steps = Vec::with_capacity(assignments.len());
        for (step_index, assignment) in assignments.into_iter().enumerate() {
            let node = graph
                .node(assignment.node_index)
                .ok_or(GraphError::UnknownNode(assignment.node_index))?;
            let provider = &providers[assignment.provider];
            let location = provider
                .allocator(MemoryType::Default)
                .map(|allocator| allocator.info().clone())
                .ok_or_else(|| EngineError::MissingAllocator {
                    provider: provider.provider_type().to_string(),
                    memory: format!("{:?}", MemoryType::Default),
                })?;

            let inputs = node
                .inputs()
                .iter()
                .map(|name| {
                    (!name.is_empty()).then(|| {
                        let slot = table.intern(name);
                        table.slots[slot].last_consumer = Some(step_index);
                        slot
                    })
                })
                .collect();
            let outputs = node
                .outputs()
                .iter()
                .map(|name| {
                    (!name.is_empty()).then(|| {
                        let slot = table.intern(name);
                        let entry = &mut table.slots[slot];
                        entry.producer = Some(step_index);
                        entry.location = location.clone();
                        slot
                    })
                })
                .collect();

            steps.push(PlanStep {
                node_index: assignment.node_index,
                provider: assignment.provider,
                kernel: assignment.kernel,
                inputs,
                outputs,
                release_after: Vec::new(),
            });
        }

        let mut outputs = Vec::new();
        for arg in graph.outputs()? {
            let slot = table.intern(arg.name());
            table.slots[slot].persistent = true;
            outputs.push((arg.name().to_string(), slot));
        }

        for (slot, value) in table.slots.iter().enumerate() {
            if value.persistent {
                continue;
            }
            if let Some(step) = value.last_consumer.or(value.producer) {
                steps[step].release_after.push(slot);
            }
        }

        Ok(ExecutionPlan {
            slots: table.slots,
            steps,
            feeds,
            initializers,
            outputs,
        })
    }

    pub(crate) fn feed(&self, name: &str) -> Option<&FeedBinding> {
        self.feeds.iter().find(|feed| feed.name == name)
    }

    pub(crate) fn output_slot(&self, name: &str) -> Option<usize> {
        self.outputs
            .iter()
            .find(|(output, _)| output == name)
            .map(|(_, slot)| *slot)
    }

    pub(crate) fn describe(&self, graph: &Graph) -> Vec<AllocationPlanEntry> {
        let step_name = |step: usize| {
            graph
                .node(self.steps[step].node_index)
                .map(|node| node.name().to_string())
        };
        self.slots
            .iter()
            .map(|slot| AllocationPlanEntry {
                value: slot.name.clone(),
                location: slot.location.clone(),
                producer: slot.producer.and_then(step_name),
                last_consumer: slot.last_consumer.and_then(step_name),
                released_after_use: !slot.persistent
                    && (slot.last_consumer.is_some() || slot.producer.is_some()),
            })
            .collect()
    }
}
