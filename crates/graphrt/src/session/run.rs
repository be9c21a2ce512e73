use std::collections::HashMap;

use tracing::{debug, warn};

use super::plan::{ExecutionPlan, PlanStep};
use super::{InferenceSession, SessionState};
use crate::config::RunOptions;
use crate::error::{EngineError, GraphError, KernelError, KernelResult, Result};
use crate::graph::{Graph, Node};
use crate::kernel::KernelContext;
use crate::logging::{self, Verbosity};
use crate::memory::MemoryType;
use crate::provider::{ExecutionProvider, CPU_PROVIDER};
use crate::types::{Tensor, Value};

/// Fence queue used for all session-driven synchronization.
const SESSION_QUEUE: usize = 0;

/// Consumer name reported when the caller fetches a value.
const FETCH_CONSUMER: &str = "<fetch>";

impl InferenceSession {
    /// Executes the model once.
    ///
    /// `feeds` must contain every graph input that is not backed by an initializer. When
    /// `output_names` is empty every graph output is returned, in declaration order. Returned
    /// values are host accessible and their fences have been waited on.
    ///
    /// `run` takes `&self`, so one initialized session can serve concurrent callers.
    pub fn run(
        &self,
        run_options: &RunOptions,
        feeds: &HashMap<String, Value>,
        output_names: &[&str],
    ) -> Result<Vec<Value>> {
        self.expect_state("run", SessionState::Initialized)?;
        let (plan, model) = match (&self.plan, &self.model) {
            (Some(plan), Some(model)) => (plan, model),
            _ => {
                return Err(EngineError::InvalidState {
                    operation: "run",
                    state: self.state,
                })
            }
        };
        let graph = model.main_graph();
        let span = logging::run_span(&self.options.session_log_id, &run_options.run_tag);
        let _guard = span.enter();
        let verbosity = Verbosity::for_run(self.options.log_verbosity, run_options.run_log_verbosity);
        let started = self.profiler.start();

        validate_feeds(plan, feeds)?;
        let fetch_slots = resolve_fetches(plan, output_names)?;

        let mut frame: Vec<Option<Value>> = vec![None; plan.slots.len()];
        for (slot, value) in &plan.initializers {
            frame[*slot] = Some(value.clone());
        }
        for (name, value) in feeds {
            if let Some(feed) = plan.feed(name) {
                frame[feed.slot] = Some(value.clone());
            }
        }

        for step in &plan.steps {
            self.execute_step(graph, plan, step, &mut frame, verbosity)?;
        }

        let fetched = fetch_slots
            .into_iter()
            .map(|(name, slot)| {
                let value = frame[slot].clone().ok_or_else(|| missing_output(graph, plan, slot))?;
                self.fetch(name, value)
            })
            .collect::<Result<Vec<_>>>()?;

        self.profiler.record_session("model_run", started);
        Ok(fetched)
    }

    fn execute_step(
        &self,
        graph: &Graph,
        plan: &ExecutionPlan,
        step: &PlanStep,
        frame: &mut [Option<Value>],
        verbosity: Verbosity,
    ) -> Result<()> {
        let node = graph
            .node(step.node_index)
            .ok_or(GraphError::UnknownNode(step.node_index))?;
        let provider = &self.providers[step.provider];
        let provider_type = provider.provider_type();
        let allocator = provider
            .allocator(MemoryType::Default)
            .ok_or_else(|| EngineError::MissingAllocator {
                provider: provider_type.to_string(),
                memory: format!("{:?}", MemoryType::Default),
            })?;
        let started = self.profiler.start();

        let mut inputs = Vec::with_capacity(step.inputs.len());
        for slot in &step.inputs {
            let prepared = match slot {
                None => None,
                Some(slot) => {
                    let value = frame[*slot]
                        .clone()
                        .ok_or_else(|| missing_output(graph, plan, *slot))?;
                    Some(self.prepare_input(node, &plan.slots[*slot].name, value, provider.as_ref())?)
                }
            };
            inputs.push(prepared);
        }

        let mut ctx = KernelContext::new(node, provider_type, &inputs, allocator);
        if let Err(source) = step.kernel.compute(&mut ctx) {
            warn!(node = %node.name(), op_type = %node.op_type(), provider = %provider_type, error = %source, "kernel failed");
            return Err(EngineError::Execution {
                node: node.name().to_string(),
                op_type: node.op_type().to_string(),
                provider: provider_type.to_string(),
                source,
            });
        }
        let mut produced = ctx.into_outputs();

        for value in inputs.iter().flatten() {
            if let Some(fence) = value.fence() {
                fence.after_used_as_input(SESSION_QUEUE);
            }
        }

        for (position, slot) in step.outputs.iter().enumerate() {
            let Some(slot) = slot else {
                continue;
            };
            let value = produced
                .get_mut(position)
                .and_then(Option::take)
                .ok_or_else(|| EngineError::MissingKernelOutput {
                    node: node.name().to_string(),
                    op_type: node.op_type().to_string(),
                    output: plan.slots[*slot].name.clone(),
                })?;
            frame[*slot] = Some(value);
        }

        self.profiler
            .record_node(node.name(), node.op_type(), provider_type, started);
        if verbosity.traces_nodes() {
            debug!(node = %node.name(), op_type = %node.op_type(), provider = %provider_type, "executed node");
        }

        if self.options.enable_memory_reuse {
            for slot in &step.release_after {
                let releasable = frame[*slot]
                    .as_ref()
                    .and_then(Value::fence)
                    .map_or(true, |fence| fence.can_release());
                if releasable {
                    frame[*slot] = None;
                }
            }
        }
        Ok(())
    }

    /// Waits on the value's fence and moves it into `consumer`'s memory when needed.
    fn prepare_input(
        &self,
        node: &Node,
        name: &str,
        value: Value,
        consumer: &dyn ExecutionProvider,
    ) -> Result<Value> {
        if let Some(fence) = value.fence() {
            fence
                .before_using_as_input(consumer.provider_type(), SESSION_QUEUE)
                .map_err(|source| EngineError::Fence {
                    value: name.to_string(),
                    node: node.name().to_string(),
                    source,
                })?;
        }
        // Values still being produced on the consumer's own queue stay where they are.
        if !value.is_tensor() || !value.is_ready() {
            return Ok(value);
        }
        let tensor = value.tensor()?;
        let Some(target) = consumer.allocator(MemoryType::Default) else {
            return Ok(value);
        };
        if tensor.location().same_space(target.info()) {
            return Ok(value);
        }

        let moved = self
            .to_host(tensor)
            .and_then(|host| {
                if target.info().is_host_accessible() {
                    Ok(host)
                } else {
                    consumer.copy_tensor(&host, MemoryType::Default)
                }
            })
            .map_err(|source| EngineError::Transfer {
                value: name.to_string(),
                source,
            })?;
        debug!(value = %name, from = %tensor.location(), to = %moved.location(), "transferred value");
        Ok(Value::from_tensor(moved))
    }

    /// Copies a device tensor into host memory through the provider that owns it.
    fn to_host(&self, tensor: &Tensor) -> KernelResult<Tensor> {
        if tensor.location().is_host_accessible() {
            return Ok(tensor.clone());
        }
        let owner = self.providers.iter().find(|provider| {
            provider
                .allocator(MemoryType::Default)
                .is_some_and(|allocator| allocator.info() == tensor.location())
        });
        match owner {
            Some(owner) => owner.copy_tensor(tensor, MemoryType::CpuOutput),
            None => Err(KernelError::execution(format!(
                "no registered provider owns memory {}",
                tensor.location()
            ))),
        }
    }

    fn fetch(&self, name: &str, value: Value) -> Result<Value> {
        if let Some(fence) = value.fence() {
            fence
                .before_using_as_input(CPU_PROVIDER, SESSION_QUEUE)
                .map_err(|source| EngineError::Fence {
                    value: name.to_string(),
                    node: FETCH_CONSUMER.to_string(),
                    source,
                })?;
            fence.after_used_as_input(SESSION_QUEUE);
        }
        if !value.is_tensor() {
            return Ok(value);
        }
        let tensor = value.tensor()?;
        if tensor.location().is_host_accessible() {
            return Ok(value);
        }
        let host = self.to_host(tensor).map_err(|source| EngineError::Transfer {
            value: name.to_string(),
            source,
        })?;
        Ok(Value::from_tensor(host))
    }
}

fn validate_feeds(plan: &ExecutionPlan, feeds: &HashMap<String, Value>) -> Result<()> {
    for name in feeds.keys() {
        if plan.feed(name).is_none() {
            return Err(EngineError::UnknownInput(name.clone()));
        }
    }

    let required = plan.feeds.iter().filter(|feed| feed.required).count();
    if let Some(missing) = plan
        .feeds
        .iter()
        .find(|feed| feed.required && !feeds.contains_key(&feed.name))
    {
        return Err(EngineError::MissingInput {
            required,
            supplied: feeds.len(),
            missing: missing.name.clone(),
        });
    }

    for feed in &plan.feeds {
        let Some(value) = feeds.get(&feed.name) else {
            continue;
        };
        if let Some(expected) = feed.data_type {
            if value.data_type() != expected {
                return Err(EngineError::InputTypeMismatch {
                    name: feed.name.clone(),
                    expected,
                    actual: value.data_type(),
                });
            }
        }
        if let (Some(shape), true) = (&feed.shape, value.is_tensor() && value.is_ready()) {
            let dims = value.tensor()?.dims();
            if !shape.matches(dims) {
                return Err(EngineError::InputShapeMismatch {
                    name: feed.name.clone(),
                    expected: shape.to_string(),
                    actual: dims.to_vec(),
                });
            }
        }
    }
    Ok(())
}

fn resolve_fetches<'a>(plan: &'a ExecutionPlan, output_names: &[&'a str]) -> Result<Vec<(&'a str, usize)>> {
    if output_names.is_empty() {
        return Ok(plan
            .outputs
            .iter()
            .map(|(name, slot)| (name.as_str(), *slot))
            .collect());
    }
    output_names
        .iter()
        .map(|name| {
            plan.output_slot(name)
                .map(|slot| (*name, slot))
                .ok_or_else(|| EngineError::UnknownOutput(name.to_string()))
        })
        .collect()
}

fn missing_output(graph: &Graph, plan: &ExecutionPlan, slot: usize) -> EngineError {
    let value = &plan.slots[slot];
    let node = value
        .producer
        .and_then(|step| graph.node(plan.steps[step].node_index));
    EngineError::MissingKernelOutput {
        node: node.map(|node| node.name().to_string()).unwrap_or_default(),
        op_type: node.map(|node| node.op_type().to_string()).unwrap_or_default(),
        output: value.name.clone(),
    }
}
