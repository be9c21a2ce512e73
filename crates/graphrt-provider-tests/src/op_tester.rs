//! Single-operator test harness.
//!
//! An [`OpTester`] describes one node by its inputs, expected outputs and attributes. Running it
//! builds a one-node model, then for every candidate provider that claims the node it loads the
//! serialized model into a fresh session, runs it and compares the fetched values against the
//! expectations.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::{bail, ensure, Context};
use graphrt::graph::{AttributeValue, Model, NodeArg, NodeAttributes};
use graphrt::schema::SchemaRegistryList;
use graphrt::types::TensorElement;
use graphrt::{
    Environment, ExecutionProvider, InferenceSession, ModelSource, RunOptions, SessionOptions,
    Tensor, Value, CPU_PROVIDER,
};
use tracing::{debug, warn};

use crate::compare::{compare_values, Tolerance};

/// Creates a fresh provider instance for one test run.
pub type ProviderFactory = dyn Fn() -> Box<dyn ExecutionProvider>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectResult {
    Success,
    /// The model must fail to resolve, initialize or run, with an error containing the
    /// expected message.
    Failure,
}

/// Which providers actually ran the node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub exercised: Vec<String>,
    pub skipped: Vec<String>,
}

impl RunSummary {
    pub fn exercised(&self, provider_type: &str) -> bool {
        self.exercised.iter().any(|name| name == provider_type)
    }
}

pub struct OpTester {
    op_type: String,
    domain: String,
    opset: u32,
    inputs: Vec<Option<(String, Value)>>,
    outputs: Vec<Option<(String, Value)>>,
    attributes: NodeAttributes,
    abs_error: Option<f64>,
    rel_error: Option<f64>,
}

impl OpTester {
    /// Tester for `op_type` in the default domain at `opset`.
    pub fn new(op_type: &str, opset: u32) -> Self {
        OpTester {
            op_type: op_type.to_string(),
            domain: String::new(),
            opset,
            inputs: Vec::new(),
            outputs: Vec::new(),
            attributes: NodeAttributes::new(),
            abs_error: None,
            rel_error: None,
        }
    }

    pub fn domain(mut self, domain: &str) -> Self {
        self.domain = domain.to_string();
        self
    }

    pub fn add_input<T: TensorElement>(&mut self, name: &str, dims: &[usize], values: Vec<T>) -> &mut Self {
        let tensor = Tensor::from_vec(dims, values).unwrap_or_else(|err| panic!("input `{name}`: {err}"));
        self.add_input_value(name, Value::from_tensor(tensor))
    }

    pub fn add_input_value(&mut self, name: &str, value: Value) -> &mut Self {
        self.inputs.push(Some((name.to_string(), value)));
        self
    }

    /// Declares an absent optional input at the next position.
    pub fn add_missing_optional_input(&mut self) -> &mut Self {
        self.inputs.push(None);
        self
    }

    pub fn add_output<T: TensorElement>(&mut self, name: &str, dims: &[usize], values: Vec<T>) -> &mut Self {
        let tensor = Tensor::from_vec(dims, values).unwrap_or_else(|err| panic!("output `{name}`: {err}"));
        self.add_output_value(name, Value::from_tensor(tensor))
    }

    pub fn add_output_value(&mut self, name: &str, expected: Value) -> &mut Self {
        self.outputs.push(Some((name.to_string(), expected)));
        self
    }

    /// Declares an absent optional output at the next position.
    pub fn add_missing_optional_output(&mut self) -> &mut Self {
        self.outputs.push(None);
        self
    }

    pub fn add_attribute(&mut self, name: &str, value: AttributeValue) -> &mut Self {
        self.attributes.insert(name.to_string(), value);
        self
    }

    pub fn set_output_abs_err(&mut self, abs: f64) -> &mut Self {
        self.abs_error = Some(abs);
        self
    }

    pub fn set_output_rel_err(&mut self, rel: f64) -> &mut Self {
        self.rel_error = Some(rel);
        self
    }

    /// One-node model over the declared inputs and outputs.
    pub fn build_model(&self) -> anyhow::Result<Model> {
        let mut model = Model::new(
            &format!("{}_test", self.op_type),
            BTreeMap::from([(self.domain.clone(), self.opset)]),
        );
        let inputs: Vec<NodeArg> = self
            .inputs
            .iter()
            .map(|input| match input {
                Some((name, value)) => match value.tensor() {
                    Ok(tensor) => NodeArg::tensor(name, tensor.element_type(), tensor.dims()),
                    Err(_) => NodeArg::new(name, Some(value.data_type())),
                },
                None => NodeArg::missing(),
            })
            .collect();
        let outputs: Vec<NodeArg> = self
            .outputs
            .iter()
            .map(|output| match output {
                Some((name, expected)) => NodeArg::new(name, Some(expected.data_type())),
                None => NodeArg::missing(),
            })
            .collect();

        let graph = model.main_graph_mut();
        graph.add_node(
            "node1",
            &self.op_type,
            "",
            &inputs,
            &outputs,
            Some(&self.attributes),
            &self.domain,
        )?;
        let declared_inputs: Vec<NodeArg> = inputs.into_iter().filter(NodeArg::exists).collect();
        let declared_outputs: Vec<NodeArg> = outputs.into_iter().filter(NodeArg::exists).collect();
        graph.set_inputs(&declared_inputs)?;
        graph.set_outputs(&declared_outputs)?;
        Ok(model)
    }

    fn feeds(&self) -> HashMap<String, Value> {
        self.inputs
            .iter()
            .flatten()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    fn output_names(&self) -> Vec<&str> {
        self.outputs.iter().flatten().map(|(name, _)| name.as_str()).collect()
    }

    /// Runs the node on every provider in `providers` that claims it.
    ///
    /// Providers listed in `excluded` and providers without a matching kernel are skipped. For
    /// [`ExpectResult::Failure`] an empty `expected_failure` accepts any error.
    pub fn try_run(
        &self,
        expect: ExpectResult,
        expected_failure: &str,
        excluded: &[&str],
        providers: &[&ProviderFactory],
    ) -> anyhow::Result<RunSummary> {
        let environment = Environment::new();
        let model = self.build_model()?;
        let mut resolved = model.clone();
        let schemas = SchemaRegistryList::new(vec![Arc::clone(environment.standard_schemas())]);
        if let Err(err) = resolved.resolve(&schemas) {
            return match expect {
                ExpectResult::Failure => {
                    check_failure(&err.to_string(), expected_failure)?;
                    Ok(RunSummary::default())
                }
                ExpectResult::Success => {
                    Err(anyhow::Error::new(err).context(format!("{} model failed to resolve", self.op_type)))
                }
            };
        }
        let node = resolved
            .main_graph()
            .node(0)
            .context("test model has no node")?;
        let bytes = model.to_bytes()?;

        let mut summary = RunSummary::default();
        for factory in providers {
            let provider = factory();
            let provider_type = provider.provider_type().to_string();
            if excluded.contains(&provider_type.as_str()) {
                debug!(op_type = %self.op_type, provider = %provider_type, "provider excluded");
                summary.skipped.push(provider_type);
                continue;
            }
            if provider
                .kernel_registry()
                .find_kernel_for(node, &provider_type)
                .is_none()
            {
                debug!(op_type = %self.op_type, provider = %provider_type, "provider has no kernel for node");
                summary.skipped.push(provider_type);
                continue;
            }

            let tolerance = Tolerance::for_provider(provider.reduced_precision())
                .with_abs(self.abs_error)
                .with_rel(self.rel_error);
            match (expect, self.run_on(&environment, provider, &bytes)) {
                (ExpectResult::Success, Ok(fetched)) => self.verify(&provider_type, &fetched, &tolerance)?,
                (ExpectResult::Success, Err(err)) => {
                    return Err(anyhow::Error::new(err)
                        .context(format!("{} failed on {provider_type}", self.op_type)))
                }
                (ExpectResult::Failure, Ok(_)) => bail!(
                    "{} succeeded on {provider_type} but was expected to fail with `{expected_failure}`",
                    self.op_type
                ),
                (ExpectResult::Failure, Err(err)) => {
                    let message = format!("{:#}", anyhow::Error::new(err));
                    check_failure(&message, expected_failure)
                        .with_context(|| format!("{} on {provider_type}", self.op_type))?;
                }
            }
            summary.exercised.push(provider_type);
        }
        if summary.exercised.is_empty() {
            warn!(op_type = %self.op_type, skipped = ?summary.skipped, "no provider ran the node");
        }
        Ok(summary)
    }

    /// Like [`OpTester::try_run`] but panics on any failure.
    pub fn run(
        &self,
        expect: ExpectResult,
        expected_failure: &str,
        excluded: &[&str],
        providers: &[&ProviderFactory],
    ) -> RunSummary {
        match self.try_run(expect, expected_failure, excluded, providers) {
            Ok(summary) => summary,
            Err(err) => panic!("{} test failed: {err:#}", self.op_type),
        }
    }

    fn run_on(
        &self,
        environment: &Environment,
        provider: Box<dyn ExecutionProvider>,
        model_bytes: &[u8],
    ) -> graphrt::Result<Vec<Value>> {
        let options = SessionOptions::default().with_log_id(format!("{}_test", self.op_type));
        let mut session = InferenceSession::new(environment, options);
        session.register_execution_provider(provider)?;
        session.load(ModelSource::Bytes(model_bytes.to_vec()))?;
        session.initialize()?;
        session.run(&RunOptions::tagged(&self.op_type), &self.feeds(), &self.output_names())
    }

    fn verify(&self, provider_type: &str, fetched: &[Value], tolerance: &Tolerance) -> anyhow::Result<()> {
        let expected: Vec<&(String, Value)> = self.outputs.iter().flatten().collect();
        ensure!(
            fetched.len() == expected.len(),
            "{provider_type} returned {} values for {} expected outputs",
            fetched.len(),
            expected.len()
        );
        for ((name, want), got) in expected.into_iter().zip(fetched) {
            if let Some(fence) = got.fence() {
                fence.before_using_as_input(CPU_PROVIDER, 0)?;
            }
            compare_values(name, want, got, tolerance)
                .with_context(|| format!("{} on {provider_type}", self.op_type))?;
        }
        Ok(())
    }
}

fn check_failure(message: &str, expected: &str) -> anyhow::Result<()> {
    ensure!(
        message.contains(expected),
        "expected an error containing `{expected}` but got `{message}`"
    );
    Ok(())
}
