//! Inference session: load a model, bind its nodes to providers and run it.
//!
//! A session moves through `Created -> Loaded -> Initialized`, after which it can be run any
//! number of times, concurrently if the caller wishes. A failed load or initialize leaves the
//! session in the terminal `Failed` state. Calls made in the wrong state return
//! [`EngineError::InvalidState`].

mod plan;
mod profiler;
mod run;

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn, Span};

use crate::config::SessionOptions;
use crate::environment::Environment;
use crate::error::{EngineError, GraphError, Result};
use crate::graph::{Model, Node};
use crate::kernel::{CustomRegistry, KernelCreateInfo, OpKernelInfo};
use crate::logging;
use crate::provider::ExecutionProvider;
use crate::schema::{OpSchemaRegistry, SchemaRegistryList};
use crate::types::{DataType, TensorShape};

use plan::{Assignment, ExecutionPlan};
pub use plan::AllocationPlanEntry;
use profiler::Profiler;
pub use profiler::{ProfileReport, TraceEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Loaded,
    Initialized,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionState::Created => "created",
            SessionState::Loaded => "loaded",
            SessionState::Initialized => "initialized",
            SessionState::Failed => "failed",
        })
    }
}

/// Where [`InferenceSession::load`] takes its model from.
#[derive(Debug)]
pub enum ModelSource {
    Model(Model),
    Json(String),
    Bytes(Vec<u8>),
    Path(PathBuf),
}

impl From<Model> for ModelSource {
    fn from(model: Model) -> Self {
        ModelSource::Model(model)
    }
}

impl From<PathBuf> for ModelSource {
    fn from(path: PathBuf) -> Self {
        ModelSource::Path(path)
    }
}

impl From<&Path> for ModelSource {
    fn from(path: &Path) -> Self {
        ModelSource::Path(path.to_path_buf())
    }
}

/// Name, type and declared shape of a model input or output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeArgMeta {
    pub name: String,
    pub data_type: Option<DataType>,
    pub shape: Option<TensorShape>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelMeta {
    pub graph_name: String,
    pub producer_name: String,
    pub producer_version: String,
    pub domain: String,
    pub description: String,
    pub model_version: i64,
    pub custom_metadata: BTreeMap<String, String>,
}

pub struct InferenceSession {
    options: SessionOptions,
    state: SessionState,
    standard_schemas: Arc<OpSchemaRegistry>,
    providers: Vec<Box<dyn ExecutionProvider>>,
    custom_registries: Vec<Arc<CustomRegistry>>,
    model: Option<Model>,
    plan: Option<ExecutionPlan>,
    profiler: Profiler,
    span: Span,
}

impl InferenceSession {
    /// Creates a session. Environment overrides (`GRAPHRT_*`) are applied on top of `options`.
    pub fn new(environment: &Environment, options: SessionOptions) -> Self {
        let options = options.with_env_overrides();
        let span = logging::session_span(&options.session_log_id);
        InferenceSession {
            profiler: Profiler::new(options.enable_profiling),
            options,
            state: SessionState::Created,
            standard_schemas: Arc::clone(environment.standard_schemas()),
            providers: Vec::new(),
            custom_registries: Vec::new(),
            model: None,
            plan: None,
            span,
        }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn expect_state(&self, operation: &'static str, expected: SessionState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(EngineError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    /// Adds a provider. Node assignment tries providers in registration order.
    pub fn register_execution_provider(&mut self, provider: Box<dyn ExecutionProvider>) -> Result<()> {
        self.expect_state("register_execution_provider", SessionState::Created)?;
        let provider_type = provider.provider_type().to_string();
        if self
            .providers
            .iter()
            .any(|existing| existing.provider_type() == provider_type)
        {
            return Err(EngineError::DuplicateProvider(provider_type));
        }
        let _guard = self.span.enter();
        debug!(provider = %provider_type, position = self.providers.len(), "registered execution provider");
        self.providers.push(provider);
        Ok(())
    }

    /// Adds caller-supplied schemas and kernels. Later registries take precedence.
    pub fn register_custom_registry(&mut self, registry: Arc<CustomRegistry>) -> Result<()> {
        self.expect_state("register_custom_registry", SessionState::Created)?;
        self.custom_registries.push(registry);
        Ok(())
    }

    pub fn providers(&self) -> Vec<&str> {
        self.providers
            .iter()
            .map(|provider| provider.provider_type())
            .collect()
    }

    fn schema_registries(&self) -> SchemaRegistryList {
        let mut list = SchemaRegistryList::default();
        for custom in self.custom_registries.iter().rev() {
            list.push(Arc::clone(custom.schema_registry()));
        }
        list.push(Arc::clone(&self.standard_schemas));
        list
    }

    /// Decodes (when needed) and resolves the model.
    pub fn load(&mut self, source: impl Into<ModelSource>) -> Result<()> {
        self.expect_state("load", SessionState::Created)?;
        let span = self.span.clone();
        let _guard = span.enter();
        let started = self.profiler.start();

        match self.load_model(source.into()) {
            Ok(model) => {
                info!(
                    graph = %model.main_graph().name(),
                    nodes = model.main_graph().nodes().len(),
                    "model loaded"
                );
                self.model = Some(model);
                self.state = SessionState::Loaded;
                self.profiler.record_session("model_loading", started);
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "model load failed");
                self.state = SessionState::Failed;
                Err(err)
            }
        }
    }

    fn load_model(&self, source: ModelSource) -> Result<Model> {
        let mut model = match source {
            ModelSource::Model(model) => model,
            ModelSource::Json(json) => Model::from_json(&json)?,
            ModelSource::Bytes(bytes) => Model::from_bytes(&bytes)?,
            ModelSource::Path(path) => Model::load(&path)?,
        };
        model.resolve(&self.schema_registries())?;
        Ok(model)
    }

    /// Assigns every node to a provider, instantiates kernels and plans memory.
    pub fn initialize(&mut self) -> Result<()> {
        self.expect_state("initialize", SessionState::Loaded)?;
        let span = self.span.clone();
        let _guard = span.enter();
        let started = self.profiler.start();

        match self.build_plan() {
            Ok(plan) => {
                info!(
                    steps = plan.steps.len(),
                    values = plan.slots.len(),
                    "session initialized"
                );
                self.plan = Some(plan);
                self.state = SessionState::Initialized;
                self.profiler.record_session("session_initialization", started);
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "session initialization failed");
                self.state = SessionState::Failed;
                Err(err)
            }
        }
    }

    fn build_plan(&mut self) -> Result<ExecutionPlan> {
        let model = self.model.as_mut().ok_or(EngineError::InvalidState {
            operation: "initialize",
            state: self.state,
        })?;
        let graph = model.main_graph_mut();
        let order = graph.topological_order()?.to_vec();

        let mut assignments = Vec::with_capacity(order.len());
        for index in order {
            let node = graph.node(index).ok_or(GraphError::UnknownNode(index))?;
            let (provider_index, create_info) =
                select_kernel(&self.providers, &self.custom_registries, node)
                    .map(|(provider, info)| (provider, info.clone()))
                    .ok_or_else(|| EngineError::UnsupportedOperator {
                        node: node.name().to_string(),
                        op_type: node.op_type().to_string(),
                        domain: node.domain().to_string(),
                        version: node.since_version().unwrap_or_default(),
                    })?;

            let provider = &self.providers[provider_index];
            graph.set_execution_provider(index, provider.provider_type())?;
            let node = graph.node(index).ok_or(GraphError::UnknownNode(index))?;
            let info = OpKernelInfo::new(node, &create_info.def, provider.provider_type());
            let kernel = create_info
                .create(&info)
                .map_err(|source| EngineError::KernelCreation {
                    node: node.name().to_string(),
                    op_type: node.op_type().to_string(),
                    provider: provider.provider_type().to_string(),
                    source,
                })?;
            debug!(
                node = %node.name(),
                op_type = %node.op_type(),
                provider = %provider.provider_type(),
                "assigned node"
            );
            assignments.push(Assignment {
                node_index: index,
                provider: provider_index,
                kernel,
            });
        }

        ExecutionPlan::build(graph, assignments, &self.providers)
    }

    fn loaded_model(&self, operation: &'static str) -> Result<&Model> {
        match (&self.model, self.state) {
            (Some(model), SessionState::Loaded | SessionState::Initialized) => Ok(model),
            _ => Err(EngineError::InvalidState {
                operation,
                state: self.state,
            }),
        }
    }

    /// Inputs the caller must feed. Initializers are not listed.
    pub fn inputs_meta(&self) -> Result<Vec<NodeArgMeta>> {
        let graph = self.loaded_model("inputs_meta")?.main_graph();
        Ok(graph
            .inputs()?
            .into_iter()
            .filter(|arg| !graph.initializers().contains_key(arg.name()))
            .map(|arg| NodeArgMeta {
                name: arg.name().to_string(),
                data_type: arg.data_type(),
                shape: arg.shape().cloned(),
            })
            .collect())
    }

    pub fn outputs_meta(&self) -> Result<Vec<NodeArgMeta>> {
        let graph = self.loaded_model("outputs_meta")?.main_graph();
        Ok(graph
            .outputs()?
            .into_iter()
            .map(|arg| NodeArgMeta {
                name: arg.name().to_string(),
                data_type: arg.data_type(),
                shape: arg.shape().cloned(),
            })
            .collect())
    }

    pub fn model_meta(&self) -> Result<ModelMeta> {
        let model = self.loaded_model("model_meta")?;
        let metadata = model.metadata();
        Ok(ModelMeta {
            graph_name: model.main_graph().name().to_string(),
            producer_name: metadata.producer_name.clone(),
            producer_version: metadata.producer_version.clone(),
            domain: metadata.domain.clone(),
            description: metadata.description.clone(),
            model_version: metadata.model_version,
            custom_metadata: metadata.custom_metadata.clone(),
        })
    }

    /// Provider a node was assigned to during initialization.
    pub fn assigned_provider(&self, node_name: &str) -> Option<&str> {
        self.model
            .as_ref()?
            .main_graph()
            .node_by_name(node_name)?
            .execution_provider()
    }

    /// Placement and lifetime of every value in the execution plan.
    pub fn memory_plan(&self) -> Result<Vec<AllocationPlanEntry>> {
        self.expect_state("memory_plan", SessionState::Initialized)?;
        match (&self.plan, &self.model) {
            (Some(plan), Some(model)) => Ok(plan.describe(model.main_graph())),
            _ => Err(EngineError::InvalidState {
                operation: "memory_plan",
                state: self.state,
            }),
        }
    }

    /// Events recorded so far, without clearing them.
    pub fn profile_report(&self) -> ProfileReport {
        self.profiler.snapshot(&self.options.session_log_id)
    }

    /// Writes the recorded events as a JSON trace and clears them.
    ///
    /// Returns the file written, or `None` when profiling is disabled.
    pub fn end_profiling(&self) -> Result<Option<PathBuf>> {
        if !self.profiler.enabled() {
            warn!(log_id = %self.options.session_log_id, "end_profiling called with profiling disabled");
            return Ok(None);
        }
        let report = self.profiler.take_report(&self.options.session_log_id);
        let prefix = self
            .options
            .profile_file_prefix
            .clone()
            .unwrap_or_else(|| PathBuf::from("graphrt_profile"));
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_micros())
            .unwrap_or_default();
        let path = PathBuf::from(format!("{}_{stamp}.json", prefix.display()));
        let json = serde_json::to_vec_pretty(&report).map_err(|err| EngineError::ProfileOutput {
            path: path.clone(),
            source: std::io::Error::other(err),
        })?;
        fs::write(&path, json).map_err(|source| EngineError::ProfileOutput {
            path: path.clone(),
            source,
        })?;
        info!(path = %path.display(), events = report.trace_events.len(), "profile written");
        Ok(Some(path))
    }
}

/// First provider, in registration order, with a matching kernel. For each provider the custom
/// registries are consulted, most recent first, before the provider's own registry.
fn select_kernel<'r>(
    providers: &'r [Box<dyn ExecutionProvider>],
    custom_registries: &'r [Arc<CustomRegistry>],
    node: &Node,
) -> Option<(usize, &'r KernelCreateInfo)> {
    providers
        .iter()
        .enumerate()
        .find_map(|(index, provider)| {
            let provider_type = provider.provider_type();
            custom_registries
                .iter()
                .rev()
                .find_map(|registry| registry.kernel_registry().find_kernel_for(node, provider_type))
                .or_else(|| provider.kernel_registry().find_kernel_for(node, provider_type))
                .map(|info| (index, info))
        })
}
