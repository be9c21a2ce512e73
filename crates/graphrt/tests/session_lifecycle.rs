mod common;

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;

use common::{f32_arg, relu_add_model, HostProvider, HOST_PROVIDER};
use graphrt::graph::{Model, NodeArg};
use graphrt::kernel::{CustomRegistry, KernelContext, KernelDef, OpKernel};
use graphrt::schema::OpSchema;
use graphrt::types::{DataType, ElementType, Tensor, TensorData};
use graphrt::{
    EngineError, Environment, ErrorKind, InferenceSession, KernelResult, ModelSource, RunOptions,
    SessionOptions, SessionState, Value,
};

fn session() -> InferenceSession {
    InferenceSession::new(&Environment::new(), SessionOptions::default().with_log_id("lifecycle"))
}

fn ready_session() -> InferenceSession {
    let mut session = session();
    session
        .register_execution_provider(Box::new(HostProvider::new()))
        .unwrap();
    session.load(relu_add_model()).unwrap();
    session.initialize().unwrap();
    session
}

fn feeds(x: Vec<f32>, b: Vec<f32>) -> HashMap<String, Value> {
    HashMap::from([
        ("x".to_string(), Value::from(Tensor::from_vec(&[2], x).unwrap())),
        ("b".to_string(), Value::from(Tensor::from_vec(&[2], b).unwrap())),
    ])
}

fn floats(value: &Value) -> Vec<f32> {
    value.tensor().unwrap().as_slice::<f32>().unwrap().to_vec()
}

#[test]
fn runs_through_the_full_lifecycle() {
    let session = ready_session();
    assert_eq!(session.state(), SessionState::Initialized);
    assert_eq!(session.assigned_provider("add"), Some(HOST_PROVIDER));

    let outputs = session
        .run(&RunOptions::tagged("basic"), &feeds(vec![-1.0, 2.0], vec![3.0, 4.0]), &[])
        .unwrap();
    assert_eq!(outputs.len(), 1);
    assert_eq!(floats(&outputs[0]), vec![3.0, 6.0]);
}

#[test]
fn operations_out_of_order_are_contract_violations() {
    let mut session = session();
    let err = session
        .run(&RunOptions::default(), &HashMap::new(), &[])
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidState {
            operation: "run",
            state: SessionState::Created
        }
    ));
    assert_eq!(err.kind(), ErrorKind::ContractViolation);
    assert!(session.initialize().is_err());

    session.load(relu_add_model()).unwrap();
    let err = session
        .register_execution_provider(Box::new(HostProvider::new()))
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidState { state: SessionState::Loaded, .. }));
    assert!(session.load(relu_add_model()).is_err());
}

#[test]
fn providers_are_registered_once() {
    let mut session = session();
    session
        .register_execution_provider(Box::new(HostProvider::new()))
        .unwrap();
    let err = session
        .register_execution_provider(Box::new(HostProvider::new()))
        .unwrap_err();
    assert!(matches!(err, EngineError::DuplicateProvider(ref name) if name == HOST_PROVIDER));
    assert_eq!(session.providers(), vec![HOST_PROVIDER]);
}

#[test]
fn failed_load_is_terminal() {
    let mut session = session();
    let err = session.load(ModelSource::Json("not json".to_string())).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Structural);
    assert_eq!(session.state(), SessionState::Failed);
    assert!(matches!(
        session.initialize().unwrap_err(),
        EngineError::InvalidState { state: SessionState::Failed, .. }
    ));
}

#[test]
fn unsupported_operator_fails_initialization() {
    let mut session = session();
    session.load(relu_add_model()).unwrap();
    let err = session.initialize().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedOperator);
    assert!(matches!(err, EngineError::UnsupportedOperator { ref op_type, .. } if op_type == "Relu"));
    assert_eq!(session.state(), SessionState::Failed);
    assert!(session
        .run(&RunOptions::default(), &feeds(vec![0.0; 2], vec![0.0; 2]), &[])
        .is_err());
}

#[test]
fn feeds_are_validated_before_execution() {
    let session = ready_session();
    let run = |feeds: HashMap<String, Value>| {
        session
            .run(&RunOptions::default(), &feeds, &[])
            .unwrap_err()
    };

    let mut missing = feeds(vec![1.0, 2.0], vec![1.0, 2.0]);
    missing.remove("b");
    match run(missing) {
        EngineError::MissingInput {
            required,
            supplied,
            missing,
        } => {
            assert_eq!((required, supplied), (2, 1));
            assert_eq!(missing, "b");
        }
        other => panic!("unexpected error: {other}"),
    }

    let mut unknown = feeds(vec![1.0, 2.0], vec![1.0, 2.0]);
    unknown.insert("h".to_string(), Value::from(Tensor::scalar(1.0f32)));
    assert!(matches!(run(unknown), EngineError::UnknownInput(ref name) if name == "h"));

    let mut wrong_type = feeds(vec![1.0, 2.0], vec![1.0, 2.0]);
    wrong_type.insert("x".to_string(), Value::from(Tensor::from_vec(&[2], vec![1i64, 2]).unwrap()));
    assert!(matches!(run(wrong_type), EngineError::InputTypeMismatch { .. }));

    let mut wrong_shape = feeds(vec![1.0, 2.0], vec![1.0, 2.0]);
    wrong_shape.insert("x".to_string(), Value::from(Tensor::from_vec(&[3], vec![1.0f32, 2.0, 3.0]).unwrap()));
    let err = run(wrong_shape);
    assert!(matches!(err, EngineError::InputShapeMismatch { ref actual, .. } if actual == &[3]));
    assert_eq!(err.kind(), ErrorKind::ContractViolation);
}

#[test]
fn unknown_output_names_are_rejected() {
    let session = ready_session();
    let err = session
        .run(&RunOptions::default(), &feeds(vec![1.0, 2.0], vec![1.0, 2.0]), &["h"])
        .unwrap_err();
    assert!(matches!(err, EngineError::UnknownOutput(ref name) if name == "h"));
}

#[test]
fn initializers_may_be_overridden_by_feeds() {
    let mut model = relu_add_model();
    model
        .main_graph_mut()
        .add_initializer("b", Tensor::from_vec(&[2], vec![10.0f32, 20.0]).unwrap())
        .unwrap();
    let mut session = session();
    session
        .register_execution_provider(Box::new(HostProvider::new()))
        .unwrap();
    session.load(model).unwrap();
    session.initialize().unwrap();

    let inputs: Vec<_> = session.inputs_meta().unwrap().into_iter().map(|meta| meta.name).collect();
    assert_eq!(inputs, vec!["x"]);

    let x_only = HashMap::from([(
        "x".to_string(),
        Value::from(Tensor::from_vec(&[2], vec![1.0f32, -1.0]).unwrap()),
    )]);
    let outputs = session.run(&RunOptions::default(), &x_only, &["y"]).unwrap();
    assert_eq!(floats(&outputs[0]), vec![11.0, 20.0]);

    let overridden = session
        .run(&RunOptions::default(), &feeds(vec![1.0, -1.0], vec![0.5, 0.5]), &["y"])
        .unwrap();
    assert_eq!(floats(&overridden[0]), vec![1.5, 0.5]);
}

#[test]
fn memory_plan_releases_intermediates_only() {
    let session = ready_session();
    let plan = session.memory_plan().unwrap();
    let entry = |name: &str| plan.iter().find(|entry| entry.value == name).unwrap();

    let h = entry("h");
    assert_eq!(h.producer.as_deref(), Some("relu"));
    assert_eq!(h.last_consumer.as_deref(), Some("add"));
    assert!(h.released_after_use);

    let y = entry("y");
    assert_eq!(y.producer.as_deref(), Some("add"));
    assert!(!y.released_after_use);
    assert!(y.location.is_host_accessible());
}

#[test]
fn metadata_is_available_after_load() {
    let mut model = relu_add_model();
    model.metadata_mut().producer_name = "tests".to_string();
    model.metadata_mut().model_version = 3;
    let mut session = session();
    assert!(session.model_meta().is_err());
    session.load(model).unwrap();

    let meta = session.model_meta().unwrap();
    assert_eq!(meta.graph_name, "relu_add");
    assert_eq!(meta.producer_name, "tests");
    assert_eq!(meta.model_version, 3);

    let outputs = session.outputs_meta().unwrap();
    assert_eq!(outputs[0].name, "y");
    assert_eq!(outputs[0].data_type, Some(DataType::Tensor(ElementType::F32)));
}

#[test]
fn concurrent_runs_share_one_session() {
    let provider = HostProvider::new();
    let executed = Arc::clone(&provider.executed);
    let mut session = session();
    session.register_execution_provider(Box::new(provider)).unwrap();
    session.load(relu_add_model()).unwrap();
    session.initialize().unwrap();
    let session = Arc::new(session);

    let handles: Vec<_> = (0..4)
        .map(|idx| {
            let session = Arc::clone(&session);
            thread::spawn(move || {
                let value = idx as f32;
                let outputs = session
                    .run(
                        &RunOptions::tagged(format!("worker-{idx}")),
                        &feeds(vec![value, -value], vec![1.0, 1.0]),
                        &[],
                    )
                    .unwrap();
                assert_eq!(floats(&outputs[0]), vec![value + 1.0, 1.0]);
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(executed.load(Ordering::SeqCst), 8);
}

#[test]
fn profiling_writes_a_trace_file() {
    let dir = tempfile::tempdir().unwrap();
    let options = SessionOptions::default().with_profiling(Some(dir.path().join("trace")));
    let mut session = InferenceSession::new(&Environment::new(), options);
    session
        .register_execution_provider(Box::new(HostProvider::new()))
        .unwrap();
    session.load(relu_add_model()).unwrap();
    session.initialize().unwrap();
    session
        .run(&RunOptions::default(), &feeds(vec![1.0, 2.0], vec![1.0, 2.0]), &[])
        .unwrap();

    let report = session.profile_report();
    let nodes: Vec<_> = report.node_events().map(|event| event.name.as_str()).collect();
    assert_eq!(nodes, vec!["relu", "add"]);

    let path = session.end_profiling().unwrap().unwrap();
    assert!(path.starts_with(dir.path()));
    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert!(json["traceEvents"].as_array().unwrap().len() >= 4);
    assert!(session.profile_report().trace_events.is_empty());
}

#[test]
fn profiling_disabled_writes_nothing() {
    let session = ready_session();
    if session.options().enable_profiling {
        // GRAPHRT_PROFILE is set in this environment.
        return;
    }
    assert_eq!(session.end_profiling().unwrap(), None);
}

struct Double;

impl OpKernel for Double {
    fn compute(&self, ctx: &mut KernelContext<'_>) -> KernelResult<()> {
        let input = ctx.input_tensor(0)?;
        let doubled = input.as_slice::<f32>()?.iter().map(|v| v * 2.0).collect();
        ctx.set_output_tensor(0, input.dims().to_vec(), TensorData::F32(doubled))
    }
}

#[test]
fn custom_registries_add_operators_and_take_precedence() {
    let float = vec![DataType::Tensor(ElementType::F32)];
    let mut custom = CustomRegistry::new();
    custom
        .register_schema(
            OpSchema::builder("Double", "com.example", 1)
                .input("X", "T")
                .output("Y", "T")
                .type_constraint("T", float.clone())
                .build()
                .unwrap(),
        )
        .unwrap();
    custom
        .register_kernel(
            KernelDef::builder("Double")
                .domain("com.example")
                .provider(HOST_PROVIDER)
                .build()
                .unwrap(),
            |_info| Ok(Box::new(Double) as Box<dyn OpKernel>),
        )
        .unwrap();
    // Overrides the provider's own Relu.
    custom
        .register_kernel(
            KernelDef::builder("Relu")
                .since_version(6)
                .provider(HOST_PROVIDER)
                .build()
                .unwrap(),
            |_info| Ok(Box::new(Double) as Box<dyn OpKernel>),
        )
        .unwrap();

    let mut model = Model::new(
        "custom",
        BTreeMap::from([(String::new(), 9), ("com.example".to_string(), 1)]),
    );
    let graph = model.main_graph_mut();
    graph
        .add_node("double", "Double", "", &[f32_arg("x", &[2])], &[NodeArg::new("d", None)], None, "com.example")
        .unwrap();
    graph
        .add_node("relu", "Relu", "", &[NodeArg::new("d", None)], &[NodeArg::new("y", None)], None, "")
        .unwrap();

    let mut session = session();
    session
        .register_execution_provider(Box::new(HostProvider::new()))
        .unwrap();
    session.register_custom_registry(Arc::new(custom)).unwrap();
    session.load(model).unwrap();
    session.initialize().unwrap();

    let feeds = HashMap::from([(
        "x".to_string(),
        Value::from(Tensor::from_vec(&[2], vec![1.0f32, -2.0]).unwrap()),
    )]);
    let outputs = session.run(&RunOptions::default(), &feeds, &[]).unwrap();
    assert_eq!(floats(&outputs[0]), vec![4.0, -8.0]);
}
