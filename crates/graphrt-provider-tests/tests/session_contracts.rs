use std::collections::{BTreeMap, HashMap};

use graphrt::graph::{Model, NodeArg};
use graphrt::types::ElementType;
use graphrt::{
    EngineError, Environment, ErrorKind, ExecutionProvider, InferenceSession, RunOptions,
    SessionOptions, SessionState, Tensor, Value, ValueData,
};
use graphrt_provider_tests::{
    ExecutedNode, ExpectResult, OpTester, RecordingProvider, StrictFence,
};

fn f32_arg(name: &str) -> NodeArg {
    NodeArg::tensor(name, ElementType::F32, &[2])
}

/// `y = Add(Relu(x), b)`.
fn relu_add_model() -> Model {
    let mut model = Model::new("relu_add", BTreeMap::from([(String::new(), 9)]));
    let graph = model.main_graph_mut();
    graph
        .add_node("relu", "Relu", "", &[f32_arg("x")], &[NodeArg::new("h", None)], None, "")
        .unwrap();
    graph
        .add_node(
            "add",
            "Add",
            "",
            &[NodeArg::new("h", None), f32_arg("b")],
            &[NodeArg::new("y", None)],
            None,
            "",
        )
        .unwrap();
    model
}

fn floats(values: [f32; 2]) -> Value {
    Value::from(Tensor::from_vec(&[2], values.to_vec()).unwrap())
}

fn session_with(providers: Vec<Box<dyn ExecutionProvider>>) -> InferenceSession {
    let mut session = InferenceSession::new(&Environment::new(), SessionOptions::default());
    for provider in providers {
        session.register_execution_provider(provider).unwrap();
    }
    session.load(relu_add_model()).unwrap();
    session.initialize().unwrap();
    session
}

fn feeds(entries: &[(&str, Value)]) -> HashMap<String, Value> {
    entries
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

fn executed(node: &str, op_type: &str, provider: &str) -> ExecutedNode {
    ExecutedNode {
        provider: provider.to_string(),
        node: node.to_string(),
        op_type: op_type.to_string(),
    }
}

#[test]
fn consumers_wait_on_fences_before_reading() {
    let producer = RecordingProvider::deferred("Producer", &["Relu"]).unwrap();
    let consumer = RecordingProvider::new("Consumer", &["Add"]).unwrap();
    let producer_log = producer.log();
    let consumer_log = consumer.log();
    let session = session_with(vec![Box::new(producer), Box::new(consumer)]);

    let (x, fence) = StrictFence::fenced_value(ValueData::Tensor(
        Tensor::from_vec(&[2], vec![1.0f32, 2.0]).unwrap(),
    ));
    let fetched = session
        .run(&RunOptions::default(), &feeds(&[("x", x), ("b", floats([0.0, 0.0]))]), &[])
        .unwrap();

    assert_eq!(fence.consumers(), vec!["Producer".to_string()]);
    assert_eq!(fence.released(), 1);
    assert_eq!(
        RecordingProvider::executed(&producer_log),
        vec![executed("relu", "Relu", "Producer")]
    );
    assert_eq!(
        RecordingProvider::executed(&consumer_log),
        vec![executed("add", "Add", "Consumer")]
    );
    // The recording kernels forward their first input.
    assert_eq!(fetched[0].tensor().unwrap().as_slice::<f32>().unwrap(), &[1.0, 2.0]);
}

#[test]
fn fetched_values_are_ready() {
    let provider = RecordingProvider::deferred("Deferred", &["Relu", "Add"]).unwrap();
    let session = session_with(vec![Box::new(provider)]);
    let fetched = session
        .run(
            &RunOptions::tagged("fetch"),
            &feeds(&[("x", floats([3.0, 4.0])), ("b", floats([0.0, 0.0]))]),
            &["y"],
        )
        .unwrap();
    assert!(fetched[0].is_ready());
    assert_eq!(fetched[0].tensor().unwrap().as_slice::<f32>().unwrap(), &[3.0, 4.0]);
}

#[test]
fn earlier_providers_take_precedence() {
    let first = RecordingProvider::new("First", &["Relu", "Add"]).unwrap();
    let second = RecordingProvider::new("Second", &["Relu", "Add"]).unwrap();
    let second_log = second.log();
    let session = session_with(vec![Box::new(first), Box::new(second)]);

    assert_eq!(session.providers(), vec!["First", "Second"]);
    assert_eq!(session.assigned_provider("relu"), Some("First"));
    assert_eq!(session.assigned_provider("add"), Some("First"));
    session
        .run(
            &RunOptions::default(),
            &feeds(&[("x", floats([1.0, 1.0])), ("b", floats([1.0, 1.0]))]),
            &[],
        )
        .unwrap();
    assert!(RecordingProvider::executed(&second_log).is_empty());
}

#[test]
fn nodes_fall_through_to_the_first_provider_that_claims_them() {
    let adds = RecordingProvider::new("Adds", &["Add"]).unwrap();
    let relus = RecordingProvider::new("Relus", &["Relu"]).unwrap();
    let session = session_with(vec![Box::new(adds), Box::new(relus)]);
    assert_eq!(session.assigned_provider("relu"), Some("Relus"));
    assert_eq!(session.assigned_provider("add"), Some("Adds"));
}

#[test]
fn unclaimed_nodes_fail_initialization() {
    let mut session = InferenceSession::new(&Environment::new(), SessionOptions::default());
    session
        .register_execution_provider(Box::new(RecordingProvider::new("Adds", &["Add"]).unwrap()))
        .unwrap();
    session.load(relu_add_model()).unwrap();

    let err = session.initialize().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedOperator);
    assert!(matches!(err, EngineError::UnsupportedOperator { ref node, .. } if node == "relu"));
    assert_eq!(session.state(), SessionState::Failed);
}

#[test]
fn feeds_are_checked_against_the_graph_inputs() {
    let provider = RecordingProvider::new("All", &["Relu", "Add"]).unwrap();
    let session = session_with(vec![Box::new(provider)]);
    let options = RunOptions::default();

    let err = session
        .run(&options, &feeds(&[("x", floats([1.0, 2.0]))]), &[])
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::MissingInput { required: 2, supplied: 1, ref missing } if missing == "b"
    ));

    let err = session
        .run(
            &options,
            &feeds(&[
                ("x", floats([1.0, 2.0])),
                ("b", floats([1.0, 2.0])),
                ("z", floats([1.0, 2.0])),
            ]),
            &[],
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::UnknownInput(ref name) if name == "z"));

    let ints = Value::from(Tensor::from_vec(&[2], vec![1i64, 2]).unwrap());
    let err = session
        .run(&options, &feeds(&[("x", ints), ("b", floats([1.0, 2.0]))]), &[])
        .unwrap_err();
    assert!(matches!(err, EngineError::InputTypeMismatch { ref name, .. } if name == "x"));
    assert_eq!(err.kind(), ErrorKind::ContractViolation);
}

#[test]
fn harness_skips_providers_without_a_kernel() {
    let only_add = || -> Box<dyn ExecutionProvider> {
        Box::new(RecordingProvider::new("OnlyAdd", &["Add"]).unwrap())
    };
    let relus = || -> Box<dyn ExecutionProvider> {
        Box::new(RecordingProvider::new("Relus", &["Relu"]).unwrap())
    };
    let mut tester = OpTester::new("Relu", 6);
    tester
        .add_input("X", &[2], vec![0.5f32, 1.5])
        .add_output("Y", &[2], vec![0.5f32, 1.5]);

    let summary = tester.run(ExpectResult::Success, "", &[], &[&only_add, &relus]);
    assert_eq!(summary.exercised, vec!["Relus".to_string()]);
    assert_eq!(summary.skipped, vec!["OnlyAdd".to_string()]);

    let summary = tester.run(ExpectResult::Success, "", &["Relus"], &[&only_add, &relus]);
    assert!(summary.exercised.is_empty());
    assert_eq!(summary.skipped.len(), 2);
}

#[test]
fn harness_reports_output_mismatches() {
    let relus = || -> Box<dyn ExecutionProvider> {
        Box::new(RecordingProvider::new("Relus", &["Relu"]).unwrap())
    };
    let mut tester = OpTester::new("Relu", 6);
    tester
        .add_input("X", &[2], vec![0.5f32, 1.5])
        .add_output("Y", &[2], vec![0.5f32, 1.6]);
    let err = tester
        .try_run(ExpectResult::Success, "", &[], &[&relus])
        .unwrap_err();
    assert!(format!("{err:#}").contains("element 1"));

    let err = tester
        .try_run(ExpectResult::Failure, "boom", &[], &[&relus])
        .unwrap_err();
    assert!(err.to_string().contains("expected to fail"));
}

#[test]
fn harness_honors_explicit_tolerances() {
    let relus = || -> Box<dyn ExecutionProvider> {
        Box::new(RecordingProvider::new("Relus", &["Relu"]).unwrap())
    };
    let mut tester = OpTester::new("Relu", 6);
    tester
        .add_input("X", &[1], vec![100.0f32])
        .add_output("Y", &[1], vec![100.5f32])
        .set_output_rel_err(0.01);
    let summary = tester.run(ExpectResult::Success, "", &[], &[&relus]);
    assert!(summary.exercised("Relus"));
}

#[test]
fn harness_waits_on_fenced_outputs() {
    let deferred = || -> Box<dyn ExecutionProvider> {
        Box::new(RecordingProvider::deferred("Deferred", &["Identity"]).unwrap())
    };
    let mut tester = OpTester::new("Identity", 1);
    tester
        .add_input("X", &[3], vec![1i32, 2, 3])
        .add_output("Y", &[3], vec![1i32, 2, 3]);
    let summary = tester.run(ExpectResult::Success, "", &[], &[&deferred]);
    assert!(summary.exercised("Deferred"));
}
