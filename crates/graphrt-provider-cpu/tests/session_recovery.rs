use std::collections::{BTreeMap, HashMap};

use graphrt::graph::{Model, NodeArg};
use graphrt::types::ElementType;
use graphrt::{
    Environment, ErrorKind, InferenceSession, RunOptions, SessionOptions, SessionState, Tensor,
    Value,
};
use graphrt_provider_cpu::CpuExecutionProvider;

/// `c = Div(a, b)` over int64 vectors of length 2.
fn divide_model() -> Model {
    let mut model = Model::new("divide", BTreeMap::from([(String::new(), 7)]));
    model
        .main_graph_mut()
        .add_node(
            "div",
            "Div",
            "",
            &[
                NodeArg::tensor("a", ElementType::I64, &[2]),
                NodeArg::tensor("b", ElementType::I64, &[2]),
            ],
            &[NodeArg::new("c", None)],
            None,
            "",
        )
        .unwrap();
    model
}

fn feeds(a: [i64; 2], b: [i64; 2]) -> HashMap<String, Value> {
    HashMap::from([
        ("a".to_string(), Value::from(Tensor::from_vec(&[2], a.to_vec()).unwrap())),
        ("b".to_string(), Value::from(Tensor::from_vec(&[2], b.to_vec()).unwrap())),
    ])
}

#[test]
fn failed_runs_leave_the_session_runnable() {
    let mut session = InferenceSession::new(&Environment::new(), SessionOptions::default());
    session
        .register_execution_provider(Box::new(CpuExecutionProvider::new()))
        .unwrap();
    session.load(divide_model()).unwrap();
    session.initialize().unwrap();

    let err = session
        .run(&RunOptions::tagged("zero"), &feeds([4, 2], [2, 0]), &["c"])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Execution);
    assert!(err.to_string().contains("integer division by zero"), "unexpected error: {err}");
    assert_eq!(session.state(), SessionState::Initialized);

    let fetched = session
        .run(&RunOptions::tagged("retry"), &feeds([4, 2], [2, 1]), &["c"])
        .unwrap();
    assert_eq!(fetched[0].tensor().unwrap().as_slice::<i64>().unwrap(), &[2, 2]);
}
