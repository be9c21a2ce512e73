use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::thread;

use graphrt::graph::{Model, NodeArg};
use graphrt::types::ElementType;
use graphrt::{
    Environment, ErrorKind, ExecutionProvider, InferenceSession, RunOptions, SessionOptions,
    Tensor, Value, CPU_PROVIDER,
};
use graphrt_provider_cpu::CpuExecutionProvider;
use graphrt_provider_faer::{FaerExecutionProvider, FAER_PROVIDER};
use graphrt_provider_stream::{StreamExecutionProvider, STREAM_PROVIDER};
use graphrt_provider_tests::conformance;

graphrt_provider_tests::define_provider_tests!(stream, graphrt_provider_stream::StreamExecutionProvider::new);

fn stream() -> Box<dyn ExecutionProvider> {
    Box::new(StreamExecutionProvider::new())
}

fn floats(dims: &[usize], values: Vec<f32>) -> Value {
    Value::from(Tensor::from_vec(dims, values).unwrap())
}

fn session(providers: Vec<Box<dyn ExecutionProvider>>, model: Model) -> anyhow::Result<InferenceSession> {
    let mut session = InferenceSession::new(&Environment::new(), SessionOptions::default());
    for provider in providers {
        session.register_execution_provider(provider)?;
    }
    session.load(model)?;
    session.initialize()?;
    Ok(session)
}

#[test]
fn stream_claims_float_elementwise_ops() {
    assert!(conformance::add_matches_expected(&stream).exercised(STREAM_PROVIDER));
    assert!(conformance::add_broadcasts_trailing_dims(&stream).exercised(STREAM_PROVIDER));
    assert!(!conformance::matmul_matches_expected(&stream).exercised(STREAM_PROVIDER));

    let unary = conformance::unary_activations_match_expected(&stream);
    let claimed: Vec<bool> = unary
        .iter()
        .map(|summary| summary.exercised(STREAM_PROVIDER))
        .collect();
    // Relu, Sigmoid, Tanh, Exp, Neg, Abs: everything but Exp runs on the stream.
    assert_eq!(claimed, vec![true, true, true, false, true, true]);
}

/// `y = Exp(Add(MatMul(Relu(x), w), b))`.
fn dense_model() -> Model {
    let mut model = Model::new("dense", BTreeMap::from([(String::new(), 9)]));
    let graph = model.main_graph_mut();
    graph
        .add_node(
            "relu",
            "Relu",
            "",
            &[NodeArg::tensor("x", ElementType::F32, &[2, 3])],
            &[NodeArg::new("h", None)],
            None,
            "",
        )
        .unwrap();
    graph
        .add_node(
            "matmul",
            "MatMul",
            "",
            &[NodeArg::new("h", None), NodeArg::tensor("w", ElementType::F32, &[3, 2])],
            &[NodeArg::new("m", None)],
            None,
            "",
        )
        .unwrap();
    graph
        .add_node(
            "add",
            "Add",
            "",
            &[NodeArg::new("m", None), NodeArg::tensor("b", ElementType::F32, &[2])],
            &[NodeArg::new("s", None)],
            None,
            "",
        )
        .unwrap();
    graph
        .add_node("exp", "Exp", "", &[NodeArg::new("s", None)], &[NodeArg::new("y", None)], None, "")
        .unwrap();
    graph
        .add_initializer(
            "w",
            Tensor::from_vec(&[3, 2], vec![1.0f32, 0.0, 0.0, 1.0, 1.0, 1.0]).unwrap(),
        )
        .unwrap();
    graph
        .set_outputs(&[NodeArg::new("y", None), NodeArg::new("s", None)])
        .unwrap();
    model
}

#[test]
fn values_cross_between_stream_faer_and_cpu() -> anyhow::Result<()> {
    let session = session(
        vec![
            stream(),
            Box::new(FaerExecutionProvider::new()),
            Box::new(CpuExecutionProvider::new()),
        ],
        dense_model(),
    )?;
    assert_eq!(session.assigned_provider("relu"), Some(STREAM_PROVIDER));
    assert_eq!(session.assigned_provider("matmul"), Some(FAER_PROVIDER));
    assert_eq!(session.assigned_provider("add"), Some(STREAM_PROVIDER));
    assert_eq!(session.assigned_provider("exp"), Some(CPU_PROVIDER));

    let feeds = HashMap::from([
        ("x".to_string(), floats(&[2, 3], vec![1.0, -2.0, 3.0, -1.0, 2.0, 0.5])),
        ("b".to_string(), floats(&[2], vec![-4.0, -3.0])),
    ]);
    let fetched = session.run(&RunOptions::tagged("mixed"), &feeds, &[])?;

    let s = fetched[1].tensor()?;
    assert!(s.location().is_host_accessible());
    assert_eq!(s.as_slice::<f32>()?, &[0.0, 0.0, -3.5, -0.5]);

    let y = fetched[0].tensor()?.as_slice::<f32>()?;
    let expected = [1.0f32, 1.0, (-3.5f32).exp(), (-0.5f32).exp()];
    for (got, want) in y.iter().zip(expected) {
        assert!((got - want).abs() < 1e-6, "{got} vs {want}");
    }
    Ok(())
}

/// `z = Neg(Add(Relu(x), b))` with shapes that cannot broadcast.
fn failing_model() -> Model {
    let mut model = Model::new("failing", BTreeMap::from([(String::new(), 7)]));
    let graph = model.main_graph_mut();
    graph
        .add_node(
            "relu",
            "Relu",
            "",
            &[NodeArg::tensor("x", ElementType::F32, &[2, 3])],
            &[NodeArg::new("h", None)],
            None,
            "",
        )
        .unwrap();
    graph
        .add_node(
            "add",
            "Add",
            "",
            &[NodeArg::new("h", None), NodeArg::tensor("b", ElementType::F32, &[2])],
            &[NodeArg::new("s", None)],
            None,
            "",
        )
        .unwrap();
    graph
        .add_node("neg", "Neg", "", &[NodeArg::new("s", None)], &[NodeArg::new("z", None)], None, "")
        .unwrap();
    model
}

#[test]
fn device_failures_surface_when_the_value_is_fetched() -> anyhow::Result<()> {
    let session = session(vec![stream()], failing_model())?;
    let feeds = HashMap::from([
        ("x".to_string(), floats(&[2, 3], vec![1.0; 6])),
        ("b".to_string(), floats(&[2], vec![1.0, 2.0])),
    ]);
    let err = session
        .run(&RunOptions::default(), &feeds, &["z"])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Execution);
    assert!(
        err.to_string().contains("not broadcast compatible"),
        "unexpected error: {err}"
    );
    Ok(())
}

#[test]
fn concurrent_runs_share_one_stream() -> anyhow::Result<()> {
    let session = Arc::new(session(
        vec![stream(), Box::new(CpuExecutionProvider::new())],
        chain_model(),
    )?);
    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let session = Arc::clone(&session);
            thread::spawn(move || -> anyhow::Result<Vec<f32>> {
                let scale = worker as f32;
                let feeds = HashMap::from([
                    ("x".to_string(), floats(&[2, 3], vec![scale; 6])),
                    ("b".to_string(), floats(&[3], vec![1.0, 2.0, 3.0])),
                ]);
                let fetched = session.run(&RunOptions::tagged(format!("worker-{worker}")), &feeds, &[])?;
                Ok(fetched[0].tensor()?.as_slice::<f32>()?.to_vec())
            })
        })
        .collect();
    for (worker, handle) in handles.into_iter().enumerate() {
        let values = handle.join().expect("worker thread panicked")?;
        let scale = worker as f32;
        let expected: Vec<f32> = [1.0, 2.0, 3.0, 1.0, 2.0, 3.0]
            .iter()
            .map(|bias| -(scale + bias))
            .collect();
        assert_eq!(values, expected);
    }
    Ok(())
}

/// `z = Neg(Add(Relu(x), b))` with a bias that broadcasts.
fn chain_model() -> Model {
    let mut model = Model::new("chain", BTreeMap::from([(String::new(), 7)]));
    let graph = model.main_graph_mut();
    graph
        .add_node(
            "relu",
            "Relu",
            "",
            &[NodeArg::tensor("x", ElementType::F32, &[2, 3])],
            &[NodeArg::new("h", None)],
            None,
            "",
        )
        .unwrap();
    graph
        .add_node(
            "add",
            "Add",
            "",
            &[NodeArg::new("h", None), NodeArg::tensor("b", ElementType::F32, &[3])],
            &[NodeArg::new("s", None)],
            None,
            "",
        )
        .unwrap();
    graph
        .add_node("neg", "Neg", "", &[NodeArg::new("s", None)], &[NodeArg::new("z", None)], None, "")
        .unwrap();
    model
}
