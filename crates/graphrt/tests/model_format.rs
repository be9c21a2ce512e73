use std::collections::BTreeMap;
use std::sync::Arc;

use graphrt::error::ModelFormatError;
use graphrt::graph::{AttributeValue, Model, NodeArg, NodeAttributes};
use graphrt::schema::{OpSchemaRegistry, SchemaRegistryList, ML_DOMAIN};
use graphrt::types::{DataType, ElementType, Tensor};

fn sample_model() -> Model {
    let mut model = Model::new(
        "scores",
        BTreeMap::from([(String::new(), 9), (ML_DOMAIN.to_string(), 1)]),
    );
    model.metadata_mut().producer_name = "unit-test".to_string();
    model
        .metadata_mut()
        .custom_metadata
        .insert("owner".to_string(), "ml".to_string());

    let graph = model.main_graph_mut();
    let f32_ty = Some(DataType::Tensor(ElementType::F32));
    graph
        .add_initializer("w", Tensor::from_vec(&[2, 2], vec![1.0f32, 0.0, 0.0, 1.0]).unwrap())
        .unwrap();
    graph
        .add_node(
            "mm",
            "MatMul",
            "",
            &[NodeArg::new("x", f32_ty), NodeArg::new("w", f32_ty)],
            &[NodeArg::new("logits", None)],
            None,
            "",
        )
        .unwrap();
    let labels = NodeAttributes::from([(
        "classlabels_strings".to_string(),
        AttributeValue::Strings(vec!["cat".to_string(), "dog".to_string()]),
    )]);
    graph
        .add_node(
            "zip",
            "ZipMap",
            "",
            &[NodeArg::new("logits", None)],
            &[NodeArg::new("scores", None)],
            Some(&labels),
            ML_DOMAIN,
        )
        .unwrap();
    model
}

fn standard() -> SchemaRegistryList {
    SchemaRegistryList::new(vec![Arc::new(OpSchemaRegistry::standard())])
}

#[test]
fn json_round_trip_yields_an_unresolved_equivalent() {
    let mut model = sample_model();
    model.resolve(&standard()).unwrap();

    let json = model.to_json().unwrap();
    let mut decoded = Model::from_json(&json).unwrap();
    assert!(!decoded.main_graph().is_resolved());
    assert_eq!(decoded.metadata(), model.metadata());
    assert_eq!(decoded.main_graph().nodes().len(), 2);
    assert_eq!(
        decoded.main_graph().initializers()["w"],
        model.main_graph().initializers()["w"]
    );

    decoded.resolve(&standard()).unwrap();
    assert_eq!(
        decoded.main_graph().node_arg("scores").unwrap().data_type(),
        Some(DataType::SeqMapStringToFloat)
    );
}

#[test]
fn binary_files_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.bin");
    sample_model().save(&path).unwrap();

    let mut loaded = Model::load(&path).unwrap();
    assert_eq!(loaded.metadata().producer_name, "unit-test");
    loaded.resolve(&standard()).unwrap();
    assert_eq!(loaded.main_graph().outputs().unwrap()[0].name(), "scores");
}

#[test]
fn json_extension_selects_the_text_format() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.json");
    sample_model().save(&path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("\"ZipMap\""));
    let loaded = Model::load(&path).unwrap();
    assert_eq!(loaded.main_graph().name(), "scores");
}

#[test]
fn missing_files_report_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.bin");
    match Model::load(&path).unwrap_err() {
        ModelFormatError::Io { path: reported, .. } => assert_eq!(reported, path),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn corrupt_bytes_are_rejected() {
    assert!(matches!(
        Model::from_bytes(&[0xff, 0x01, 0x02]),
        Err(ModelFormatError::Binary(_))
    ));
    assert!(matches!(
        Model::from_json("{\"graph\": 3}"),
        Err(ModelFormatError::Json(_))
    ));
}
