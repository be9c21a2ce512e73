use super::{AttributeKind, OpSchema, OpSchemaBuilder, OpSchemaRegistry, ML_DOMAIN, ONNX_DOMAIN};
use crate::graph::{AttributeValue, NodeAttributes};
use crate::types::{DataType, ElementType};

const BINARY_OPS: [&str; 4] = ["Add", "Sub", "Mul", "Div"];
const FLOAT_UNARY_OPS: [&str; 4] = ["Relu", "Sigmoid", "Tanh", "Exp"];
const SIGNED_UNARY_OPS: [&str; 2] = ["Abs", "Neg"];

fn tensors(elements: &[ElementType]) -> Vec<DataType> {
    elements.iter().copied().map(DataType::Tensor).collect()
}

fn numeric_types() -> Vec<DataType> {
    tensors(&[
        ElementType::F32,
        ElementType::F64,
        ElementType::F16,
        ElementType::I32,
        ElementType::I64,
        ElementType::U32,
        ElementType::U64,
    ])
}

fn signed_types() -> Vec<DataType> {
    tensors(&[
        ElementType::F32,
        ElementType::F64,
        ElementType::F16,
        ElementType::I8,
        ElementType::I16,
        ElementType::I32,
        ElementType::I64,
    ])
}

fn add(registry: &mut OpSchemaRegistry, builder: OpSchemaBuilder) {
    let schema = builder
        .build()
        .expect("built-in schema table references declared type parameters");
    registry
        .register(schema)
        .expect("built-in schema table has unique versions");
}

fn binary(op: &str, version: u32) -> OpSchemaBuilder {
    OpSchema::builder(op, ONNX_DOMAIN, version)
        .input("A", "T")
        .input("B", "T")
        .output("C", "T")
}

fn unary(op: &str, version: u32) -> OpSchemaBuilder {
    OpSchema::builder(op, ONNX_DOMAIN, version)
        .input("X", "T")
        .output("Y", "T")
}

fn zipmap_output_types(attributes: &NodeAttributes) -> Vec<Option<DataType>> {
    let ty = match (
        attributes.get("classlabels_strings"),
        attributes.get("classlabels_int64s"),
    ) {
        (Some(AttributeValue::Strings(_)), None) => Some(DataType::SeqMapStringToFloat),
        (None, Some(AttributeValue::Ints(_))) => Some(DataType::SeqMapInt64ToFloat),
        _ => None,
    };
    vec![ty]
}

pub(super) fn build() -> OpSchemaRegistry {
    let mut registry = OpSchemaRegistry::new();

    for op in BINARY_OPS {
        add(
            &mut registry,
            binary(op, 1)
                .attribute("broadcast", AttributeKind::Int, false)
                .attribute("axis", AttributeKind::Int, false)
                .attribute("consumed_inputs", AttributeKind::Ints, false)
                .type_constraint("T", DataType::float_tensors()),
        );
        add(
            &mut registry,
            binary(op, 6)
                .attribute("broadcast", AttributeKind::Int, false)
                .attribute("axis", AttributeKind::Int, false)
                .type_constraint("T", numeric_types()),
        );
        add(&mut registry, binary(op, 7).type_constraint("T", numeric_types()));
    }

    for op in FLOAT_UNARY_OPS {
        add(
            &mut registry,
            unary(op, 1)
                .attribute("consumed_inputs", AttributeKind::Ints, false)
                .type_constraint("T", DataType::float_tensors()),
        );
        add(
            &mut registry,
            unary(op, 6).type_constraint("T", DataType::float_tensors()),
        );
    }

    for op in SIGNED_UNARY_OPS {
        add(
            &mut registry,
            unary(op, 1)
                .attribute("consumed_inputs", AttributeKind::Ints, false)
                .type_constraint("T", DataType::float_tensors()),
        );
        add(&mut registry, unary(op, 6).type_constraint("T", signed_types()));
    }

    add(
        &mut registry,
        OpSchema::builder("Identity", ONNX_DOMAIN, 1)
            .input("input", "T")
            .output("output", "T")
            .type_constraint("T", DataType::all_tensors()),
    );

    add(
        &mut registry,
        OpSchema::builder("MatMul", ONNX_DOMAIN, 1)
            .input("A", "T")
            .input("B", "T")
            .output("Y", "T")
            .type_constraint("T", DataType::float_tensors()),
    );
    add(
        &mut registry,
        OpSchema::builder("MatMul", ONNX_DOMAIN, 9)
            .input("A", "T")
            .input("B", "T")
            .output("Y", "T")
            .type_constraint("T", numeric_types()),
    );

    for (version, types) in [(7, DataType::float_tensors()), (9, numeric_types())] {
        add(
            &mut registry,
            OpSchema::builder("Gemm", ONNX_DOMAIN, version)
                .input("A", "T")
                .input("B", "T")
                .input("C", "T")
                .output("Y", "T")
                .attribute("alpha", AttributeKind::Float, false)
                .attribute("beta", AttributeKind::Float, false)
                .attribute("transA", AttributeKind::Int, false)
                .attribute("transB", AttributeKind::Int, false)
                .type_constraint("T", types),
        );
    }

    add(
        &mut registry,
        OpSchema::builder("ZipMap", ML_DOMAIN, 1)
            .input("X", "tensor(float)")
            .output("Z", "T")
            .attribute("classlabels_strings", AttributeKind::Strings, false)
            .attribute("classlabels_int64s", AttributeKind::Ints, false)
            .type_constraint(
                "T",
                vec![DataType::SeqMapStringToFloat, DataType::SeqMapInt64ToFloat],
            )
            .output_types(zipmap_output_types),
    );

    registry
}
