//! Operator cases every provider is expected to agree on.
//!
//! Each case runs on the provider built by `factory` when that provider claims the node and
//! returns the summary, so callers can assert which providers were exercised.

use std::collections::BTreeMap;

use graphrt::graph::AttributeValue;
use graphrt::schema::ML_DOMAIN;
use graphrt::{Value, ValueData};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::op_tester::{ExpectResult, OpTester, ProviderFactory, RunSummary};

fn expect_success(tester: &OpTester, factory: &ProviderFactory) -> RunSummary {
    tester.run(ExpectResult::Success, "", &[], &[factory])
}

fn random_values(rng: &mut StdRng, len: usize) -> Vec<f32> {
    (0..len).map(|_| rng.gen_range(-1.0f32..1.0)).collect()
}

fn naive_matmul(lhs: &[f32], rhs: &[f32], m: usize, k: usize, n: usize) -> Vec<f32> {
    let mut out = vec![0.0f64; m * n];
    for i in 0..m {
        for p in 0..k {
            let a = f64::from(lhs[i * k + p]);
            for j in 0..n {
                out[i * n + j] += a * f64::from(rhs[p * n + j]);
            }
        }
    }
    out.into_iter().map(|v| v as f32).collect()
}

pub fn add_matches_expected(factory: &ProviderFactory) -> RunSummary {
    let mut tester = OpTester::new("Add", 7);
    tester
        .add_input("A", &[2], vec![1.0f32, 2.0])
        .add_input("B", &[2], vec![3.0f32, 4.0])
        .add_output("C", &[2], vec![4.0f32, 6.0]);
    expect_success(&tester, factory)
}

pub fn add_broadcasts_trailing_dims(factory: &ProviderFactory) -> RunSummary {
    let mut tester = OpTester::new("Add", 7);
    tester
        .add_input("A", &[2, 3], vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0])
        .add_input("B", &[3], vec![10.0f32, 20.0, 30.0])
        .add_output("C", &[2, 3], vec![11.0f32, 22.0, 33.0, 14.0, 25.0, 36.0]);
    expect_success(&tester, factory)
}

pub fn binary_arithmetic_matches_expected(factory: &ProviderFactory) -> Vec<RunSummary> {
    let lhs = vec![6.0f32, -3.0, 1.5, 0.0];
    let rhs = vec![2.0f32, 4.0, -0.5, 8.0];
    let cases: [(&str, fn(f32, f32) -> f32); 3] =
        [("Sub", |a, b| a - b), ("Mul", |a, b| a * b), ("Div", |a, b| a / b)];
    cases
        .into_iter()
        .map(|(op, f)| {
            let expected = lhs.iter().zip(&rhs).map(|(&a, &b)| f(a, b)).collect();
            let mut tester = OpTester::new(op, 7);
            tester
                .add_input("A", &[2, 2], lhs.clone())
                .add_input("B", &[2, 2], rhs.clone())
                .add_output("C", &[2, 2], expected);
            expect_success(&tester, factory)
        })
        .collect()
}

/// Opset 6 broadcasting: `B` is aligned with `A` starting at `axis`.
pub fn legacy_add_broadcasts_along_axis(factory: &ProviderFactory) -> RunSummary {
    let lhs: Vec<f32> = (0..24).map(|v| v as f32).collect();
    let rhs = vec![100.0f32, 200.0, 300.0];
    let expected = lhs
        .iter()
        .enumerate()
        .map(|(index, value)| value + rhs[(index / 4) % 3])
        .collect();
    let mut tester = OpTester::new("Add", 6);
    tester
        .add_input("A", &[2, 3, 4], lhs)
        .add_input("B", &[3], rhs)
        .add_attribute("broadcast", AttributeValue::Int(1))
        .add_attribute("axis", AttributeValue::Int(1))
        .add_output("C", &[2, 3, 4], expected);
    expect_success(&tester, factory)
}

pub fn unary_activations_match_expected(factory: &ProviderFactory) -> Vec<RunSummary> {
    let input = vec![-1.5f32, -0.25, 0.0, 0.75, 2.0];
    let cases: [(&str, fn(f32) -> f32); 6] = [
        ("Relu", |x| x.max(0.0)),
        ("Sigmoid", |x| 1.0 / (1.0 + (-x).exp())),
        ("Tanh", f32::tanh),
        ("Exp", f32::exp),
        ("Neg", |x| -x),
        ("Abs", f32::abs),
    ];
    cases
        .into_iter()
        .map(|(op, f)| {
            let expected = input.iter().copied().map(f).collect();
            let mut tester = OpTester::new(op, 6);
            tester
                .add_input("X", &[5], input.clone())
                .add_output("Y", &[5], expected);
            expect_success(&tester, factory)
        })
        .collect()
}

pub fn matmul_matches_expected(factory: &ProviderFactory) -> RunSummary {
    let mut tester = OpTester::new("MatMul", 9);
    tester
        .add_input("A", &[2, 2], vec![1.0f32, 2.0, 3.0, 4.0])
        .add_input("B", &[2, 2], vec![5.0f32, 6.0, 7.0, 8.0])
        .add_output("Y", &[2, 2], vec![19.0f32, 22.0, 43.0, 50.0]);
    expect_success(&tester, factory)
}

/// A batched left operand against a shared right operand.
pub fn matmul_broadcasts_batches(factory: &ProviderFactory) -> RunSummary {
    let lhs: Vec<f32> = (1..=12).map(|v| v as f32).collect();
    let rhs = vec![1.0f32, 0.0, 0.0, 1.0, 1.0, 1.0];
    let expected: Vec<f32> = lhs
        .chunks(6)
        .flat_map(|batch| naive_matmul(batch, &rhs, 2, 3, 2))
        .collect();
    let mut tester = OpTester::new("MatMul", 9);
    tester
        .add_input("A", &[2, 2, 3], lhs)
        .add_input("B", &[3, 2], rhs)
        .add_output("Y", &[2, 2, 2], expected);
    expect_success(&tester, factory)
}

pub fn random_matmul_matches_reference(factory: &ProviderFactory) -> RunSummary {
    let mut rng = StdRng::seed_from_u64(42);
    let (m, k, n) = (4, 8, 5);
    let lhs = random_values(&mut rng, m * k);
    let rhs = random_values(&mut rng, k * n);
    let expected = naive_matmul(&lhs, &rhs, m, k, n);
    let mut tester = OpTester::new("MatMul", 9);
    tester
        .add_input("A", &[m, k], lhs)
        .add_input("B", &[k, n], rhs)
        .add_output("Y", &[m, n], expected);
    expect_success(&tester, factory)
}

/// `Y = alpha * A^T * B + beta * C` with `C` broadcast along rows.
pub fn gemm_transposes_and_adds_bias(factory: &ProviderFactory) -> RunSummary {
    let (m, k, n) = (2, 3, 4);
    // A is stored as [k, m] and transposed by the node.
    let a_stored: Vec<f32> = vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0];
    let a: Vec<f32> = (0..m)
        .flat_map(|i| (0..k).map(move |p| (i, p)))
        .map(|(i, p)| a_stored[p * m + i])
        .collect();
    let b: Vec<f32> = (0..k * n).map(|v| v as f32 * 0.5).collect();
    let c = vec![1.0f32, -1.0, 2.0, -2.0];
    let (alpha, beta) = (0.5f32, 2.0f32);
    let product = naive_matmul(&a, &b, m, k, n);
    let expected = product
        .iter()
        .enumerate()
        .map(|(index, value)| alpha * value + beta * c[index % n])
        .collect();

    let mut tester = OpTester::new("Gemm", 9);
    tester
        .add_input("A", &[k, m], a_stored)
        .add_input("B", &[k, n], b)
        .add_input("C", &[n], c)
        .add_attribute("alpha", AttributeValue::Float(alpha))
        .add_attribute("beta", AttributeValue::Float(beta))
        .add_attribute("transA", AttributeValue::Int(1))
        .add_output("Y", &[m, n], expected);
    expect_success(&tester, factory)
}

pub fn identity_copies_int64(factory: &ProviderFactory) -> RunSummary {
    let mut tester = OpTester::new("Identity", 1);
    tester
        .add_input("X", &[3], vec![7i64, -1, i64::MAX])
        .add_output("Y", &[3], vec![7i64, -1, i64::MAX]);
    expect_success(&tester, factory)
}

pub fn zipmap_pairs_string_labels(factory: &ProviderFactory) -> RunSummary {
    let labels = ["cat", "dog", "fox"];
    let rows = [[0.1f32, 0.7, 0.2], [0.5, 0.25, 0.25]];
    let expected = rows
        .iter()
        .map(|row| {
            labels
                .iter()
                .map(|label| label.to_string())
                .zip(row.iter().copied())
                .collect::<BTreeMap<_, _>>()
        })
        .collect();
    let mut tester = OpTester::new("ZipMap", 1).domain(ML_DOMAIN);
    tester
        .add_input("X", &[2, 3], rows.concat())
        .add_attribute(
            "classlabels_strings",
            AttributeValue::Strings(labels.iter().map(|label| label.to_string()).collect()),
        )
        .add_output_value("Z", Value::new(ValueData::SeqMapStringToFloat(expected)));
    expect_success(&tester, factory)
}

pub fn zipmap_pairs_int64_labels(factory: &ProviderFactory) -> RunSummary {
    let mut tester = OpTester::new("ZipMap", 1).domain(ML_DOMAIN);
    tester
        .add_input("X", &[2], vec![0.4f32, 0.6])
        .add_attribute("classlabels_int64s", AttributeValue::Ints(vec![10, 20]))
        .add_output_value(
            "Z",
            Value::new(ValueData::SeqMapInt64ToFloat(vec![BTreeMap::from([
                (10, 0.4),
                (20, 0.6),
            ])])),
        );
    expect_success(&tester, factory)
}

pub fn integer_division_by_zero_fails(factory: &ProviderFactory) -> RunSummary {
    let mut tester = OpTester::new("Div", 7);
    tester
        .add_input("A", &[2], vec![4i32, 2])
        .add_input("B", &[2], vec![2i32, 0])
        .add_output("C", &[2], vec![2i32, 0]);
    tester.run(ExpectResult::Failure, "division by zero", &[], &[factory])
}

/// `bool` is outside `Add`'s type constraint, so the model never resolves.
pub fn bool_add_is_rejected(factory: &ProviderFactory) -> RunSummary {
    let mut tester = OpTester::new("Add", 7);
    tester
        .add_input("A", &[1], vec![true])
        .add_input("B", &[1], vec![false])
        .add_output("C", &[1], vec![true]);
    tester.run(ExpectResult::Failure, "not allowed", &[], &[factory])
}
