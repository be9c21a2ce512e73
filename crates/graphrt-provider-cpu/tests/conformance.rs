use graphrt::graph::AttributeValue;
use graphrt::schema::ML_DOMAIN;
use graphrt::{ExecutionProvider, CPU_PROVIDER};
use graphrt_provider_cpu::CpuExecutionProvider;
use graphrt_provider_tests::{conformance, ExpectResult, OpTester, RunSummary};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

graphrt_provider_tests::define_provider_tests!(cpu, graphrt_provider_cpu::CpuExecutionProvider::new);

fn cpu() -> Box<dyn ExecutionProvider> {
    Box::new(CpuExecutionProvider::new())
}

fn assert_exercised(summary: &RunSummary) {
    assert!(
        summary.exercised(CPU_PROVIDER),
        "CPU provider was skipped: {summary:?}"
    );
}

#[test]
fn cpu_claims_every_conformance_case() {
    for summary in [
        conformance::add_matches_expected(&cpu),
        conformance::add_broadcasts_trailing_dims(&cpu),
        conformance::legacy_add_broadcasts_along_axis(&cpu),
        conformance::matmul_matches_expected(&cpu),
        conformance::matmul_broadcasts_batches(&cpu),
        conformance::random_matmul_matches_reference(&cpu),
        conformance::gemm_transposes_and_adds_bias(&cpu),
        conformance::identity_copies_int64(&cpu),
        conformance::zipmap_pairs_string_labels(&cpu),
        conformance::zipmap_pairs_int64_labels(&cpu),
        conformance::integer_division_by_zero_fails(&cpu),
    ] {
        assert_exercised(&summary);
    }
    for summary in conformance::binary_arithmetic_matches_expected(&cpu)
        .iter()
        .chain(&conformance::unary_activations_match_expected(&cpu))
    {
        assert_exercised(summary);
    }
}

#[test]
fn random_broadcast_add_matches_reference() {
    let mut rng = StdRng::seed_from_u64(7);
    let lhs: Vec<f32> = (0..3 * 17).map(|_| rng.gen_range(-10.0f32..10.0)).collect();
    let rhs: Vec<f32> = (0..17).map(|_| rng.gen_range(-10.0f32..10.0)).collect();
    let expected = lhs
        .iter()
        .enumerate()
        .map(|(index, value)| value + rhs[index % 17])
        .collect();
    let mut tester = OpTester::new("Add", 7);
    tester
        .add_input("A", &[3, 17], lhs)
        .add_input("B", &[1, 17], rhs)
        .add_output("C", &[3, 17], expected);
    assert_exercised(&tester.run(ExpectResult::Success, "", &[], &[&cpu]));
}

#[test]
fn integer_add_wraps_on_overflow() {
    let mut tester = OpTester::new("Add", 7);
    tester
        .add_input("A", &[2], vec![i32::MAX, 5])
        .add_input("B", &[2], vec![1i32, -7])
        .add_output("C", &[2], vec![i32::MIN, -2]);
    assert_exercised(&tester.run(ExpectResult::Success, "", &[], &[&cpu]));
}

#[test]
fn legacy_scalar_broadcast_and_disabled_broadcast() {
    let mut tester = OpTester::new("Mul", 6);
    tester
        .add_input("A", &[2, 2], vec![1.0f64, 2.0, 3.0, 4.0])
        .add_input("B", &[1], vec![0.5f64])
        .add_attribute("broadcast", AttributeValue::Int(1))
        .add_output("C", &[2, 2], vec![0.5f64, 1.0, 1.5, 2.0]);
    assert_exercised(&tester.run(ExpectResult::Success, "", &[], &[&cpu]));

    let mut tester = OpTester::new("Sub", 6);
    tester
        .add_input("A", &[2, 2], vec![1.0f32, 2.0, 3.0, 4.0])
        .add_input("B", &[2], vec![1.0f32, 1.0])
        .add_output("C", &[2, 2], vec![0.0f32, 1.0, 2.0, 3.0]);
    tester.run(ExpectResult::Failure, "broadcasting is disabled", &[], &[&cpu]);
}

#[test]
fn incompatible_broadcast_fails_at_run_time() {
    let mut tester = OpTester::new("Add", 7);
    tester
        .add_input("A", &[2, 3], vec![0.0f32; 6])
        .add_input("B", &[2], vec![0.0f32; 2])
        .add_output("C", &[2, 3], vec![0.0f32; 6]);
    let summary = tester.run(ExpectResult::Failure, "", &[], &[&cpu]);
    assert_exercised(&summary);
}

#[test]
fn integer_matmul_is_exact() {
    let mut tester = OpTester::new("MatMul", 9);
    tester
        .add_input("A", &[1, 3], vec![1i64, 2, 3])
        .add_input("B", &[3, 1], vec![4i64, 5, 6])
        .add_output("Y", &[1, 1], vec![32i64]);
    assert_exercised(&tester.run(ExpectResult::Success, "", &[], &[&cpu]));
}

#[test]
fn double_gemm_with_transposed_b() {
    // B is stored as [n, k].
    let mut tester = OpTester::new("Gemm", 7);
    tester
        .add_input("A", &[1, 2], vec![1.0f64, 2.0])
        .add_input("B", &[2, 2], vec![1.0f64, 1.0, 0.0, 2.0])
        .add_input("C", &[1], vec![10.0f64])
        .add_attribute("transB", AttributeValue::Int(1))
        .add_output("Y", &[1, 2], vec![13.0f64, 14.0]);
    assert_exercised(&tester.run(ExpectResult::Success, "", &[], &[&cpu]));
}

#[test]
fn zipmap_rejects_label_count_mismatch() {
    let mut tester = OpTester::new("ZipMap", 1).domain(ML_DOMAIN);
    tester
        .add_input("X", &[1, 3], vec![0.2f32, 0.3, 0.5])
        .add_attribute("classlabels_int64s", AttributeValue::Ints(vec![1, 2]))
        .add_output_value(
            "Z",
            graphrt::Value::new(graphrt::ValueData::SeqMapInt64ToFloat(Vec::new())),
        );
    tester.run(
        ExpectResult::Failure,
        "labels but the input has 3 classes",
        &[],
        &[&cpu],
    );
}

#[test]
fn integer_abs_and_neg_are_supported() {
    for (op, expected) in [("Abs", vec![3i64, 0, 4]), ("Neg", vec![3i64, 0, -4])] {
        let mut tester = OpTester::new(op, 6);
        tester
            .add_input("X", &[3], vec![-3i64, 0, 4])
            .add_output("Y", &[3], expected);
        assert_exercised(&tester.run(ExpectResult::Success, "", &[], &[&cpu]));
    }
}
