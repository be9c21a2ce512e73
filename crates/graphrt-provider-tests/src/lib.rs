//! Test harness shared by graphrt execution providers.
//!
//! [`OpTester`](op_tester::OpTester) runs one operator across providers and checks the results
//! with the tolerance rules in [`compare`]. [`define_provider_tests!`] instantiates the shared
//! [`conformance`] cases for a provider constructor.

pub mod compare;
pub mod conformance;
pub mod op_tester;
pub mod recording_provider;
pub mod strict_fence;

pub use graphrt;

pub use compare::{compare_values, Mismatch, Tolerance};
pub use op_tester::{ExpectResult, OpTester, ProviderFactory, RunSummary};
pub use recording_provider::{ExecutedNode, ExecutionLog, RecordingProvider};
pub use strict_fence::StrictFence;

#[macro_export]
macro_rules! define_provider_tests {
    ($module:ident, $provider_ctor:expr) => {
        #[cfg(test)]
        mod $module {
            use $crate::conformance;

            fn provider() -> Box<dyn $crate::graphrt::ExecutionProvider> {
                Box::new(($provider_ctor)())
            }

            #[test]
            fn conformance_add_matches_expected() {
                conformance::add_matches_expected(&provider);
            }

            #[test]
            fn conformance_add_broadcasts_trailing_dims() {
                conformance::add_broadcasts_trailing_dims(&provider);
            }

            #[test]
            fn conformance_binary_arithmetic_matches_expected() {
                conformance::binary_arithmetic_matches_expected(&provider);
            }

            #[test]
            fn conformance_legacy_add_broadcasts_along_axis() {
                conformance::legacy_add_broadcasts_along_axis(&provider);
            }

            #[test]
            fn conformance_unary_activations_match_expected() {
                conformance::unary_activations_match_expected(&provider);
            }

            #[test]
            fn conformance_matmul_matches_expected() {
                conformance::matmul_matches_expected(&provider);
            }

            #[test]
            fn conformance_matmul_broadcasts_batches() {
                conformance::matmul_broadcasts_batches(&provider);
            }

            #[test]
            fn conformance_random_matmul_matches_reference() {
                conformance::random_matmul_matches_reference(&provider);
            }

            #[test]
            fn conformance_gemm_transposes_and_adds_bias() {
                conformance::gemm_transposes_and_adds_bias(&provider);
            }

            #[test]
            fn conformance_identity_copies_int64() {
                conformance::identity_copies_int64(&provider);
            }

            #[test]
            fn conformance_zipmap_pairs_string_labels() {
                conformance::zipmap_pairs_string_labels(&provider);
            }

            #[test]
            fn conformance_zipmap_pairs_int64_labels() {
                conformance::zipmap_pairs_int64_labels(&provider);
            }

            #[test]
            fn conformance_integer_division_by_zero_fails() {
                conformance::integer_division_by_zero_fails(&provider);
            }

            #[test]
            fn conformance_bool_add_is_rejected() {
                conformance::bool_add_is_rejected(&provider);
            }
        }
    };
}
