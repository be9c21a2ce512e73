//! Expected-versus-fetched comparison, dispatched on the value's data type.

use graphrt::error::ValueError;
use graphrt::types::{DataType, ElementType, Tensor, TensorData};
use graphrt::Value;
use thiserror::Error;

/// Numeric tolerance for f32 outputs.
///
/// When neither `abs` nor `rel` is set a value matches if it is within `default_threshold` of
/// the expectation. Otherwise the allowed error is `max(abs, rel * |expected|)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    pub abs: Option<f64>,
    pub rel: Option<f64>,
    pub default_threshold: f64,
}

impl Tolerance {
    pub const DEFAULT_THRESHOLD: f64 = 0.001;
    /// Used for providers whose arithmetic may drift further from the CPU reference.
    pub const REDUCED_PRECISION_THRESHOLD: f64 = 0.005;

    pub fn for_provider(reduced_precision: bool) -> Self {
        Tolerance {
            abs: None,
            rel: None,
            default_threshold: if reduced_precision {
                Self::REDUCED_PRECISION_THRESHOLD
            } else {
                Self::DEFAULT_THRESHOLD
            },
        }
    }

    pub fn with_abs(mut self, abs: Option<f64>) -> Self {
        self.abs = abs;
        self
    }

    pub fn with_rel(mut self, rel: Option<f64>) -> Self {
        self.rel = rel;
        self
    }

    /// Infinities must match exactly, and NaN only matches NaN.
    pub fn allows(&self, expected: f64, actual: f64) -> bool {
        if expected.is_nan() || actual.is_nan() {
            return expected.is_nan() && actual.is_nan();
        }
        if expected.is_infinite() || actual.is_infinite() {
            return expected == actual;
        }
        let diff = (expected - actual).abs();
        match (self.abs, self.rel) {
            (None, None) => diff <= self.default_threshold,
            (abs, rel) => diff <= abs.unwrap_or(0.0).max(rel.unwrap_or(0.0) * expected.abs()),
        }
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Tolerance::for_provider(false)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Mismatch {
    #[error("output `{name}`: expected {expected} but fetched {actual}")]
    DataType {
        name: String,
        expected: DataType,
        actual: DataType,
    },
    #[error("output `{name}`: expected shape {expected:?} but fetched {actual:?}")]
    Shape {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    #[error("output `{name}` element {index}: expected {expected} but fetched {actual} ({tolerance:?})")]
    Float {
        name: String,
        index: usize,
        expected: f64,
        actual: f64,
        tolerance: Tolerance,
    },
    #[error("output `{name}` element {index}: expected {expected} but fetched {actual}")]
    Exact {
        name: String,
        index: usize,
        expected: String,
        actual: String,
    },
    #[error("output `{name}`: expected {expected} maps but fetched {actual}")]
    SequenceLength {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("output `{name}` map {index} differs: expected {expected} but fetched {actual}")]
    Map {
        name: String,
        index: usize,
        expected: String,
        actual: String,
    },
    #[error("output `{name}`: {source}")]
    Value {
        name: String,
        #[source]
        source: ValueError,
    },
}

type Comparator = fn(&str, &Value, &Value, &Tolerance) -> Result<(), Mismatch>;

/// Comparison routine for values of `data_type`. Only f32 tensors are compared with a
/// tolerance; f16 and f64 tensors, like every other element type, must match exactly.
pub fn comparator(data_type: DataType) -> Comparator {
    match data_type {
        DataType::Tensor(ElementType::F32) => compare_float_tensors,
        DataType::Tensor(_) => compare_exact_tensors,
        DataType::SeqMapStringToFloat => compare_string_maps,
        DataType::SeqMapInt64ToFloat => compare_int64_maps,
    }
}

/// Checks `actual` against `expected`. Both values must already be readable.
pub fn compare_values(name: &str, expected: &Value, actual: &Value, tolerance: &Tolerance) -> Result<(), Mismatch> {
    if expected.data_type() != actual.data_type() {
        return Err(Mismatch::DataType {
            name: name.to_string(),
            expected: expected.data_type(),
            actual: actual.data_type(),
        });
    }
    comparator(expected.data_type())(name, expected, actual, tolerance)
}

fn value_error(name: &str) -> impl Fn(ValueError) -> Mismatch + '_ {
    move |source| Mismatch::Value {
        name: name.to_string(),
        source,
    }
}

fn tensors<'v>(name: &str, expected: &'v Value, actual: &'v Value) -> Result<(&'v Tensor, &'v Tensor), Mismatch> {
    let expected = expected.tensor().map_err(value_error(name))?;
    let actual = actual.tensor().map_err(value_error(name))?;
    if expected.dims() != actual.dims() {
        return Err(Mismatch::Shape {
            name: name.to_string(),
            expected: expected.dims().to_vec(),
            actual: actual.dims().to_vec(),
        });
    }
    Ok((expected, actual))
}

fn as_f64(data: &TensorData) -> Vec<f64> {
    match data {
        TensorData::F32(values) => values.iter().map(|&v| f64::from(v)).collect(),
        _ => Vec::new(),
    }
}

fn compare_float_tensors(name: &str, expected: &Value, actual: &Value, tolerance: &Tolerance) -> Result<(), Mismatch> {
    let (expected, actual) = tensors(name, expected, actual)?;
    let expected = as_f64(expected.data());
    let actual = as_f64(actual.data());
    for (index, (&want, &got)) in expected.iter().zip(&actual).enumerate() {
        if !tolerance.allows(want, got) {
            return Err(Mismatch::Float {
                name: name.to_string(),
                index,
                expected: want,
                actual: got,
                tolerance: *tolerance,
            });
        }
    }
    Ok(())
}

fn compare_exact_tensors(name: &str, expected: &Value, actual: &Value, _tolerance: &Tolerance) -> Result<(), Mismatch> {
    let (expected, actual) = tensors(name, expected, actual)?;
    if expected.data() == actual.data() {
        return Ok(());
    }
    let render = |data: &TensorData| -> Vec<String> {
        macro_rules! render_all {
            ($($variant:ident),*) => {
                match data {
                    $(TensorData::$variant(values) => values.iter().map(|v| format!("{v:?}")).collect(),)*
                }
            };
        }
        render_all!(Bool, F16, F32, F64, I8, I16, I32, I64, U8, U16, U32, U64, String)
    };
    let (want, got) = (render(expected.data()), render(actual.data()));
    let index = want
        .iter()
        .zip(&got)
        .position(|(a, b)| a != b)
        .unwrap_or(want.len().min(got.len()));
    Err(Mismatch::Exact {
        name: name.to_string(),
        index,
        expected: want.get(index).cloned().unwrap_or_default(),
        actual: got.get(index).cloned().unwrap_or_default(),
    })
}

fn compare_maps<K: PartialEq + std::fmt::Debug>(
    name: &str,
    expected: &[std::collections::BTreeMap<K, f32>],
    actual: &[std::collections::BTreeMap<K, f32>],
) -> Result<(), Mismatch> {
    if expected.len() != actual.len() {
        return Err(Mismatch::SequenceLength {
            name: name.to_string(),
            expected: expected.len(),
            actual: actual.len(),
        });
    }
    match expected.iter().zip(actual).position(|(want, got)| want != got) {
        None => Ok(()),
        Some(index) => Err(Mismatch::Map {
            name: name.to_string(),
            index,
            expected: format!("{:?}", expected[index]),
            actual: format!("{:?}", actual[index]),
        }),
    }
}

fn compare_string_maps(name: &str, expected: &Value, actual: &Value, _tolerance: &Tolerance) -> Result<(), Mismatch> {
    compare_maps(
        name,
        expected.seq_map_string_to_float().map_err(value_error(name))?,
        actual.seq_map_string_to_float().map_err(value_error(name))?,
    )
}

fn compare_int64_maps(name: &str, expected: &Value, actual: &Value, _tolerance: &Tolerance) -> Result<(), Mismatch> {
    compare_maps(
        name,
        expected.seq_map_int64_to_float().map_err(value_error(name))?,
        actual.seq_map_int64_to_float().map_err(value_error(name))?,
    )
}
