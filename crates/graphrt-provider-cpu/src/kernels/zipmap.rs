//! `ZipMap`: turns per-class scores into one label-to-score map per row.

use std::collections::BTreeMap;

use graphrt::{KernelContext, KernelError, KernelResult, OpKernel, OpKernelInfo, Value, ValueData};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Labels {
    Strings(Vec<String>),
    Ints(Vec<i64>),
}

impl Labels {
    fn len(&self) -> usize {
        match self {
            Labels::Strings(labels) => labels.len(),
            Labels::Ints(labels) => labels.len(),
        }
    }
}

pub struct ZipMapKernel {
    labels: Labels,
}

impl ZipMapKernel {
    /// Exactly one of `classlabels_strings` and `classlabels_int64s` must be set.
    pub fn new(info: &OpKernelInfo<'_>) -> KernelResult<Self> {
        let labels = match (info.strings("classlabels_strings")?, info.ints("classlabels_int64s")?) {
            (Some(strings), None) => Labels::Strings(strings.to_vec()),
            (None, Some(ints)) => Labels::Ints(ints.to_vec()),
            (Some(_), Some(_)) => {
                return Err(KernelError::invalid_argument(
                    "ZipMap accepts only one of classlabels_strings and classlabels_int64s",
                ))
            }
            (None, None) => {
                return Err(KernelError::invalid_argument(
                    "ZipMap requires classlabels_strings or classlabels_int64s",
                ))
            }
        };
        Ok(ZipMapKernel { labels })
    }

    fn zip<K: Clone + Ord>(labels: &[K], scores: &[f32], classes: usize) -> Vec<BTreeMap<K, f32>> {
        scores
            .chunks(classes.max(1))
            .map(|row| labels.iter().cloned().zip(row.iter().copied()).collect())
            .collect()
    }
}

impl OpKernel for ZipMapKernel {
    fn compute(&self, ctx: &mut KernelContext<'_>) -> KernelResult<()> {
        let input = ctx.input_tensor(0)?;
        let classes = match input.dims() {
            [classes] | [_, classes] => *classes,
            dims => {
                return Err(KernelError::invalid_argument(format!(
                    "ZipMap expects [C] or [N, C] scores, got {dims:?}"
                )))
            }
        };
        if classes != self.labels.len() {
            return Err(KernelError::invalid_argument(format!(
                "ZipMap has {} labels but the input has {classes} classes",
                self.labels.len()
            )));
        }
        let scores = input.as_slice::<f32>()?;
        let data = match &self.labels {
            Labels::Strings(labels) => ValueData::SeqMapStringToFloat(Self::zip(labels, scores, classes)),
            Labels::Ints(labels) => ValueData::SeqMapInt64ToFloat(Self::zip(labels, scores, classes)),
        };
        ctx.set_output(0, Value::new(data))
    }
}
