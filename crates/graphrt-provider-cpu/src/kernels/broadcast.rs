//! Numpy-style multidirectional broadcasting.

use graphrt::{KernelError, KernelResult};
use smallvec::{smallvec, SmallVec};

type Dims = SmallVec<[usize; 6]>;

/// Shape both operands broadcast to. Dimensions are aligned from the right; a dimension of 1
/// stretches to match the other operand.
pub fn broadcast_shape(lhs: &[usize], rhs: &[usize]) -> KernelResult<Vec<usize>> {
    let rank = lhs.len().max(rhs.len());
    let lhs = padded(lhs, rank);
    let rhs = padded(rhs, rank);
    lhs.iter()
        .zip(&rhs)
        .map(|(&l, &r)| match (l, r) {
            _ if l == r => Ok(l),
            (1, _) => Ok(r),
            (_, 1) => Ok(l),
            _ => Err(KernelError::invalid_argument(format!(
                "shapes {:?} and {:?} are not broadcast compatible",
                strip(&lhs),
                strip(&rhs)
            ))),
        })
        .collect()
}

fn padded(dims: &[usize], rank: usize) -> Dims {
    let mut out: Dims = smallvec![1; rank - dims.len()];
    out.extend_from_slice(dims);
    out
}

fn strip(dims: &[usize]) -> &[usize] {
    let leading = dims.iter().take_while(|&&dim| dim == 1).count();
    &dims[leading.min(dims.len().saturating_sub(1))..]
}

/// Row-major strides of `dims` viewed at `out` rank, with 0 on broadcast axes.
fn broadcast_strides(dims: &[usize], out: &[usize]) -> Dims {
    let dims = padded(dims, out.len());
    let mut strides: Dims = smallvec![0; out.len()];
    let mut acc = 1usize;
    for axis in (0..out.len()).rev() {
        strides[axis] = if dims[axis] == 1 && out[axis] != 1 { 0 } else { acc };
        acc *= dims[axis];
    }
    strides
}

/// Walks `out` in row-major order yielding the matching flat offsets into both operands.
pub struct BroadcastOffsets {
    out: Dims,
    lhs_strides: Dims,
    rhs_strides: Dims,
    counter: Dims,
    offsets: (usize, usize),
    remaining: usize,
}

impl BroadcastOffsets {
    /// `lhs` and `rhs` must broadcast to `out`.
    pub fn new(lhs: &[usize], rhs: &[usize], out: &[usize]) -> Self {
        BroadcastOffsets {
            lhs_strides: broadcast_strides(lhs, out),
            rhs_strides: broadcast_strides(rhs, out),
            counter: smallvec![0; out.len()],
            offsets: (0, 0),
            remaining: out.iter().product(),
            out: SmallVec::from_slice(out),
        }
    }
}

impl Iterator for BroadcastOffsets {
    type Item = (usize, usize);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let current = self.offsets;
        for axis in (0..self.out.len()).rev() {
            self.counter[axis] += 1;
            self.offsets.0 += self.lhs_strides[axis];
            self.offsets.1 += self.rhs_strides[axis];
            if self.counter[axis] < self.out[axis] {
                break;
            }
            self.offsets.0 -= self.lhs_strides[axis] * self.out[axis];
            self.offsets.1 -= self.rhs_strides[axis] * self.out[axis];
            self.counter[axis] = 0;
        }
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for BroadcastOffsets {}

/// Applies `f` pairwise after broadcasting both operands to a common shape.
pub fn broadcast_zip<T, U, F>(
    lhs: &[T],
    lhs_dims: &[usize],
    rhs: &[T],
    rhs_dims: &[usize],
    mut f: F,
) -> KernelResult<(Vec<usize>, Vec<U>)>
where
    T: Copy,
    F: FnMut(T, T) -> KernelResult<U>,
{
    let out = broadcast_shape(lhs_dims, rhs_dims)?;
    if lhs_dims == rhs_dims {
        let values = lhs
            .iter()
            .zip(rhs)
            .map(|(&a, &b)| f(a, b))
            .collect::<KernelResult<Vec<_>>>()?;
        return Ok((out, values));
    }
    let values = BroadcastOffsets::new(lhs_dims, rhs_dims, &out)
        .map(|(l, r)| f(lhs[l], rhs[r]))
        .collect::<KernelResult<Vec<_>>>()?;
    Ok((out, values))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shapes_align_from_the_right() {
        assert_eq!(broadcast_shape(&[2, 3], &[3]).unwrap(), vec![2, 3]);
        assert_eq!(broadcast_shape(&[4, 1, 5], &[3, 1]).unwrap(), vec![4, 3, 5]);
        assert_eq!(broadcast_shape(&[], &[2]).unwrap(), vec![2]);
        assert!(broadcast_shape(&[2, 3], &[2]).is_err());
    }

    #[test]
    fn offsets_repeat_broadcast_axes() {
        let offsets: Vec<_> = BroadcastOffsets::new(&[2, 1], &[3], &[2, 3]).collect();
        assert_eq!(
            offsets,
            vec![(0, 0), (0, 1), (0, 2), (1, 0), (1, 1), (1, 2)]
        );
    }

    #[test]
    fn zip_broadcasts_a_row_over_a_matrix() {
        let (dims, values) = broadcast_zip(
            &[1.0f32, 2.0, 3.0, 4.0],
            &[2, 2],
            &[10.0, 20.0],
            &[2],
            |a, b| Ok(a + b),
        )
        .unwrap();
        assert_eq!(dims, vec![2, 2]);
        assert_eq!(values, vec![11.0, 22.0, 13.0, 24.0]);
    }
}
