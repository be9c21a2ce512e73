//! Declared shapes of graph values, which may mix fixed and symbolic dimensions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One dimension of a declared shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dim {
    Fixed(usize),
    /// Named dimension bound at run time, e.g. `batch`.
    Symbolic(String),
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dim::Fixed(size) => write!(f, "{size}"),
            Dim::Symbolic(name) => f.write_str(name),
        }
    }
}

/// Declared shape attached to a node arg.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TensorShape {
    dims: Vec<Dim>,
}

impl TensorShape {
    pub fn new(dims: Vec<Dim>) -> Self {
        TensorShape { dims }
    }

    /// Shape whose every dimension is known.
    pub fn fixed(dims: &[usize]) -> Self {
        TensorShape {
            dims: dims.iter().copied().map(Dim::Fixed).collect(),
        }
    }

    pub fn dims(&self) -> &[Dim] {
        &self.dims
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Returns the concrete dimensions when no dimension is symbolic.
    pub fn to_fixed(&self) -> Option<Vec<usize>> {
        self.dims
            .iter()
            .map(|dim| match dim {
                Dim::Fixed(size) => Some(*size),
                Dim::Symbolic(_) => None,
            })
            .collect()
    }

    /// Checks concrete run-time dimensions against this declaration. Symbolic dimensions match
    /// any size.
    pub fn matches(&self, actual: &[usize]) -> bool {
        self.dims.len() == actual.len()
            && self.dims.iter().zip(actual).all(|(dim, size)| match dim {
                Dim::Fixed(expected) => expected == size,
                Dim::Symbolic(_) => true,
            })
    }
}

impl fmt::Display for TensorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (idx, dim) in self.dims.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{dim}")?;
        }
        f.write_str("]")
    }
}
