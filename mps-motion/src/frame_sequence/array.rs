//! # Backend-agnostic array value

use super::lazy::LazyArray;
use ndarray::ArrayD;
use std::sync::Arc;

/// Array value backed either by resident memory or by a deferred graph node.
///
/// Operations built through [`FieldArray::map`] and [`FieldArray::zip`] keep the backend of their
/// inputs: eager values are computed on the spot, lazy values only record a new graph node.
#[derive(Clone, Debug)]
pub enum FieldArray {
    Eager(Arc<ArrayD<f64>>),
    Lazy(LazyArray),
}

impl From<ArrayD<f64>> for FieldArray {
    fn from(array: ArrayD<f64>) -> Self {
        Self::Eager(Arc::new(array))
    }
}

impl From<LazyArray> for FieldArray {
    fn from(array: LazyArray) -> Self {
        Self::Lazy(array)
    }
}

impl FieldArray {
    /// Create a deferred value with `array` as its graph leaf.
    pub fn lazy(array: ArrayD<f64>) -> Self {
        Self::Lazy(LazyArray::from_array(array))
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            Self::Eager(a) => a.shape(),
            Self::Lazy(a) => a.shape(),
        }
    }

    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    pub fn is_lazy(&self) -> bool {
        matches!(self, Self::Lazy(_))
    }

    /// Borrow the materialised value, evaluating the graph if needed.
    pub fn computed(&self) -> &ArrayD<f64> {
        match self {
            Self::Eager(a) => &**a,
            Self::Lazy(a) => a.compute(),
        }
    }

    /// Copy out the materialised value.
    pub fn to_array(&self) -> ArrayD<f64> {
        self.computed().clone()
    }

    /// Convert to the deferred backend without evaluating anything.
    pub fn into_lazy(self) -> Self {
        match self {
            Self::Eager(a) => {
                Self::lazy(Arc::try_unwrap(a).unwrap_or_else(|shared| (*shared).clone()))
            }
            lazy => lazy,
        }
    }

    /// Convert to the eager backend, evaluating the graph.
    pub fn into_eager(self) -> Self {
        match self {
            Self::Lazy(a) => Self::from(a.compute().clone()),
            eager => eager,
        }
    }

    /// Apply a pure array function.
    ///
    /// # Arguments
    ///
    /// * `shape` - shape of the array `op` produces.
    /// * `op` - operation to apply.
    pub fn map(
        &self,
        shape: Vec<usize>,
        op: impl Fn(&ArrayD<f64>) -> ArrayD<f64> + Send + Sync + 'static,
    ) -> Self {
        match self {
            Self::Eager(a) => {
                let out = op(a);
                debug_assert_eq!(out.shape(), shape.as_slice());
                Self::from(out)
            }
            Self::Lazy(a) => Self::Lazy(a.map(shape, op)),
        }
    }

    /// Apply a pure function of two arrays.
    ///
    /// The result is deferred if either operand is.
    pub fn zip(
        &self,
        other: &FieldArray,
        shape: Vec<usize>,
        op: impl Fn(&ArrayD<f64>, &ArrayD<f64>) -> ArrayD<f64> + Send + Sync + 'static,
    ) -> Self {
        match (self, other) {
            (Self::Eager(a), Self::Eager(b)) => Self::from(op(a, b)),
            (Self::Lazy(a), Self::Lazy(b)) => Self::Lazy(a.zip(b, shape, op)),
            (Self::Lazy(a), Self::Eager(b)) => {
                let b = LazyArray::from_array((**b).clone());
                Self::Lazy(a.zip(&b, shape, op))
            }
            (Self::Eager(a), Self::Lazy(b)) => {
                let a = LazyArray::from_array((**a).clone());
                Self::Lazy(a.zip(b, shape, op))
            }
        }
    }
}
