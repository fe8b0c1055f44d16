//! # Deferred array graph
//!
//! A [`LazyArray`] is a node in an immutable computation graph. Building a node only records its
//! inputs, its output shape and the pure function producing it. Evaluation happens on
//! [`LazyArray::compute`], and the result is memoised inside the node, so any number of derived
//! nodes share the work done upstream.

use ndarray::ArrayD;
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;

type Op = Box<dyn Fn(&[&ArrayD<f64>]) -> ArrayD<f64> + Send + Sync>;

enum Node {
    Source(ArrayD<f64>),
    Op {
        shape: Vec<usize>,
        inputs: Vec<LazyArray>,
        op: Op,
        value: OnceCell<ArrayD<f64>>,
    },
}

/// Deferred array value.
#[derive(Clone)]
pub struct LazyArray {
    node: Arc<Node>,
}

impl LazyArray {
    /// Wrap an already materialised array as a graph leaf.
    pub fn from_array(array: ArrayD<f64>) -> Self {
        Self {
            node: Arc::new(Node::Source(array)),
        }
    }

    /// Shape of the value this node evaluates to.
    pub fn shape(&self) -> &[usize] {
        match &*self.node {
            Node::Source(array) => array.shape(),
            Node::Op { shape, .. } => shape,
        }
    }

    /// Whether the node already holds its value.
    pub fn is_computed(&self) -> bool {
        match &*self.node {
            Node::Source(_) => true,
            Node::Op { value, .. } => value.get().is_some(),
        }
    }

    /// Record a unary operation on this node.
    ///
    /// # Arguments
    ///
    /// * `shape` - shape of the array `op` returns.
    /// * `op` - pure function of the input value.
    pub fn map(
        &self,
        shape: Vec<usize>,
        op: impl Fn(&ArrayD<f64>) -> ArrayD<f64> + Send + Sync + 'static,
    ) -> Self {
        Self::node(shape, vec![self.clone()], Box::new(move |i| op(i[0])))
    }

    /// Record a binary operation on this node and `other`.
    pub fn zip(
        &self,
        other: &LazyArray,
        shape: Vec<usize>,
        op: impl Fn(&ArrayD<f64>, &ArrayD<f64>) -> ArrayD<f64> + Send + Sync + 'static,
    ) -> Self {
        Self::node(
            shape,
            vec![self.clone(), other.clone()],
            Box::new(move |i| op(i[0], i[1])),
        )
    }

    fn node(shape: Vec<usize>, inputs: Vec<LazyArray>, op: Op) -> Self {
        Self {
            node: Arc::new(Node::Op {
                shape,
                inputs,
                op,
                value: OnceCell::new(),
            }),
        }
    }

    /// Evaluate the node.
    ///
    /// Inputs are evaluated first (and memoised), then the node's own operation runs once.
    pub fn compute(&self) -> &ArrayD<f64> {
        match &*self.node {
            Node::Source(array) => array,
            Node::Op {
                inputs, op, value, ..
            } => value.get_or_init(|| {
                let inputs = inputs.iter().map(LazyArray::compute).collect::<Vec<_>>();
                op(&inputs)
            }),
        }
    }
}

impl fmt::Debug for LazyArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyArray")
            .field("shape", &self.shape())
            .field("computed", &self.is_computed())
            .finish()
    }
}
