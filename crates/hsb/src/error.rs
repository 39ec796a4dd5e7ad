//! Error types for topology validation and batch transforms.
//!
//! Structural problems with a tree are reported as [`TopologyError`] and
//! wrapped into [`HsbError::InvalidTopology`] at the transform boundary.
//! Both kinds are detected before any row is processed, so a failed call
//! never leaves partially written output behind.
//!
//! Numerically degenerate rows (a zero subtree mass, a probability row that
//! does not sum to one) are *not* errors: the kernels propagate the IEEE
//! result (`NaN`/`Inf`) and leave detection to the caller.

use crate::repr::NodeId;

/// Structural validation errors for [`Topology`](crate::repr::Topology).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopologyError {
    /// The tree must have at least one leaf.
    #[error("topology must have at least one leaf")]
    NoLeaves,

    /// One of the parallel arrays does not have `2n - 1` entries.
    #[error("{array} has length {actual}, expected 2 * {n_leaves} - 1 = {expected}")]
    LengthMismatch {
        array: &'static str,
        n_leaves: usize,
        expected: usize,
        actual: usize,
    },

    /// A child pointer of an internal node is outside the node range.
    #[error("node {node}: {side} child {child} is outside [0, {n_nodes})")]
    ChildOutOfBounds {
        node: NodeId,
        side: &'static str,
        child: i64,
        n_nodes: usize,
    },

    /// A child is stored at or before its parent's slot.
    #[error("node {node}: {side} child {child} must be stored after its parent")]
    ChildBeforeParent {
        node: NodeId,
        side: &'static str,
        child: NodeId,
    },

    /// A leaf node carries a leaf id outside `[0, n)`.
    #[error("node {node}: leaf id {leaf} is outside [0, {n_leaves})")]
    LeafOutOfRange {
        node: NodeId,
        leaf: i64,
        n_leaves: usize,
    },

    /// Two leaf nodes carry the same leaf id.
    #[error("leaf id {leaf} is assigned to both node {first} and node {second}")]
    DuplicateLeaf {
        leaf: usize,
        first: NodeId,
        second: NodeId,
    },

    /// The number of leaf nodes is not `n`.
    #[error("expected {expected} leaf nodes, found {actual}")]
    LeafCountMismatch { expected: usize, actual: usize },

    /// A node is the child of more than one parent (or both children of one).
    ///
    /// Given the leaf count check, this is also how orphaned slots surface.
    #[error("node {node} is referenced by more than one parent")]
    DuplicateVisit { node: NodeId },

    /// A tiled (per-row) topology matrix has an unexpected shape.
    #[error("tiled {array} has shape {actual:?}, expected {expected:?}")]
    TiledShapeMismatch {
        array: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    /// A tiled topology row differs from the first row.
    #[error("tiled topology row {row} differs from row 0")]
    TiledRowMismatch { row: usize },
}

/// Errors returned by the batch transforms.
#[derive(Debug, thiserror::Error)]
pub enum HsbError {
    #[error("invalid topology: {0}")]
    InvalidTopology(#[from] TopologyError),

    /// A batch buffer's dimensions disagree with the topology or with the
    /// other buffers of the same call.
    #[error("{buffer} has shape {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        buffer: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// A batch buffer is not in standard (row-major, contiguous) layout.
    #[error("{buffer} must be a contiguous row-major buffer")]
    NonContiguous { buffer: &'static str },

    /// Differentiation was requested for an operation without a gradient.
    #[error("operation `{op}` has no registered gradient")]
    GradientNotSupported { op: &'static str },

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl HsbError {
    pub(crate) fn shape(buffer: &'static str, expected: &[usize], actual: &[usize]) -> Self {
        HsbError::ShapeMismatch {
            buffer,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }
}
