//! Per-row hierarchical stick-breaking kernels.
//!
//! Each kernel is a single pass over the node slots of a [`Topology`], driven
//! by one row of data and a borrowed [`Scratch`]:
//!
//! | kernel                   | order      | reads                       | writes               |
//! |--------------------------|------------|-----------------------------|----------------------|
//! | [`forward_row`]          | ascending  | logits `n-1`                | probabilities `n`    |
//! | [`inverse_row`]          | descending | probabilities `n`           | ratios `n-1`, ladj   |
//! | [`inverse_gradient_row`] | ascending  | ratio/ladj grads, ratios    | probability grad `n` |
//!
//! Ascending slot order visits parents before children (top-down), descending
//! order visits children before parents (bottom-up). Internal node ratios live
//! in the column given by the node's cached rank.
//!
//! # Scratch contract
//!
//! Scratch vectors are reused across rows without being cleared:
//!
//! - Top-down passes reset slot `0` (the root) at the start of every row. Every
//!   other slot is written by its parent, which is visited first.
//! - The bottom-up pass writes every slot from the input row (leaves) or from
//!   its two children (internal nodes), which are visited first.
//!
//! The log-Jacobian is a local of [`inverse_row`]; nothing carries over from
//! one row to the next.

// Range loops index several parallel arrays at once.
#![allow(clippy::needless_range_loop)]

use num_traits::AsPrimitive;

use crate::data::Real;
use crate::repr::{NodeId, NodeKind, Topology};

use super::scratch::Scratch;

/// Logistic function `1 / (1 + exp(-x))`.
#[inline]
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Inverse of [`sigmoid`]: `ln(p / (1 - p))`.
#[inline]
pub fn logit(p: f64) -> f64 {
    p.ln() - (-p).ln_1p()
}

/// Stick-breaking forward map: logits to leaf probabilities.
///
/// Node `j`'s mass is split between its children as `sigmoid(logit[rank])`
/// (left) and the remainder (right). The output row sums to one up to
/// floating-point error.
///
/// # Panics
///
/// In debug builds, if the row lengths do not match the topology.
pub fn forward_row<T: Real>(
    topology: &Topology,
    logits: &[T],
    scratch: &mut Scratch,
    probs: &mut [T],
) {
    debug_assert_eq!(logits.len(), topology.n_internal());
    debug_assert_eq!(probs.len(), topology.n_leaves());

    let n_nodes = topology.n_nodes();
    let mass = scratch.mass(n_nodes);
    mass[0] = 1.0;

    for j in 0..n_nodes {
        match topology.node(j as NodeId) {
            NodeKind::Leaf { leaf } => {
                probs[leaf as usize] = T::from_f64(mass[j]);
            }
            NodeKind::Internal { left, right, rank } => {
                let p = sigmoid(logits[rank as usize].as_());
                let parent = mass[j];
                mass[left as usize] = p * parent;
                mass[right as usize] = (1.0 - p) * parent;
            }
        }
    }
}

/// Stick-breaking inverse map: leaf probabilities to ratios, plus the
/// log-absolute-determinant of the forward map's Jacobian.
///
/// Subtree masses are accumulated bottom-up; each internal node's ratio is
/// `mass(left) / mass(node)`. The returned log-Jacobian is
/// `-Σ ln mass(node)` over internal nodes.
///
/// The row is expected to lie in the open simplex. It is not renormalized:
/// a row that does not sum to one still produces output, and a zero subtree
/// mass yields `NaN`/`Inf` rather than an error.
///
/// Ratios may use a wider element type than the probabilities (`f32` in,
/// `f64` ratios out), so they are not rounded to the input precision; the
/// log-Jacobian has the probabilities' type.
///
/// # Panics
///
/// In debug builds, if the row lengths do not match the topology.
pub fn inverse_row<P: Real, R: Real>(
    topology: &Topology,
    probs: &[P],
    scratch: &mut Scratch,
    ratios: &mut [R],
) -> P {
    debug_assert_eq!(probs.len(), topology.n_leaves());
    debug_assert_eq!(ratios.len(), topology.n_internal());

    let n_nodes = topology.n_nodes();
    let mass = scratch.mass(n_nodes);
    let mut log_jacobian = 0.0f64;

    for j in (0..n_nodes).rev() {
        match topology.node(j as NodeId) {
            NodeKind::Leaf { leaf } => {
                mass[j] = probs[leaf as usize].as_();
            }
            NodeKind::Internal { left, right, rank } => {
                let left_mass = mass[left as usize];
                let subtree = left_mass + mass[right as usize];
                mass[j] = subtree;
                ratios[rank as usize] = R::from_f64(left_mass / subtree);
                log_jacobian -= subtree.ln();
            }
        }
    }

    P::from_f64(log_jacobian)
}

/// Reverse-mode gradient of [`inverse_row`] with respect to its input row.
///
/// Walks the tree top-down, rebuilding subtree masses from the stored
/// `ratios` (root mass one) and pushing adjoints from each node to its
/// children:
///
/// ```text
/// v[left]  = v[j] - ladj_grad / u_j + (u_right / u_j²) · ratio_grad[k]
/// v[right] = v[j] - ladj_grad / u_j - (u_left  / u_j²) · ratio_grad[k]
/// ```
///
/// A leaf's adjoint is the gradient for its probability.
///
/// # Panics
///
/// In debug builds, if the row lengths do not match the topology.
pub fn inverse_gradient_row<P: Real, R: Real>(
    topology: &Topology,
    ratios_grad: &[R],
    log_jacobian_grad: P,
    ratios: &[R],
    scratch: &mut Scratch,
    probs_grad: &mut [P],
) {
    debug_assert_eq!(ratios_grad.len(), topology.n_internal());
    debug_assert_eq!(ratios.len(), topology.n_internal());
    debug_assert_eq!(probs_grad.len(), topology.n_leaves());

    let n_nodes = topology.n_nodes();
    let (mass, adjoint) = scratch.mass_and_adjoint(n_nodes);
    let ladj_grad: f64 = log_jacobian_grad.as_();
    mass[0] = 1.0;
    adjoint[0] = 0.0;

    for j in 0..n_nodes {
        match topology.node(j as NodeId) {
            NodeKind::Leaf { leaf } => {
                probs_grad[leaf as usize] = P::from_f64(adjoint[j]);
            }
            NodeKind::Internal { left, right, rank } => {
                let k = rank as usize;
                let ratio: f64 = ratios[k].as_();
                let ratio_grad: f64 = ratios_grad[k].as_();

                let subtree = mass[j];
                let left_mass = subtree * ratio;
                let right_mass = subtree * (1.0 - ratio);
                let subtree_sq = subtree * subtree;

                // d(ladj)/d(u_j), shared by both children
                let shared = adjoint[j] - ladj_grad / subtree;

                adjoint[left as usize] = shared + (right_mass / subtree_sq) * ratio_grad;
                adjoint[right as usize] = shared - (left_mass / subtree_sq) * ratio_grad;
                mass[left as usize] = left_mass;
                mass[right as usize] = right_mass;
            }
        }
    }
}
