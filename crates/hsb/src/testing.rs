//! Test helpers: literal topologies, synthetic trees and random batches.
//!
//! Public so integration tests and benchmarks can share them.

use std::collections::VecDeque;

use ndarray::Array2;
use rand::prelude::*;

use crate::repr::Topology;

/// Build a [`Topology`] from a node-slot literal.
///
/// Each entry is `slot => split(left, right)` or `slot => leaf(id)`. Slots must
/// be listed for `0..2n-1`; the macro panics if the result is not a valid tree.
///
/// ```
/// let topo = hsb::topology! {
///     0 => split(1, 2),
///     1 => leaf(0),
///     2 => leaf(1),
/// };
/// assert_eq!(topo.n_leaves(), 2);
/// ```
#[macro_export]
macro_rules! topology {
    (@node $l:ident, $r:ident, $f:ident, $slot:literal, split($left:expr, $right:expr)) => {
        $l[$slot] = $left;
        $r[$slot] = $right;
    };
    (@node $l:ident, $r:ident, $f:ident, $slot:literal, leaf($id:expr)) => {
        $f[$slot] = $id;
    };
    ($($slot:literal => $kind:ident($($arg:expr),*)),+ $(,)?) => {{
        let n_nodes = 0usize $(+ { let _ = $slot; 1 })+;
        let mut left = vec![-1i32; n_nodes];
        let mut right = vec![-1i32; n_nodes];
        let mut leaves = vec![-1i32; n_nodes];
        $( $crate::topology!(@node left, right, leaves, $slot, $kind($($arg),*)); )+
        $crate::repr::Topology::new(left, right, leaves, n_nodes.div_ceil(2))
            .expect("topology literal must describe a valid tree")
    }};
}

// =============================================================================
// Synthetic Topologies
// =============================================================================

/// Number slots breadth-first while recursively splitting a leaf list.
///
/// `split(len)` picks how many of `len > 1` leaves go to the left subtree.
fn breadth_first(leaf_order: Vec<i32>, mut split: impl FnMut(usize) -> usize) -> Topology {
    let n_leaves = leaf_order.len();
    let n_nodes = 2 * n_leaves - 1;
    let mut left = vec![-1i32; n_nodes];
    let mut right = vec![-1i32; n_nodes];
    let mut leaves = vec![-1i32; n_nodes];

    let mut queue = VecDeque::from([(0usize, leaf_order)]);
    let mut next_slot = 1usize;
    while let Some((slot, ids)) = queue.pop_front() {
        if ids.len() == 1 {
            leaves[slot] = ids[0];
            continue;
        }
        let n_left = split(ids.len()).clamp(1, ids.len() - 1);
        let mut left_ids = ids;
        let right_ids = left_ids.split_off(n_left);

        left[slot] = next_slot as i32;
        right[slot] = (next_slot + 1) as i32;
        queue.push_back((next_slot, left_ids));
        queue.push_back((next_slot + 1, right_ids));
        next_slot += 2;
    }

    Topology::new(left, right, leaves, n_leaves).expect("generated topology is valid")
}

/// Balanced tree over `n_leaves` leaves in natural leaf order.
pub fn balanced_topology(n_leaves: usize) -> Topology {
    assert!(n_leaves > 0);
    breadth_first((0..n_leaves as i32).collect(), |len| len / 2)
}

/// Maximally deep tree: every internal node has a leaf as its left child.
pub fn caterpillar_topology(n_leaves: usize) -> Topology {
    assert!(n_leaves > 0);
    breadth_first((0..n_leaves as i32).collect(), |_| 1)
}

/// Random tree shape with randomly permuted leaf ids.
pub fn random_topology(n_leaves: usize, seed: u64) -> Topology {
    assert!(n_leaves > 0);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut order: Vec<i32> = (0..n_leaves as i32).collect();
    order.shuffle(&mut rng);
    breadth_first(order, |len| rng.gen_range(1..len))
}

// =============================================================================
// Random Batches
// =============================================================================

/// Logits uniform in `[-scale, scale]`, shape `(n_rows, n_internal)`.
pub fn random_logits(n_rows: usize, n_internal: usize, seed: u64, scale: f64) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array2::from_shape_simple_fn((n_rows, n_internal), || rng.gen_range(-scale..=scale))
}

/// Ratios uniform in `[0.01, 0.99]`, shape `(n_rows, n_internal)`.
pub fn random_ratios(n_rows: usize, n_internal: usize, seed: u64) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array2::from_shape_simple_fn((n_rows, n_internal), || rng.gen_range(0.01..=0.99))
}

/// Rows in the open simplex, shape `(n_rows, n_leaves)`.
pub fn random_simplex(n_rows: usize, n_leaves: usize, seed: u64) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut rows = Array2::from_shape_simple_fn((n_rows, n_leaves), || rng.gen_range(0.05..1.0));
    for mut row in rows.rows_mut() {
        let total = row.sum();
        row /= total;
    }
    rows
}
