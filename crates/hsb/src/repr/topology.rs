//! Validated binary-tree topology shared by every row of a batch.
//!
//! A tree with `n` leaves is stored as `2n - 1` node slots in three parallel
//! arrays (structure of arrays). Slot `0` is the root and every child is stored
//! at a strictly greater slot than its parent, so ascending slot order is a
//! valid top-down traversal and descending slot order a valid bottom-up one.
//!
//! Internal nodes are ranked by ascending slot index. Rank `k` is the column
//! of the ratio/logit buffers that belongs to that node; ranks are computed
//! once here and cached so that both traversal directions address the same
//! column without keeping a running counter.

use ndarray::ArrayView2;

use crate::error::TopologyError;

use super::NodeId;

/// Marker stored in the rank array for leaf slots.
const NO_RANK: u32 = u32::MAX;

/// Decoded view of a single node slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Leaf carrying its index into the leaf-probability row.
    Leaf { leaf: u32 },
    /// Internal node with its children and its ratio column.
    Internal {
        left: NodeId,
        right: NodeId,
        rank: u32,
    },
}

/// Immutable, validated tree topology.
///
/// Only constructible through [`Topology::new`] or [`Topology::from_tiled`],
/// so every value upholds the child-after-parent ordering, the exact
/// `n`-leaves / `n - 1`-internal partition and connectivity from the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    n_leaves: usize,
    left_children: Box<[NodeId]>,
    right_children: Box<[NodeId]>,
    /// Leaf index per slot, negative for internal slots.
    leaf_ids: Box<[i32]>,
    ranks: Box<[u32]>,
    depth: usize,
}

impl Topology {
    /// Validate and build a topology from the host's parallel arrays.
    ///
    /// `left_children` / `right_children` are only read for internal slots
    /// (slots with a negative `leaf_ids` entry).
    ///
    /// # Errors
    ///
    /// Returns a [`TopologyError`] naming the first violated invariant.
    pub fn new(
        left_children: Vec<i32>,
        right_children: Vec<i32>,
        leaf_ids: Vec<i32>,
        n_leaves: usize,
    ) -> Result<Self, TopologyError> {
        Self::build(left_children, right_children, leaf_ids, n_leaves).inspect_err(|err| {
            tracing::debug!(error = %err, n_leaves, "rejected topology");
        })
    }

    /// Build from the per-row host layout, where each of the `m` rows of the
    /// three `m × (2n - 1)` matrices repeats the same topology.
    ///
    /// # Errors
    ///
    /// Fails if the matrices disagree in shape, have no rows, if any row
    /// differs from row 0, or if row 0 is not a valid topology.
    pub fn from_tiled(
        left_children: ArrayView2<i32>,
        right_children: ArrayView2<i32>,
        leaf_ids: ArrayView2<i32>,
    ) -> Result<Self, TopologyError> {
        let (n_rows, n_cols) = left_children.dim();
        if n_rows == 0 {
            return Err(TopologyError::TiledShapeMismatch {
                array: "left_children",
                expected: (1, n_cols),
                actual: (0, n_cols),
            });
        }
        for (array, dim) in [
            ("right_children", right_children.dim()),
            ("leaf_ids", leaf_ids.dim()),
        ] {
            if dim != (n_rows, n_cols) {
                return Err(TopologyError::TiledShapeMismatch {
                    array,
                    expected: (n_rows, n_cols),
                    actual: dim,
                });
            }
        }

        let first = (
            left_children.row(0),
            right_children.row(0),
            leaf_ids.row(0),
        );
        for row in 1..n_rows {
            if left_children.row(row) != first.0
                || right_children.row(row) != first.1
                || leaf_ids.row(row) != first.2
            {
                return Err(TopologyError::TiledRowMismatch { row });
            }
        }

        let n_leaves = n_cols.div_ceil(2);
        Self::new(
            first.0.to_vec(),
            first.1.to_vec(),
            first.2.to_vec(),
            n_leaves,
        )
    }

    fn build(
        left_children: Vec<i32>,
        right_children: Vec<i32>,
        leaf_ids: Vec<i32>,
        n_leaves: usize,
    ) -> Result<Self, TopologyError> {
        if n_leaves == 0 {
            return Err(TopologyError::NoLeaves);
        }
        // No slice can hold 2n - 1 entries when that count overflows
        let n_nodes = n_leaves.checked_mul(2).map(|n| n - 1).ok_or(
            TopologyError::LengthMismatch {
                array: "left_children",
                n_leaves,
                expected: usize::MAX,
                actual: left_children.len(),
            },
        )?;
        for (array, len) in [
            ("left_children", left_children.len()),
            ("right_children", right_children.len()),
            ("leaf_ids", leaf_ids.len()),
        ] {
            if len != n_nodes {
                return Err(TopologyError::LengthMismatch {
                    array,
                    n_leaves,
                    expected: n_nodes,
                    actual: len,
                });
            }
        }

        let mut leaf_owner: Vec<Option<NodeId>> = vec![None; n_leaves];
        let mut n_found_leaves = 0usize;
        for (j, &leaf) in leaf_ids.iter().enumerate() {
            if leaf < 0 {
                continue;
            }
            let node = j as NodeId;
            let leaf_idx = leaf as usize;
            if leaf_idx >= n_leaves {
                return Err(TopologyError::LeafOutOfRange {
                    node,
                    leaf: i64::from(leaf),
                    n_leaves,
                });
            }
            if let Some(first) = leaf_owner[leaf_idx] {
                return Err(TopologyError::DuplicateLeaf {
                    leaf: leaf_idx,
                    first,
                    second: node,
                });
            }
            leaf_owner[leaf_idx] = Some(node);
            n_found_leaves += 1;
        }
        if n_found_leaves != n_leaves {
            return Err(TopologyError::LeafCountMismatch {
                expected: n_leaves,
                actual: n_found_leaves,
            });
        }

        // Exactly n - 1 internal slots contribute 2n - 2 child pointers, one
        // per non-root slot. Rejecting a second parent therefore also rules
        // out orphans, and child-after-parent rules out cycles.
        let mut has_parent = vec![false; n_nodes];
        let mut left = vec![0 as NodeId; n_nodes];
        let mut right = vec![0 as NodeId; n_nodes];
        let mut ranks = vec![NO_RANK; n_nodes];
        let mut depths = vec![0usize; n_nodes];
        let mut next_rank = 0u32;

        for j in (0..n_nodes).filter(|&j| leaf_ids[j] < 0) {
            let node = j as NodeId;
            for (side, raw, slot) in [
                ("left", left_children[j], &mut left[j]),
                ("right", right_children[j], &mut right[j]),
            ] {
                if raw < 0 || raw as usize >= n_nodes {
                    return Err(TopologyError::ChildOutOfBounds {
                        node,
                        side,
                        child: i64::from(raw),
                        n_nodes,
                    });
                }
                let child = raw as usize;
                if child <= j {
                    return Err(TopologyError::ChildBeforeParent {
                        node,
                        side,
                        child: child as NodeId,
                    });
                }
                if has_parent[child] {
                    return Err(TopologyError::DuplicateVisit {
                        node: child as NodeId,
                    });
                }
                has_parent[child] = true;
                depths[child] = depths[j] + 1;
                *slot = child as NodeId;
            }

            ranks[j] = next_rank;
            next_rank += 1;
        }

        let depth = depths.iter().copied().max().unwrap_or(0);

        Ok(Self {
            n_leaves,
            left_children: left.into_boxed_slice(),
            right_children: right.into_boxed_slice(),
            leaf_ids: leaf_ids.into_boxed_slice(),
            ranks: ranks.into_boxed_slice(),
            depth,
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Number of leaves `n` (columns of the leaf-probability buffer).
    #[inline]
    pub fn n_leaves(&self) -> usize {
        self.n_leaves
    }

    /// Number of internal nodes `n - 1` (columns of the ratio buffer).
    #[inline]
    pub fn n_internal(&self) -> usize {
        self.n_leaves - 1
    }

    /// Number of node slots `2n - 1`.
    #[inline]
    pub fn n_nodes(&self) -> usize {
        self.leaf_ids.len()
    }

    /// Length of the longest root-to-leaf path (a single leaf has depth 0).
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    #[inline]
    pub fn is_leaf(&self, node: NodeId) -> bool {
        self.leaf_ids[node as usize] >= 0
    }

    /// Leaf index of a leaf slot, `None` for internal slots.
    #[inline]
    pub fn leaf_id(&self, node: NodeId) -> Option<u32> {
        u32::try_from(self.leaf_ids[node as usize]).ok()
    }

    /// Ratio column of an internal slot, `None` for leaf slots.
    #[inline]
    pub fn rank(&self, node: NodeId) -> Option<u32> {
        let rank = self.ranks[node as usize];
        (rank != NO_RANK).then_some(rank)
    }

    /// Left child of an internal slot. Meaningless for leaves.
    #[inline]
    pub fn left_child(&self, node: NodeId) -> NodeId {
        self.left_children[node as usize]
    }

    /// Right child of an internal slot. Meaningless for leaves.
    #[inline]
    pub fn right_child(&self, node: NodeId) -> NodeId {
        self.right_children[node as usize]
    }

    /// Decode one slot. This is the only accessor the row kernels use.
    #[inline]
    pub fn node(&self, node: NodeId) -> NodeKind {
        let j = node as usize;
        let leaf = self.leaf_ids[j];
        if leaf >= 0 {
            NodeKind::Leaf { leaf: leaf as u32 }
        } else {
            NodeKind::Internal {
                left: self.left_children[j],
                right: self.right_children[j],
                rank: self.ranks[j],
            }
        }
    }

    /// Internal slots in rank order (rank `k` is the `k`-th item).
    pub fn internal_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.n_nodes() as NodeId).filter(|&j| !self.is_leaf(j))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, s};

    /// ```text
    ///        0
    ///      /   \
    ///     1     2
    ///    / \   / \
    ///   3   4 5   6
    ///  (0) (1)(2) (3)
    /// ```
    fn four_leaf_balanced() -> (Vec<i32>, Vec<i32>, Vec<i32>) {
        (
            vec![1, 3, 5, -1, -1, -1, -1],
            vec![2, 4, 6, -1, -1, -1, -1],
            vec![-1, -1, -1, 0, 1, 2, 3],
        )
    }

    #[test]
    fn builds_balanced_tree() {
        let (l, r, f) = four_leaf_balanced();
        let topo = Topology::new(l, r, f, 4).unwrap();

        assert_eq!(topo.n_leaves(), 4);
        assert_eq!(topo.n_internal(), 3);
        assert_eq!(topo.n_nodes(), 7);
        assert_eq!(topo.depth(), 2);
        assert_eq!(topo.internal_nodes().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(topo.rank(2), Some(2));
        assert_eq!(topo.rank(3), None);
        assert_eq!(topo.leaf_id(5), Some(2));
        assert_eq!(topo.leaf_id(1), None);
        assert_eq!(
            topo.node(1),
            NodeKind::Internal {
                left: 3,
                right: 4,
                rank: 1
            }
        );
        assert_eq!(topo.node(6), NodeKind::Leaf { leaf: 3 });
    }

    #[test]
    fn ranks_follow_slot_order_not_depth() {
        // 0 -> (1, 2); 1 is a leaf, 2 -> (3, 4)
        let topo = Topology::new(
            vec![2, -1, 3, -1, -1],
            vec![1, -1, 4, -1, -1],
            vec![-1, 2, -1, 0, 1],
            3,
        )
        .unwrap();

        assert_eq!(topo.rank(0), Some(0));
        assert_eq!(topo.rank(2), Some(1));
        assert_eq!(topo.left_child(0), 2);
        assert_eq!(topo.right_child(0), 1);
    }

    #[test]
    fn single_leaf_tree() {
        let topo = Topology::new(vec![-1], vec![-1], vec![0], 1).unwrap();
        assert_eq!(topo.n_internal(), 0);
        assert_eq!(topo.depth(), 0);
        assert!(topo.is_leaf(0));
    }

    #[test]
    fn rejects_zero_leaves() {
        let err = Topology::new(vec![], vec![], vec![], 0).unwrap_err();
        assert_eq!(err, TopologyError::NoLeaves);
    }

    #[test]
    fn rejects_overflowing_leaf_count() {
        let err = Topology::new(vec![-1], vec![-1], vec![0], usize::MAX).unwrap_err();
        assert!(matches!(
            err,
            TopologyError::LengthMismatch {
                array: "left_children",
                actual: 1,
                ..
            }
        ));
    }

    #[test]
    fn rejects_length_mismatch() {
        let (l, r, mut f) = four_leaf_balanced();
        f.pop();
        let err = Topology::new(l, r, f, 4).unwrap_err();
        assert_eq!(
            err,
            TopologyError::LengthMismatch {
                array: "leaf_ids",
                n_leaves: 4,
                expected: 7,
                actual: 6
            }
        );
    }

    #[test]
    fn rejects_child_out_of_bounds() {
        let (mut l, r, f) = four_leaf_balanced();
        l[1] = 7;
        let err = Topology::new(l, r, f, 4).unwrap_err();
        assert!(matches!(
            err,
            TopologyError::ChildOutOfBounds { node: 1, side: "left", child: 7, .. }
        ));
    }

    #[test]
    fn rejects_child_not_after_parent() {
        let (l, mut r, f) = four_leaf_balanced();
        r[2] = 2;
        let err = Topology::new(l, r, f, 4).unwrap_err();
        assert_eq!(
            err,
            TopologyError::ChildBeforeParent {
                node: 2,
                side: "right",
                child: 2
            }
        );
    }

    #[test]
    fn rejects_duplicate_leaf_id() {
        let (l, r, mut f) = four_leaf_balanced();
        f[6] = 1;
        let err = Topology::new(l, r, f, 4).unwrap_err();
        assert_eq!(
            err,
            TopologyError::DuplicateLeaf {
                leaf: 1,
                first: 4,
                second: 6
            }
        );
    }

    #[test]
    fn rejects_leaf_id_out_of_range() {
        let (l, r, mut f) = four_leaf_balanced();
        f[3] = 4;
        let err = Topology::new(l, r, f, 4).unwrap_err();
        assert!(matches!(err, TopologyError::LeafOutOfRange { node: 3, leaf: 4, .. }));
    }

    #[test]
    fn rejects_shared_child() {
        let (mut l, r, f) = four_leaf_balanced();
        l[2] = 4;
        let err = Topology::new(l, r, f, 4).unwrap_err();
        assert_eq!(err, TopologyError::DuplicateVisit { node: 4 });
    }

    #[test]
    fn rejects_wrong_partition() {
        // Only one leaf among three slots for a two-leaf tree.
        let err = Topology::new(vec![1, 2, -1], vec![2, 2, -1], vec![-1, -1, 0], 2)
            .unwrap_err();
        assert_eq!(
            err,
            TopologyError::LeafCountMismatch {
                expected: 2,
                actual: 1
            }
        );

        // Right leaf count, but slot 2 hangs off two parents and slot 4 off none.
        let err = Topology::new(
            vec![1, 2, -1, -1, -1],
            vec![2, 3, -1, -1, -1],
            vec![-1, -1, 0, 1, 2],
            3,
        )
        .unwrap_err();
        assert_eq!(err, TopologyError::DuplicateVisit { node: 2 });
    }

    #[test]
    fn rejects_both_children_equal() {
        let (l, mut r, f) = four_leaf_balanced();
        r[0] = 1;
        let err = Topology::new(l, r, f, 4).unwrap_err();
        assert_eq!(err, TopologyError::DuplicateVisit { node: 1 });
    }

    #[test]
    fn from_tiled_accepts_identical_rows() {
        let (l, r, f) = four_leaf_balanced();
        let tile = |v: &[i32]| Array2::from_shape_fn((3, v.len()), |(_, j)| v[j]);
        let topo =
            Topology::from_tiled(tile(&l).view(), tile(&r).view(), tile(&f).view()).unwrap();
        assert_eq!(topo, Topology::new(l, r, f, 4).unwrap());
    }

    #[test]
    fn from_tiled_rejects_divergent_row() {
        let (l, r, f) = four_leaf_balanced();
        let tile = |v: &[i32]| Array2::from_shape_fn((3, v.len()), |(_, j)| v[j]);
        let mut leaves = tile(&f);
        leaves[[2, 3]] = 1;
        leaves[[2, 4]] = 0;
        let err = Topology::from_tiled(tile(&l).view(), tile(&r).view(), leaves.view())
            .unwrap_err();
        assert_eq!(err, TopologyError::TiledRowMismatch { row: 2 });
    }

    #[test]
    fn from_tiled_rejects_shape_mismatch() {
        let (l, r, f) = four_leaf_balanced();
        let tile = |v: &[i32], m: usize| Array2::from_shape_fn((m, v.len()), |(_, j)| v[j]);
        let err = Topology::from_tiled(tile(&l, 2).view(), tile(&r, 3).view(), tile(&f, 2).view())
            .unwrap_err();
        assert!(matches!(
            err,
            TopologyError::TiledShapeMismatch { array: "right_children", .. }
        ));

        // Views borrowed from differently scoped arrays
        let right = tile(&r, 2);
        let err = {
            let leaves = tile(&f, 2);
            Topology::from_tiled(tile(&l, 2).view(), right.view(), leaves.slice(s![.., ..6]))
                .unwrap_err()
        };
        assert_eq!(
            err,
            TopologyError::TiledShapeMismatch {
                array: "leaf_ids",
                expected: (2, 7),
                actual: (2, 6),
            }
        );

        let err = Topology::from_tiled(tile(&l, 0).view(), tile(&r, 0).view(), tile(&f, 0).view())
            .unwrap_err();
        assert!(matches!(err, TopologyError::TiledShapeMismatch { array: "left_children", .. }));
    }
}
