//! Forward/inverse consistency across tree shapes.
//!
//! - ratios -> logits -> forward -> inverse recovers the ratios
//! - simplex -> inverse -> forward recovers the probabilities
//! - the log-Jacobian equals minus the summed log subtree masses

use approx::assert_abs_diff_eq;
use hsb::testing::{
    balanced_topology, caterpillar_topology, random_logits, random_ratios, random_simplex,
    random_topology,
};
use hsb::transform::logit;
use hsb::{NodeId, NodeKind, StickBreaking, Topology};
use ndarray::{Array2, ArrayView1};
use rstest::rstest;

/// Probability mass below `node`, summed leaf by leaf.
fn subtree_mass(topology: &Topology, node: NodeId, probs: ArrayView1<f64>) -> f64 {
    match topology.node(node) {
        NodeKind::Leaf { leaf } => probs[leaf as usize],
        NodeKind::Internal { left, right, .. } => {
            subtree_mass(topology, left, probs) + subtree_mass(topology, right, probs)
        }
    }
}

#[rstest]
#[case::single_split(balanced_topology(2))]
#[case::balanced(balanced_topology(16))]
#[case::caterpillar(caterpillar_topology(16))]
#[case::random(random_topology(16, 3))]
#[case::random_large(random_topology(100, 9))]
fn ratios_survive_forward_then_inverse(#[case] topology: Topology) {
    let ratios = random_ratios(32, topology.n_internal(), 7);
    let logits = ratios.mapv(logit);
    let transform = StickBreaking::new(&topology);

    let probs = transform.forward(logits.view()).unwrap();
    for row in probs.rows() {
        assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-12);
        assert!(row.iter().all(|&p| p > 0.0));
    }

    let out = transform.inverse(probs.view()).unwrap();
    assert_abs_diff_eq!(out.ratios, ratios, epsilon = 1e-9);
}

#[rstest]
#[case::balanced(balanced_topology(7))]
#[case::caterpillar(caterpillar_topology(7))]
#[case::random(random_topology(12, 5))]
fn probabilities_survive_inverse_then_forward(#[case] topology: Topology) {
    let probs = random_simplex(20, topology.n_leaves(), 1);
    let transform = StickBreaking::new(&topology);

    let out = transform.inverse(probs.view()).unwrap();
    let logits = out.ratios.mapv(logit);
    let recovered = transform.forward(logits.view()).unwrap();
    assert_abs_diff_eq!(recovered, probs, epsilon = 1e-12);
}

#[rstest]
#[case::balanced(balanced_topology(9))]
#[case::caterpillar(caterpillar_topology(9))]
#[case::random(random_topology(9, 21))]
fn log_jacobian_sums_subtree_masses(#[case] topology: Topology) {
    let probs = random_simplex(10, topology.n_leaves(), 4);
    let out = StickBreaking::new(&topology).inverse(probs.view()).unwrap();

    for (i, row) in probs.rows().into_iter().enumerate() {
        let expected: f64 = topology
            .internal_nodes()
            .map(|j| -subtree_mass(&topology, j, row).ln())
            .sum();
        assert_abs_diff_eq!(out.log_jacobian[[i, 0]], expected, epsilon = 1e-12);
    }
}

#[test]
fn single_precision_rows_stay_on_the_simplex() {
    let topology = random_topology(64, 17);
    let logits = random_logits(50, topology.n_internal(), 2, 4.0).mapv(|x| x as f32);
    let probs: Array2<f32> = StickBreaking::new(&topology).forward(logits.view()).unwrap();

    for row in probs.rows() {
        assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-5);
    }
}

#[test]
fn ratios_are_indexed_by_rank_not_slot() {
    // Root's left child is a leaf, so internal slots 0, 2, 4 hold ranks 0, 1, 2
    let topology = caterpillar_topology(4);
    assert_eq!(topology.rank(0), Some(0));
    assert_eq!(topology.rank(2), Some(1));
    assert_eq!(topology.rank(4), Some(2));

    let probs = ndarray::array![[0.4f64, 0.3, 0.2, 0.1]];
    let out = StickBreaking::new(&topology).inverse(probs.view()).unwrap();
    assert_abs_diff_eq!(
        out.ratios,
        ndarray::array![[0.4, 0.5, 2.0 / 3.0]],
        epsilon = 1e-12
    );
}
