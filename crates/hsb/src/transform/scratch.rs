//! Per-worker scratch buffers.

/// Scratch state owned by exactly one worker for the duration of a call.
///
/// `mass` holds subtree masses `u`, `adjoint` holds the reverse-mode adjoints
/// `v` and is only allocated by the gradient kernel. Both grow lazily to the
/// topology's node count and are reused, without clearing, across every row
/// the owning worker processes: the kernels reset slot `0` per row and write
/// every other slot before reading it.
#[derive(Debug, Default, Clone)]
pub struct Scratch {
    mass: Vec<f64>,
    adjoint: Vec<f64>,
}

impl Scratch {
    /// Scratch with the mass vector preallocated for `n_nodes` slots.
    pub fn new(n_nodes: usize) -> Self {
        Self {
            mass: vec![0.0; n_nodes],
            adjoint: Vec::new(),
        }
    }

    /// Subtree-mass vector with at least `n_nodes` slots.
    #[inline]
    pub(crate) fn mass(&mut self, n_nodes: usize) -> &mut [f64] {
        grow(&mut self.mass, n_nodes);
        &mut self.mass[..n_nodes]
    }

    /// Subtree-mass and adjoint vectors with at least `n_nodes` slots each.
    #[inline]
    pub(crate) fn mass_and_adjoint(&mut self, n_nodes: usize) -> (&mut [f64], &mut [f64]) {
        grow(&mut self.mass, n_nodes);
        grow(&mut self.adjoint, n_nodes);
        (&mut self.mass[..n_nodes], &mut self.adjoint[..n_nodes])
    }

    /// Slots currently allocated for `(mass, adjoint)`.
    pub fn capacity(&self) -> (usize, usize) {
        (self.mass.len(), self.adjoint.len())
    }
}

#[inline]
fn grow(buf: &mut Vec<f64>, n_nodes: usize) {
    if buf.len() < n_nodes {
        buf.resize(n_nodes, 0.0);
    }
}
