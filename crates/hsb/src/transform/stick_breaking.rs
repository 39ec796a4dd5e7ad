//! Batch facade over the row kernels.
//!
//! [`StickBreaking`] binds a [`Topology`] to a [`TransformConfig`] and exposes
//! the three batch operations. Every call validates all buffer shapes up
//! front, plans shards, and then runs the row kernels over each shard with
//! one scratch buffer per worker.
//!
//! # Usage
//!
//! ```
//! use hsb::{StickBreaking, testing::balanced_topology};
//! use ndarray::Array2;
//!
//! let topology = balanced_topology(4);
//! let transform = StickBreaking::new(&topology);
//!
//! let logits = Array2::<f32>::zeros((2, 3));
//! let probs = transform.forward(logits.view()).unwrap();
//! assert_eq!(probs.row(0).to_vec(), vec![0.25; 4]);
//!
//! let inverse = transform.inverse(probs.view()).unwrap();
//! assert_eq!(inverse.ratios.dim(), (2, 3));
//! assert_eq!(inverse.log_jacobian.dim(), (2, 1));
//! ```

use ndarray::{Array2, ArrayView2, ArrayViewMut2};

use crate::config::TransformConfig;
use crate::data::{Real, axis, check_matrix, check_row, row_slice, row_slice_mut};
use crate::error::HsbError;
use crate::repr::Topology;
use crate::utils::{Parallelism, run_with_threads};

use super::kernels;
use super::operation::Operation;
use super::schedule::BatchScheduler;
use super::scratch::Scratch;

/// Result of the inverse transform.
///
/// `P` is the element type of the probabilities (and of the log-Jacobian),
/// `R` that of the ratios.
#[derive(Debug, Clone, PartialEq)]
pub struct InverseOutput<P, R = P> {
    /// Split ratio per internal node, shape `(m, n - 1)`.
    pub ratios: Array2<R>,
    /// Log-absolute-determinant of the forward Jacobian, shape `(m, 1)`.
    pub log_jacobian: Array2<P>,
}

/// Hierarchical stick-breaking transform over one fixed topology.
#[derive(Debug, Clone)]
pub struct StickBreaking<'t> {
    topology: &'t Topology,
    config: TransformConfig,
}

impl<'t> StickBreaking<'t> {
    /// Create a transform with the default [`TransformConfig`].
    pub fn new(topology: &'t Topology) -> Self {
        Self {
            topology,
            config: TransformConfig::default(),
        }
    }

    /// Replace the scheduling configuration.
    pub fn with_config(mut self, config: TransformConfig) -> Self {
        self.config = config;
        self
    }

    #[inline]
    pub fn topology(&self) -> &'t Topology {
        self.topology
    }

    #[inline]
    pub fn config(&self) -> &TransformConfig {
        &self.config
    }

    fn run<R: Send>(&self, f: impl FnOnce(Parallelism) -> R + Send) -> Result<R, HsbError> {
        run_with_threads(self.config.n_threads, f)
    }

    // =========================================================================
    // Forward
    // =========================================================================

    /// Map logits `(m, n - 1)` to leaf probabilities `(m, n)`.
    ///
    /// # Errors
    ///
    /// [`HsbError::ShapeMismatch`] / [`HsbError::NonContiguous`] for bad input,
    /// [`HsbError::ThreadPool`] if a dedicated pool cannot be built.
    pub fn forward<T: Real>(&self, logits: ArrayView2<T>) -> Result<Array2<T>, HsbError> {
        let zero = T::from_f64(0.0);
        let mut probs = Array2::from_elem((logits.nrows(), self.topology.n_leaves()), zero);
        self.forward_into(logits, probs.view_mut())?;
        Ok(probs)
    }

    /// Map logits into a caller-provided probability buffer.
    ///
    /// Nothing is written if the shapes are inconsistent.
    pub fn forward_into<T: Real>(
        &self,
        logits: ArrayView2<T>,
        mut probs: ArrayViewMut2<T>,
    ) -> Result<(), HsbError> {
        let topology = self.topology;
        let n_rows = logits.nrows();
        check_matrix("logits", &logits, n_rows, topology.n_internal())?;
        check_matrix("probs", &probs, n_rows, topology.n_leaves())?;

        self.run(move |parallelism| {
            let scheduler = BatchScheduler::new(topology, n_rows, &self.config, parallelism);
            let chunk = scheduler.rows_per_shard();
            let shards = logits
                .axis_chunks_iter(axis::ROWS, chunk)
                .zip(probs.axis_chunks_iter_mut(axis::ROWS, chunk));

            scheduler.for_each_shard(shards, |scratch, (logits, mut probs)| {
                for (l, p) in logits
                    .axis_iter(axis::ROWS)
                    .zip(probs.axis_iter_mut(axis::ROWS))
                {
                    kernels::forward_row(topology, row_slice(l), scratch, row_slice_mut(p));
                }
            });
        })
    }

    /// The forward map has no gradient; this always fails.
    ///
    /// # Errors
    ///
    /// Always [`HsbError::GradientNotSupported`].
    pub fn forward_gradient<T: Real>(
        &self,
        _probs_grad: ArrayView2<T>,
        _logits: ArrayView2<T>,
    ) -> Result<Array2<T>, HsbError> {
        Err(HsbError::GradientNotSupported {
            op: Operation::Forward.name(),
        })
    }

    // =========================================================================
    // Inverse
    // =========================================================================

    /// Map leaf probabilities `(m, n)` to ratios `(m, n - 1)` and the
    /// log-Jacobian `(m, 1)`.
    ///
    /// Rows are expected to lie in the open simplex; see
    /// [`inverse_row`](kernels::inverse_row) for degenerate rows.
    pub fn inverse<T: Real>(&self, probs: ArrayView2<T>) -> Result<InverseOutput<T>, HsbError> {
        self.inverse_as::<T, T>(probs)
    }

    /// Inverse transform with ratios of element type `R`.
    ///
    /// `inverse_as::<f64, _>` on `f32` probabilities keeps the ratios in
    /// double precision instead of rounding them to the input type.
    pub fn inverse_as<R: Real, P: Real>(
        &self,
        probs: ArrayView2<P>,
    ) -> Result<InverseOutput<P, R>, HsbError> {
        let n_rows = probs.nrows();
        let mut output = InverseOutput {
            ratios: Array2::from_elem((n_rows, self.topology.n_internal()), R::from_f64(0.0)),
            log_jacobian: Array2::from_elem((n_rows, 1), P::from_f64(0.0)),
        };
        self.inverse_into(
            probs,
            output.ratios.view_mut(),
            output.log_jacobian.view_mut(),
        )?;
        Ok(output)
    }

    /// Inverse transform into caller-provided buffers.
    pub fn inverse_into<P: Real, R: Real>(
        &self,
        probs: ArrayView2<P>,
        mut ratios: ArrayViewMut2<R>,
        mut log_jacobian: ArrayViewMut2<P>,
    ) -> Result<(), HsbError> {
        let topology = self.topology;
        let n_rows = probs.nrows();
        check_matrix("probs", &probs, n_rows, topology.n_leaves())?;
        check_matrix("ratios", &ratios, n_rows, topology.n_internal())?;
        check_matrix("log_jacobian", &log_jacobian, n_rows, 1)?;

        self.run(move |parallelism| {
            let scheduler = BatchScheduler::new(topology, n_rows, &self.config, parallelism);
            let chunk = scheduler.rows_per_shard();
            let shards = probs
                .axis_chunks_iter(axis::ROWS, chunk)
                .zip(ratios.axis_chunks_iter_mut(axis::ROWS, chunk))
                .zip(log_jacobian.axis_chunks_iter_mut(axis::ROWS, chunk));

            scheduler.for_each_shard(shards, |scratch, ((probs, mut ratios), mut ladj)| {
                let rows = probs
                    .axis_iter(axis::ROWS)
                    .zip(ratios.axis_iter_mut(axis::ROWS))
                    .zip(ladj.axis_iter_mut(axis::ROWS));
                for ((p, r), mut l) in rows {
                    l[0] = kernels::inverse_row(topology, row_slice(p), scratch, row_slice_mut(r));
                }
            });
        })
    }

    // =========================================================================
    // Inverse gradient
    // =========================================================================

    /// Gradient of the inverse transform with respect to its probabilities.
    ///
    /// Takes the incoming gradients for ratios `(m, n - 1)` and log-Jacobian
    /// `(m, 1)` together with the ratios the inverse produced, and returns the
    /// probability gradient `(m, n)`. Ratios and their gradient share element
    /// type `R`; the log-Jacobian gradient and the result use `P`.
    pub fn inverse_gradient<P: Real, R: Real>(
        &self,
        ratios_grad: ArrayView2<R>,
        log_jacobian_grad: ArrayView2<P>,
        ratios: ArrayView2<R>,
    ) -> Result<Array2<P>, HsbError> {
        let zero = P::from_f64(0.0);
        let mut probs_grad = Array2::from_elem((ratios.nrows(), self.topology.n_leaves()), zero);
        self.inverse_gradient_into(ratios_grad, log_jacobian_grad, ratios, probs_grad.view_mut())?;
        Ok(probs_grad)
    }

    /// Inverse gradient into a caller-provided buffer.
    pub fn inverse_gradient_into<P: Real, R: Real>(
        &self,
        ratios_grad: ArrayView2<R>,
        log_jacobian_grad: ArrayView2<P>,
        ratios: ArrayView2<R>,
        mut probs_grad: ArrayViewMut2<P>,
    ) -> Result<(), HsbError> {
        let topology = self.topology;
        let n_rows = ratios.nrows();
        check_matrix("ratios_grad", &ratios_grad, n_rows, topology.n_internal())?;
        check_matrix("log_jacobian_grad", &log_jacobian_grad, n_rows, 1)?;
        check_matrix("ratios", &ratios, n_rows, topology.n_internal())?;
        check_matrix("probs_grad", &probs_grad, n_rows, topology.n_leaves())?;

        self.run(move |parallelism| {
            let scheduler = BatchScheduler::new(topology, n_rows, &self.config, parallelism);
            let chunk = scheduler.rows_per_shard();
            let shards = ratios_grad
                .axis_chunks_iter(axis::ROWS, chunk)
                .zip(log_jacobian_grad.axis_chunks_iter(axis::ROWS, chunk))
                .zip(ratios.axis_chunks_iter(axis::ROWS, chunk))
                .zip(probs_grad.axis_chunks_iter_mut(axis::ROWS, chunk));

            scheduler.for_each_shard(shards, |scratch, (((y_grad, l_grad), y), mut out)| {
                let rows = y_grad
                    .axis_iter(axis::ROWS)
                    .zip(l_grad.axis_iter(axis::ROWS))
                    .zip(y.axis_iter(axis::ROWS))
                    .zip(out.axis_iter_mut(axis::ROWS));
                for (((yg, lg), y), g) in rows {
                    kernels::inverse_gradient_row(
                        topology,
                        row_slice(yg),
                        lg[0],
                        row_slice(y),
                        scratch,
                        row_slice_mut(g),
                    );
                }
            });
        })
    }

    // =========================================================================
    // Single rows
    // =========================================================================

    /// Forward transform of a single row on the calling thread.
    pub fn forward_row_into<T: Real>(&self, logits: &[T], probs: &mut [T]) -> Result<(), HsbError> {
        check_row("logits", logits, self.topology.n_internal())?;
        check_row("probs", probs, self.topology.n_leaves())?;
        let mut scratch = Scratch::new(self.topology.n_nodes());
        kernels::forward_row(self.topology, logits, &mut scratch, probs);
        Ok(())
    }

    /// Inverse transform of a single row; returns the log-Jacobian.
    pub fn inverse_row_into<P: Real, R: Real>(
        &self,
        probs: &[P],
        ratios: &mut [R],
    ) -> Result<P, HsbError> {
        check_row("probs", probs, self.topology.n_leaves())?;
        check_row("ratios", ratios, self.topology.n_internal())?;
        let mut scratch = Scratch::new(self.topology.n_nodes());
        Ok(kernels::inverse_row(self.topology, probs, &mut scratch, ratios))
    }

    /// Inverse gradient of a single row.
    pub fn inverse_gradient_row_into<P: Real, R: Real>(
        &self,
        ratios_grad: &[R],
        log_jacobian_grad: P,
        ratios: &[R],
        probs_grad: &mut [P],
    ) -> Result<(), HsbError> {
        check_row("ratios_grad", ratios_grad, self.topology.n_internal())?;
        check_row("ratios", ratios, self.topology.n_internal())?;
        check_row("probs_grad", probs_grad, self.topology.n_leaves())?;
        let mut scratch = Scratch::new(self.topology.n_nodes());
        kernels::inverse_gradient_row(
            self.topology,
            ratios_grad,
            log_jacobian_grad,
            ratios,
            &mut scratch,
            probs_grad,
        );
        Ok(())
    }
}
