//! Batch buffer conventions and shape checks.
//!
//! All batch buffers are row-major `ndarray` matrices with one row per sample.
//! A call's buffers share the same number of rows `m`; their column counts are
//! fixed by the topology (`n - 1` ratios/logits, `n` leaf probabilities, one
//! log-Jacobian).

use ndarray::{ArrayBase, ArrayView1, ArrayViewMut1, Data, Ix2};
use num_traits::{AsPrimitive, Float};

use crate::error::HsbError;

/// Axis constants for row-major batch buffers.
pub mod axis {
    use ndarray::Axis;

    pub const ROWS: Axis = Axis(0);
    pub const COLS: Axis = Axis(1);
}

// =============================================================================
// Element Types
// =============================================================================

/// Floating-point element type of a batch buffer.
///
/// Kernels read and write buffers of any `Real` type but always do their
/// arithmetic in `f64`, so deep trees do not accumulate single-precision
/// error along root-to-leaf paths. Widening goes through
/// [`AsPrimitive::as_`]; [`Real::from_f64`] rounds a result back.
pub trait Real: Float + AsPrimitive<f64> + Send + Sync {
    fn from_f64(value: f64) -> Self;
}

impl<T> Real for T
where
    T: Float + AsPrimitive<f64> + Send + Sync,
    f64: AsPrimitive<T>,
{
    #[inline]
    fn from_f64(value: f64) -> Self {
        value.as_()
    }
}

// =============================================================================
// Shape Checks
// =============================================================================

/// Check that `buffer` has exactly `(n_rows, n_cols)` and standard layout.
///
/// Standard layout is required because shards hand contiguous row slices
/// straight to the row kernels.
pub(crate) fn check_matrix<S: Data>(
    name: &'static str,
    buffer: &ArrayBase<S, Ix2>,
    n_rows: usize,
    n_cols: usize,
) -> Result<(), HsbError> {
    if buffer.dim() != (n_rows, n_cols) {
        return Err(HsbError::shape(name, &[n_rows, n_cols], buffer.shape()));
    }
    if !buffer.is_standard_layout() {
        return Err(HsbError::NonContiguous { buffer: name });
    }
    Ok(())
}

/// Borrow a row of a standard-layout matrix as a slice.
#[inline]
pub(crate) fn row_slice<'a, T>(row: ArrayView1<'a, T>) -> &'a [T] {
    row.to_slice()
        .expect("rows of a standard-layout matrix are contiguous")
}

/// Borrow a row of a standard-layout matrix as a mutable slice.
#[inline]
pub(crate) fn row_slice_mut<'a, T>(row: ArrayViewMut1<'a, T>) -> &'a mut [T] {
    row.into_slice()
        .expect("rows of a standard-layout matrix are contiguous")
}

/// Check the length of a single row slice.
pub(crate) fn check_row(name: &'static str, row: &[impl Sized], len: usize) -> Result<(), HsbError> {
    if row.len() != len {
        return Err(HsbError::shape(name, &[len], &[row.len()]));
    }
    Ok(())
}
