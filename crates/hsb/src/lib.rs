//! hsb: hierarchical stick-breaking for tree-structured simplices.
//!
//! A rooted binary tree with `n` leaves parameterizes the probability simplex
//! over its leaves: every internal node splits its mass between its children
//! by a ratio in `(0, 1)`. This crate maps between per-node logits/ratios and
//! leaf probabilities for whole batches of rows, and provides the gradient of
//! the inverse map for reverse-mode differentiation.
//!
//! # Key Types
//!
//! - [`Topology`] - Validated tree shared by every row of a batch
//! - [`StickBreaking`] - Batch forward / inverse / inverse-gradient
//! - [`TransformConfig`] - Threading and sharding configuration
//! - [`HsbError`] / [`TopologyError`] - Error types
//!
//! # Example
//!
//! ```
//! use hsb::{StickBreaking, Topology};
//! use ndarray::array;
//!
//! // Root splits leaf 0 from the subtree {1, 2}
//! let topology = Topology::new(
//!     vec![1, -1, 3, -1, -1],
//!     vec![2, -1, 4, -1, -1],
//!     vec![-1, 0, -1, 1, 2],
//!     3,
//! )
//! .unwrap();
//!
//! let transform = StickBreaking::new(&topology);
//! let probs = transform.forward(array![[0.0f64, 0.0]].view()).unwrap();
//! assert_eq!(probs, array![[0.5, 0.25, 0.25]]);
//! ```

// Re-export approx traits for users who want to compare outputs
pub use approx;

pub mod config;
pub mod data;
pub mod error;
pub mod repr;
pub mod testing;
pub mod transform;
pub mod utils;

// =============================================================================
// Convenience Re-exports
// =============================================================================

pub use config::{ConfigError, TransformConfig};
pub use data::Real;
pub use error::{HsbError, TopologyError};
pub use repr::{NodeId, NodeKind, Topology};
pub use transform::{InverseOutput, Operation, StickBreaking};
pub use utils::{Parallelism, run_with_threads};
