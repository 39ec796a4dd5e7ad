//! Hierarchical stick-breaking transforms.
//!
//! - [`kernels`]: the per-row forward, inverse and inverse-gradient passes
//! - [`schedule`]: shard planning and per-worker scratch ownership
//! - [`StickBreaking`]: batch facade that validates buffers and runs both
//!
//! The forward map sends `n - 1` logits to a point of the `n`-simplex; the
//! inverse recovers one split ratio per internal node together with the
//! log-Jacobian of the forward map.

pub mod kernels;
mod operation;
pub mod schedule;
mod scratch;
mod stick_breaking;

pub use kernels::{forward_row, inverse_gradient_row, inverse_row, logit, sigmoid};
pub use operation::Operation;
pub use schedule::{BatchScheduler, ShardPlan};
pub use scratch::Scratch;
pub use stick_breaking::{InverseOutput, StickBreaking};
