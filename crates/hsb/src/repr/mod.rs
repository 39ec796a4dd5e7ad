//! Canonical tree representation.

/// Canonical node identifier: an index into the topology's node slots.
pub type NodeId = u32;

pub mod topology;

pub use topology::{NodeKind, Topology};
