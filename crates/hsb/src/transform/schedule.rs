//! Batch scheduling: contiguous row shards on a worker pool.
//!
//! A batch of `m` rows is cut into contiguous shards. Shard size comes from a
//! per-row cost estimate, never from the kernels: a shard is only split off
//! once it carries `min_cost_per_shard` units of work, and there are never
//! more shards than workers.
//!
//! Each worker job allocates one [`Scratch`] when it starts and reuses it for
//! every row of every shard it runs. Scratch is moved into the job, so no two
//! workers can observe the same instance and no lock is taken per row.

use std::ops::Range;

use crate::config::TransformConfig;
use crate::repr::Topology;
use crate::utils::Parallelism;

use super::scratch::Scratch;

// =============================================================================
// ShardPlan
// =============================================================================

/// Partition of `[0, n_rows)` into equally sized contiguous shards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardPlan {
    n_rows: usize,
    rows_per_shard: usize,
    n_shards: usize,
}

impl ShardPlan {
    /// Plan shards for `n_rows` rows costing `row_cost` units each.
    ///
    /// `n_shards = clamp(n_rows * row_cost / min_cost_per_shard, 1, max_parallelism)`,
    /// then rows are spread evenly, so only the last shard may be shorter.
    pub fn new(
        n_rows: usize,
        row_cost: usize,
        max_parallelism: usize,
        min_cost_per_shard: usize,
    ) -> Self {
        if n_rows == 0 {
            return Self {
                n_rows,
                rows_per_shard: 1,
                n_shards: 0,
            };
        }

        let total_cost = n_rows.saturating_mul(row_cost);
        let wanted = total_cost / min_cost_per_shard.max(1);
        let n_shards = wanted.clamp(1, max_parallelism.max(1)).min(n_rows);
        let rows_per_shard = n_rows.div_ceil(n_shards);

        Self {
            n_rows,
            rows_per_shard,
            n_shards: n_rows.div_ceil(rows_per_shard),
        }
    }

    #[inline]
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Rows per shard (always at least one).
    #[inline]
    pub fn rows_per_shard(&self) -> usize {
        self.rows_per_shard
    }

    #[inline]
    pub fn n_shards(&self) -> usize {
        self.n_shards
    }

    /// Row range of every shard, in order.
    pub fn ranges(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        (0..self.n_shards).map(move |s| {
            let start = s * self.rows_per_shard;
            start..(start + self.rows_per_shard).min(self.n_rows)
        })
    }
}

// =============================================================================
// BatchScheduler
// =============================================================================

/// Runs shards of one call, giving each worker job its own [`Scratch`].
#[derive(Debug, Clone, Copy)]
pub struct BatchScheduler {
    n_nodes: usize,
    plan: ShardPlan,
    parallelism: Parallelism,
}

impl BatchScheduler {
    /// Plan a call over `n_rows` rows of `topology`.
    ///
    /// The per-row cost is `n_leaves * cost_per_leaf`. A plan with a single
    /// shard runs on the calling thread even when `parallelism` allows more.
    pub fn new(
        topology: &Topology,
        n_rows: usize,
        config: &TransformConfig,
        parallelism: Parallelism,
    ) -> Self {
        let row_cost = topology.n_leaves().saturating_mul(config.cost_per_leaf);
        let plan = ShardPlan::new(
            n_rows,
            row_cost,
            parallelism.n_workers(),
            config.min_cost_per_shard,
        );
        let parallelism = if plan.n_shards() > 1 {
            parallelism
        } else {
            Parallelism::Sequential
        };

        tracing::debug!(
            n_rows,
            row_cost,
            n_shards = plan.n_shards(),
            rows_per_shard = plan.rows_per_shard(),
            parallel = parallelism.is_parallel(),
            "shard plan"
        );

        Self {
            n_nodes: topology.n_nodes(),
            plan,
            parallelism,
        }
    }

    #[inline]
    pub fn plan(&self) -> ShardPlan {
        self.plan
    }

    /// Rows per shard; use as the chunk size for `axis_chunks_iter`.
    #[inline]
    pub fn rows_per_shard(&self) -> usize {
        self.plan.rows_per_shard()
    }

    #[inline]
    pub fn parallelism(&self) -> Parallelism {
        self.parallelism
    }

    /// Run `f` once per shard.
    ///
    /// `shards` must yield exactly the plan's shards, e.g. zipped
    /// `axis_chunks_iter(ROWS, rows_per_shard())` of every buffer in the call.
    pub fn for_each_shard<T, I, F>(&self, shards: I, f: F)
    where
        T: Send,
        I: Iterator<Item = T> + Send,
        F: Fn(&mut Scratch, T) + Sync + Send,
    {
        let n_nodes = self.n_nodes;
        self.parallelism
            .maybe_par_bridge_for_each_init(shards, || Scratch::new(n_nodes), f);
    }
}
