//! Transform configuration with builder pattern.
//!
//! [`TransformConfig`] controls how a batch is sharded across workers. It uses
//! the `bon` crate for builder generation and validates at build time.
//!
//! # Example
//!
//! ```
//! use std::num::NonZeroUsize;
//! use hsb::TransformConfig;
//!
//! // All defaults: ambient rayon pool, host-style cost model
//! let config = TransformConfig::builder().build().unwrap();
//!
//! // Four dedicated workers, finer shards
//! let config = TransformConfig::builder()
//!     .n_threads(NonZeroUsize::new(4).unwrap())
//!     .min_cost_per_shard(1_000)
//!     .build()
//!     .unwrap();
//! assert_eq!(config.min_cost_per_shard, 1_000);
//! ```

use std::num::NonZeroUsize;

use bon::Builder;

// =============================================================================
// ConfigError
// =============================================================================

/// Errors that can occur during configuration validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Cost model parameters must be positive.
    #[error("{field} must be at least 1")]
    ZeroCost { field: &'static str },
}

// =============================================================================
// TransformConfig
// =============================================================================

/// Scheduling configuration for the batch transforms.
///
/// The cost model mirrors the host sharder the kernels were written for: a
/// row costs `n_leaves * cost_per_leaf` units, and a shard is only split off
/// once it carries at least `min_cost_per_shard` units of work.
#[derive(Debug, Clone, Builder)]
#[builder(
    derive(Clone, Debug),
    finish_fn(vis = "", name = __build_internal)
)]
pub struct TransformConfig {
    /// Number of threads. `None` uses the ambient rayon pool.
    pub n_threads: Option<NonZeroUsize>,

    /// Estimated cost of one row per leaf of the tree. Default: 10.
    #[builder(default = 10)]
    pub cost_per_leaf: usize,

    /// Minimum estimated cost per shard. Default: 10 000.
    ///
    /// Small batches on small trees stay on a single worker.
    #[builder(default = 10_000)]
    pub min_cost_per_shard: usize,
}

/// Custom finishing function that validates the config.
impl<S: transform_config_builder::IsComplete> TransformConfigBuilder<S> {
    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `cost_per_leaf` or `min_cost_per_shard` is zero.
    pub fn build(self) -> Result<TransformConfig, ConfigError> {
        let config = self.__build_internal();
        config.validate()?;
        Ok(config)
    }
}

impl TransformConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.cost_per_leaf == 0 {
            return Err(ConfigError::ZeroCost {
                field: "cost_per_leaf",
            });
        }
        if self.min_cost_per_shard == 0 {
            return Err(ConfigError::ZeroCost {
                field: "min_cost_per_shard",
            });
        }
        Ok(())
    }
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self::builder().build().expect("default config is valid")
    }
}
