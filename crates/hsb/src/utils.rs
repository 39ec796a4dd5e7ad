//! Parallelism configuration and worker-pool setup.

use std::num::NonZeroUsize;

use rayon::prelude::*;

use crate::error::HsbError;

// =============================================================================
// Parallelism Configuration
// =============================================================================

/// Whether parallel execution is allowed.
///
/// When `Parallel`, the batch scheduler hands shards to `rayon` workers.
/// When `Sequential`, all shards run in order on the calling thread.
///
/// The thread pool itself is set up by [`run_with_threads`]; components only
/// respect this flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Parallelism {
    Sequential,
    Parallel,
}

impl Parallelism {
    /// Create from thread count semantics.
    ///
    /// - 0 = auto (parallel if the rayon pool has multiple threads, sequential otherwise)
    /// - 1 = sequential
    /// - >1 = parallel
    #[inline]
    pub fn from_threads(n_threads: usize) -> Self {
        if n_threads == 1 || (n_threads == 0 && rayon::current_num_threads() == 1) {
            Parallelism::Sequential
        } else {
            Parallelism::Parallel
        }
    }

    /// Returns `true` if parallel execution is allowed.
    #[inline]
    pub fn is_parallel(self) -> bool {
        matches!(self, Parallelism::Parallel)
    }

    /// Number of workers that may run shards concurrently.
    #[inline]
    pub fn n_workers(self) -> usize {
        if self.is_parallel() {
            rayon::current_num_threads()
        } else {
            1
        }
    }

    /// Parallel bridge for_each with per-worker initialization.
    ///
    /// The `init` closure is called once per rayon job (in parallel mode) or
    /// once total (in sequential mode). The value it returns is owned by that
    /// job alone and reused for every item the job processes.
    #[inline]
    pub fn maybe_par_bridge_for_each_init<T, I, INIT, S, F>(self, iter: I, init: INIT, f: F)
    where
        T: Send,
        I: Iterator<Item = T> + Send,
        INIT: Fn() -> S + Sync + Send,
        F: Fn(&mut S, T) + Sync + Send,
    {
        if self.is_parallel() {
            iter.par_bridge().for_each_init(init, f);
        } else {
            let mut state = init();
            iter.for_each(|item| f(&mut state, item));
        }
    }
}

// =============================================================================
// Thread Pool Setup
// =============================================================================

/// Run a closure with the appropriate thread pool.
///
/// Thread count semantics:
/// - `None` = use the ambient rayon pool (parallel unless it has one thread)
/// - `Some(1)` = sequential (no thread pool)
/// - `Some(n)` = a dedicated pool with exactly `n` threads
///
/// # Errors
///
/// Returns [`HsbError::ThreadPool`] if the dedicated pool cannot be built.
pub fn run_with_threads<T: Send>(
    n_threads: Option<NonZeroUsize>,
    f: impl FnOnce(Parallelism) -> T + Send,
) -> Result<T, HsbError> {
    let requested = n_threads.map_or(0, NonZeroUsize::get);
    let parallelism = Parallelism::from_threads(requested);

    if requested <= 1 {
        return Ok(f(parallelism));
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(requested)
        .build()?;
    tracing::debug!(n_threads = requested, "built worker pool");
    Ok(pool.install(|| f(parallelism)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parallelism_from_threads() {
        assert!(!Parallelism::from_threads(1).is_parallel());
        assert!(Parallelism::from_threads(2).is_parallel());
        assert!(Parallelism::from_threads(8).is_parallel());
    }

    #[test]
    fn test_sequential_has_one_worker() {
        assert_eq!(Parallelism::Sequential.n_workers(), 1);
    }

    #[test]
    fn test_run_with_threads_sequential() {
        let result = run_with_threads(NonZeroUsize::new(1), |p| p).unwrap();
        assert_eq!(result, Parallelism::Sequential);
    }

    #[test]
    fn test_run_with_threads_auto() {
        let result = run_with_threads(None, |_| 42).unwrap();
        assert_eq!(result, 42);
    }

    #[test]
    fn test_run_with_threads_explicit() {
        let (parallelism, workers) =
            run_with_threads(NonZeroUsize::new(3), |p| (p, p.n_workers())).unwrap();
        assert_eq!(parallelism, Parallelism::Parallel);
        assert_eq!(workers, 3);
    }

    #[test]
    fn test_bridge_init_visits_every_item() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        for parallelism in [Parallelism::Sequential, Parallelism::Parallel] {
            let sum = AtomicUsize::new(0);
            parallelism.maybe_par_bridge_for_each_init(
                0..100usize,
                Vec::<usize>::new,
                |seen, i| {
                    seen.push(i);
                    sum.fetch_add(i, Ordering::Relaxed);
                },
            );
            assert_eq!(sum.load(Ordering::Relaxed), 4950);
        }
    }
}
