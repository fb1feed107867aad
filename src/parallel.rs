//! Worker pool configuration for batch runs
//!
//! Each batch builds its own Rayon pool instead of touching the global one,
//! so several batches can run in one process with different sizes.

use crate::errors::{ConvertError, Result};
use rayon::{ThreadPool, ThreadPoolBuilder};

/// How many files are converted at once
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParallelConfig {
    pub num_threads: Option<usize>,
    pub serial: bool,
}

impl ParallelConfig {
    pub fn new(num_threads: Option<usize>, serial: bool) -> Self {
        Self {
            num_threads,
            serial,
        }
    }

    /// Run jobs one after another on the calling thread
    pub fn serial() -> Self {
        Self {
            num_threads: None,
            serial: true,
        }
    }

    pub fn with_threads(num_threads: usize) -> Self {
        Self {
            num_threads: Some(num_threads),
            serial: false,
        }
    }

    /// Requested pool size, or one core fewer than available (at least 1).
    pub fn worker_count(&self) -> usize {
        if self.serial {
            return 1;
        }
        match self.num_threads {
            Some(n) => n.max(1),
            None => num_cpus::get().saturating_sub(1).max(1),
        }
    }

    /// Build a pool sized by [`worker_count`](Self::worker_count).
    pub fn build_pool(&self) -> Result<ThreadPool> {
        let num_threads = self.worker_count();
        ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("earthgrid-worker-{}", i))
            .build()
            .map_err(|e| {
                ConvertError::ThreadPool(format!(
                    "Failed to initialize thread pool with {} threads: {}",
                    num_threads, e
                ))
            })
    }
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self::new(None, false)
    }
}

/// Information about the parallel processing environment
#[derive(Debug, Clone)]
pub struct ParallelInfo {
    pub workers: usize,
    pub available_cores: usize,
}

impl ParallelInfo {
    pub fn for_config(config: &ParallelConfig) -> Self {
        Self {
            workers: config.worker_count(),
            available_cores: num_cpus::get(),
        }
    }
}
