//! Worker pool for fire-and-forget background tasks.
//!
//! Provides a global thread pool built on rayon. Tasks are submitted from
//! latency-sensitive contexts (the tray message loop, most importantly) and
//! never joined: the submitter must return immediately, and a task failure
//! must never propagate back.
//!
//! Task panics are caught and logged so a misbehaving callback cannot take
//! down a worker thread's caller.
//!
//! # Example
//!
//! ```no_run
//! use duskswitch_core::worker::WorkerPool;
//!
//! let pool = WorkerPool::global();
//! pool.spawn(|| {
//!     // background work; result is not observed
//! });
//! ```

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use rayon::{ThreadPool as RayonThreadPool, ThreadPoolBuilder};

use crate::signal::panic_message;

/// Global worker pool instance.
static GLOBAL_POOL: OnceLock<WorkerPool> = OnceLock::new();

/// Error type for worker pool construction.
#[derive(Debug)]
pub enum WorkerPoolError {
    /// The underlying pool could not be built.
    CreationFailed(String),
}

impl fmt::Display for WorkerPoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerPoolError::CreationFailed(msg) => {
                write!(f, "failed to create worker pool: {}", msg)
            }
        }
    }
}

impl std::error::Error for WorkerPoolError {}

/// Configuration for creating a worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of worker threads. `None` means use the number of CPU cores.
    pub num_threads: Option<usize>,
    /// Name prefix for worker threads.
    pub thread_name: String,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            // One core's worth of workers is plenty: the tasks are registry
            // writes, toasts, and directory opens.
            num_threads: Some(2),
            thread_name: "duskswitch-worker".to_string(),
        }
    }
}

impl WorkerPoolConfig {
    /// Create a new configuration with a custom thread count.
    pub fn with_threads(num_threads: usize) -> Self {
        Self {
            num_threads: Some(num_threads),
            ..Default::default()
        }
    }
}

/// A pool for executing fire-and-forget background tasks.
///
/// Built on rayon's work-stealing scheduler. There are no task handles:
/// callers submit work and move on.
pub struct WorkerPool {
    pool: RayonThreadPool,
    active_tasks: Arc<AtomicUsize>,
}

impl WorkerPool {
    /// Get the global worker pool instance.
    ///
    /// The global pool is lazily initialized with default settings.
    pub fn global() -> &'static WorkerPool {
        GLOBAL_POOL.get_or_init(|| {
            WorkerPool::new(WorkerPoolConfig::default())
                .expect("failed to create global worker pool")
        })
    }

    /// Create a new worker pool with the given configuration.
    pub fn new(config: WorkerPoolConfig) -> Result<Self, WorkerPoolError> {
        let mut builder = ThreadPoolBuilder::new()
            .thread_name(move |index| format!("{}-{}", config.thread_name, index));

        if let Some(num_threads) = config.num_threads {
            builder = builder.num_threads(num_threads);
        }

        let pool = builder
            .build()
            .map_err(|e| WorkerPoolError::CreationFailed(e.to_string()))?;

        Ok(Self {
            pool,
            active_tasks: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Get the number of threads in the pool.
    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Get the number of currently active (running) tasks.
    pub fn active_tasks(&self) -> usize {
        self.active_tasks.load(Ordering::Acquire)
    }

    /// Submit a fire-and-forget task.
    ///
    /// The task runs on a worker thread. A panicking task is caught and
    /// logged; nothing is reported back to the submitter.
    pub fn spawn<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.active_tasks.fetch_add(1, Ordering::AcqRel);
        let active_tasks = self.active_tasks.clone();

        self.pool.spawn(move || {
            if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(task)) {
                let message = panic_message(&panic);
                tracing::error!(
                    target: "duskswitch_core::worker",
                    "worker task panicked: {message}"
                );
            }
            active_tasks.fetch_sub(1, Ordering::AcqRel);
        });
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("num_threads", &self.num_threads())
            .field("active_tasks", &self.active_tasks())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;
    use std::time::Duration;

    fn wait_until_idle(pool: &WorkerPool) {
        for _ in 0..200 {
            if pool.active_tasks() == 0 {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("worker pool did not drain");
    }

    #[test]
    fn test_spawn_runs_task() {
        let pool = WorkerPool::new(WorkerPoolConfig::with_threads(2)).unwrap();
        let counter = Arc::new(AtomicI32::new(0));

        let counter_clone = counter.clone();
        pool.spawn(move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });

        wait_until_idle(&pool);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_multiple_tasks() {
        let pool = WorkerPool::new(WorkerPoolConfig::with_threads(4)).unwrap();
        let counter = Arc::new(AtomicI32::new(0));

        for _ in 0..10 {
            let counter = counter.clone();
            pool.spawn(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        wait_until_idle(&pool);
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_panicking_task_does_not_poison_pool() {
        let pool = WorkerPool::new(WorkerPoolConfig::with_threads(1)).unwrap();
        let counter = Arc::new(AtomicI32::new(0));

        pool.spawn(|| panic!("task bug"));

        let counter_clone = counter.clone();
        pool.spawn(move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });

        wait_until_idle(&pool);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_global_pool() {
        let pool = WorkerPool::global();
        let counter = Arc::new(AtomicI32::new(0));

        let counter_clone = counter.clone();
        pool.spawn(move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });

        // Other tests may share the global pool, so only wait for our task.
        for _ in 0..200 {
            if counter.load(Ordering::SeqCst) == 1 {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("global pool task did not run");
    }
}
