//! Work dispatch for elapsed notifications.
//!
//! A timer never runs subscribers on its own wait-loop thread. Every firing is
//! handed to a [`WorkDispatcher`] as a zero-argument unit of work, so a slow
//! subscriber cannot skew the timer's cadence.
//!
//! [`ThreadPool`] is the default dispatcher: a rayon pool with work-stealing
//! scheduling. A panic raised by a unit of work stays inside the pool; it is
//! logged and the worker thread carries on.
//!
//! # Example
//!
//! ```
//! use horizon_interval::dispatch::{ThreadPool, ThreadPoolConfig, WorkDispatcher};
//! use std::sync::mpsc;
//!
//! let pool = ThreadPool::new(ThreadPoolConfig::with_threads(2)).unwrap();
//! let (tx, rx) = mpsc::channel();
//!
//! pool.submit(Box::new(move || {
//!     tx.send(42).unwrap();
//! }));
//!
//! assert_eq!(rx.recv().unwrap(), 42);
//! ```

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use rayon::{ThreadPool as RayonThreadPool, ThreadPoolBuilder};

use crate::error::{Result, ThreadPoolError};
use crate::logging::targets;

/// Global thread pool instance.
static GLOBAL_POOL: OnceLock<Arc<ThreadPool>> = OnceLock::new();

/// A boxed unit of work.
pub type Work = Box<dyn FnOnce() + Send + 'static>;

/// A facility that runs units of work asynchronously.
///
/// Implementations must run each submitted unit at most once and must not run
/// it inline on the submitting thread. No ordering between submissions is
/// required.
pub trait WorkDispatcher: Send + Sync {
    /// Submit a unit of work for asynchronous execution.
    fn submit(&self, work: Work);
}

/// Configuration for creating a custom thread pool.
#[derive(Debug, Clone)]
pub struct ThreadPoolConfig {
    /// Number of worker threads. `None` means use the number of CPU cores.
    pub num_threads: Option<usize>,
    /// Name prefix for worker threads.
    pub thread_name: String,
    /// Stack size for worker threads in bytes.
    pub stack_size: Option<usize>,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self {
            num_threads: None,
            thread_name: "horizon-interval-dispatch".to_string(),
            stack_size: None,
        }
    }
}

impl ThreadPoolConfig {
    /// Create a new configuration with custom thread count.
    pub fn with_threads(num_threads: usize) -> Self {
        Self {
            num_threads: Some(num_threads),
            ..Default::default()
        }
    }
}

/// A thread pool for dispatching elapsed notifications.
pub struct ThreadPool {
    pool: RayonThreadPool,
    active_tasks: Arc<AtomicUsize>,
}

impl ThreadPool {
    /// Get the global thread pool instance.
    ///
    /// The global pool is lazily initialized with default settings. If the
    /// default pool cannot be built, a single-threaded pool is used instead.
    pub fn global() -> Arc<ThreadPool> {
        GLOBAL_POOL
            .get_or_init(|| {
                let pool = ThreadPool::new(ThreadPoolConfig::default()).or_else(|err| {
                    tracing::error!(
                        target: targets::DISPATCH,
                        error = %err,
                        "default thread pool creation failed, retrying with one thread"
                    );
                    ThreadPool::new(ThreadPoolConfig::with_threads(1))
                });
                match pool {
                    Ok(pool) => Arc::new(pool),
                    Err(err) => panic!("unable to create any dispatch thread pool: {err}"),
                }
            })
            .clone()
    }

    /// Initialize the global thread pool with custom configuration.
    ///
    /// This must be called before the first call to [`ThreadPool::global`].
    /// Returns an error if the pool has already been initialized.
    pub fn init_global(config: ThreadPoolConfig) -> Result<Arc<ThreadPool>> {
        let pool = Arc::new(ThreadPool::new(config)?);
        GLOBAL_POOL
            .set(pool.clone())
            .map_err(|_| ThreadPoolError::AlreadyInitialized)?;
        Ok(pool)
    }

    /// Create a new thread pool with the given configuration.
    pub fn new(config: ThreadPoolConfig) -> Result<Self> {
        let thread_name = config.thread_name;
        let mut builder = ThreadPoolBuilder::new()
            .thread_name(move |index| format!("{thread_name}-{index}"))
            .panic_handler(log_panic);

        if let Some(num_threads) = config.num_threads {
            builder = builder.num_threads(num_threads);
        }

        if let Some(stack_size) = config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let pool = builder
            .build()
            .map_err(|e| ThreadPoolError::CreationFailed(e.to_string()))?;

        Ok(Self {
            pool,
            active_tasks: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Get the number of threads in the pool.
    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Get the number of submitted units of work that have not finished.
    pub fn active_tasks(&self) -> usize {
        self.active_tasks.load(Ordering::Acquire)
    }
}

impl WorkDispatcher for ThreadPool {
    fn submit(&self, work: Work) {
        self.active_tasks.fetch_add(1, Ordering::AcqRel);
        let active = ActiveTask(self.active_tasks.clone());

        self.pool.spawn(move || {
            let _active = active;
            work();
        });
    }
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("num_threads", &self.num_threads())
            .field("active_tasks", &self.active_tasks())
            .finish()
    }
}

/// Decrements the active task count when a unit of work ends, even by panic.
struct ActiveTask(Arc<AtomicUsize>);

impl Drop for ActiveTask {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Panic handler for pool threads.
fn log_panic(payload: Box<dyn Any + Send>) {
    let message = payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>");
    tracing::error!(
        target: targets::DISPATCH,
        panic = message,
        "dispatched work panicked"
    );
}

static_assertions::assert_impl_all!(ThreadPool: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_submit_runs_work() {
        let pool = ThreadPool::new(ThreadPoolConfig::with_threads(2)).unwrap();
        let (tx, rx) = mpsc::channel();

        pool.submit(Box::new(move || {
            tx.send(std::thread::current().name().map(str::to_owned)).unwrap();
        }));

        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(name.unwrap().starts_with("horizon-interval-dispatch-"));
    }

    #[test]
    fn test_multiple_submissions() {
        let pool = ThreadPool::new(ThreadPoolConfig::with_threads(4)).unwrap();
        let counter = Arc::new(AtomicI32::new(0));
        let (tx, rx) = mpsc::channel();

        for _ in 0..10 {
            let counter = counter.clone();
            let tx = tx.clone();
            pool.submit(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                tx.send(()).unwrap();
            }));
        }

        for _ in 0..10 {
            rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_panicking_work_does_not_poison_pool() {
        let pool = ThreadPool::new(ThreadPoolConfig::with_threads(1)).unwrap();
        let (tx, rx) = mpsc::channel();

        pool.submit(Box::new(|| panic!("subscriber failure")));
        pool.submit(Box::new(move || tx.send(7).unwrap()));

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 7);

        // The panicking job still releases its active-task slot.
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(pool.active_tasks(), 0);
    }

    #[test]
    fn test_config_threads() {
        let pool = ThreadPool::new(ThreadPoolConfig::with_threads(3)).unwrap();
        assert_eq!(pool.num_threads(), 3);
    }

    #[test]
    fn test_global_pool() {
        let pool = ThreadPool::global();
        let (tx, rx) = mpsc::channel();
        pool.submit(Box::new(move || tx.send(42).unwrap()));
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
        assert!(Arc::ptr_eq(&pool, &ThreadPool::global()));
    }
}
