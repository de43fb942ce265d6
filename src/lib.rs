// flexpool: a dynamically scaling worker pool.
//
// The pool executes caller-submitted closures on an elastic fleet of OS
// threads bounded by `[core_thread_count, max_thread_count]`, hands
// every submitter a one-shot result handle, and follows live tuning
// changes through a process-wide YAML-backed configuration store.

pub mod config;
pub mod error;
pub mod logging;
pub mod pool;
pub mod util;

// Re-export the commonly used types
pub use error::{ConfigError, PoolError, TaskError};
pub use pool::{PoolConfig, PoolStatus, TaskHandle, ThreadPool};
