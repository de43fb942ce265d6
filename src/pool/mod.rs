//! # Worker Pool Module
//!
//! A dynamically scaling pool of OS worker threads with a pausable
//! lifecycle, a bounded FIFO task queue and an autoscaling monitor.
//!
//! ## Key Concepts
//! - Pool lifecycle: RUNNING <-> PAUSED -> SHUTDOWN -> TERMINATING -> TERMINATED
//! - Elastic fleet: worker count moves within `[core, max]` under load
//! - Result handles: every submission returns a one-shot [`TaskHandle`]
//!
//! ## Design Principles
//! - Blocking execution: tasks are synchronous calls on preemptive threads
//! - Graceful shutdown: queued work always drains before termination
//! - Live tuning: knobs can be rewritten at runtime through the config store

mod core;
mod monitor;
mod queue;
mod semaphore;
mod task;
mod worker;

use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::{self, ConfigVar};
use crate::error::PoolError;

use self::core::PoolCore;
use self::task::Task;
use self::worker::Worker;

pub use self::task::TaskHandle;

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

/// Tuning record for a [`ThreadPool`].
///
/// On the wire this is a YAML map of `max_task_count`,
/// `core_thread_count`, `max_thread_count`, `keep_alive_time`
/// (integer milliseconds) and `monitor_interval` (integer milliseconds);
/// omitted keys keep their defaults. `enable_dynamic_scaling` is a
/// construction-time switch and never serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Task queue capacity; 0 means unbounded.
    pub max_task_count: usize,
    /// Steady-state worker count; the monitor never shrinks below it.
    pub core_thread_count: usize,
    /// Ceiling the monitor may grow the fleet to.
    pub max_thread_count: usize,
    /// Idle time a non-core worker must accumulate before it is
    /// shrink-eligible.
    #[serde(with = "duration_ms")]
    pub keep_alive_time: Duration,
    /// Wake period of the autoscaling monitor.
    #[serde(with = "duration_ms")]
    pub monitor_interval: Duration,
    /// Whether to run the monitor at all.
    #[serde(skip)]
    pub enable_dynamic_scaling: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_task_count: 0,
            core_thread_count: 1,
            max_thread_count: 8,
            keep_alive_time: Duration::from_millis(5000),
            monitor_interval: Duration::from_millis(200),
            enable_dynamic_scaling: true,
        }
    }
}

impl PoolConfig {
    /// Config sized to the host: one core worker per CPU with twice
    /// that as the ceiling.
    pub fn sized_for_host() -> Self {
        let cpus = num_cpus::get();
        Self {
            core_thread_count: cpus,
            max_thread_count: cpus.saturating_mul(2),
            ..Self::default()
        }
    }
}

// Equality ignores `enable_dynamic_scaling`: the switch never travels
// through the config store, so it must not defeat change detection.
impl PartialEq for PoolConfig {
    fn eq(&self, other: &Self) -> bool {
        self.max_task_count == other.max_task_count
            && self.core_thread_count == other.core_thread_count
            && self.max_thread_count == other.max_thread_count
            && self.keep_alive_time == other.keep_alive_time
            && self.monitor_interval == other.monitor_interval
    }
}

/// Pool lifecycle states.
///
/// All transitions are monotonic except RUNNING <-> PAUSED.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolStatus {
    /// Accepting and executing tasks.
    Running,
    /// Accepting tasks but not executing them.
    Paused,
    /// Refusing new tasks, draining the queue.
    Shutdown,
    /// Releasing workers and the monitor.
    Terminating,
    /// All threads joined; the pool is unusable.
    Terminated,
}

impl fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PoolStatus::Running => "RUNNING",
            PoolStatus::Paused => "PAUSED",
            PoolStatus::Shutdown => "SHUTDOWN",
            PoolStatus::Terminating => "TERMINATING",
            PoolStatus::Terminated => "TERMINATED",
        };
        f.write_str(name)
    }
}

/// Config store key the pool registers its tuning record under.
const CONFIG_KEY: &str = "threadpool";

/// A dynamically scaling worker pool.
///
/// Submitted closures execute asynchronously on owned OS threads;
/// every submission returns a [`TaskHandle`] carrying the closure's
/// result. The pool registers a `"threadpool"` record in the process
/// config store at construction, so its tuning knobs follow YAML
/// reloads at runtime.
///
/// Dropping the pool runs [`ThreadPool::shutdown`], which drains all
/// queued work first.
///
/// # Example
///
/// ```no_run
/// use flexpool::{PoolConfig, ThreadPool};
///
/// let pool = ThreadPool::new(PoolConfig::default());
/// let handle = pool.submit(|| 2 + 2).unwrap();
/// assert_eq!(handle.wait().unwrap(), 4);
/// pool.shutdown();
/// ```
pub struct ThreadPool {
    core: Arc<PoolCore>,
    monitor: Mutex<Option<JoinHandle<()>>>,
    config_var: Option<Arc<ConfigVar<PoolConfig>>>,
    listener_id: Option<u64>,
}

impl ThreadPool {
    /// Builds the pool, spawns `core_thread_count` workers, starts the
    /// monitor when dynamic scaling is enabled, and registers the
    /// tuning record in the config store.
    pub fn new(config: PoolConfig) -> Self {
        if config.core_thread_count > config.max_thread_count {
            warn!(
                "core_thread_count {} exceeds max_thread_count {}; the monitor will never expand",
                config.core_thread_count, config.max_thread_count
            );
        }

        let core = Arc::new(PoolCore::new(&config));

        let monitor = if config.enable_dynamic_scaling {
            info!(
                "dynamic scaling enabled, monitor interval {}ms",
                config.monitor_interval.as_millis()
            );
            let monitor_core = Arc::clone(&core);
            let handle = thread::Builder::new()
                .name("flexpool-monitor".into())
                .spawn(move || monitor::monitor_loop(monitor_core))
                .expect("failed to spawn monitor thread");
            Some(handle)
        } else {
            info!("dynamic scaling disabled, monitor inactive");
            None
        };

        {
            let mut workers = core.workers.lock();
            for _ in 0..config.core_thread_count {
                workers.push(Worker::spawn(Arc::clone(&core)));
            }
        }

        let (config_var, listener_id) = install_config_listener(&core, &config);

        Self {
            core,
            monitor: Mutex::new(monitor),
            config_var,
            listener_id,
        }
    }

    /// Submits a closure for asynchronous execution.
    ///
    /// Accepted while RUNNING or PAUSED (a paused pool queues the task
    /// until resumed); fails with [`PoolError::IllegalState`] in any
    /// later state and with [`PoolError::QueueFull`] when a bounded
    /// queue is at capacity.
    pub fn submit<F, R>(&self, f: F) -> Result<TaskHandle<R>, PoolError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        // Holding the status lock for the whole admission keeps the
        // state check, the capacity check and the enqueue atomic with
        // respect to lifecycle transitions and other submitters.
        let status_guard = self.core.status.lock();
        let status = *status_guard;
        if status != PoolStatus::Running && status != PoolStatus::Paused {
            error!("submit rejected: pool is {}", status);
            return Err(PoolError::IllegalState { status });
        }

        let (task, handle) = Task::package(f);
        self.core.queue.try_push(task).map_err(|err| {
            error!("submit rejected: {}", err);
            err
        })?;

        Ok(handle)
    }

    /// RUNNING -> PAUSED: workers stop picking up tasks; submissions
    /// stay accepted. No-op in any other state.
    pub fn pause(&self) {
        let mut status = self.core.status.lock();
        if *status == PoolStatus::Running {
            *status = PoolStatus::Paused;
            info!("thread pool status: RUNNING -> PAUSED");

            for worker in self.core.workers.lock().iter() {
                worker.pause();
            }

            // Wake parked workers so each notices its new status.
            self.core.queue.notify_workers();
        }
    }

    /// PAUSED -> RUNNING. No-op in any other state.
    pub fn resume(&self) {
        let mut status = self.core.status.lock();
        self.core.resume_locked(&mut status);
    }

    /// Gracefully shuts the pool down: stops admissions, drains the
    /// queue, joins every worker, zombie and the monitor. Blocks until
    /// TERMINATED. Idempotent; called from `Drop`.
    pub fn shutdown(&self) {
        // Phase 1: move to SHUTDOWN, resuming first when paused so the
        // drain can make progress.
        {
            let mut status = self.core.status.lock();
            match *status {
                PoolStatus::Paused => {
                    self.core.resume_locked(&mut status);
                    *status = PoolStatus::Shutdown;
                }
                PoolStatus::Running => *status = PoolStatus::Shutdown,
                _ => return,
            }
            info!("thread pool status: RUNNING -> SHUTDOWN");
        }

        // Phase 2: wait for the queue to drain. New tasks are refused
        // from here on, so the wait is finite as long as workers exist;
        // a zero-worker pool with queued tasks would block here, which
        // matches the contract that queued work always executes.
        self.core.queue.wait_until_empty();

        // Phase 3: terminate.
        *self.core.status.lock() = PoolStatus::Terminating;
        self.core.terminating.store(true, Ordering::Release);
        self.core.queue.notify_workers();
        self.core.wake_monitor();
        info!("thread pool status: SHUTDOWN -> TERMINATING");

        {
            // Second broadcast covers workers that re-entered the wait
            // between the flag store and the first broadcast.
            self.core.queue.notify_workers();
            self.core.workers.lock().clear();
        }
        debug!("all workers joined");

        self.core.zombies.lock().clear();
        debug!("zombie workers joined");

        if let Some(handle) = self.monitor.lock().take() {
            if handle.join().is_err() {
                error!("monitor thread exited via panic");
            }
        }
        debug!("monitor joined");

        if let (Some(var), Some(id)) = (&self.config_var, self.listener_id) {
            var.remove_listener(id);
        }

        *self.core.status.lock() = PoolStatus::Terminated;
        info!("thread pool status: TERMINATING -> TERMINATED");
    }

    /// Adds `count` workers. Legal while RUNNING or PAUSED.
    pub fn increase_thread_count(&self, count: usize) -> Result<(), PoolError> {
        let status = self.core.status.lock();
        self.core.increase_workers(*status, count)
    }

    /// Signals the last `min(count, thread_count)` workers to terminate
    /// and parks them on the zombie list; their threads are joined
    /// later, not here. Legal while RUNNING or PAUSED.
    pub fn decrease_thread_count(&self, count: usize) -> Result<(), PoolError> {
        let status = self.core.status.lock();
        self.core.decrease_workers(*status, count)
    }

    /// Rewrites the queue capacity (0 = unbounded); applies to future
    /// admissions only.
    pub fn set_max_task_count(&self, count: usize) {
        self.core.queue.set_capacity(count);
    }

    /// Number of active (non-zombie) workers.
    pub fn thread_count(&self) -> usize {
        self.core.workers.lock().len()
    }

    /// Current lifecycle state.
    pub fn status(&self) -> PoolStatus {
        *self.core.status.lock()
    }

    /// Live tuning values, assembled from the per-knob atomics.
    pub fn config(&self) -> PoolConfig {
        self.core.snapshot_config()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPool")
            .field("status", &self.status())
            .field("thread_count", &self.thread_count())
            .finish()
    }
}

/// Registers the pool's tuning record and installs the change listener
/// that folds store updates into the pool atomics.
fn install_config_listener(
    core: &Arc<PoolCore>,
    config: &PoolConfig,
) -> (Option<Arc<ConfigVar<PoolConfig>>>, Option<u64>) {
    let var = match config::get_or_create(CONFIG_KEY, config.clone(), "thread pool tuning") {
        Ok(var) => var,
        Err(err) => {
            error!("failed to register thread pool config: {}", err);
            return (None, None);
        }
    };

    // The listener holds a weak reference: the store outlives any pool,
    // and a stale entry must not keep a terminated core alive.
    let weak: Weak<PoolCore> = Arc::downgrade(core);
    let id = var.add_listener(move |old, new| {
        if let Some(core) = weak.upgrade() {
            apply_config_change(&core, old, new);
        }
    });

    (Some(var), Some(id))
}

fn apply_config_change(core: &PoolCore, old: &PoolConfig, new: &PoolConfig) {
    if old.max_task_count != new.max_task_count {
        info!(
            "thread pool max_task_count changed from {} to {}",
            old.max_task_count, new.max_task_count
        );
        core.queue.set_capacity(new.max_task_count);
    }

    if old.core_thread_count != new.core_thread_count {
        info!(
            "thread pool core_thread_count changed from {} to {}",
            old.core_thread_count, new.core_thread_count
        );
        core.core_threads
            .store(new.core_thread_count, Ordering::Release);
    }

    if old.max_thread_count != new.max_thread_count {
        info!(
            "thread pool max_thread_count changed from {} to {}",
            old.max_thread_count, new.max_thread_count
        );
        core.max_threads
            .store(new.max_thread_count, Ordering::Release);
    }

    if old.keep_alive_time != new.keep_alive_time {
        info!(
            "thread pool keep_alive_time changed from {}ms to {}ms",
            old.keep_alive_time.as_millis(),
            new.keep_alive_time.as_millis()
        );
        core.keep_alive_ms
            .store(new.keep_alive_time.as_millis() as u64, Ordering::Release);
    }

    if old.monitor_interval != new.monitor_interval {
        info!(
            "thread pool monitor_interval changed from {}ms to {}ms",
            old.monitor_interval.as_millis(),
            new.monitor_interval.as_millis()
        );
        core.monitor_interval_ms
            .store(new.monitor_interval.as_millis() as u64, Ordering::Release);
    }
}
