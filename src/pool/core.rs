use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{error, info};

use crate::error::PoolError;

use super::queue::TaskQueue;
use super::worker::Worker;
use super::{PoolConfig, PoolStatus};

/// State shared by the facade, the workers and the monitor.
///
/// Lock order, outermost first: `status`, `workers`, `zombies`, the
/// queue's internal lock, a worker's status lock. The `terminating`
/// atomic duplicates the terminal status so the queue wake predicate
/// never has to reach for `status` while the queue lock is held.
pub(crate) struct PoolCore {
    pub(crate) status: Mutex<PoolStatus>,
    pub(crate) terminating: AtomicBool,

    pub(crate) workers: Mutex<Vec<Worker>>,
    pub(crate) zombies: Mutex<Vec<Worker>>,

    pub(crate) queue: TaskQueue,
    pub(crate) busy_workers: AtomicUsize,

    // Live-tunable knobs; each is read per use, no multi-field
    // coherence required.
    pub(crate) core_threads: AtomicUsize,
    pub(crate) max_threads: AtomicUsize,
    pub(crate) keep_alive_ms: AtomicU64,
    pub(crate) monitor_interval_ms: AtomicU64,
    pub(crate) dynamic_scaling: bool,

    // Parking spot for the monitor's interruptible sleep.
    pub(crate) monitor_lock: Mutex<()>,
    pub(crate) monitor_cv: Condvar,

    // Zero point of the millisecond clock behind last-active tracking.
    epoch: Instant,
}

impl PoolCore {
    pub(crate) fn new(config: &PoolConfig) -> Self {
        Self {
            status: Mutex::new(PoolStatus::Running),
            terminating: AtomicBool::new(false),
            workers: Mutex::new(Vec::new()),
            zombies: Mutex::new(Vec::new()),
            queue: TaskQueue::new(config.max_task_count),
            busy_workers: AtomicUsize::new(0),
            core_threads: AtomicUsize::new(config.core_thread_count),
            max_threads: AtomicUsize::new(config.max_thread_count),
            keep_alive_ms: AtomicU64::new(config.keep_alive_time.as_millis() as u64),
            monitor_interval_ms: AtomicU64::new(config.monitor_interval.as_millis() as u64),
            dynamic_scaling: config.enable_dynamic_scaling,
            monitor_lock: Mutex::new(()),
            monitor_cv: Condvar::new(),
            epoch: Instant::now(),
        }
    }

    /// Milliseconds elapsed since pool construction.
    pub(crate) fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    pub(crate) fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms.load(Ordering::Acquire))
    }

    /// Assembles the live configuration from the per-knob atomics.
    pub(crate) fn snapshot_config(&self) -> PoolConfig {
        PoolConfig {
            max_task_count: self.queue.capacity(),
            core_thread_count: self.core_threads.load(Ordering::Acquire),
            max_thread_count: self.max_threads.load(Ordering::Acquire),
            keep_alive_time: Duration::from_millis(self.keep_alive_ms.load(Ordering::Acquire)),
            monitor_interval: self.monitor_interval(),
            enable_dynamic_scaling: self.dynamic_scaling,
        }
    }

    /// Wakes the monitor out of its interval sleep. The monitor lock is
    /// held across the broadcast so the wakeup cannot race the
    /// monitor's own terminating check.
    pub(crate) fn wake_monitor(&self) {
        let _guard = self.monitor_lock.lock();
        self.monitor_cv.notify_all();
    }

    /// PAUSED -> RUNNING transition. Caller holds the status lock and
    /// passes its guard target.
    pub(crate) fn resume_locked(&self, status: &mut PoolStatus) {
        if *status == PoolStatus::Paused {
            *status = PoolStatus::Running;
            info!("thread pool status: PAUSED -> RUNNING");

            for worker in self.workers.lock().iter() {
                worker.resume();
            }

            // Tasks may have queued up while paused.
            self.queue.notify_workers();
        }
    }

    /// Appends `count` workers. Caller holds the status lock; `status`
    /// is the state observed under it.
    pub(crate) fn increase_workers(
        self: &Arc<Self>,
        status: PoolStatus,
        count: usize,
    ) -> Result<(), PoolError> {
        if status != PoolStatus::Running && status != PoolStatus::Paused {
            error!("cannot add workers while the pool is {}", status);
            return Err(PoolError::IllegalState { status });
        }

        let mut workers = self.workers.lock();
        for _ in 0..count {
            let worker = Worker::spawn(Arc::clone(self));
            if status == PoolStatus::Paused {
                worker.pause();
            }
            workers.push(worker);
        }
        info!("thread pool grew by {} workers", count);
        Ok(())
    }

    /// Signals the last `min(count, len)` workers to terminate and moves
    /// them to the zombie list without waiting for their threads. Caller
    /// holds the status lock.
    pub(crate) fn decrease_workers(&self, status: PoolStatus, count: usize) -> Result<(), PoolError> {
        if status != PoolStatus::Running && status != PoolStatus::Paused {
            error!("cannot remove workers while the pool is {}", status);
            return Err(PoolError::IllegalState { status });
        }

        let mut workers = self.workers.lock();
        let mut zombies = self.zombies.lock();

        let remove = count.min(workers.len());
        if remove > 0 {
            let new_len = workers.len() - remove;
            let tail = workers.split_off(new_len);
            for worker in &tail {
                worker.terminate();
            }
            zombies.extend(tail);

            // Parked workers re-examine their state and exit.
            self.queue.notify_workers();
        }

        info!("thread pool shrank by {} workers", remove);
        Ok(())
    }
}
