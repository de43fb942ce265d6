use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::RwLock;
use tracing::{debug, error};

use super::core::PoolCore;
use super::queue::Fetch;
use super::semaphore::BinarySemaphore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkerStatus {
    Running,
    Paused,
    Terminating,
    Terminated,
}

/// An owned OS thread consuming from the pool's task queue.
///
/// The worker carries its own lifecycle, independent of the pool's:
/// RUNNING -> (PAUSED <-> RUNNING)* -> TERMINATING -> TERMINATED.
/// Dropping a worker joins its thread.
pub(crate) struct Worker {
    shared: Arc<WorkerShared>,
    handle: Option<JoinHandle<()>>,
}

struct WorkerShared {
    // Readers-writer lock: the hot-path wake predicate reads, the rare
    // pause/resume/terminate calls write.
    status: RwLock<WorkerStatus>,
    pause_sem: BinarySemaphore,
    last_active_ms: AtomicU64,
}

impl Worker {
    /// Spawns the worker thread.
    ///
    /// A fresh worker is credited with a full keep-alive of idle time:
    /// one that never picks up a task is shrink-eligible on the next
    /// monitor tick.
    pub(crate) fn spawn(core: Arc<PoolCore>) -> Worker {
        let idle_credit = core
            .now_ms()
            .saturating_sub(core.keep_alive_ms.load(Ordering::Acquire));

        let shared = Arc::new(WorkerShared {
            status: RwLock::new(WorkerStatus::Running),
            pause_sem: BinarySemaphore::new(false),
            last_active_ms: AtomicU64::new(idle_credit),
        });

        let handle = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("flexpool-worker".into())
                .spawn(move || run(core, shared))
                .expect("failed to spawn worker thread")
        };

        Worker {
            shared,
            handle: Some(handle),
        }
    }

    /// RUNNING -> PAUSED. The worker discovers the change on its next
    /// self-check or through the queue broadcast the pool issues.
    pub(crate) fn pause(&self) {
        let mut status = self.shared.status.write();
        if *status == WorkerStatus::Running {
            *status = WorkerStatus::Paused;
        }
    }

    /// PAUSED -> RUNNING, releasing the pause permit.
    pub(crate) fn resume(&self) {
        let mut status = self.shared.status.write();
        if *status == WorkerStatus::Paused {
            *status = WorkerStatus::Running;
            self.shared.pause_sem.release();
        }
    }

    /// RUNNING|PAUSED -> TERMINATING. A paused worker is unparked so it
    /// can observe the change.
    pub(crate) fn terminate(&self) {
        let mut status = self.shared.status.write();
        match *status {
            WorkerStatus::Running => *status = WorkerStatus::Terminating,
            WorkerStatus::Paused => {
                *status = WorkerStatus::Terminating;
                self.shared.pause_sem.release();
            }
            _ => {}
        }
    }

    /// Last task-completion time, in pool-epoch milliseconds.
    pub(crate) fn last_active_ms(&self) -> u64 {
        self.shared.last_active_ms.load(Ordering::Acquire)
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("worker thread exited via panic");
            }
        }
    }
}

fn run(core: Arc<PoolCore>, shared: Arc<WorkerShared>) {
    debug!("worker started");

    loop {
        // Phase 1: self-check.
        {
            let mut status = shared.status.write();
            match *status {
                WorkerStatus::Terminating => {
                    *status = WorkerStatus::Terminated;
                    break;
                }
                WorkerStatus::Paused => {
                    drop(status);
                    shared.pause_sem.acquire();
                    continue;
                }
                _ => {}
            }
        }

        // Phase 2: fetch, classifying what woke us.
        let task = match core.queue.fetch(
            || *shared.status.read() == WorkerStatus::Running,
            &core.terminating,
        ) {
            Fetch::StatusChanged => continue,
            Fetch::Drained => {
                *shared.status.write() = WorkerStatus::Terminating;
                continue;
            }
            Fetch::Task(task) => task,
        };

        // Phase 3: execute with no locks held. The task shim catches
        // panics, so `run` cannot unwind into the loop.
        core.busy_workers.fetch_add(1, Ordering::AcqRel);
        task.run();
        core.busy_workers.fetch_sub(1, Ordering::AcqRel);
        shared
            .last_active_ms
            .store(core.now_ms(), Ordering::Release);
    }

    debug!("worker terminated");
}
