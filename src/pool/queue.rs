use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::{Condvar, Mutex};

use crate::error::PoolError;

use super::task::Task;

/// Outcome of a blocking fetch, classifying what woke the worker.
pub(crate) enum Fetch {
    /// A task was dequeued and must be executed.
    Task(Task),
    /// The worker's own status left RUNNING; it must re-run its
    /// self-check before touching the queue again.
    StatusChanged,
    /// The pool is terminating and the queue is empty; the worker can
    /// begin its own termination.
    Drained,
}

/// Bounded FIFO of type-erased tasks.
///
/// Two condition variables drive the pool: `not_empty` wakes workers on
/// admission and on state changes, `emptied` signals the shutdown path
/// once a pop leaves the queue empty.
pub(crate) struct TaskQueue {
    tasks: Mutex<VecDeque<Task>>,
    // 0 = unbounded. Read per admission, so capacity changes apply to
    // future submissions only.
    capacity: AtomicUsize,
    not_empty: Condvar,
    emptied: Condvar,
}

impl TaskQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            tasks: Mutex::new(VecDeque::new()),
            capacity: AtomicUsize::new(capacity),
            not_empty: Condvar::new(),
            emptied: Condvar::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Acquire)
    }

    pub(crate) fn set_capacity(&self, capacity: usize) {
        self.capacity.store(capacity, Ordering::Release);
    }

    /// Enqueues a task and wakes one waiting worker, or fails with
    /// `QueueFull` when the capacity limit is reached.
    pub(crate) fn try_push(&self, task: Task) -> Result<(), PoolError> {
        let capacity = self.capacity.load(Ordering::Acquire);
        {
            let mut tasks = self.tasks.lock();
            if capacity > 0 && tasks.len() >= capacity {
                return Err(PoolError::QueueFull { capacity });
            }
            tasks.push_back(task);
        }
        self.not_empty.notify_one();
        Ok(())
    }

    /// Blocks until the wake condition holds, then classifies the wake
    /// cause.
    ///
    /// The wake condition: the worker is no longer running, or a task is
    /// available, or the pool is terminating. `running` is evaluated
    /// while the queue lock is held, so it must only take the worker's
    /// own status lock (queue lock before worker status lock is the
    /// sanctioned order).
    pub(crate) fn fetch(
        &self,
        running: impl Fn() -> bool,
        terminating: &AtomicBool,
    ) -> Fetch {
        let mut tasks = self.tasks.lock();
        loop {
            if !running() {
                return Fetch::StatusChanged;
            }
            if terminating.load(Ordering::Acquire) && tasks.is_empty() {
                return Fetch::Drained;
            }
            if let Some(task) = tasks.pop_front() {
                if tasks.is_empty() {
                    self.emptied.notify_all();
                }
                return Fetch::Task(task);
            }
            self.not_empty.wait(&mut tasks);
        }
    }

    /// Blocks until the queue is empty (shutdown drain).
    pub(crate) fn wait_until_empty(&self) {
        let mut tasks = self.tasks.lock();
        while !tasks.is_empty() {
            self.emptied.wait(&mut tasks);
        }
    }

    /// Broadcasts to every waiting worker so each re-examines its state.
    ///
    /// Taken under the queue lock: a worker between its predicate check
    /// and parking still holds the lock, so the broadcast cannot slip
    /// into that window and get lost.
    pub(crate) fn notify_workers(&self) {
        let _tasks = self.tasks.lock();
        self.not_empty.notify_all();
    }
}
