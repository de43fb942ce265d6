use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use tracing::warn;

use crate::error::TaskError;

/// The uniform, type-erased form a submitted closure takes inside the
/// task queue: a nullary job that delivers its outcome through a
/// one-shot channel instead of a return value.
pub(crate) struct Task {
    job: Box<dyn FnOnce() + Send + 'static>,
}

impl Task {
    /// Packages a typed closure with a one-shot result channel.
    ///
    /// The job runs under `catch_unwind`: a panicking task delivers its
    /// payload through the handle and emits a warn event, it never
    /// unwinds into the worker.
    pub(crate) fn package<F, R>(f: F) -> (Task, TaskHandle<R>)
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = flume::bounded(1);
        let job = Box::new(move || {
            let result = match panic::catch_unwind(AssertUnwindSafe(f)) {
                Ok(value) => Ok(value),
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    warn!("task panicked: {}", message);
                    Err(TaskError::Panicked(message))
                }
            };
            // The submitter may have dropped its handle; delivery is
            // best effort.
            let _ = tx.send(result);
        });

        (Task { job }, TaskHandle { rx })
    }

    /// Executes the job, consuming the task.
    pub(crate) fn run(self) {
        (self.job)();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// One-shot handle to a submitted task's outcome.
///
/// Delivers either the task's return value or the error that ended it.
/// Dropping the handle does not cancel the task.
pub struct TaskHandle<R> {
    rx: flume::Receiver<Result<R, TaskError>>,
}

impl<R> std::fmt::Debug for TaskHandle<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("ready", &!self.rx.is_empty())
            .finish()
    }
}

impl<R> TaskHandle<R> {
    /// Blocks until the task has run and returns its outcome.
    ///
    /// Returns `TaskError::Cancelled` if the pool dropped the task
    /// before executing it.
    pub fn wait(self) -> Result<R, TaskError> {
        self.rx.recv().unwrap_or(Err(TaskError::Cancelled))
    }

    /// Returns the outcome if the task has already finished.
    pub fn try_wait(&self) -> Option<Result<R, TaskError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(flume::TryRecvError::Empty) => None,
            Err(flume::TryRecvError::Disconnected) => Some(Err(TaskError::Cancelled)),
        }
    }

    /// Blocks up to `timeout` for the outcome; `None` on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<R, TaskError>> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(flume::RecvTimeoutError::Timeout) => None,
            Err(flume::RecvTimeoutError::Disconnected) => Some(Err(TaskError::Cancelled)),
        }
    }
}
