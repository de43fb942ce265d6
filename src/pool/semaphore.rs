use parking_lot::{Condvar, Mutex};

/// A single-permit parking primitive.
///
/// Workers transitioning into the paused state park on it; `resume` and
/// `terminate` unpark them by releasing the permit.
pub(crate) struct BinarySemaphore {
    permit: Mutex<bool>,
    cv: Condvar,
}

impl BinarySemaphore {
    pub(crate) fn new(initially_available: bool) -> Self {
        Self {
            permit: Mutex::new(initially_available),
            cv: Condvar::new(),
        }
    }

    /// Blocks until a permit is available, then consumes it.
    pub(crate) fn acquire(&self) {
        let mut available = self.permit.lock();
        while !*available {
            self.cv.wait(&mut available);
        }
        *available = false;
    }

    /// Installs a permit and wakes one waiter. Idempotent: releasing an
    /// already-available permit is a no-op.
    pub(crate) fn release(&self) {
        let mut available = self.permit.lock();
        if !*available {
            *available = true;
            self.cv.notify_one();
        }
    }
}
