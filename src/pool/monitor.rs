use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use super::core::PoolCore;
use super::PoolStatus;

/// Autoscaler loop, run on its own thread while dynamic scaling is
/// enabled. Exits when the pool's terminating flag is raised.
pub(crate) fn monitor_loop(core: Arc<PoolCore>) {
    loop {
        if core.terminating.load(Ordering::Acquire) {
            break;
        }

        // Interruptible sleep. The interval is re-read every cycle so a
        // live reconfig takes effect on the next tick.
        {
            let mut guard = core.monitor_lock.lock();
            let deadline = Instant::now() + core.monitor_interval();
            while !core.terminating.load(Ordering::Acquire) {
                if core.monitor_cv.wait_until(&mut guard, deadline).timed_out() {
                    break;
                }
            }
        }

        if core.terminating.load(Ordering::Acquire) {
            break;
        }

        debug!("monitor tick: adjusting worker count");
        adjust_thread_count(&core);
    }

    debug!("monitor terminated");
}

/// One scaling decision over a consistent snapshot, taken under the
/// pool status lock.
fn adjust_thread_count(core: &Arc<PoolCore>) {
    let status_guard = core.status.lock();
    let status = *status_guard;
    if status != PoolStatus::Running && status != PoolStatus::Paused {
        return;
    }

    let worker_count = core.workers.lock().len();
    let busy = core.busy_workers.load(Ordering::Acquire);
    let queue_size = core.queue.len();

    // Expansion: every worker busy and tasks backing up. One worker per
    // tick damps oscillation.
    if status == PoolStatus::Running
        && busy == worker_count
        && queue_size > 0
        && worker_count < core.max_threads.load(Ordering::Acquire)
    {
        if let Err(err) = core.increase_workers(status, 1) {
            warn!("monitor failed to expand the pool: {}", err);
        }
        return;
    }

    // Shrink: more than the core count alive and some of them idle past
    // the keep-alive deadline. Newest workers sit at the tail, so the
    // scan runs back-to-front over the non-core overhang.
    let core_threads = core.core_threads.load(Ordering::Acquire);
    if worker_count > core_threads && busy < worker_count {
        let now = core.now_ms();
        let keep_alive = core.keep_alive_ms.load(Ordering::Acquire);
        let overhang = worker_count - core_threads;

        let timed_out = {
            let workers = core.workers.lock();
            workers
                .iter()
                .rev()
                .take(overhang)
                .filter(|worker| now.saturating_sub(worker.last_active_ms()) >= keep_alive)
                .count()
        };

        if timed_out > 0 {
            if let Err(err) = core.decrease_workers(status, timed_out) {
                warn!("monitor failed to shrink the pool: {}", err);
            }
        }
    }
}
