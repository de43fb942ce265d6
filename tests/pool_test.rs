//! Pool lifecycle, submission and queue management tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use flexpool::{logging, PoolConfig, PoolError, PoolStatus, TaskError, ThreadPool};

/// Base config with dynamic scaling off so worker counts stay exactly
/// where the test puts them.
fn static_config() -> PoolConfig {
    PoolConfig {
        enable_dynamic_scaling: false,
        ..PoolConfig::default()
    }
}

fn init() {
    logging::init_test();
}

// =================================================================
// 1. Basic functionality
// =================================================================

#[test]
fn constructor_and_destructor() {
    init();
    for _ in 0..5 {
        let pool = ThreadPool::new(PoolConfig {
            core_thread_count: 8,
            max_task_count: 100,
            ..static_config()
        });
        assert_eq!(pool.thread_count(), 8);
        assert_eq!(pool.status(), PoolStatus::Running);

        pool.shutdown();
        assert_eq!(pool.status(), PoolStatus::Terminated);
        assert_eq!(pool.thread_count(), 0);
    }
}

#[test]
fn submit_and_execute_task() {
    init();
    let pool = ThreadPool::new(static_config());
    let counter = Arc::new(AtomicUsize::new(0));

    let handle = {
        let counter = counter.clone();
        pool.submit(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            "test"
        })
        .unwrap()
    };

    assert_eq!(handle.wait().unwrap(), "test");
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(pool.thread_count(), 1);
}

#[test]
fn submit_multiple_tasks() {
    init();
    let pool = ThreadPool::new(PoolConfig {
        core_thread_count: 4,
        ..static_config()
    });
    let counter = Arc::new(AtomicUsize::new(0));
    let num_tasks = 100;

    let handles: Vec<_> = (0..num_tasks)
        .map(|_| {
            let counter = counter.clone();
            pool.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap()
        })
        .collect();

    for handle in handles {
        handle.wait().unwrap();
    }
    assert_eq!(counter.load(Ordering::SeqCst), num_tasks);
}

#[test]
fn submit_when_paused_holds_tasks() {
    init();
    let pool = ThreadPool::new(static_config());
    let counter = Arc::new(AtomicUsize::new(0));

    pool.pause();
    assert_eq!(pool.status(), PoolStatus::Paused);

    let _handle = {
        let counter = counter.clone();
        pool.submit(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap()
    };
    thread::sleep(Duration::from_millis(50));

    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[test]
fn submit_when_queue_full() {
    init();
    let pool = ThreadPool::new(PoolConfig {
        max_task_count: 2,
        ..static_config()
    });

    // Park the only worker so queued tasks cannot drain.
    let (release, blocked) = mpsc::channel::<()>();
    pool.submit(move || {
        let _ = blocked.recv();
    })
    .unwrap();

    // Give the worker time to take the blocker off the queue.
    thread::sleep(Duration::from_millis(100));

    pool.submit(|| {}).unwrap();
    pool.submit(|| {}).unwrap();

    let err = pool.submit(|| {}).unwrap_err();
    assert_eq!(err, PoolError::QueueFull { capacity: 2 });

    release.send(()).unwrap();
}

#[test]
fn submit_when_terminated() {
    init();
    let pool = ThreadPool::new(static_config());
    pool.shutdown();
    assert_eq!(pool.status(), PoolStatus::Terminated);

    let err = pool.submit(|| {}).unwrap_err();
    assert_eq!(
        err,
        PoolError::IllegalState {
            status: PoolStatus::Terminated
        }
    );
}

// =================================================================
// 2. State transitions
// =================================================================

#[test]
fn pause_and_resume() {
    init();
    let pool = ThreadPool::new(PoolConfig {
        core_thread_count: 2,
        ..static_config()
    });
    let counter = Arc::new(AtomicUsize::new(0));

    // Occupy one worker so the pool is mid-flight when paused.
    let _long_task = pool
        .submit(|| thread::sleep(Duration::from_millis(300)))
        .unwrap();

    pool.pause();
    assert_eq!(pool.status(), PoolStatus::Paused);

    let handle_after_pause = {
        let counter = counter.clone();
        pool.submit(move || counter.store(1, Ordering::SeqCst))
            .unwrap()
    };

    // Even with an idle worker available, nothing runs while paused.
    thread::sleep(Duration::from_millis(100));
    assert_eq!(counter.load(Ordering::SeqCst), 0);

    pool.resume();
    assert_eq!(pool.status(), PoolStatus::Running);

    handle_after_pause.wait().unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn shutdown_drains_tasks_submitted_while_paused() {
    init();
    let pool = ThreadPool::new(PoolConfig {
        core_thread_count: 2,
        ..static_config()
    });
    let counter = Arc::new(AtomicUsize::new(0));
    let num_tasks = 100;

    pool.pause();
    assert_eq!(pool.status(), PoolStatus::Paused);

    for _ in 0..num_tasks {
        let counter = counter.clone();
        pool.submit(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    }

    // Shutdown resumes first, then drains everything.
    pool.shutdown();
    assert_eq!(counter.load(Ordering::SeqCst), num_tasks);
    assert_eq!(pool.status(), PoolStatus::Terminated);
    assert_eq!(pool.thread_count(), 0);
}

// =================================================================
// 3. Dynamic fleet control
// =================================================================

#[test]
fn increase_thread_count() {
    init();
    let pool = ThreadPool::new(PoolConfig {
        core_thread_count: 2,
        ..static_config()
    });
    assert_eq!(pool.thread_count(), 2);

    // While RUNNING
    pool.increase_thread_count(2).unwrap();
    assert_eq!(pool.thread_count(), 4);

    // While PAUSED
    pool.pause();
    pool.increase_thread_count(2).unwrap();
    assert_eq!(pool.thread_count(), 6);

    // In a terminal state
    pool.shutdown();
    let err = pool.increase_thread_count(2).unwrap_err();
    assert_eq!(
        err,
        PoolError::IllegalState {
            status: PoolStatus::Terminated
        }
    );
}

#[test]
fn decrease_thread_count() {
    init();
    let pool = ThreadPool::new(PoolConfig {
        core_thread_count: 6,
        ..static_config()
    });
    assert_eq!(pool.thread_count(), 6);

    pool.decrease_thread_count(2).unwrap();
    assert_eq!(pool.thread_count(), 4);

    pool.pause();
    pool.decrease_thread_count(2).unwrap();
    assert_eq!(pool.thread_count(), 2);

    pool.shutdown();
    let err = pool.decrease_thread_count(2).unwrap_err();
    assert_eq!(
        err,
        PoolError::IllegalState {
            status: PoolStatus::Terminated
        }
    );
}

#[test]
fn decrease_thread_count_to_zero() {
    init();
    let pool = ThreadPool::new(PoolConfig {
        core_thread_count: 2,
        ..static_config()
    });
    pool.decrease_thread_count(2).unwrap();
    assert_eq!(pool.thread_count(), 0);

    // Removing from an empty fleet is a no-op, not an error.
    pool.decrease_thread_count(2).unwrap();
    assert_eq!(pool.thread_count(), 0);

    // Submissions still succeed, but nothing runs them yet.
    let executed = Arc::new(AtomicBool::new(false));
    let handle = {
        let executed = executed.clone();
        pool.submit(move || executed.store(true, Ordering::SeqCst))
            .unwrap()
    };

    thread::sleep(Duration::from_millis(100));
    assert!(!executed.load(Ordering::SeqCst));

    pool.increase_thread_count(1).unwrap();
    handle.wait().unwrap();
    assert!(executed.load(Ordering::SeqCst));
}

// =================================================================
// 4. Concurrency
// =================================================================

#[test]
fn concurrent_submit() {
    init();
    let pool = Arc::new(ThreadPool::new(PoolConfig {
        core_thread_count: 8,
        ..static_config()
    }));
    let counter = Arc::new(AtomicUsize::new(0));
    let num_threads = 4;
    let tasks_per_thread = 250;

    let submitters: Vec<_> = (0..num_threads)
        .map(|_| {
            let pool = pool.clone();
            let counter = counter.clone();
            thread::spawn(move || {
                for _ in 0..tasks_per_thread {
                    let counter = counter.clone();
                    pool.submit(move || {
                        counter.fetch_add(1, Ordering::SeqCst);
                    })
                    .unwrap();
                }
            })
        })
        .collect();

    for submitter in submitters {
        submitter.join().unwrap();
    }

    // Graceful shutdown guarantees every accepted task ran.
    pool.shutdown();
    assert_eq!(counter.load(Ordering::SeqCst), num_threads * tasks_per_thread);
}

// =================================================================
// 5. Task queue management
// =================================================================

#[test]
fn max_task_count_is_live() {
    init();
    let pool = ThreadPool::new(PoolConfig {
        max_task_count: 6,
        ..static_config()
    });

    let (release, blocked) = mpsc::channel::<()>();
    pool.submit(move || {
        let _ = blocked.recv();
    })
    .unwrap();
    thread::sleep(Duration::from_millis(50));

    for _ in 0..6 {
        pool.submit(|| {}).unwrap();
    }
    assert_eq!(
        pool.submit(|| {}).unwrap_err(),
        PoolError::QueueFull { capacity: 6 }
    );

    // Raising the cap admits again immediately.
    pool.set_max_task_count(10);
    for _ in 0..4 {
        pool.submit(|| {}).unwrap();
    }

    release.send(()).unwrap();
}

// =================================================================
// 6. Edge cases
// =================================================================

#[test]
fn repeated_pause_and_resume_calls() {
    init();
    let pool = ThreadPool::new(static_config());

    pool.pause();
    assert_eq!(pool.status(), PoolStatus::Paused);
    for _ in 0..10 {
        pool.pause();
    }

    let done = Arc::new(AtomicBool::new(false));
    let handle = {
        let done = done.clone();
        pool.submit(move || done.store(true, Ordering::SeqCst))
            .unwrap()
    };
    thread::sleep(Duration::from_millis(50));
    assert!(!done.load(Ordering::SeqCst));

    pool.resume();
    assert_eq!(pool.status(), PoolStatus::Running);
    for _ in 0..10 {
        pool.resume();
    }

    handle.wait().unwrap();
    assert!(done.load(Ordering::SeqCst));
}

#[test]
fn shutdown_is_idempotent() {
    init();
    let pool = ThreadPool::new(static_config());
    let counter = Arc::new(AtomicUsize::new(0));

    pool.pause();
    for _ in 0..100 {
        let counter = counter.clone();
        pool.submit(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    }

    pool.shutdown();
    assert_eq!(pool.status(), PoolStatus::Terminated);
    assert_eq!(counter.load(Ordering::SeqCst), 100);

    for _ in 0..10 {
        pool.shutdown();
    }
    assert_eq!(pool.status(), PoolStatus::Terminated);
}

#[test]
fn submit_covers_captures_and_results() {
    init();
    let pool = ThreadPool::new(PoolConfig {
        core_thread_count: 4,
        ..static_config()
    });

    // Capture by value
    let x = 3;
    let handle = pool.submit(move || x + 7).unwrap();
    assert_eq!(handle.wait().unwrap(), 10);

    // Owned data moved into the task
    let prefix = String::from("Result:");
    let handle = pool.submit(move || format!("{}{}", prefix, 100)).unwrap();
    assert_eq!(handle.wait().unwrap(), "Result:100");

    // Float math
    let handle = pool.submit(|| 3.5f64 * 2.0).unwrap();
    assert!((handle.wait().unwrap() - 7.0).abs() < f64::EPSILON);

    // Unit-returning task
    let count = Arc::new(AtomicUsize::new(0));
    let handle = {
        let count = count.clone();
        pool.submit(move || {
            count.fetch_add(10, Ordering::SeqCst);
        })
        .unwrap()
    };
    handle.wait().unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 10);

    // Shared state mutated by the task, observed after completion
    let data = Arc::new(parking_lot::Mutex::new(String::from("original")));
    let handle = {
        let data = data.clone();
        pool.submit(move || {
            data.lock().push_str(" modified");
        })
        .unwrap()
    };
    handle.wait().unwrap();
    assert_eq!(&*data.lock(), "original modified");

    // A panicking task surfaces through the handle, not the pool
    let handle = pool.submit(|| -> () { panic!("test") }).unwrap();
    match handle.wait() {
        Err(TaskError::Panicked(msg)) => assert!(msg.contains("test")),
        other => panic!("unexpected outcome: {:?}", other),
    }

    // The pool survived the panic.
    let handle = pool.submit(|| 1).unwrap();
    assert_eq!(handle.wait().unwrap(), 1);
}
