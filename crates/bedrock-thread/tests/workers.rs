//! Worker lifecycle across real threads.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bedrock_thread::{ContextConfig, ThreadContext, Worker};

/// Route `tracing` output (worker lifecycle, default error handler) to the
/// test harness's captured output.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

#[test]
fn many_workers_stop_on_request() {
    let ticks = Arc::new(AtomicUsize::new(0));
    let mut workers: Vec<Worker> = (0..4)
        .map(|i| {
            let ticks = Arc::clone(&ticks);
            Worker::spawn(format!("ticker-{i}"), move |control| {
                while !control.should_stop() {
                    ticks.fetch_add(1, Ordering::Relaxed);
                    thread::sleep(Duration::from_millis(1));
                }
            })
            .unwrap()
        })
        .collect();

    while ticks.load(Ordering::Relaxed) < 4 {
        thread::yield_now();
    }
    for worker in &workers {
        worker.request_stop();
    }
    for worker in &mut workers {
        assert!(worker.wait_for_finish(Some(Duration::from_secs(10))));
        assert!(!worker.is_running());
    }
}

#[test]
fn non_polling_worker_outlasts_bounded_wait() {
    let (tx, rx) = crossbeam_channel::bounded::<()>(0);
    let mut worker = Worker::spawn("ignores-stop", move |_control| {
        let _ = rx.recv();
    })
    .unwrap();
    worker.request_stop();
    assert!(!worker.wait_for_finish(Some(Duration::from_millis(10))));
    drop(tx);
    assert!(worker.wait_for_finish(Some(Duration::from_secs(10))));
}

#[test]
fn context_worker_tears_down_on_exit() {
    init_tracing();
    let (tx, rx) = crossbeam_channel::bounded(1);
    let mut worker = Worker::spawn_with_context(
        "ctx-worker",
        ContextConfig::default(),
        move |control, ctx| {
            ctx.push_error("handled at teardown", file!(), line!());
            let _ = tx.send((ctx.id(), control.should_stop()));
        },
    )
    .unwrap();
    assert!(worker.wait_for_finish(Some(Duration::from_secs(10))));
    let (_, stopped) = rx.recv().unwrap();
    assert!(!stopped);
    // The main thread's registry is untouched.
    assert!(ThreadContext::current().is_none());
}
