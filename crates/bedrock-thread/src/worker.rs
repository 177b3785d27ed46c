//! Worker threads with cooperative stop and bounded waiting.
//!
//! A [`Worker`] owns one OS thread running a procedure that receives a
//! [`WorkerControl`]. Stopping is cooperative: [`Worker::request_stop`]
//! raises a flag the procedure polls with
//! [`WorkerControl::should_stop`]. Completion is observed through a
//! channel whose sender lives on the worker thread and is dropped when the
//! procedure returns or unwinds, so waiting never needs the thread to
//! cooperate beyond finishing.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bedrock_core::tracing_sink;
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};

use crate::config::ContextConfig;
use crate::context::ThreadContext;
use crate::error::ContextError;

/// Passed to a worker's procedure.
#[derive(Debug)]
pub struct WorkerControl {
    name: String,
    stop: Arc<AtomicBool>,
}

impl WorkerControl {
    /// Whether the owner has asked this worker to stop.
    pub fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// The worker's thread name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A running worker thread.
///
/// Dropping a worker requests a stop and joins the thread.
pub struct Worker {
    name: String,
    handle: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    done: Receiver<()>,
}

impl Worker {
    /// Start `proc` on a new thread called `name`.
    pub fn spawn<F>(name: impl Into<String>, proc: F) -> Result<Self, ContextError>
    where
        F: FnOnce(WorkerControl) + Send + 'static,
    {
        let name = name.into();
        let stop = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(0);
        let control = WorkerControl {
            name: name.clone(),
            stop: Arc::clone(&stop),
        };

        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                // Disconnects the completion channel on return or unwind.
                let _done = done_tx;
                tracing::debug!(worker = %control.name, "worker started");
                let worker = control.name.clone();
                proc(control);
                tracing::debug!(%worker, "worker finished");
            })
            .map_err(|e| ContextError::ThreadSpawnFailed {
                reason: format!("{name}: {e}"),
            })?;

        Ok(Self {
            name,
            handle: Some(handle),
            stop,
            done: done_rx,
        })
    }

    /// Start `proc` on a new thread that gets its own [`ThreadContext`].
    ///
    /// The context logs through `tracing` until the procedure installs
    /// another log function, and is torn down when the procedure returns.
    /// If the context cannot be created the procedure does not run and the
    /// failure is logged.
    pub fn spawn_with_context<F>(
        name: impl Into<String>,
        config: ContextConfig,
        proc: F,
    ) -> Result<Self, ContextError>
    where
        F: FnOnce(WorkerControl, &ThreadContext) + Send + 'static,
    {
        config.validate()?;
        Self::spawn(name, move |control| {
            match ThreadContext::init_default_with_config(tracing_sink(), &config) {
                Ok(ctx) => {
                    proc(control, &ctx);
                    ctx.teardown();
                }
                Err(err) => {
                    tracing::error!(worker = %control.name(), %err, "worker context init failed");
                }
            }
        })
    }

    /// The worker's thread name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask the worker to stop. It finishes at its next
    /// [`should_stop`](WorkerControl::should_stop) check.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Whether the procedure is still running.
    pub fn is_running(&self) -> bool {
        matches!(self.done.try_recv(), Err(TryRecvError::Empty))
    }

    /// Wait for the procedure to finish, at most `timeout` if given.
    ///
    /// Returns `true` once it has finished; the thread is then joined.
    /// Returns `false` on timeout, leaving the worker running.
    pub fn wait_for_finish(&mut self, timeout: Option<Duration>) -> bool {
        let finished = match timeout {
            // Nothing is ever sent; `recv` returns once the sender is gone.
            None => self.done.recv().is_err(),
            Some(timeout) => !matches!(
                self.done.recv_timeout(timeout),
                Err(RecvTimeoutError::Timeout)
            ),
        };
        if finished {
            self.join();
        }
        finished
    }

    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!(worker = %self.name, "worker panicked");
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.request_stop();
            self.join();
        }
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .field("stop_requested", &self.stop.load(Ordering::Relaxed))
            .finish()
    }
}

/// Start `proc` on a detached thread. Nobody can stop or join it.
pub fn dispatch<F>(name: impl Into<String>, proc: F) -> Result<(), ContextError>
where
    F: FnOnce(WorkerControl) + Send + 'static,
{
    let mut worker = Worker::spawn(name, proc)?;
    // Dropping the handle detaches the thread.
    drop(worker.handle.take());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn stop_request_is_observed() {
        let mut worker = Worker::spawn("poller", |control| {
            while !control.should_stop() {
                thread::sleep(Duration::from_millis(1));
            }
        })
        .unwrap();
        assert!(worker.is_running());
        worker.request_stop();
        assert!(worker.wait_for_finish(Some(Duration::from_secs(10))));
        assert!(!worker.is_running());
    }

    #[test]
    fn bounded_wait_times_out_on_busy_worker() {
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);
        let mut worker = Worker::spawn("stubborn", move |_control| {
            let _ = release_rx.recv();
        })
        .unwrap();
        let start = Instant::now();
        assert!(!worker.wait_for_finish(Some(Duration::from_millis(20))));
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert!(worker.is_running());
        drop(release_tx);
        assert!(worker.wait_for_finish(None));
    }

    #[test]
    fn worker_thread_carries_its_name() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let mut worker = Worker::spawn("named-worker", move |control| {
            let _ = tx.send((control.name().to_string(), thread::current().name().map(String::from)));
        })
        .unwrap();
        assert!(worker.wait_for_finish(None));
        let (control_name, thread_name) = rx.recv().unwrap();
        assert_eq!(control_name, "named-worker");
        assert_eq!(thread_name.as_deref(), Some("named-worker"));
        assert_eq!(worker.name(), "named-worker");
    }

    #[test]
    fn panicking_worker_counts_as_finished() {
        let mut worker = Worker::spawn("panics", |_| panic!("worker failure")).unwrap();
        assert!(worker.wait_for_finish(Some(Duration::from_secs(10))));
    }

    #[test]
    fn drop_stops_and_joins() {
        let stopped = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stopped);
        let worker = Worker::spawn("dropped", move |control| {
            while !control.should_stop() {
                thread::sleep(Duration::from_millis(1));
            }
            flag.store(true, Ordering::SeqCst);
        })
        .unwrap();
        drop(worker);
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[test]
    fn worker_gets_its_own_context() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let mut worker = Worker::spawn_with_context(
            "with-context",
            ContextConfig::default(),
            move |_control, ctx| {
                let same = ThreadContext::current().map(|c| c.id()) == Some(ctx.id());
                let pos = ctx.with_scratch(None, |s| {
                    s.push(64, 8).map(|_| s.pos()).unwrap_or_default()
                });
                let _ = tx.send((same, pos));
            },
        )
        .unwrap();
        assert!(worker.wait_for_finish(Some(Duration::from_secs(10))));
        assert_eq!(rx.recv().unwrap(), (true, 64));
    }

    #[test]
    fn invalid_context_config_fails_before_spawning() {
        let config = ContextConfig {
            scratch_reserve: 0,
            ..ContextConfig::default()
        };
        let err = Worker::spawn_with_context("never", config, |_, _| {}).unwrap_err();
        assert!(matches!(err, ContextError::InvalidConfig { .. }));
    }

    #[test]
    fn dispatched_worker_runs_detached() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        dispatch("detached", move |control| {
            let _ = tx.send(control.should_stop());
        })
        .unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(10)), Ok(false));
    }
}
