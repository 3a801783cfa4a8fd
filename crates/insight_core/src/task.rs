//! Bounded worker pool and cooperative cancellation.
//!
//! Background operations (indexing, per-file analysis, fix application,
//! relevance crawls) run on a fixed set of worker threads and check a shared
//! cancellation token at fine granularity. Blocking network calls and
//! throttle sleeps happen on these workers, never on an interactive thread.

use crate::error::{InsightError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::warn;

/// Cooperative cancellation flag shared across one operation.
///
/// Cloning shares the flag; cancelling any clone cancels them all.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates an unfired token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the token; idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// True when the token has fired.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Returns `Err(Cancelled)` when the token has fired.
    ///
    /// Long operations call this per element, per file, and per retry
    /// attempt so no checkpoint is ever further away than one unit of work.
    pub fn checkpoint(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(InsightError::Cancelled)
        } else {
            Ok(())
        }
    }
}

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-size pool of worker threads executing queued jobs in FIFO order.
pub struct WorkerPool {
    tx: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Creates a pool with `threads` workers (minimum 1).
    pub fn new(threads: usize) -> Self {
        let threads = threads.max(1);
        let (tx, rx) = mpsc::channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));

        let mut workers = Vec::with_capacity(threads);
        for i in 0..threads {
            let rx = Arc::clone(&rx);
            let builder = thread::Builder::new().name(format!("insight-worker-{}", i));
            match builder.spawn(move || worker_loop(rx)) {
                Ok(handle) => workers.push(handle),
                Err(e) => warn!(error = %e, "failed to spawn worker thread"),
            }
        }

        Self {
            tx: Some(tx),
            workers,
        }
    }

    /// Queues a job for execution on the next free worker.
    pub fn execute<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| InsightError::PoolUnavailable("pool is shut down".to_string()))?;
        tx.send(Box::new(job))
            .map_err(|_| InsightError::PoolUnavailable("all workers exited".to_string()))
    }

    /// Number of worker threads.
    pub fn threads(&self) -> usize {
        self.workers.len()
    }
}

fn worker_loop(rx: Arc<Mutex<Receiver<Job>>>) {
    loop {
        let job = {
            let guard = rx.lock().unwrap_or_else(|e| e.into_inner());
            guard.recv()
        };
        match job {
            Ok(job) => job(),
            // Sender dropped: pool is shutting down.
            Err(_) => break,
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the channel lets workers drain pending jobs and exit.
        drop(self.tx.take());
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

/// Handle to a background task producing a value of type `T`.
///
/// The task sends its result exactly once on completion; the handle's token
/// can cancel it cooperatively at any point.
pub struct TaskHandle<T> {
    rx: Receiver<T>,
    token: CancelToken,
}

impl<T> TaskHandle<T> {
    /// The task's cancellation token.
    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    /// Fires the task's cancellation token.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Blocks until the task completes and returns its result.
    pub fn wait(self) -> Result<T> {
        self.rx.recv().map_err(|_| {
            InsightError::PoolUnavailable("task dropped without completing".to_string())
        })
    }

    /// Blocks up to `timeout` for the result.
    ///
    /// Returns `Ok(None)` when the deadline passes first; the task keeps
    /// running until cancelled, so the caller decides what a timeout means.
    pub fn wait_for(&self, timeout: Duration) -> Result<Option<T>> {
        match self.rx.recv_timeout(timeout) {
            Ok(value) => Ok(Some(value)),
            Err(mpsc::RecvTimeoutError::Timeout) => Ok(None),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(InsightError::PoolUnavailable(
                "task dropped without completing".to_string(),
            )),
        }
    }
}

/// Runs `f` on the pool, handing it a clone of `token`, and returns a handle
/// to the eventual result.
pub fn spawn_task<T, F>(pool: &WorkerPool, token: CancelToken, f: F) -> Result<TaskHandle<T>>
where
    T: Send + 'static,
    F: FnOnce(CancelToken) -> T + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let job_token = token.clone();
    pool.execute(move || {
        let result = f(job_token);
        // Receiver may be gone when the caller stopped waiting; fine.
        let _ = tx.send(result);
    })?;
    Ok(TaskHandle { rx, token })
}
