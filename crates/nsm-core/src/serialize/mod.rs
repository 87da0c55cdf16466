//! Serialized task execution
//!
//! [`SerialExecutor`] runs submitted futures one at a time, strictly in
//! submission order, on a single worker task. Submitting never blocks the
//! caller.
//!
//! ```text
//! async_exec(a) ─┐
//! async_exec(b) ─┼──► [ a | b | c ] ──► worker: a, then b, then c
//! async_exec(c) ─┘
//! ```

use std::future::Future;
use std::pin::Pin;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, warn};

type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

struct Job {
    task: Task,
    done: oneshot::Sender<()>,
}

/// Completion handle for a unit submitted with [`SerialExecutor::async_exec`]
///
/// Dropping the handle does not cancel the unit.
#[derive(Debug)]
pub struct ExecHandle {
    done: oneshot::Receiver<()>,
}

impl ExecHandle {
    /// Wait for the unit to finish
    ///
    /// # Returns
    ///
    /// - `Ok(())`: The unit ran to completion
    /// - `Err(Error::ExecutorClosed)`: The unit was never run, or panicked
    pub async fn wait(self) -> crate::Result<()> {
        self.done.await.map_err(|_| crate::Error::ExecutorClosed)
    }
}

/// Single-worker, in-order task queue
///
/// # Lifecycle
///
/// The worker is spawned on the current tokio runtime by [`SerialExecutor::new`]
/// and exits once the executor is dropped and the queue has drained.
#[derive(Debug)]
pub struct SerialExecutor {
    tx: mpsc::UnboundedSender<Job>,
}

impl SerialExecutor {
    /// Create an executor and spawn its worker
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(Self::run(rx));
        Self { tx }
    }

    /// Enqueue a unit of work
    ///
    /// The unit runs after every previously submitted unit has finished, and
    /// never concurrently with another unit from this executor.
    pub fn async_exec<F>(&self, task: F) -> ExecHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let job = Job {
            task: Box::pin(task),
            done: done_tx,
        };
        if self.tx.send(job).is_err() {
            // The receiver half only goes away if the worker itself died.
            error!("Serial executor worker is gone, dropping task");
        }
        ExecHandle { done: done_rx }
    }

    async fn run(mut rx: mpsc::UnboundedReceiver<Job>) {
        while let Some(job) = rx.recv().await {
            // Each unit runs in its own task so a panic is contained; awaiting
            // it before taking the next job keeps execution serial.
            match tokio::spawn(job.task).await {
                Ok(()) => {
                    let _ = job.done.send(());
                }
                Err(e) if e.is_panic() => {
                    error!("Serialized task panicked: {}", e);
                }
                Err(e) => {
                    warn!("Serialized task did not complete: {}", e);
                }
            }
        }
    }
}

impl Default for SerialExecutor {
    fn default() -> Self {
        Self::new()
    }
}
