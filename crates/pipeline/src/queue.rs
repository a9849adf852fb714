//! Bounded in-process job queue with a single background consumer.
//!
//! [`JobQueue::submit`] never blocks: it either enqueues the payload and
//! returns its [`JobId`] or fails with [`QueueError::Full`]. Once
//! [`JobQueue::start`] has been called, one Tokio task drains the queue in
//! FIFO order and hands each job to a [`JobHandler`], strictly one at a
//! time.
//!
//! [`JobQueue::stop`] lets the consumer finish the job it is running and
//! then exit; jobs still queued at that point are abandoned and counted in
//! the logs. A panic inside the handler is caught and logged so the loop
//! keeps going.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use lightning_core::job::{Job, JobId};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Default queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("Job queue is full (capacity {capacity})")]
    Full { capacity: usize },

    #[error("Job queue is stopped")]
    Closed,

    #[error("Job queue consumer is already running")]
    AlreadyStarted,
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// Processes dequeued jobs. Owned exclusively by the consumer task, so
/// implementations can keep mutable state across jobs without locking.
#[async_trait]
pub trait JobHandler<T: Send + 'static>: Send + 'static {
    async fn handle(&mut self, job: Job<T>);
}

// ---------------------------------------------------------------------------
// JobQueue
// ---------------------------------------------------------------------------

pub struct JobQueue<T> {
    tx: mpsc::Sender<Job<T>>,
    /// Taken by the consumer on `start`.
    rx: Mutex<Option<mpsc::Receiver<Job<T>>>>,
    capacity: usize,
    cancel: CancellationToken,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> JobQueue<T> {
    /// Create a queue holding at most `capacity` unstarted jobs (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
            capacity,
            cancel: CancellationToken::new(),
            consumer: Mutex::new(None),
        }
    }

    /// Enqueue `payload` without blocking.
    pub fn submit(&self, payload: T) -> Result<JobId, QueueError> {
        if self.cancel.is_cancelled() {
            return Err(QueueError::Closed);
        }

        let job = Job::new(payload);
        let id = job.id.clone();
        match self.tx.try_send(job) {
            Ok(()) => {
                tracing::debug!(job_id = %id, depth = self.len(), "Job queued");
                Ok(id)
            }
            Err(TrySendError::Full(_)) => {
                tracing::warn!(capacity = self.capacity, "Job rejected, queue full");
                Err(QueueError::Full {
                    capacity: self.capacity,
                })
            }
            Err(TrySendError::Closed(_)) => Err(QueueError::Closed),
        }
    }

    /// Spawn the consumer task. May be called once.
    pub fn start<H: JobHandler<T>>(&self, handler: H) -> Result<(), QueueError> {
        let rx = lock(&self.rx).take().ok_or(QueueError::AlreadyStarted)?;
        let handle = tokio::spawn(run_consumer(rx, handler, self.cancel.clone()));
        *lock(&self.consumer) = Some(handle);
        Ok(())
    }

    /// Ask the consumer to exit after its current job. Later submissions
    /// fail with [`QueueError::Closed`].
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// [`stop`](Self::stop), then wait up to `timeout` for the consumer to
    /// exit. Returns `false` if it was still busy when the timeout hit.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.stop();
        let Some(handle) = lock(&self.consumer).take() else {
            return true;
        };
        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Job consumer task failed");
                true
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "Job consumer still busy at shutdown"
                );
                false
            }
        }
    }

    /// Number of jobs waiting to be picked up.
    pub fn len(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

async fn run_consumer<T, H>(
    mut rx: mpsc::Receiver<Job<T>>,
    mut handler: H,
    cancel: CancellationToken,
) where
    T: Send + 'static,
    H: JobHandler<T>,
{
    tracing::info!("Job consumer started");

    loop {
        let job = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            job = rx.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        let job_id = job.id.clone();
        tracing::debug!(job_id = %job_id, "Job dequeued");
        if let Err(panic) = AssertUnwindSafe(handler.handle(job)).catch_unwind().await {
            tracing::error!(
                job_id = %job_id,
                panic = panic_message(panic.as_ref()),
                "Job handler panicked"
            );
        }
    }

    rx.close();
    let mut abandoned = 0usize;
    while rx.try_recv().is_ok() {
        abandoned += 1;
    }
    if abandoned > 0 {
        tracing::warn!(abandoned, "Queued jobs abandoned on shutdown");
    }
    tracing::info!("Job consumer stopped");
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
