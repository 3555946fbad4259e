//! Execution bridge: adapts blocking remote calls to futures.
//!
//! The remote API is strictly synchronous, one blocking call per network
//! round trip. [`ExecutionBridge`] owns a bounded pool of worker threads and
//! turns each blocking call into a unit of concurrent work behind a
//! [`TaskHandle`] future, so callers never block their own thread of control
//! on a single round trip.
//!
//! Admission is FIFO with no priorities: a submitted task runs exactly once,
//! on exactly one worker, as soon as a worker frees up. A panicking task
//! rejects only its own handle; the worker survives.

use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::task::{Context, Poll};
use std::thread;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::config::{BridgeConfig, MIN_WORKERS};
use crate::error::{ApiError, ApiResult};

struct Job {
    cancelled: Arc<AtomicBool>,
    run: Box<dyn FnOnce() + Send + 'static>,
}

/// Bounded worker pool executing blocking operations off the async runtime.
///
/// Dropping the bridge without calling [`shutdown`](Self::shutdown) lets the
/// workers finish the queued work in the background and exit on their own;
/// `shutdown` additionally bounds the wait and rejects queued-but-unstarted
/// tasks.
pub struct ExecutionBridge {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
    draining: Arc<AtomicBool>,
    drain_timeout: Duration,
}

impl ExecutionBridge {
    /// Spins up the worker pool described by `config`.
    ///
    /// The pool size is clamped to the unconfigurable minimum of one worker.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Internal`] if the operating system refuses to
    /// spawn a worker thread.
    pub fn new(config: BridgeConfig) -> ApiResult<Self> {
        let workers = config.workers.max(MIN_WORKERS);
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));
        let draining = Arc::new(AtomicBool::new(false));

        let handles = (0..workers)
            .map(|i| {
                let receiver = Arc::clone(&receiver);
                let draining = Arc::clone(&draining);
                thread::Builder::new()
                    .name(format!("tether-worker-{i}"))
                    .spawn(move || worker_loop(receiver, draining))
                    .map_err(|e| {
                        ApiError::Internal(format!("failed to spawn bridge worker: {e}"))
                    })
            })
            .collect::<ApiResult<Vec<_>>>()?;

        tracing::debug!(workers, "execution bridge started");

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(handles),
            draining,
            drain_timeout: config.drain_timeout(),
        })
    }

    /// Submits a blocking operation for execution on the pool.
    ///
    /// Returns immediately with a [`TaskHandle`] that resolves with the
    /// operation's result. Cancelling the handle before a worker picks the
    /// task up prevents the call from starting; once started, the call runs
    /// to completion (remote side effects are not rolled back).
    pub fn run<T, F>(&self, op: F) -> TaskHandle<T>
    where
        F: FnOnce() -> ApiResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let cancelled = Arc::new(AtomicBool::new(false));

        let job = Job {
            cancelled: Arc::clone(&cancelled),
            run: Box::new(move || {
                let result = catch_unwind(AssertUnwindSafe(op)).unwrap_or_else(|panic| {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| (*s).to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "task panicked".to_string());
                    tracing::error!(%message, "bridge task panicked");
                    Err(ApiError::Internal(format!("task panicked: {message}")))
                });
                // The caller may have dropped the handle; that is not an error.
                let _ = tx.send(result);
            }),
        };

        let guard = self
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match guard.as_ref() {
            // Send can only fail if every worker already exited, which the
            // drain flag also covers: dropping the job rejects the handle.
            Some(sender) => {
                let _ = sender.send(job);
            }
            None => drop(job),
        }

        TaskHandle { rx, cancelled }
    }

    /// Tears the pool down.
    ///
    /// Stops admitting new tasks, waits up to the configured drain timeout
    /// for in-flight tasks to finish, and rejects queued-but-unstarted tasks
    /// with [`ApiError::Shutdown`]. Workers still busy after the timeout are
    /// detached.
    pub async fn shutdown(&self) {
        self.draining.store(true, Ordering::SeqCst);
        {
            let mut guard = self
                .sender
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.take();
        }

        let handles: Vec<_> = {
            let mut guard = self
                .workers
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.drain(..).collect()
        };
        if handles.is_empty() {
            return;
        }

        let join_all = tokio::task::spawn_blocking(move || {
            for handle in handles {
                let _ = handle.join();
            }
        });

        match tokio::time::timeout(self.drain_timeout, join_all).await {
            Ok(_) => tracing::debug!("execution bridge drained"),
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.drain_timeout.as_secs(),
                    "bridge shutdown timed out; detaching busy workers"
                );
            }
        }
    }
}

fn worker_loop(receiver: Arc<Mutex<mpsc::Receiver<Job>>>, draining: Arc<AtomicBool>) {
    loop {
        // Holding the lock across recv serializes job pickup (FIFO); it is
        // released as soon as a job is handed to this worker.
        let job = {
            let guard = match receiver.lock() {
                Ok(guard) => guard,
                Err(_) => return,
            };
            guard.recv()
        };

        let Ok(job) = job else {
            // Queue closed and empty.
            return;
        };

        if draining.load(Ordering::SeqCst) || job.cancelled.load(Ordering::SeqCst) {
            // Dropping the job without running it rejects its handle.
            continue;
        }

        (job.run)();
    }
}

/// Handle to a result not yet available; resolved or rejected exactly once.
///
/// Implements [`Future`], so it can be awaited directly or combined with
/// other handles.
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<ApiResult<T>>,
    cancelled: Arc<AtomicBool>,
}

impl<T> TaskHandle<T> {
    /// Requests cancellation.
    ///
    /// Effective only while the task is still queued; a task already running
    /// on a worker completes normally (its result is then discarded by the
    /// rejected handle). Remote side effects of a started call are not
    /// rolled back.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Awaits the result with a deadline.
    ///
    /// On timeout the handle is rejected with [`ApiError::Timeout`] and the
    /// underlying task is cancelled best-effort. A timeout does not guarantee
    /// the remote side effect did not occur.
    pub async fn join_timeout(self, deadline: Duration) -> ApiResult<T> {
        let cancelled = Arc::clone(&self.cancelled);
        match tokio::time::timeout(deadline, self).await {
            Ok(result) => result,
            Err(_) => {
                cancelled.store(true, Ordering::SeqCst);
                Err(ApiError::Timeout(deadline))
            }
        }
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = ApiResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => {
                // The job was dropped without running: either this handle was
                // cancelled, or the pool shut down underneath it.
                if this.cancelled.load(Ordering::SeqCst) {
                    Poll::Ready(Err(ApiError::Cancelled))
                } else {
                    Poll::Ready(Err(ApiError::Shutdown))
                }
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
