//! Batch fan-out over the execution bridge.
//!
//! A batch submits one bridge task per input item, so concurrency is bounded
//! by the worker pool size, not the batch size. Results are reassembled in
//! input order regardless of completion order, and each batch carries a
//! correlation id in its log span.

use std::sync::Arc;

use tracing::Instrument;
use uuid::Uuid;

use crate::bridge::ExecutionBridge;
use crate::error::{ApiError, ApiResult};

/// How a batch reacts to a failing item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPolicy {
    /// Stop at the first (lowest input index) failure; cancel tasks that have
    /// not started and discard in-flight results.
    FailFast,
    /// Run everything; report one outcome per item.
    CollectAll,
}

/// Per-item result of a [`BatchPolicy::CollectAll`] batch.
#[derive(Debug)]
pub enum ItemOutcome<T> {
    Success(T),
    Failure(ApiError),
}

impl<T> ItemOutcome<T> {
    /// Whether the item succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// The success value, if any.
    pub fn success(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            Self::Failure(_) => None,
        }
    }

    /// The failure, if any.
    pub fn failure(&self) -> Option<&ApiError> {
        match self {
            Self::Success(_) => None,
            Self::Failure(err) => Some(err),
        }
    }
}

/// Runs the same operation over many inputs concurrently.
pub struct BatchCoordinator {
    bridge: Arc<ExecutionBridge>,
}

impl BatchCoordinator {
    pub fn new(bridge: Arc<ExecutionBridge>) -> Self {
        Self { bridge }
    }

    /// Applies `op` to every item and reassembles outcomes in input order.
    ///
    /// Under [`BatchPolicy::FailFast`] the returned error is
    /// [`ApiError::Batch`] carrying the input index of the lowest-index
    /// failure. Under [`BatchPolicy::CollectAll`] per-item failures live in
    /// the outcome vector and only coordinator-level breakage (the bridge
    /// shutting down mid-batch) returns `Err`. No retries happen here.
    pub async fn run<I, T, F>(
        &self,
        items: Vec<I>,
        op: F,
        policy: BatchPolicy,
    ) -> ApiResult<Vec<ItemOutcome<T>>>
    where
        I: Send + 'static,
        T: Send + 'static,
        F: Fn(I) -> ApiResult<T> + Send + Sync + 'static,
    {
        let correlation = Uuid::new_v4();
        let span = tracing::info_span!("batch", %correlation, items = items.len(), ?policy);

        async move {
            let op = Arc::new(op);
            let handles: Vec<_> = items
                .into_iter()
                .map(|item| {
                    let op = Arc::clone(&op);
                    self.bridge.run(move || op(item))
                })
                .collect();

            match policy {
                BatchPolicy::CollectAll => {
                    let mut outcomes = Vec::with_capacity(handles.len());
                    for handle in handles {
                        match handle.await {
                            Ok(value) => outcomes.push(ItemOutcome::Success(value)),
                            Err(ApiError::Shutdown) => {
                                tracing::warn!("bridge shut down mid-batch");
                                return Err(ApiError::Shutdown);
                            }
                            Err(err) => outcomes.push(ItemOutcome::Failure(err)),
                        }
                    }
                    Ok(outcomes)
                }
                BatchPolicy::FailFast => {
                    let mut outcomes = Vec::with_capacity(handles.len());
                    let mut pending = handles.into_iter().enumerate();
                    while let Some((index, handle)) = pending.next() {
                        match handle.await {
                            Ok(value) => outcomes.push(ItemOutcome::Success(value)),
                            Err(source) => {
                                tracing::warn!(index, error = %source, "batch failing fast");
                                for (_, remaining) in pending {
                                    remaining.cancel();
                                }
                                return Err(ApiError::Batch {
                                    index,
                                    source: Box::new(source),
                                });
                            }
                        }
                    }
                    Ok(outcomes)
                }
            }
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    fn coordinator(workers: usize) -> BatchCoordinator {
        let bridge = Arc::new(
            ExecutionBridge::new(BridgeConfig {
                workers,
                drain_timeout_secs: 5,
            })
            .unwrap(),
        );
        BatchCoordinator::new(bridge)
    }

    #[tokio::test]
    async fn collect_all_keeps_input_order_under_staggered_latency() {
        let coordinator = coordinator(4);
        let outcomes = coordinator
            .run(
                vec![30u64, 0, 10, 20],
                |delay| {
                    std::thread::sleep(Duration::from_millis(delay));
                    Ok(delay)
                },
                BatchPolicy::CollectAll,
            )
            .await
            .unwrap();

        let values: Vec<_> = outcomes.into_iter().map(|o| o.success().unwrap()).collect();
        assert_eq!(values, vec![30, 0, 10, 20]);
    }

    #[tokio::test]
    async fn collect_all_reports_one_outcome_per_item() {
        let coordinator = coordinator(2);
        let outcomes = coordinator
            .run(
                vec![1, 2, 3, 4],
                |n| {
                    if n % 2 == 0 {
                        Err(ApiError::from_remote(404, format!("item {n} missing")))
                    } else {
                        Ok(n * 10)
                    }
                },
                BatchPolicy::CollectAll,
            )
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 4);
        assert!(outcomes[0].is_success());
        assert!(matches!(
            outcomes[1].failure(),
            Some(ApiError::NotFound { .. })
        ));
        assert!(outcomes[2].is_success());
        assert!(outcomes[3].failure().is_some());
    }

    #[tokio::test]
    async fn fail_fast_reports_the_lowest_failing_index() {
        let coordinator = coordinator(4);
        let err = coordinator
            .run(
                vec![0, 1, 2, 3, 4],
                |n| {
                    if n >= 2 {
                        Err(ApiError::from_remote(500, "boom"))
                    } else {
                        Ok(n)
                    }
                },
                BatchPolicy::FailFast,
            )
            .await
            .unwrap_err();

        match err {
            ApiError::Batch { index, source } => {
                assert_eq!(index, 2);
                assert!(matches!(*source, ApiError::Remote { status: 500, .. }));
            }
            other => panic!("expected batch error, got {other}"),
        }
    }

    #[tokio::test]
    async fn fail_fast_cancels_unstarted_items() {
        // One worker: item 0 fails while the rest sit in the queue. The worker
        // may already hold the next item when the cancels land, so that one
        // item blocks on a gate until the batch has returned; everything still
        // queued must be cancelled rather than executed.
        let coordinator = coordinator(1);
        let executed = Arc::new(AtomicUsize::new(0));
        let (gate_tx, gate_rx) = std::sync::mpsc::channel::<()>();
        let gate_rx = Arc::new(Mutex::new(gate_rx));

        let counter = Arc::clone(&executed);
        let err = coordinator
            .run(
                vec![0usize, 1, 2, 3],
                move |n| {
                    if n == 0 {
                        Err(ApiError::from_remote(500, "first item broke"))
                    } else {
                        gate_rx.lock().unwrap().recv().ok();
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(n)
                    }
                },
                BatchPolicy::FailFast,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Batch { index: 0, .. }));
        // All cancels are done; release whichever item the worker grabbed.
        drop(gate_tx);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(executed.load(Ordering::SeqCst) <= 1);
    }

    #[tokio::test]
    async fn empty_batch_is_a_noop() {
        let coordinator = coordinator(2);
        let outcomes = coordinator
            .run(Vec::<u32>::new(), |n| Ok(n), BatchPolicy::FailFast)
            .await
            .unwrap();
        assert!(outcomes.is_empty());
    }
}
