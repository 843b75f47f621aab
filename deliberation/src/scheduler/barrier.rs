//! All-or-nothing round barrier.
//!
//! Fans tasks out on a `JoinSet` and collects them in completion order. The
//! first failure (error, panic or cancellation) aborts every sibling and waits
//! for them to wind down before it is returned, so no aborted task can emit
//! anything after the caller reports the failure.

use std::future::Future;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::{DeliberationError, DeliberationResult};

pub struct RoundBarrier<T> {
    tasks: JoinSet<DeliberationResult<T>>,
}

impl<T: Send + 'static> Default for RoundBarrier<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> RoundBarrier<T> {
    pub fn new() -> Self {
        Self {
            tasks: JoinSet::new(),
        }
    }

    pub fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = DeliberationResult<T>> + Send + 'static,
    {
        self.tasks.spawn(task);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every task. Results are in completion order.
    pub async fn wait_all(mut self, cancel: &CancellationToken) -> DeliberationResult<Vec<T>> {
        let mut results = Vec::with_capacity(self.tasks.len());
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(in_flight = self.tasks.len(), "Barrier cancelled");
                    self.tasks.shutdown().await;
                    return Err(DeliberationError::Cancelled);
                }
                next = self.tasks.join_next() => next,
            };

            match next {
                None => return Ok(results),
                Some(Ok(Ok(value))) => results.push(value),
                Some(Ok(Err(e))) => {
                    warn!(error = %e, in_flight = self.tasks.len(), "Task failed, aborting siblings");
                    self.tasks.shutdown().await;
                    return Err(e);
                }
                Some(Err(join_err)) => {
                    warn!(error = %join_err, "Task panicked, aborting siblings");
                    self.tasks.shutdown().await;
                    return Err(DeliberationError::Internal(anyhow::anyhow!(
                        "turn task panicked: {join_err}"
                    )));
                }
            }
        }
    }
}

/// Run `future` unless `cancel` fires first.
pub async fn cancellable<F, T>(cancel: &CancellationToken, future: F) -> DeliberationResult<T>
where
    F: Future<Output = DeliberationResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DeliberationError::Cancelled),
        result = future => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn collects_in_completion_order() {
        let mut barrier = RoundBarrier::new();
        for (value, delay) in [(1u32, 30u64), (2, 10), (3, 20)] {
            barrier.spawn(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                Ok(value)
            });
        }
        assert_eq!(barrier.len(), 3);
        let results = barrier.wait_all(&CancellationToken::new()).await.unwrap();
        assert_eq!(results, vec![2, 3, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn first_failure_aborts_siblings() {
        let finished = Arc::new(AtomicUsize::new(0));
        let mut barrier = RoundBarrier::new();
        for i in 0..3u64 {
            let finished = finished.clone();
            barrier.spawn(async move {
                if i == 1 {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    return Err(DeliberationError::Validation("boom".into()));
                }
                tokio::time::sleep(Duration::from_secs(60)).await;
                finished.fetch_add(1, Ordering::SeqCst);
                Ok(i)
            });
        }

        let err = barrier.wait_all(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, DeliberationError::Validation(_)));

        tokio::time::advance(Duration::from_secs(120)).await;
        tokio::task::yield_now().await;
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_the_round() {
        let cancel = CancellationToken::new();
        let mut barrier: RoundBarrier<()> = RoundBarrier::new();
        barrier.spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        });

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });
        let err = barrier.wait_all(&cancel).await.unwrap_err();
        assert!(matches!(err, DeliberationError::Cancelled));
    }

    #[tokio::test]
    async fn panics_become_internal_errors() {
        let mut barrier: RoundBarrier<()> = RoundBarrier::new();
        barrier.spawn(async {
            if true {
                panic!("bad turn");
            }
            Ok(())
        });
        let err = barrier.wait_all(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, DeliberationError::Internal(_)));
    }

    #[tokio::test]
    async fn empty_barrier_is_ready() {
        let barrier: RoundBarrier<u8> = RoundBarrier::new();
        assert!(barrier.is_empty());
        assert!(barrier.wait_all(&CancellationToken::new()).await.unwrap().is_empty());
    }
}
