//! Bounded worker pool
//!
//! Shared by the creator and the fetcher. Every job runs as its own tokio
//! task but only `workers` of them hold a permit at any time.

use futures::stream::{FuturesUnordered, StreamExt};
use ledgerfs_core::error::{LedgerFsError, Result};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::error;

/// Progress update sent after each finished job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolProgress {
    pub completed: usize,
    pub total: usize,
    pub failed: bool,
}

#[derive(Clone)]
pub struct WorkerPool {
    workers: usize,
    semaphore: Arc<Semaphore>,
    progress_tx: Option<mpsc::UnboundedSender<PoolProgress>>,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            workers,
            semaphore: Arc::new(Semaphore::new(workers)),
            progress_tx: None,
        }
    }

    /// Create a pool that reports each finished job
    pub fn with_progress(workers: usize) -> (Self, mpsc::UnboundedReceiver<PoolProgress>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut pool = Self::new(workers);
        pool.progress_tx = Some(tx);
        (pool, rx)
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run every job to completion; results come back in input order
    pub async fn run<I, F, Fut, T>(&self, items: Vec<I>, job: F) -> Vec<Result<T>>
    where
        I: Send + 'static,
        F: Fn(I) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let handles = self.spawn_all(items, job);

        futures::future::join_all(handles)
            .await
            .into_iter()
            .map(flatten)
            .collect()
    }

    /// Run jobs until the first failure, which aborts the rest
    pub async fn try_run<I, F, Fut, T>(&self, items: Vec<I>, job: F) -> Result<Vec<T>>
    where
        I: Send + 'static,
        F: Fn(I) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let total = items.len();
        let handles = self.spawn_all(items, job);
        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();

        let mut pending: FuturesUnordered<_> = handles
            .into_iter()
            .enumerate()
            .map(|(position, handle)| async move { (position, handle.await) })
            .collect();

        let mut slots: Vec<Option<T>> = (0..total).map(|_| None).collect();
        while let Some((position, joined)) = pending.next().await {
            match flatten(joined) {
                Ok(value) => slots[position] = Some(value),
                Err(e) => {
                    for abort in &aborts {
                        abort.abort();
                    }
                    return Err(e);
                }
            }
        }

        Ok(slots.into_iter().flatten().collect())
    }

    fn spawn_all<I, F, Fut, T>(&self, items: Vec<I>, job: F) -> Vec<JoinHandle<Result<T>>>
    where
        I: Send + 'static,
        F: Fn(I) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let total = items.len();
        let completed = Arc::new(AtomicUsize::new(0));

        items
            .into_iter()
            .map(|item| {
                let semaphore = self.semaphore.clone();
                let progress_tx = self.progress_tx.clone();
                let completed = completed.clone();
                let job = job.clone();
                tokio::spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|_| LedgerFsError::Internal("worker pool closed".to_string()))?;
                    let result = job(item).await;
                    if let Some(tx) = progress_tx {
                        let _ = tx.send(PoolProgress {
                            completed: completed.fetch_add(1, Ordering::SeqCst) + 1,
                            total,
                            failed: result.is_err(),
                        });
                    }
                    result
                })
            })
            .collect()
    }
}

fn flatten<T>(joined: std::result::Result<Result<T>, tokio::task::JoinError>) -> Result<T> {
    match joined {
        Ok(result) => result,
        Err(e) => {
            error!(error = %e, "Worker task panicked");
            Err(LedgerFsError::Internal(format!("worker task failed: {}", e)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_results_in_input_order() {
        let pool = WorkerPool::new(4);
        let results = pool
            .run((0..10u64).collect(), |i| async move {
                tokio::time::sleep(Duration::from_millis(10 - i)).await;
                Ok(i * 2)
            })
            .await;

        let values: Vec<u64> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, (0..10u64).map(|i| i * 2).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let pool = WorkerPool::new(3);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let results = pool
            .run((0..12).collect::<Vec<u32>>(), {
                let running = running.clone();
                let peak = peak.clone();
                move |_| {
                    let running = running.clone();
                    let peak = peak.clone();
                    async move {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    }
                }
            })
            .await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_run_isolates_failures() {
        let pool = WorkerPool::new(2);
        let results = pool
            .run(vec![0u32, 1, 2], |i| async move {
                if i == 1 {
                    Err(LedgerFsError::Remote("boom".into()))
                } else {
                    Ok(i)
                }
            })
            .await;

        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
    }

    #[tokio::test]
    async fn test_try_run_stops_on_failure() {
        let pool = WorkerPool::new(1);
        let finished = Arc::new(AtomicUsize::new(0));

        let result = pool
            .try_run((0..5u32).collect(), {
                let finished = finished.clone();
                move |i| {
                    let finished = finished.clone();
                    async move {
                        if i == 0 {
                            return Err(LedgerFsError::Remote("first job fails".into()));
                        }
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        finished.fetch_add(1, Ordering::SeqCst);
                        Ok(i)
                    }
                }
            })
            .await;

        assert!(matches!(result, Err(LedgerFsError::Remote(_))));
        assert!(finished.load(Ordering::SeqCst) < 4);
    }

    #[tokio::test]
    async fn test_try_run_ordered_output() {
        let pool = WorkerPool::new(8);
        let values = pool
            .try_run((0..20u64).collect(), |i| async move {
                tokio::time::sleep(Duration::from_millis(20 - i)).await;
                Ok(i)
            })
            .await
            .unwrap();
        assert_eq!(values, (0..20u64).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_progress_reports() {
        let (pool, mut rx) = WorkerPool::with_progress(2);
        pool.run(vec![1u8, 2, 3], |i| async move { Ok(i) }).await;

        let mut updates = Vec::new();
        while let Ok(update) = rx.try_recv() {
            updates.push(update);
        }
        assert_eq!(updates.len(), 3);
        assert!(updates.iter().all(|u| u.total == 3 && !u.failed));
        assert_eq!(updates.iter().map(|u| u.completed).max(), Some(3));
    }
}
