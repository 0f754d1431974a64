//! Bounded task pool for fanning out nested per-resource fetches.
//!
//! The pool runs at most `workers` tasks concurrently, applies backpressure
//! to submitters through a bounded input queue, and tags every result with
//! the submitter-chosen id so out-of-order completions can be scattered back
//! into their originating slots. [`execute_batch`] wraps the common
//! all-or-nothing pattern: run a batch, keep results index-stable, and treat
//! the first task failure as fatal for the whole batch.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

type TaskFuture<T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send>>;

/// A unit of work with a caller-assigned id.
///
/// The id is echoed back on the [`TaskResult`] so the caller can place the
/// output regardless of completion order.
pub struct Task<T, E> {
    id: usize,
    work: Box<dyn FnOnce(CancellationToken) -> TaskFuture<T, E> + Send>,
}

impl<T, E> Task<T, E> {
    /// Create a task. The closure receives the pool's cancellation token so
    /// long-running work can observe shutdown.
    pub fn new<F, Fut>(id: usize, work: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self {
            id,
            work: Box::new(move |cancel| Box::pin(work(cancel))),
        }
    }

    /// The caller-assigned id.
    pub fn id(&self) -> usize {
        self.id
    }
}

impl<T, E> std::fmt::Debug for Task<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task").field("id", &self.id).finish()
    }
}

/// Why an individual task did not produce a value.
#[derive(Debug, Error)]
pub enum TaskError<E: std::error::Error + 'static> {
    /// The pool was cancelled before or during the task.
    #[error("task cancelled")]
    Cancelled,

    /// The task's own work failed.
    #[error(transparent)]
    Failed(#[from] E),
}

/// Outcome of one task, tagged with its submission id.
#[derive(Debug)]
pub struct TaskResult<T, E: std::error::Error + 'static> {
    /// The id the task was submitted with.
    pub id: usize,
    /// The task's outcome.
    pub result: Result<T, TaskError<E>>,
}

/// Errors from pool bookkeeping, as opposed to task outcomes.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The pool's input side has been shut down.
    #[error("task pool is closed")]
    Closed,
}

/// Cloneable submission handle, for feeding a pool from a spawned producer
/// while the owning task drains results.
pub struct Submitter<T, E> {
    task_tx: mpsc::Sender<Task<T, E>>,
    outstanding: Arc<AtomicUsize>,
}

impl<T, E> Clone for Submitter<T, E> {
    fn clone(&self) -> Self {
        Self {
            task_tx: self.task_tx.clone(),
            outstanding: Arc::clone(&self.outstanding),
        }
    }
}

impl<T, E> Submitter<T, E> {
    /// Submit a task, waiting if all workers are busy and the input queue is
    /// full.
    pub async fn submit(&self, task: Task<T, E>) -> Result<(), PoolError> {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        self.task_tx.send(task).await.map_err(|_| {
            self.outstanding.fetch_sub(1, Ordering::SeqCst);
            PoolError::Closed
        })
    }
}

/// A fixed-size pool of worker tasks with a bounded input queue.
///
/// Input capacity equals the worker count, so a producer gets ahead of the
/// workers by at most one queued task each before `submit` suspends. Results
/// flow out through an unbounded channel since the pool itself never
/// generates results faster than workers complete them.
pub struct TaskPool<T, E>
where
    T: Send + 'static,
    E: std::error::Error + Send + 'static,
{
    task_tx: Option<mpsc::Sender<Task<T, E>>>,
    result_rx: mpsc::UnboundedReceiver<TaskResult<T, E>>,
    cancel: CancellationToken,
    outstanding: Arc<AtomicUsize>,
    workers: Vec<JoinHandle<()>>,
}

impl<T, E> TaskPool<T, E>
where
    T: Send + 'static,
    E: std::error::Error + Send + 'static,
{
    /// Spawn `workers` worker tasks. The pool cancels when `cancel` fires,
    /// without cancelling the parent token.
    pub fn new(workers: usize, cancel: &CancellationToken) -> Self {
        let workers = workers.max(1);
        let cancel = cancel.child_token();
        let (task_tx, task_rx) = mpsc::channel::<Task<T, E>>(workers);
        let (result_tx, result_rx) = mpsc::unbounded_channel();
        let task_rx = Arc::new(Mutex::new(task_rx));

        let handles = (0..workers)
            .map(|worker| {
                let task_rx = Arc::clone(&task_rx);
                let result_tx = result_tx.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    worker_loop(worker, task_rx, result_tx, cancel).await;
                })
            })
            .collect();

        Self {
            task_tx: Some(task_tx),
            result_rx,
            cancel,
            outstanding: Arc::new(AtomicUsize::new(0)),
            workers: handles,
        }
    }

    /// Submit a task, waiting for queue space when all workers are busy.
    pub async fn submit(&self, task: Task<T, E>) -> Result<(), PoolError> {
        let tx = self.task_tx.as_ref().ok_or(PoolError::Closed)?;
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        tx.send(task).await.map_err(|_| {
            self.outstanding.fetch_sub(1, Ordering::SeqCst);
            PoolError::Closed
        })
    }

    /// A cloneable handle for submitting from a spawned producer.
    pub fn submitter(&self) -> Result<Submitter<T, E>, PoolError> {
        let task_tx = self.task_tx.as_ref().ok_or(PoolError::Closed)?.clone();
        Ok(Submitter {
            task_tx,
            outstanding: Arc::clone(&self.outstanding),
        })
    }

    /// Receive the next completed task, in completion order. Returns `None`
    /// once no submissions remain in flight and the input side is closed.
    pub async fn next_result(&mut self) -> Option<TaskResult<T, E>> {
        let result = self.result_rx.recv().await?;
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
        Some(result)
    }

    /// Tasks submitted but not yet returned through
    /// [`next_result`](Self::next_result).
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// The pool's cancellation token.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Graceful shutdown: stop accepting tasks, let queued work finish, then
    /// reap the workers.
    pub async fn shutdown(mut self) {
        drop(self.task_tx.take());
        for handle in self.workers.drain(..) {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "pool worker panicked during shutdown");
            }
        }
        self.cancel.cancel();
        self.result_rx.close();
    }

    /// Abortive shutdown: cancel in-flight work first, then reap the
    /// workers. Queued tasks complete as `Cancelled` or are dropped.
    pub async fn force_shutdown(mut self) {
        self.cancel.cancel();
        drop(self.task_tx.take());
        for handle in self.workers.drain(..) {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "pool worker panicked during shutdown");
            }
        }
        self.result_rx.close();
    }
}

async fn worker_loop<T, E>(
    worker: usize,
    task_rx: Arc<Mutex<mpsc::Receiver<Task<T, E>>>>,
    result_tx: mpsc::UnboundedSender<TaskResult<T, E>>,
    cancel: CancellationToken,
) where
    E: std::error::Error + 'static,
{
    loop {
        // Hold the receiver lock only while waiting for the next task so the
        // other workers can pull work while this one runs.
        let task = {
            let mut rx = task_rx.lock().await;
            rx.recv().await
        };
        let Some(task) = task else {
            tracing::trace!(worker, "input closed, worker exiting");
            return;
        };

        let id = task.id;
        let result = if cancel.is_cancelled() {
            Err(TaskError::Cancelled)
        } else {
            tokio::select! {
                () = cancel.cancelled() => Err(TaskError::Cancelled),
                outcome = (task.work)(cancel.clone()) => outcome.map_err(TaskError::Failed),
            }
        };

        if result_tx.send(TaskResult { id, result }).is_err() {
            // Result side dropped, nothing left to report to.
            return;
        }
    }
}

/// Run a batch of tasks through a fresh pool and gather the outputs in
/// submission-id order.
///
/// Task ids must be the indices `0..tasks.len()`. The first failed task
/// aborts the batch: remaining work is cancelled and that task's error is
/// returned. On success the output vector is index-aligned with the input.
pub async fn execute_batch<T, E>(
    cancel: &CancellationToken,
    workers: usize,
    tasks: Vec<Task<T, E>>,
) -> Result<Vec<T>, TaskError<E>>
where
    T: Send + 'static,
    E: std::error::Error + Send + 'static,
{
    let total = tasks.len();
    if total == 0 {
        return Ok(Vec::new());
    }

    let mut pool = TaskPool::new(workers, cancel);
    let submitter = match pool.submitter() {
        Ok(s) => s,
        Err(PoolError::Closed) => return Err(TaskError::Cancelled),
    };

    // Feed from a separate task so submission backpressure cannot deadlock
    // against result draining.
    let feeder = tokio::spawn(async move {
        for task in tasks {
            if submitter.submit(task).await.is_err() {
                return;
            }
        }
    });

    let mut slots: Vec<Option<T>> = (0..total).map(|_| None).collect();
    let mut received = 0usize;

    while received < total {
        let Some(TaskResult { id, result }) = pool.next_result().await else {
            break;
        };
        received += 1;
        match result {
            Ok(value) => {
                if let Some(slot) = slots.get_mut(id) {
                    *slot = Some(value);
                }
            }
            Err(e) => {
                pool.force_shutdown().await;
                feeder.abort();
                return Err(e);
            }
        }
    }

    pool.shutdown().await;
    if let Err(e) = feeder.await
        && !e.is_cancelled()
    {
        tracing::warn!(error = %e, "batch feeder panicked");
    }

    let mut out = Vec::with_capacity(total);
    for slot in slots {
        match slot {
            Some(value) => out.push(value),
            None => return Err(TaskError::Cancelled),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Debug, Error)]
    #[error("{0}")]
    struct TestError(&'static str);

    #[tokio::test(start_paused = true)]
    async fn batch_results_are_index_stable_despite_completion_order() {
        let cancel = CancellationToken::new();

        // Earlier tasks sleep longer, so completion order is reversed.
        let tasks: Vec<Task<usize, TestError>> = (0..8)
            .map(|i| {
                Task::new(i, move |_| async move {
                    tokio::time::sleep(Duration::from_millis(100 * (8 - i as u64))).await;
                    Ok(i * 10)
                })
            })
            .collect();

        let out = execute_batch(&cancel, 4, tasks).await.unwrap();
        assert_eq!(out, vec![0, 10, 20, 30, 40, 50, 60, 70]);
    }

    #[tokio::test]
    async fn first_task_failure_aborts_the_batch() {
        let cancel = CancellationToken::new();
        let completed = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<Task<usize, TestError>> = (0..6)
            .map(|i| {
                let completed = Arc::clone(&completed);
                Task::new(i, move |_| async move {
                    if i == 2 {
                        Err(TestError("boom"))
                    } else {
                        completed.fetch_add(1, Ordering::SeqCst);
                        Ok(i)
                    }
                })
            })
            .collect();

        let err = execute_batch(&cancel, 2, tasks).await.expect_err("fatal");
        assert!(matches!(err, TaskError::Failed(TestError("boom"))));
    }

    #[tokio::test]
    async fn empty_batch_is_a_noop() {
        let cancel = CancellationToken::new();
        let out: Vec<u8> =
            execute_batch::<u8, TestError>(&cancel, 4, Vec::new()).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn submit_applies_backpressure_when_workers_are_busy() {
        let cancel = CancellationToken::new();
        let pool: TaskPool<(), TestError> = TaskPool::new(1, &cancel);

        // One task occupying the worker plus one filling the queue slot.
        for i in 0..2 {
            pool.submit(Task::new(i, |_| async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }))
            .await
            .unwrap();
        }

        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            pool.submit(Task::new(2, |_| async { Ok(()) })),
        )
        .await;
        assert!(blocked.is_err(), "third submit should wait for capacity");

        pool.force_shutdown().await;
    }

    #[tokio::test]
    async fn cancellation_surfaces_as_cancelled_results() {
        let cancel = CancellationToken::new();
        let mut pool: TaskPool<(), TestError> = TaskPool::new(2, &cancel);

        pool.submit(Task::new(0, |token: CancellationToken| async move {
            token.cancelled().await;
            Ok(())
        }))
        .await
        .unwrap();

        cancel.cancel();
        let result = pool.next_result().await.expect("one result");
        assert!(matches!(
            result.result,
            Ok(()) | Err(TaskError::Cancelled)
        ));
        pool.force_shutdown().await;
    }

    #[tokio::test]
    async fn outstanding_tracks_in_flight_tasks() {
        let cancel = CancellationToken::new();
        let mut pool: TaskPool<usize, TestError> = TaskPool::new(2, &cancel);
        assert_eq!(pool.outstanding(), 0);

        pool.submit(Task::new(0, |_| async { Ok(1) })).await.unwrap();
        assert_eq!(pool.outstanding(), 1);

        let result = pool.next_result().await.expect("result");
        assert_eq!(result.id, 0);
        assert_eq!(pool.outstanding(), 0);
        pool.shutdown().await;
    }
}
