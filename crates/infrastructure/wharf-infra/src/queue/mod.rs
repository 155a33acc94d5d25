use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use tokio::sync::{watch, Notify, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

/// Boxed failure returned by a task handler.
pub type TaskError = Box<dyn std::error::Error + Send + Sync>;

type Handler<T> = Arc<dyn Fn(T) -> BoxFuture<'static, Result<(), TaskError>> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct QueueOptions {
    pub name: String,
    /// Maximum number of handlers running at any instant.
    pub concurrency: usize,
    /// Re-executions allowed after the first failure. 0 means single attempt.
    pub retries: u32,
}

impl QueueOptions {
    pub fn new(name: impl Into<String>, concurrency: usize, retries: u32) -> Self {
        Self {
            name: name.into(),
            concurrency: concurrency.max(1),
            retries,
        }
    }
}

/// The first permanent task failure observed by a queue. Cheap to clone so
/// every waiter sees the same error.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{name}: task failed after {attempts} attempt(s): {source}")]
pub struct QueueError {
    pub name: String,
    pub attempts: u32,
    #[source]
    pub source: Arc<dyn std::error::Error + Send + Sync + 'static>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Tasks ever added.
    pub total: u64,
    /// Tasks that began executing at least once.
    pub started: u64,
    /// Tasks in a terminal state (success or retries exhausted).
    pub complete: u64,
    pub success: u64,
    pub errored: u64,
    /// Re-executions scheduled after a failed attempt.
    pub retried: u64,
    /// Handlers running right now.
    pub active: u64,
    /// Terminal outcome reached (drained, or a permanent failure recorded).
    pub finished: bool,
}

#[derive(Clone)]
enum Outcome {
    Running,
    Finished,
    Failed(QueueError),
}

struct Job<T> {
    task: T,
    attempts: u32,
}

struct QueueCore<T> {
    name: String,
    retries: u32,
    handler: Handler<T>,
    semaphore: Arc<Semaphore>,
    pending: Mutex<VecDeque<Job<T>>>,
    wakeup: Notify,
    closed: AtomicBool,
    dispatching: AtomicBool,
    /// Jobs popped from `pending` that have not yet reached a terminal state
    /// or been requeued. Incremented under the `pending` lock so a drained
    /// check never misses a job in hand.
    inflight: AtomicU64,
    outcome: watch::Sender<Outcome>,
    total: AtomicU64,
    started: AtomicU64,
    complete: AtomicU64,
    success: AtomicU64,
    errored: AtomicU64,
    retried: AtomicU64,
    active: AtomicU64,
}

impl<T> QueueCore<T> {
    fn record_failure(&self, err: QueueError) {
        // Only the first permanent failure becomes the queue outcome.
        self.outcome.send_if_modified(|o| match o {
            Outcome::Running => {
                *o = Outcome::Failed(err);
                true
            }
            _ => false,
        });
    }

    fn drained(&self) -> bool {
        if !self.closed.load(Ordering::SeqCst) {
            return false;
        }
        let pending = self.pending.lock().unwrap();
        pending.is_empty() && self.inflight.load(Ordering::SeqCst) == 0
    }

    fn finish_if_drained(&self) {
        if self.drained() {
            self.outcome.send_if_modified(|o| match o {
                Outcome::Running => {
                    *o = Outcome::Finished;
                    true
                }
                _ => false,
            });
        }
    }
}

/// Bounded-concurrency task queue with a per-task retry budget.
///
/// Tasks can be seeded before execution starts: `add` enqueues, `process`
/// begins dispatch, `close` marks the input complete, and `wait` reports the
/// overall outcome. A permanent failure rejects `wait` immediately but never
/// stops the queue from draining the remaining work.
pub struct TaskQueue<T> {
    core: Arc<QueueCore<T>>,
}

impl<T> Clone for TaskQueue<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T: Clone + Send + 'static> TaskQueue<T> {
    pub fn new<F, Fut>(options: QueueOptions, handler: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        let handler: Handler<T> = Arc::new(move |task| Box::pin(handler(task)));
        let (outcome, _) = watch::channel(Outcome::Running);
        Self {
            core: Arc::new(QueueCore {
                name: options.name,
                retries: options.retries,
                handler,
                semaphore: Arc::new(Semaphore::new(options.concurrency)),
                pending: Mutex::new(VecDeque::new()),
                wakeup: Notify::new(),
                closed: AtomicBool::new(false),
                dispatching: AtomicBool::new(false),
                inflight: AtomicU64::new(0),
                outcome,
                total: AtomicU64::new(0),
                started: AtomicU64::new(0),
                complete: AtomicU64::new(0),
                success: AtomicU64::new(0),
                errored: AtomicU64::new(0),
                retried: AtomicU64::new(0),
                active: AtomicU64::new(0),
            }),
        }
    }

    /// Enqueue a task. Panics if the queue was already closed; adding to a
    /// closed queue is a bug in the caller, not a runtime condition.
    pub fn add(&self, task: T) {
        assert!(
            !self.core.closed.load(Ordering::SeqCst),
            "add after close on queue '{}'",
            self.core.name
        );
        self.core.total.fetch_add(1, Ordering::SeqCst);
        self.core
            .pending
            .lock()
            .unwrap()
            .push_back(Job { task, attempts: 0 });
        self.core.wakeup.notify_one();
    }

    /// No further adds; the queue finishes once everything in flight drains.
    pub fn close(&self) {
        self.core.closed.store(true, Ordering::SeqCst);
        self.core.finish_if_drained();
        self.core.wakeup.notify_one();
    }

    /// Start dispatching. Idempotent; must be called from a tokio runtime.
    pub fn process(&self) {
        if self.core.dispatching.swap(true, Ordering::SeqCst) {
            return;
        }
        let core = Arc::clone(&self.core);
        tokio::spawn(dispatch(core));
    }

    /// Resolves `Ok` once the queue is closed and every task succeeded, or
    /// `Err` with the first permanent failure as soon as one is recorded.
    /// Late callers observe the same outcome.
    pub async fn wait(&self) -> Result<(), QueueError> {
        let mut rx = self.core.outcome.subscribe();
        loop {
            match rx.borrow_and_update().clone() {
                Outcome::Running => {}
                Outcome::Finished => return Ok(()),
                Outcome::Failed(err) => return Err(err),
            }
            if rx.changed().await.is_err() {
                return Ok(());
            }
        }
    }

    pub fn stats(&self) -> QueueStats {
        let c = &self.core;
        QueueStats {
            total: c.total.load(Ordering::SeqCst),
            started: c.started.load(Ordering::SeqCst),
            complete: c.complete.load(Ordering::SeqCst),
            success: c.success.load(Ordering::SeqCst),
            errored: c.errored.load(Ordering::SeqCst),
            retried: c.retried.load(Ordering::SeqCst),
            active: c.active.load(Ordering::SeqCst),
            finished: !matches!(&*c.outcome.borrow(), Outcome::Running),
        }
    }
}

async fn dispatch<T: Clone + Send + 'static>(core: Arc<QueueCore<T>>) {
    loop {
        let job = {
            let mut pending = core.pending.lock().unwrap();
            let job = pending.pop_front();
            if job.is_some() {
                core.inflight.fetch_add(1, Ordering::SeqCst);
            }
            job
        };
        match job {
            Some(job) => {
                let Ok(permit) = Arc::clone(&core.semaphore).acquire_owned().await else {
                    break;
                };
                tokio::spawn(run_job(Arc::clone(&core), job, permit));
            }
            None => {
                if core.drained() {
                    core.finish_if_drained();
                    debug!(queue = %core.name, "queue drained");
                    break;
                }
                core.wakeup.notified().await;
            }
        }
    }
}

async fn run_job<T: Clone + Send + 'static>(
    core: Arc<QueueCore<T>>,
    job: Job<T>,
    permit: OwnedSemaphorePermit,
) {
    if job.attempts == 0 {
        core.started.fetch_add(1, Ordering::SeqCst);
    }
    core.active.fetch_add(1, Ordering::SeqCst);
    let result = (core.handler)(job.task.clone()).await;
    core.active.fetch_sub(1, Ordering::SeqCst);

    match result {
        Ok(()) => {
            core.success.fetch_add(1, Ordering::SeqCst);
            core.complete.fetch_add(1, Ordering::SeqCst);
            core.inflight.fetch_sub(1, Ordering::SeqCst);
        }
        Err(err) if job.attempts < core.retries => {
            debug!(queue = %core.name, attempt = job.attempts + 1, error = %err, "task retried");
            core.retried.fetch_add(1, Ordering::SeqCst);
            // Requeue before releasing the inflight slot so the queue can
            // never look drained while a retry is in hand.
            core.pending.lock().unwrap().push_back(Job {
                task: job.task,
                attempts: job.attempts + 1,
            });
            core.inflight.fetch_sub(1, Ordering::SeqCst);
        }
        Err(err) => {
            let attempts = job.attempts + 1;
            warn!(queue = %core.name, attempts, error = %err, "task failed permanently");
            core.errored.fetch_add(1, Ordering::SeqCst);
            core.complete.fetch_add(1, Ordering::SeqCst);
            core.record_failure(QueueError {
                name: core.name.clone(),
                attempts,
                source: Arc::from(err),
            });
            core.inflight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    core.finish_if_drained();
    drop(permit);
    core.wakeup.notify_one();
}
