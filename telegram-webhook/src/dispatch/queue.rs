//! Bounded dispatch queue with a fixed worker pool.
//!
//! `submit` never blocks: a full queue is rejected with [`WebhookError::QueueFull`]. Workers share
//! one receiver and pull tasks in FIFO order; each attempt runs in its own task under a timeout so
//! a hung or panicking handler only fails that attempt. Failed attempts are retried with backoff
//! on the same worker, then dead-lettered.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use super::dead_letter::{DeadLetter, DeadLetterSink};
use super::retry::RetryPolicy;
use crate::core::{Handler, HandlerError, InboundUpdate, Result, WebhookError};

/// Worker pool and queue limits.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Number of workers running handlers concurrently.
    pub workers: usize,
    /// Maximum tasks waiting in the queue (in-flight tasks not counted).
    pub queue_depth: usize,
    pub retry: RetryPolicy,
    /// Per-attempt limit; an attempt running longer is cancelled and counted as failed.
    pub handler_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_depth: 1024,
            retry: RetryPolicy::default(),
            handler_timeout: Duration::from_secs(30),
        }
    }
}

/// An update paired with the handler that processes it and the attempts made so far.
pub struct DispatchTask {
    update: Arc<InboundUpdate>,
    handler: Arc<dyn Handler>,
    attempts: u32,
}

impl DispatchTask {
    pub fn new(update: InboundUpdate, handler: Arc<dyn Handler>) -> Self {
        Self {
            update: Arc::new(update),
            handler,
            attempts: 0,
        }
    }

    pub fn update(&self) -> &InboundUpdate {
        &self.update
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Point-in-time counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub submitted: u64,
    pub rejected: u64,
    pub succeeded: u64,
    pub retried: u64,
    pub dead_lettered: u64,
    /// Tasks currently waiting in the queue.
    pub depth: usize,
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    rejected: AtomicU64,
    succeeded: AtomicU64,
    retried: AtomicU64,
    dead_lettered: AtomicU64,
}

/// Shared by all workers.
struct WorkerContext {
    retry: RetryPolicy,
    handler_timeout: Duration,
    dead_letters: Arc<dyn DeadLetterSink>,
    counters: Arc<Counters>,
}

/// Bounded queue feeding a fixed pool of handler workers.
pub struct DispatchQueue {
    sender: RwLock<Option<mpsc::Sender<DispatchTask>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    handler: Arc<dyn Handler>,
    capacity: usize,
    counters: Arc<Counters>,
}

impl DispatchQueue {
    /// Creates the queue and spawns its workers on the current tokio runtime.
    ///
    /// `handler` is used for updates given to [`Self::submit`]; [`Self::submit_task`] can carry
    /// another one. Zero workers or depth are raised to one.
    pub fn start(
        config: DispatchConfig,
        handler: Arc<dyn Handler>,
        dead_letters: Arc<dyn DeadLetterSink>,
    ) -> Self {
        let capacity = config.queue_depth.max(1);
        let worker_count = config.workers.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let receiver = Arc::new(Mutex::new(receiver));
        let counters = Arc::new(Counters::default());

        let ctx = Arc::new(WorkerContext {
            retry: config.retry,
            handler_timeout: config.handler_timeout,
            dead_letters,
            counters: counters.clone(),
        });

        let workers = (0..worker_count)
            .map(|worker_id| tokio::spawn(worker_loop(worker_id, receiver.clone(), ctx.clone())))
            .collect();

        info!(
            workers = worker_count,
            queue_depth = capacity,
            max_retries = ctx.retry.max_retries,
            handler_timeout_ms = ctx.handler_timeout.as_millis() as u64,
            "Dispatch queue started"
        );

        Self {
            sender: RwLock::new(Some(sender)),
            workers: Mutex::new(workers),
            handler,
            capacity,
            counters,
        }
    }

    /// Enqueues `update` for the queue's handler.
    pub fn submit(&self, update: InboundUpdate) -> Result<()> {
        self.submit_task(DispatchTask::new(update, self.handler.clone()))
    }

    /// Enqueues a task without waiting.
    ///
    /// Fails with [`WebhookError::QueueFull`] when `queue_depth` tasks are already waiting and
    /// with [`WebhookError::QueueClosed`] after [`Self::shutdown`].
    pub fn submit_task(&self, task: DispatchTask) -> Result<()> {
        let guard = self.sender.read().unwrap_or_else(PoisonError::into_inner);
        let sender = guard.as_ref().ok_or(WebhookError::QueueClosed)?;
        let update_id = task.update.id().to_string();

        match sender.try_send(task) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                let depth = sender.max_capacity() - sender.capacity();
                debug!(update_id = %update_id, depth, "Update queued");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                warn!(
                    update_id = %update_id,
                    capacity = self.capacity,
                    "Dispatch queue full, rejecting update"
                );
                Err(WebhookError::QueueFull {
                    capacity: self.capacity,
                })
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(WebhookError::QueueClosed),
        }
    }

    /// Tasks currently waiting (not yet picked up by a worker).
    pub fn depth(&self) -> usize {
        let guard = self.sender.read().unwrap_or_else(PoisonError::into_inner);
        guard
            .as_ref()
            .map_or(0, |sender| sender.max_capacity() - sender.capacity())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.sender
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            retried: self.counters.retried.load(Ordering::Relaxed),
            dead_lettered: self.counters.dead_lettered.load(Ordering::Relaxed),
            depth: self.depth(),
        }
    }

    /// Stops accepting tasks and waits until the workers finish everything already queued,
    /// retries included. Idempotent.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        let sender = self
            .sender
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(sender);

        let workers: Vec<_> = self.workers.lock().await.drain(..).collect();
        if workers.is_empty() {
            return;
        }
        info!(workers = workers.len(), "Dispatch queue draining");
        for worker in workers {
            if let Err(e) = worker.await {
                error!(error = %e, "Dispatch worker terminated abnormally");
            }
        }
        info!(stats = ?self.stats(), "Dispatch queue stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<DispatchTask>>>,
    ctx: Arc<WorkerContext>,
) {
    debug!(worker_id, "Dispatch worker started");
    loop {
        let next = receiver.lock().await.recv().await;
        let Some(task) = next else { break };
        ctx.process(worker_id, task).await;
    }
    debug!(worker_id, "Dispatch worker stopped");
}

impl WorkerContext {
    /// Runs a task to success or dead letter. Never panics or returns an error.
    async fn process(&self, worker_id: usize, mut task: DispatchTask) {
        loop {
            task.attempts += 1;
            let err = match self.attempt(&task).await {
                Ok(()) => {
                    self.counters.succeeded.fetch_add(1, Ordering::Relaxed);
                    info!(
                        worker_id,
                        update_id = %task.update.id(),
                        attempt = task.attempts,
                        "Update handled"
                    );
                    return;
                }
                Err(err) => err,
            };

            if !self.retry.should_retry(task.attempts) {
                self.dead_letter(&task, &err).await;
                return;
            }

            let delay = self.retry.delay_for(task.attempts);
            self.counters.retried.fetch_add(1, Ordering::Relaxed);
            warn!(
                worker_id,
                update_id = %task.update.id(),
                attempt = task.attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Handler attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn attempt(&self, task: &DispatchTask) -> std::result::Result<(), HandlerError> {
        let handler = task.handler.clone();
        let update = task.update.clone();
        let handle = tokio::spawn(async move { handler.handle(&update).await });
        let abort = handle.abort_handle();

        match tokio::time::timeout(self.handler_timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) if join_err.is_panic() => {
                Err(HandlerError::Panicked(panic_message(join_err.into_panic())))
            }
            Ok(Err(join_err)) => Err(HandlerError::Failed(join_err.to_string())),
            Err(_) => {
                abort.abort();
                Err(HandlerError::Timeout(self.handler_timeout))
            }
        }
    }

    async fn dead_letter(&self, task: &DispatchTask, err: &HandlerError) {
        self.counters.dead_lettered.fetch_add(1, Ordering::Relaxed);
        error!(
            update_id = %task.update.id(),
            attempts = task.attempts,
            error = %err,
            "Retries exhausted, dead-lettering update"
        );
        let letter = DeadLetter::new(&task.update, task.attempts, err.to_string());
        if let Err(e) = self.dead_letters.record(&letter).await {
            error!(
                update_id = %task.update.id(),
                error = %e,
                "Failed to write dead letter"
            );
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
