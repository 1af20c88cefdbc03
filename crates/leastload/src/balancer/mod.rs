//! Client-facing handle that spawns and owns the dispatcher and workers.
//!
//! [`Balancer::spawn`] starts `worker_count` worker tasks, each with its own
//! bounded queue, plus one dispatcher task that owns the load-ordered pool.
//! Clients call [`Balancer::submit`] (or [`Balancer::enqueue`] for a
//! [`Ticket`] they can await later); every request resolves to exactly one
//! result.
//!
//! Shutdown is cooperative and phased:
//!
//! 1. Refuse new requests.
//! 2. Wait up to `shutdown_timeout` for in-flight requests to drain.
//! 3. Cancel the shared [`CancellationToken`] to stop every loop.
//! 4. Join the dispatcher and workers.

mod ticket;
#[cfg(test)]
mod tests;

pub use ticket::Ticket;

use crate::{
    config::BalancerConfig,
    dispatcher::Dispatcher,
    error::{Error, Result},
    pool::PoolStats,
    request::{Control, WorkRequest},
    task::Task,
    worker::worker_loop,
};
use core::time::Duration;
use parking_lot::Mutex;
use portable_atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::{sleep, timeout},
};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::Instrument;

const CONTROL_BUFFER_SIZE: usize = 16;
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(10);
const JOIN_TIMEOUT: Duration = Duration::from_secs(3);

struct Shared {
    accepting: AtomicBool,
    inflight: AtomicUsize,
    shutdown_token: CancellationToken,
    shutdown_timeout: Duration,
    dispatcher: Mutex<Option<JoinHandle<Result<()>>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    // Stops every loop once the last handle and ticket are gone.
    _cancel_on_drop: DropGuard,
}

/// Cloneable handle to a running least-loaded dispatcher.
///
/// Dropping the last handle (and every outstanding [`Ticket`]) cancels the
/// dispatcher and workers without draining. Call [`Balancer::shutdown`] for a
/// graceful stop.
pub struct Balancer<I, O> {
    requests: mpsc::Sender<WorkRequest<I, O>>,
    control: mpsc::Sender<Control>,
    shared: Arc<Shared>,
}

impl<I, O> Clone for Balancer<I, O> {
    fn clone(&self) -> Self {
        Self {
            requests: self.requests.clone(),
            control: self.control.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<I, O> Balancer<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Validates `config`, then spawns the workers and the dispatcher onto
    /// the current Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `config` does not validate.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn spawn<T>(config: BalancerConfig, task: T) -> Result<Self>
    where
        T: Task<I, Output = O>,
    {
        config.validate()?;
        tracing::info!(
            workers = config.worker_count,
            queue_capacity = config.queue_capacity,
            backpressure = ?config.backpressure,
            "Starting balancer"
        );

        let task = Arc::new(task);
        let shutdown_token = CancellationToken::new();
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();

        let mut queues = Vec::with_capacity(config.worker_count);
        let mut workers = Vec::with_capacity(config.worker_count);
        for worker_id in 0..config.worker_count {
            let (tx, rx) = mpsc::channel(config.queue_capacity);
            queues.push(tx);

            let worker = worker_loop(
                worker_id,
                rx,
                completion_tx.clone(),
                Arc::clone(&task),
                shutdown_token.clone(),
            )
            .instrument(tracing::debug_span!("worker", worker_id));
            workers.push(tokio::spawn(worker));
        }
        drop(completion_tx);

        let (request_tx, request_rx) = mpsc::channel(config.intake_capacity);
        let (control_tx, control_rx) = mpsc::channel(CONTROL_BUFFER_SIZE);

        let dispatcher = Dispatcher::new(queues, config.backpressure, shutdown_token.clone());
        let dispatcher = tokio::spawn(
            dispatcher
                .run(request_rx, completion_rx, control_rx)
                .instrument(tracing::info_span!("dispatcher")),
        );

        let cancel_on_drop = shutdown_token.clone().drop_guard();
        Ok(Self {
            requests: request_tx,
            control: control_tx,
            shared: Arc::new(Shared {
                accepting: AtomicBool::new(true),
                inflight: AtomicUsize::new(0),
                shutdown_token,
                shutdown_timeout: config.shutdown_timeout,
                dispatcher: Mutex::new(Some(dispatcher)),
                workers: Mutex::new(workers),
                _cancel_on_drop: cancel_on_drop,
            }),
        })
    }

    /// Submits `payload` and waits for its result.
    ///
    /// # Errors
    ///
    /// - [`Error::ServiceShutdown`] if the balancer no longer accepts work.
    /// - [`Error::Overloaded`] if the chosen worker's queue was full.
    /// - [`Error::TaskFailed`] if the task failed or panicked.
    /// - [`Error::ChannelError`] if the request was dropped before a result
    ///   was produced.
    pub async fn submit(&self, payload: I) -> Result<O> {
        self.enqueue(payload).await?.await
    }

    /// Places `payload` on the intake channel and returns a [`Ticket`] that
    /// resolves to its result.
    ///
    /// Waits only for intake capacity, not for the result.
    pub async fn enqueue(&self, payload: I) -> Result<Ticket<O>> {
        if !self.is_accepting() {
            return Err(Error::ServiceShutdown);
        }

        let (request, rx) = WorkRequest::new(payload);
        let ticket = Ticket::new(rx, Arc::clone(&self.shared));

        self.requests
            .send(request)
            .await
            .map_err(|_| Error::ServiceShutdown)?;

        Ok(ticket)
    }

    /// Asks the dispatcher for the current load distribution.
    pub async fn snapshot(&self) -> Result<PoolStats> {
        let (reply, rx) = oneshot::channel();
        self.control
            .send(Control::Snapshot { reply })
            .await
            .map_err(|_| Error::ServiceShutdown)?;
        rx.await.map_err(|_| Error::ServiceShutdown)
    }

    /// Number of submitted requests whose tickets are still alive.
    pub fn inflight(&self) -> usize {
        self.shared.inflight.load(Ordering::Acquire)
    }

    pub fn is_accepting(&self) -> bool {
        self.shared.accepting.load(Ordering::Acquire) && !self.shared.shutdown_token.is_cancelled()
    }

    /// Gracefully shuts down the dispatcher and every worker.
    ///
    /// Calling it again after a completed shutdown is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the [`Error::InvariantViolation`] that stopped the dispatcher,
    /// if any.
    pub async fn shutdown(&self) -> Result<()> {
        // === Phase 0: Stop accepting new requests ===
        tracing::debug!("Refusing new requests");
        self.shared.accepting.store(false, Ordering::Release);

        // === Phase 1: Wait for in-flight requests to drain ===
        tracing::debug!("Draining in-flight requests ({} active)", self.inflight());
        let drain_result = timeout(self.shared.shutdown_timeout, async {
            while self.inflight() > 0 {
                sleep(DRAIN_POLL_INTERVAL).await;
            }
        })
        .await;

        match drain_result {
            Ok(()) => tracing::debug!("All in-flight requests drained"),
            Err(_) => tracing::warn!(
                "Graceful drain timed out ({} requests still in flight)",
                self.inflight()
            ),
        }

        // === Phase 2: Cancel every loop ===
        tracing::debug!("Cancelling dispatcher and workers via shutdown token");
        self.shared.shutdown_token.cancel();

        // === Phase 3: Join tasks ===
        let dispatcher = self.shared.dispatcher.lock().take();
        let workers = core::mem::take(&mut *self.shared.workers.lock());

        let mut outcome = Ok(());
        if let Some(handle) = dispatcher {
            match timeout(JOIN_TIMEOUT, handle).await {
                Ok(Ok(Ok(()))) => tracing::debug!("Dispatcher stopped"),
                Ok(Ok(Err(e))) => {
                    tracing::error!("Dispatcher stopped with error: {e}");
                    outcome = Err(e);
                }
                Ok(Err(e)) => {
                    tracing::error!("Dispatcher task failed: {e}");
                    outcome = Err(Error::invariant(format!("dispatcher task failed: {e}")));
                }
                Err(_) => tracing::warn!("Dispatcher shutdown timed out"),
            }
        }

        let joins = workers
            .into_iter()
            .enumerate()
            .map(|(worker_id, handle)| async move {
                match timeout(JOIN_TIMEOUT, handle).await {
                    Ok(Ok(())) => tracing::trace!("Worker {worker_id} joined"),
                    Ok(Err(e)) => tracing::error!("Worker {worker_id} task failed: {e}"),
                    Err(_) => tracing::warn!("Worker {worker_id} shutdown timed out"),
                }
            });
        futures::future::join_all(joins).await;

        tracing::info!("Balancer shutdown complete");
        outcome
    }
}
