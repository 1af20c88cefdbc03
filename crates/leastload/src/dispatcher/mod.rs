//! The dispatcher loop: sole owner and mutator of the [`WorkerPool`].
//!
//! The dispatcher multiplexes three inputs with `tokio::select!`:
//!
//! - client [`WorkRequest`]s, routed to the least loaded worker
//!   ([`Dispatcher::dispatch`]);
//! - worker completion signals, which lower that worker's load and re-sort it
//!   ([`Dispatcher::completed`]);
//! - read-only [`Control`] queries.
//!
//! Exactly one event is handled per loop iteration, so heap edits never
//! interleave and the pool needs no lock. `select!` picks among ready
//! branches at random, which keeps either input from starving the other.


use crate::{
    config::Backpressure,
    error::{Error, Result},
    pool::{PoolStats, WorkerId, WorkerPool},
    request::{Control, WorkRequest},
};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

/// Routes requests to workers in least-loaded order.
pub struct Dispatcher<I, O> {
    pool: WorkerPool<mpsc::Sender<WorkRequest<I, O>>>,
    backpressure: Backpressure,
    shutdown_token: CancellationToken,
}

impl<I, O> Dispatcher<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Creates a dispatcher over already-spawned worker queues. The n-th
    /// sender becomes worker `n`.
    pub fn new(
        queues: Vec<mpsc::Sender<WorkRequest<I, O>>>,
        backpressure: Backpressure,
        shutdown_token: CancellationToken,
    ) -> Self {
        Self {
            pool: WorkerPool::new(queues),
            backpressure,
            shutdown_token,
        }
    }

    pub fn pool(&self) -> &WorkerPool<mpsc::Sender<WorkRequest<I, O>>> {
        &self.pool
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Hands `request` to the least loaded worker.
    ///
    /// Returns the chosen worker, or `None` if the request could not be
    /// queued. In that case the client has already been answered with the
    /// reason ([`Error::Overloaded`], [`Error::ChannelError`], or
    /// [`Error::ServiceShutdown`] if the shutdown token fires while waiting for
    /// room) and the worker's load is unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvariantViolation`] if the pool bookkeeping is
    /// corrupt.
    pub async fn dispatch(&mut self, request: WorkRequest<I, O>) -> Result<Option<WorkerId>> {
        let worker = self.pool.least()?;
        let queue = self
            .pool
            .get(worker)
            .ok_or_else(|| Error::invariant(format!("worker {worker} has no queue")))?;

        let handed = match queue.try_send(request) {
            Ok(()) => true,
            Err(TrySendError::Full(request)) => match self.backpressure {
                Backpressure::Reject => {
                    tracing::warn!("Worker {worker} queue full, rejecting request");
                    let _ = request.reply.send(Err(Error::Overloaded { worker }));
                    false
                }
                Backpressure::Wait => {
                    tracing::debug!("Worker {worker} queue full, waiting for room");
                    tokio::select! {
                        permit = queue.reserve() => match permit {
                            Ok(permit) => {
                                permit.send(request);
                                true
                            }
                            Err(_) => {
                                reply_closed(worker, request);
                                false
                            }
                        },
                        () = self.shutdown_token.cancelled() => {
                            tracing::debug!("Shutdown while waiting on worker {worker} queue");
                            let _ = request.reply.send(Err(Error::ServiceShutdown));
                            false
                        }
                    }
                }
            },
            Err(TrySendError::Closed(request)) => {
                reply_closed(worker, request);
                false
            }
        };

        if handed {
            self.pool.increment_load(worker)?;
        }
        self.pool.insert(worker)?;
        debug_assert!(self.pool.is_consistent());

        Ok(handed.then_some(worker))
    }

    /// Records that `worker` finished one request and re-sorts it.
    ///
    /// The worker is pulled out at its recorded heap position and re-inserted
    /// with the lower load, instead of decreasing its key in place.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvariantViolation`] for an unknown worker, a worker
    /// with no outstanding requests, or a stale heap position.
    pub fn completed(&mut self, worker: WorkerId) -> Result<()> {
        match self.pool.load(worker) {
            None => return Err(Error::invariant(format!("completion from unknown worker {worker}"))),
            Some(0) => {
                return Err(Error::invariant(format!(
                    "completion from worker {worker} with no outstanding requests"
                )));
            }
            Some(_) => {}
        }

        let pos = self
            .pool
            .position(worker)
            .ok_or_else(|| Error::invariant(format!("worker {worker} has no heap position")))?;

        let removed = self.pool.remove_at(pos)?;
        if removed != worker {
            return Err(Error::invariant(format!(
                "heap position {pos} held worker {removed}, expected worker {worker}"
            )));
        }

        self.pool.decrement_load(worker)?;
        self.pool.insert(worker)?;
        debug_assert!(self.pool.is_consistent());

        Ok(())
    }

    fn control(&self, message: Control) {
        match message {
            Control::Snapshot { reply } => {
                if reply.send(self.pool.stats()).is_err() {
                    tracing::trace!("Snapshot requester went away");
                }
            }
        }
    }

    /// Runs the event loop until the shutdown token fires or every input
    /// closes.
    ///
    /// # Errors
    ///
    /// Stops and returns the first [`Error::InvariantViolation`]. Continuing
    /// would schedule against a corrupt heap.
    pub async fn run(
        mut self,
        mut requests: mpsc::Receiver<WorkRequest<I, O>>,
        mut completions: mpsc::UnboundedReceiver<WorkerId>,
        mut control: mpsc::Receiver<Control>,
    ) -> Result<()> {
        tracing::debug!("Dispatcher started with {} workers", self.pool.len());
        let shutdown_token = self.shutdown_token.clone();

        loop {
            let outcome = tokio::select! {
                () = shutdown_token.cancelled() => {
                    tracing::debug!("Dispatcher shutdown via cancellation token");
                    break;
                }
                Some(request) = requests.recv() => self.dispatch(request).await.map(|_| ()),
                Some(worker) = completions.recv() => self.completed(worker),
                Some(message) = control.recv() => {
                    self.control(message);
                    Ok(())
                }
                else => {
                    tracing::debug!("Dispatcher inputs closed");
                    break;
                }
            };

            if let Err(e) = outcome {
                tracing::error!("Stopping dispatcher: {e}");
                return Err(e);
            }

            if tracing::enabled!(tracing::Level::TRACE) {
                tracing::trace!("Pool: {}", self.pool.stats());
            }
        }

        tracing::debug!("Dispatcher stopped");
        Ok(())
    }
}

fn reply_closed<I, O>(worker: WorkerId, request: WorkRequest<I, O>) {
    tracing::warn!("Worker {worker} queue closed, dropping request");
    let _ = request.reply.send(Err(Error::ChannelError {
        context: format!("Worker {worker} channel closed"),
    }));
}
