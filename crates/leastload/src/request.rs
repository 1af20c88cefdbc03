use crate::{error::Result, pool::PoolStats};
use tokio::sync::oneshot;

/// A unit of work travelling from a client to exactly one worker.
///
/// - `payload`: Input handed to the task function.
/// - `reply`: Write-once slot for the result. The worker sends on it exactly
///   once and never reads it back; the client awaits the paired receiver.
#[derive(Debug)]
pub struct WorkRequest<I, O> {
    pub payload: I,
    pub reply: oneshot::Sender<Result<O>>,
}

impl<I, O> WorkRequest<I, O> {
    /// Creates a request and the receiver its result will arrive on.
    pub fn new(payload: I) -> (Self, oneshot::Receiver<Result<O>>) {
        let (reply, rx) = oneshot::channel();
        (Self { payload, reply }, rx)
    }
}

/// Read-only queries answered by the dispatcher loop.
///
/// Queries never mutate the pool; they exist so that pool state can be
/// observed without sharing it outside the dispatcher.
#[derive(Debug)]
pub enum Control {
    /// Reply with a [`PoolStats`] snapshot.
    Snapshot { reply: oneshot::Sender<PoolStats> },
}
