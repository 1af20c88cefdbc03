//! Error types for the least-loaded dispatcher.
//!
//! This module defines the central `Error` enum shared by the heap, the worker
//! pool, the dispatcher loop and the client-facing [`Balancer`] handle.
//!
//! ## Error Cases
//! - `InvariantViolation`: heap or load bookkeeping is inconsistent. Fatal to
//!   the dispatcher.
//! - `Overloaded`: the chosen worker's queue was full and the request was
//!   rejected.
//! - `TaskFailed`: the injected task returned an error or panicked.
//! - `ChannelError`: an internal channel closed unexpectedly.
//! - `ServiceShutdown`: a request arrived while the balancer was shutting down.
//! - `InvalidConfig`: the configuration was rejected at startup.
//!
//! [`Balancer`]: crate::Balancer

use crate::pool::WorkerId;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the dispatcher.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// Pool bookkeeping is corrupt (empty pool on extraction, stale position,
    /// negative load). The dispatcher stops when it sees one of these.
    #[error("Pool invariant violated: {context}")]
    InvariantViolation { context: String },

    /// The least-loaded worker had no queue capacity left.
    #[error("Worker {worker} queue is full")]
    Overloaded { worker: WorkerId },

    /// The task function failed or panicked while handling the request.
    #[error("Task failed: {reason}")]
    TaskFailed { reason: String },

    /// Internal channel send/receive failure (e.g., closed channel).
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// The balancer is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,

    /// The configuration was rejected.
    #[error("Invalid config: {reason}")]
    InvalidConfig { reason: String },
}

impl Error {
    pub(crate) fn invariant(context: impl Into<String>) -> Self {
        Self::InvariantViolation {
            context: context.into(),
        }
    }
}
