use crate::error::{Error, Result};
use core::time::Duration;

/// What the dispatcher does when the least loaded worker's queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum Backpressure {
    /// Answer the client with [`Error::Overloaded`] and leave the worker's load
    /// unchanged.
    Reject,
    /// Wait inside the dispatcher until the queue has room. Every other event
    /// is held back meanwhile.
    #[default]
    Wait,
}

/// Startup configuration for a [`Balancer`](crate::Balancer).
///
/// Size `queue_capacity` for the maximum number of concurrently live clients
/// to keep dispatch non-blocking.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BalancerConfig {
    /// Number of parallel workers.
    pub worker_count: usize,
    /// Requests buffered per worker before its queue is full.
    pub queue_capacity: usize,
    /// Capacity of the shared intake channel feeding the dispatcher.
    pub intake_capacity: usize,
    /// Over-capacity policy for worker queues.
    pub backpressure: Backpressure,
    /// How long shutdown waits for in-flight requests before cancelling.
    pub shutdown_timeout: Duration,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            worker_count: 10,
            queue_capacity: 1000,
            intake_capacity: 1024,
            backpressure: Backpressure::Wait,
            shutdown_timeout: Duration::from_secs(3),
        }
    }
}

impl BalancerConfig {
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if any count or capacity is zero.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("worker_count", self.worker_count),
            ("queue_capacity", self.queue_capacity),
            ("intake_capacity", self.intake_capacity),
        ];

        for (name, value) in fields {
            if value == 0 {
                return Err(Error::InvalidConfig {
                    reason: format!("{name} must be greater than 0"),
                });
            }
        }

        Ok(())
    }
}
