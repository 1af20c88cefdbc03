//! The pluggable unit of work executed by workers.

use core::fmt;

/// Failure reported by a [`Task`]. Delivered to the client as
/// [`Error::TaskFailed`](crate::Error::TaskFailed).
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct TaskError {
    reason: String,
}

impl TaskError {
    pub fn new(reason: impl fmt::Display) -> Self {
        Self {
            reason: reason.to_string(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// A synchronous computation run by a worker for each request.
///
/// One instance is shared by every worker, hence `Send + Sync`. Any
/// `Fn(I) -> Result<O, TaskError>` closure is a `Task<I>`.
///
/// # Example
///
/// ```
/// use leastload::{Task, TaskError};
///
/// struct Sine;
///
/// impl Task<i32> for Sine {
///     type Output = f64;
///
///     fn run(&self, input: i32) -> Result<f64, TaskError> {
///         Ok(f64::from(input).sin())
///     }
/// }
///
/// assert_eq!(Sine.run(0), Ok(0.0));
/// ```
pub trait Task<I>: Send + Sync + 'static {
    type Output: Send + 'static;

    fn run(&self, input: I) -> Result<Self::Output, TaskError>;
}

impl<I, O, F> Task<I> for F
where
    F: Fn(I) -> Result<O, TaskError> + Send + Sync + 'static,
    O: Send + 'static,
{
    type Output = O;

    fn run(&self, input: I) -> Result<O, TaskError> {
        self(input)
    }
}
