use crate::{
    error::{Error, Result},
    pool::WorkerId,
    request::WorkRequest,
    task::Task,
};
use std::{
    any::Any,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Worker task responsible for executing [`WorkRequest`]s one at a time.
///
/// The worker waits on its own queue, runs the shared [`Task`] synchronously,
/// writes the result to the request's reply slot, and then reports its
/// [`WorkerId`] on the completion channel. It never touches load counters;
/// those belong to the dispatcher.
///
/// # Arguments
///
/// - `worker_id`: Stable identity of this worker in the pool.
/// - `rx`: Receiving end of this worker's queue. The dispatcher is the only
///   sender.
/// - `completions`: Shared channel used to signal finished requests.
/// - `task`: The unit of work, shared with every other worker.
/// - `shutdown_token`: Stops the loop between requests.
///
/// The loop also exits when its queue or the completion channel closes.
pub async fn worker_loop<I, T>(
    worker_id: WorkerId,
    mut rx: mpsc::Receiver<WorkRequest<I, T::Output>>,
    completions: mpsc::UnboundedSender<WorkerId>,
    task: Arc<T>,
    shutdown_token: CancellationToken,
) where
    I: Send + 'static,
    T: Task<I>,
{
    tracing::debug!("Worker {worker_id} started");

    loop {
        let request = tokio::select! {
            () = shutdown_token.cancelled() => {
                tracing::debug!("Worker {worker_id} shutdown via cancellation token");
                break;
            }
            request = rx.recv() => match request {
                Some(request) => request,
                None => {
                    tracing::debug!("Worker {worker_id} queue closed");
                    break;
                }
            },
        };

        let WorkRequest { payload, reply } = request;
        let result = execute(task.as_ref(), payload);

        if let Err(e) = &result {
            tracing::warn!("Worker {worker_id} task failed: {e}");
        }

        if reply.send(result).is_err() {
            tracing::trace!("Worker {worker_id} reply dropped by client");
        }

        if completions.send(worker_id).is_err() {
            tracing::debug!("Worker {worker_id} exiting, dispatcher is gone");
            break;
        }
    }

    tracing::debug!("Worker {worker_id} stopped");
}

/// Runs `task`, turning a returned error or a panic into
/// [`Error::TaskFailed`] so the client always receives an outcome.
fn execute<I, T: Task<I>>(task: &T, payload: I) -> Result<T::Output> {
    match catch_unwind(AssertUnwindSafe(|| task.run(payload))) {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(Error::TaskFailed {
            reason: e.to_string(),
        }),
        Err(panic) => Err(Error::TaskFailed {
            reason: format!("task panicked: {}", panic_message(panic.as_ref())),
        }),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic payload"
    }
}
