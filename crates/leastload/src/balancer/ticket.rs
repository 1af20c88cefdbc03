use super::Shared;
use crate::error::{Error, Result};
use core::{
    future::Future,
    pin::Pin,
    task::{Context, Poll, ready},
};
use pin_project_lite::pin_project;
use portable_atomic::Ordering;
use std::sync::Arc;
use tokio::sync::oneshot;

pin_project! {
    /// Pending result of an enqueued request.
    ///
    /// Resolves exactly once: to the task's output, to the error the
    /// dispatcher or worker reported, or to [`Error::ChannelError`] if the
    /// request was dropped before anyone answered it (e.g. during shutdown).
    /// The request counts as in flight until the ticket resolves or is
    /// dropped, whichever comes first.
    #[must_use = "a ticket does nothing unless awaited"]
    pub struct Ticket<O> {
        #[pin]
        rx: oneshot::Receiver<Result<O>>,
        inflight: Option<InflightGuard>,
    }
}

impl<O> Ticket<O> {
    pub(super) fn new(rx: oneshot::Receiver<Result<O>>, shared: Arc<Shared>) -> Self {
        shared.inflight.fetch_add(1, Ordering::AcqRel);
        Self {
            rx,
            inflight: Some(InflightGuard(shared)),
        }
    }
}

impl<O> Future for Ticket<O> {
    type Output = Result<O>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let received = ready!(this.rx.poll(cx));
        this.inflight.take();

        Poll::Ready(received.unwrap_or_else(|_| {
            Err(Error::ChannelError {
                context: "Request dropped before a result was delivered".to_string(),
            })
        }))
    }
}

struct InflightGuard(Arc<Shared>);

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.0.inflight.fetch_sub(1, Ordering::AcqRel);
    }
}
