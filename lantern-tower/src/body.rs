use std::pin::Pin;
use std::task::{ready, Context, Poll};

use http_body::{Body, Frame, SizeHint};
use lantern_core::{BodyFormat, EventGuard, Transaction};

use crate::Completion;

/// Name of the event recording the time spent producing the response body.
pub const RESPONSE_BODY_EVENT: &str = "process_response_body.http";

/// A response body that records how long it takes to be produced.
///
/// A single [`RESPONSE_BODY_EVENT`] event is started when the body is polled
/// for the first time and stopped once the body ends, fails or is dropped.
/// If the request owns its transaction, the transaction is completed at the
/// same point.
#[pin_project::pin_project]
pub struct BodyWrapper<B> {
    #[pin]
    inner: B,
    pending: Option<Transaction>,
    event: Option<EventGuard>,
    completion: Option<Completion>,
}

impl<B> BodyWrapper<B> {
    /// Wraps a body without recording anything.
    pub fn passthrough(inner: B) -> Self {
        BodyWrapper {
            inner,
            pending: None,
            event: None,
            completion: None,
        }
    }

    /// Wraps a body, recording the body event on `transaction`.
    pub fn new(inner: B, transaction: Transaction) -> Self {
        BodyWrapper {
            pending: Some(transaction),
            ..Self::passthrough(inner)
        }
    }

    pub(crate) fn completing(mut self, completion: Option<Completion>) -> Self {
        self.completion = completion;
        self
    }

    /// Returns `true` if this wrapper records an event.
    pub fn is_recording(&self) -> bool {
        self.pending.is_some() || self.event.is_some()
    }

    /// Unwraps the inner body.
    pub fn into_inner(self) -> B {
        self.inner
    }
}

impl<B: Body> Body for BodyWrapper<B> {
    type Data = B::Data;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let mut this = self.project();
        if let Some(transaction) = this.pending.take() {
            *this.event = Some(transaction.start_event(
                RESPONSE_BODY_EVENT,
                "Process response body",
                "",
                BodyFormat::Plain,
            ));
        }

        let frame = ready!(this.inner.as_mut().poll_frame(cx));
        let finished = match &frame {
            Some(Ok(_)) => this.inner.is_end_stream(),
            Some(Err(_)) | None => true,
        };
        if finished {
            this.event.take();
            this.completion.take();
        }
        Poll::Ready(frame)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
