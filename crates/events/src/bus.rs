//! Publish/subscribe abstraction (mechanics only).
//!
//! A multicast source fans every notification out to the listeners registered
//! at the moment of publication. There is no replay: a listener that
//! subscribes late never sees earlier notifications.
//!
//! A notification is either a value or a [`StreamError`]. Both travel on the
//! same channel so a listener observes them in the order they were published.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::mpsc;
use tokio_stream::Stream;

use crate::error::StreamError;

/// One item on a stream: a value or an error notification.
pub type Notification<M> = Result<M, StreamError>;

/// Boxed stream of notifications, the common currency between sources,
/// derived streams and projections.
pub type BoxStream<M> = Pin<Box<dyn Stream<Item = Notification<M>> + Send + 'static>>;

/// A listener's handle on a multicast source.
///
/// The subscription is a [`Stream`]: it yields notifications in publish order
/// and ends once the source is closed (or dropped) and the queue is drained.
/// Dropping the subscription unregisters the listener on the next publish.
///
/// ## Usage Pattern
///
/// ```ignore
/// let mut sub = source.subscribe();
/// while let Some(notification) = sub.next().await {
///     match notification {
///         Ok(value) => handle(value),
///         Err(err) => report(err),
///     }
/// }
/// ```
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: mpsc::UnboundedReceiver<Notification<M>>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: mpsc::UnboundedReceiver<Notification<M>>) -> Self {
        Self { receiver }
    }

    /// A subscription that is already complete.
    pub fn closed() -> Self {
        let (_, rx) = mpsc::unbounded_channel();
        Self::new(rx)
    }

    /// Wait for the next notification; `None` once the source is closed.
    pub async fn recv(&mut self) -> Option<Notification<M>> {
        self.receiver.recv().await
    }

    /// Take the next notification if one is already queued.
    pub fn try_recv(&mut self) -> Result<Notification<M>, mpsc::error::TryRecvError> {
        self.receiver.try_recv()
    }

    pub fn boxed(self) -> BoxStream<M>
    where
        M: Send + 'static,
    {
        Box::pin(self)
    }
}

impl<M> Stream for Subscription<M> {
    type Item = Notification<M>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

/// Publish side of a multicast source.
///
/// `publish` and `error` hand one notification to every current listener.
/// Failures only report that the source can no longer deliver (closed or
/// internally broken); they never depend on whether anyone is listening.
///
/// ## Thread Safety
///
/// The trait requires `Send + Sync` so one sink can be shared by every
/// producer of a stream.
pub trait EventSink<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn error(&self, error: StreamError) -> Result<(), Self::Error>;
}

impl<M, S> EventSink<M> for Arc<S>
where
    S: EventSink<M> + ?Sized,
{
    type Error = S::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn error(&self, error: StreamError) -> Result<(), Self::Error> {
        (**self).error(error)
    }
}
