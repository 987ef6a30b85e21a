//! Event streams: the entry point domain code publishes into, and its
//! observable counterpart that projections and aggregations read from.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_stream::{Stream, StreamExt};
use tracing::debug;

use eventlens_core::Event;

use crate::aggregation::AggregationStrategy;
use crate::bus::{BoxStream, EventSink, Notification, Subscription};
use crate::error::{BusError, StreamError};
use crate::in_memory_bus::{Broadcaster, DeliveryMode};

/// Publish-only view of a multicast event source.
///
/// This is what domain code receives: it can publish events and error
/// notifications but cannot listen. Clones publish into the same source.
#[derive(Debug)]
pub struct EventStream<T> {
    hub: Arc<Broadcaster<Event<T>>>,
}

impl<T> Clone for EventStream<T> {
    fn clone(&self) -> Self {
        Self {
            hub: self.hub.clone(),
        }
    }
}

impl<T> EventStream<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::with_mode(DeliveryMode::Immediate)
    }

    pub fn with_mode(mode: DeliveryMode) -> Self {
        Self {
            hub: Arc::new(Broadcaster::new(mode)),
        }
    }

    /// Complete every listener. Later publishes fail with [`BusError::Closed`].
    pub fn close(&self) {
        self.hub.close();
    }

    pub fn is_closed(&self) -> bool {
        self.hub.is_closed()
    }
}

impl<T> Default for EventStream<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EventSink<Event<T>> for EventStream<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Error = BusError;

    fn publish(&self, event: Event<T>) -> Result<(), Self::Error> {
        self.hub.publish(event)
    }

    fn error(&self, error: StreamError) -> Result<(), Self::Error> {
        self.hub.error(error)
    }
}

/// An [`EventStream`] that can also be listened to.
///
/// Every call to [`stream`](ObservableEventStream::stream) registers an
/// independent listener; listeners only see events published after they
/// registered.
#[derive(Debug)]
pub struct ObservableEventStream<T> {
    sink: EventStream<T>,
}

impl<T> Clone for ObservableEventStream<T> {
    fn clone(&self) -> Self {
        Self {
            sink: self.sink.clone(),
        }
    }
}

impl<T> ObservableEventStream<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::with_mode(DeliveryMode::Immediate)
    }

    pub fn with_mode(mode: DeliveryMode) -> Self {
        Self {
            sink: EventStream::with_mode(mode),
        }
    }

    /// The publish-only view handed to domain code.
    pub fn sink(&self) -> EventStream<T> {
        self.sink.clone()
    }

    /// Register a new listener.
    pub fn stream(&self) -> Subscription<Event<T>> {
        self.sink.hub.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sink.hub.subscriber_count()
    }

    /// Derived stream of the events `strategy` builds from this source.
    ///
    /// The listener is registered immediately, so events published right
    /// after this call count toward the aggregation even before the returned
    /// stream is polled. Error notifications pass through unchanged; emissions
    /// follow the order of the events that completed them.
    pub fn aggregate<S>(&self, mut strategy: S) -> BoxStream<Event<T>>
    where
        S: AggregationStrategy<T> + 'static,
    {
        Box::pin(self.stream().filter_map(move |notification| match notification {
            Ok(event) => strategy.try_to_aggregate_on(&event).map(Ok),
            Err(err) => Some(Err(err)),
        }))
    }

    /// Publish every item of `source` into this stream.
    ///
    /// Values go through `publish`, errors through `error`. The task ends when
    /// `source` ends or this stream is closed. Must be called within a Tokio
    /// runtime.
    pub fn forward<S>(&self, source: S) -> JoinHandle<()>
    where
        S: Stream<Item = Notification<Event<T>>> + Send + 'static,
    {
        let sink = self.sink.clone();
        tokio::spawn(async move {
            let mut source = Box::pin(source);
            while let Some(notification) = source.next().await {
                let sent = match notification {
                    Ok(event) => sink.publish(event),
                    Err(err) => sink.error(err),
                };
                if let Err(err) = sent {
                    debug!(error = %err, "forward target no longer accepts events");
                    break;
                }
            }
        })
    }

    pub fn close(&self) {
        self.sink.close();
    }

    pub fn is_closed(&self) -> bool {
        self.sink.is_closed()
    }
}

impl<T> Default for ObservableEventStream<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EventSink<Event<T>> for ObservableEventStream<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Error = BusError;

    fn publish(&self, event: Event<T>) -> Result<(), Self::Error> {
        self.sink.publish(event)
    }

    fn error(&self, error: StreamError) -> Result<(), Self::Error> {
        self.sink.error(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequential::Sequential;

    fn ev(name: &str, id: u32) -> Event<u32> {
        Event::new(name, [("id", id)])
    }

    #[tokio::test]
    async fn published_events_reach_every_listener_in_order() {
        let events = ObservableEventStream::<u32>::new();
        let mut a = events.stream();
        let mut b = events.stream();
        let sink = events.sink();

        sink.publish(ev("A", 1)).unwrap();
        sink.publish(ev("B", 2)).unwrap();

        for sub in [&mut a, &mut b] {
            assert_eq!(sub.next().await.unwrap().unwrap(), ev("A", 1));
            assert_eq!(sub.next().await.unwrap().unwrap(), ev("B", 2));
        }
    }

    #[tokio::test]
    async fn errors_are_broadcast_as_notifications() {
        let events = ObservableEventStream::<u32>::new();
        let mut sub = events.stream();

        events.error(anyhow::anyhow!("invalid input").into()).unwrap();

        let err = sub.next().await.unwrap().unwrap_err();
        assert_eq!(err.to_string(), "invalid input");
    }

    #[tokio::test]
    async fn late_listeners_miss_earlier_events() {
        let events = ObservableEventStream::<u32>::new();
        events.publish(ev("A", 1)).unwrap();

        let mut late = events.stream();
        events.publish(ev("B", 2)).unwrap();
        events.close();

        assert_eq!(late.next().await.unwrap().unwrap(), ev("B", 2));
        assert!(late.next().await.is_none());
    }

    #[tokio::test]
    async fn aggregate_emits_once_per_completed_run() {
        let events = ObservableEventStream::<u32>::new();
        let mut aggregated = events.aggregate(Sequential::<u32>::new("AB", ["A", "B"]).unwrap());

        for e in [ev("A", 1), ev("A", 2), ev("B", 3), ev("A", 4), ev("B", 5)] {
            events.publish(e).unwrap();
        }
        events.close();

        let first = aggregated.next().await.unwrap().unwrap();
        let second = aggregated.next().await.unwrap().unwrap();
        assert_eq!(first.name(), "AB");
        assert_eq!(first.id_of("id"), Some(&3));
        assert_eq!(second.id_of("id"), Some(&5));
        assert!(aggregated.next().await.is_none());
    }

    #[tokio::test]
    async fn aggregate_passes_errors_through() {
        let events = ObservableEventStream::<u32>::new();
        let mut aggregated = events.aggregate(Sequential::<u32>::new("AB", ["A", "B"]).unwrap());

        events.publish(ev("A", 1)).unwrap();
        events.error(StreamError::published(anyhow::anyhow!("glitch"))).unwrap();
        events.publish(ev("B", 2)).unwrap();

        assert!(aggregated.next().await.unwrap().is_err());
        assert_eq!(aggregated.next().await.unwrap().unwrap().name(), "AB");
    }

    #[tokio::test]
    async fn forward_republishes_aggregations() {
        let source = ObservableEventStream::<u32>::new();
        let target = ObservableEventStream::<u32>::new();
        let mut out = target.stream();

        let task = target.forward(source.aggregate(Sequential::<u32>::new("AB", ["A", "B"]).unwrap()));

        source.publish(ev("A", 1)).unwrap();
        source.publish(ev("B", 2)).unwrap();

        let forwarded = out.next().await.unwrap().unwrap();
        assert_eq!(forwarded.name(), "AB");

        source.close();
        task.await.unwrap();
    }

    #[test]
    fn sink_clones_share_the_source() {
        let events = ObservableEventStream::<u32>::new();
        let mut sub = events.stream();
        let sink = events.sink();
        let copy = sink.clone();

        copy.publish(ev("A", 1)).unwrap();
        assert_eq!(sub.try_recv().unwrap().unwrap(), ev("A", 1));
        assert_eq!(events.subscriber_count(), 1);
    }
}
