//! Query-driven projections over an event stream.

use std::marker::PhantomData;
use std::sync::Arc;

use tokio::task::{AbortHandle, JoinHandle};
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, warn};

use eventlens_core::{Event, EventNames, IntoEventNames};

use crate::bus::{EventSink, Notification, Subscription};
use crate::config::ProjectionConfig;
use crate::error::{BusError, ProjectionError, StreamError};
use crate::in_memory_bus::{Broadcaster, DeliveryMode};
use crate::query::Query;

/// A live binding of a [`Query`] to an event stream.
///
/// Projections turn a stream of domain events into a stream of query results:
/// the initial result of [`Query::execute`] followed by an updated result for
/// every event whose name is one of the projection's event names.
///
/// ## Lifecycle
///
/// 1. **Idle**: constructed, never started. `stop` is a no-op.
/// 2. **Running**: [`start`](Projection::start) subscribed to an incoming
///    stream. Matching events are handed to [`Query::execute_on`] one at a
///    time, so results keep the order of their triggering events. The initial
///    load runs concurrently; its result may land before or after results of
///    events that arrived while it was in flight.
/// 3. **Stopped**: [`stop`](Projection::stop) cancelled the subscription and
///    closed the output stream. Listeners see the stream end; results of
///    queries still in flight are discarded. A stopped projection cannot be
///    started again.
///
/// Calling `start` on a running projection cancels the previous subscription
/// before installing the new one.
///
/// ## Error Handling
///
/// A failing query never ends the projection. The failure is published as a
/// [`StreamError::Query`] notification on the output stream and later events
/// are processed as usual. Error notifications arriving on the incoming stream
/// are forwarded verbatim. `Ok(None)` from a query publishes nothing.
///
/// ## Delivery
///
/// The output stream is a multicast source; listeners obtained from
/// [`stream`](Projection::stream) only see results published after they
/// subscribed. Whether results are queued on listeners immediately or on a
/// later scheduling turn is fixed at construction ([`DeliveryMode`]).
pub struct Projection<T, Q>
where
    T: Send + Sync + 'static,
    Q: Query<T>,
{
    query: Arc<Q>,
    event_names: EventNames,
    output: Arc<Broadcaster<Q::Output>>,
    subscription: Option<JoinHandle<()>>,
    initial_load: Option<AbortHandle>,
    _events: PhantomData<fn(Event<T>)>,
}

impl<T, Q> Projection<T, Q>
where
    T: Send + Sync + 'static,
    Q: Query<T>,
{
    /// Bind `query` to the events named by `event_names`, with deferred delivery.
    pub fn new(query: Q, event_names: impl IntoEventNames) -> Result<Self, ProjectionError> {
        Self::with_mode(query, event_names, DeliveryMode::default())
    }

    pub fn with_mode(
        query: Q,
        event_names: impl IntoEventNames,
        mode: DeliveryMode,
    ) -> Result<Self, ProjectionError> {
        Ok(Self {
            query: Arc::new(query),
            event_names: EventNames::new(event_names)?,
            output: Arc::new(Broadcaster::new(mode)),
            subscription: None,
            initial_load: None,
            _events: PhantomData,
        })
    }

    pub fn from_config(
        query: Q,
        event_names: impl IntoEventNames,
        config: &ProjectionConfig,
    ) -> Result<Self, ProjectionError> {
        Self::with_mode(query, event_names, config.delivery)
    }

    pub fn event_names(&self) -> &EventNames {
        &self.event_names
    }

    pub fn delivery_mode(&self) -> DeliveryMode {
        self.output.mode()
    }

    /// True while a subscription is installed.
    pub fn is_started(&self) -> bool {
        self.subscription.is_some()
    }

    /// Register a listener on the output stream.
    pub fn stream(&self) -> Subscription<Q::Output> {
        self.output.subscribe()
    }

    /// Subscribe to `incoming` and run the initial load.
    ///
    /// Returns once the subscription is installed and the initial load has
    /// settled; event processing continues in the background.
    pub async fn start<S>(&mut self, incoming: S) -> Result<(), ProjectionError>
    where
        S: Stream<Item = Notification<Event<T>>> + Send + 'static,
    {
        let initial = self.launch(incoming)?;
        if let Err(err) = initial.await {
            if err.is_panic() {
                warn!(events = %self.event_names, "initial load panicked");
            }
        }
        Ok(())
    }

    /// Install the subscription and spawn the initial load without waiting for it.
    pub(crate) fn launch<S>(&mut self, incoming: S) -> Result<JoinHandle<()>, ProjectionError>
    where
        S: Stream<Item = Notification<Event<T>>> + Send + 'static,
    {
        if self.output.is_closed() {
            return Err(ProjectionError::Closed);
        }

        if let Some(previous) = self.subscription.take() {
            warn!(events = %self.event_names, "projection restarted; cancelling previous subscription");
            previous.abort();
        }
        if let Some(previous) = self.initial_load.take() {
            previous.abort();
        }

        self.subscription = Some(tokio::spawn(process_events(
            self.query.clone(),
            self.event_names.clone(),
            self.output.clone(),
            incoming,
        )));

        let initial = tokio::spawn(initial_load::<T, Q>(self.query.clone(), self.output.clone()));
        self.initial_load = Some(initial.abort_handle());

        debug!(events = %self.event_names, "projection started");
        Ok(initial)
    }

    /// Cancel the subscription and complete the output stream.
    ///
    /// Safe to call when never started or already stopped.
    pub async fn stop(&mut self) {
        if let Some(initial) = self.initial_load.take() {
            initial.abort();
        }

        let Some(task) = self.subscription.take() else {
            return;
        };

        self.output.close();
        task.abort();
        // Wait until the task is gone so nothing runs after `stop` returns.
        let _ = task.await;
        debug!(events = %self.event_names, "projection stopped");
    }
}

impl<T, Q> Drop for Projection<T, Q>
where
    T: Send + Sync + 'static,
    Q: Query<T>,
{
    fn drop(&mut self) {
        if let Some(initial) = self.initial_load.take() {
            initial.abort();
        }
        if let Some(task) = self.subscription.take() {
            task.abort();
            self.output.close();
        }
    }
}

impl<T, Q> core::fmt::Debug for Projection<T, Q>
where
    T: Send + Sync + 'static,
    Q: Query<T>,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Projection")
            .field("event_names", &self.event_names)
            .field("started", &self.is_started())
            .field("delivery", &self.delivery_mode())
            .finish()
    }
}

async fn process_events<T, Q, S>(
    query: Arc<Q>,
    event_names: EventNames,
    output: Arc<Broadcaster<Q::Output>>,
    incoming: S,
) where
    T: Send + Sync + 'static,
    Q: Query<T>,
    S: Stream<Item = Notification<Event<T>>> + Send + 'static,
{
    let mut incoming = Box::pin(incoming);

    while let Some(notification) = incoming.next().await {
        let delivered = match notification {
            Ok(event) if event_names.contains(event.name()) => {
                let result = <Q as Query<T>>::execute_on(&query, &event).await;
                deliver(&output, result, event.name())
            }
            Ok(_) => continue,
            Err(err) => output.error(err),
        };

        if delivered.is_err() {
            // Output closed underneath us: the projection was stopped.
            break;
        }
    }
}

async fn initial_load<T, Q>(query: Arc<Q>, output: Arc<Broadcaster<Q::Output>>)
where
    T: Send + Sync + 'static,
    Q: Query<T>,
{
    let result = <Q as Query<T>>::execute(&query).await;
    let _ = deliver(&output, result, "initial load");
}

fn deliver<D>(
    output: &Broadcaster<D>,
    result: anyhow::Result<Option<D>>,
    origin: &str,
) -> Result<(), BusError>
where
    D: Clone + Send + 'static,
{
    match result {
        Ok(Some(value)) => output.publish(value),
        Ok(None) => Ok(()),
        Err(err) => {
            warn!(origin, error = %err, "projection query failed");
            output.error(StreamError::query(err))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::stream::ObservableEventStream;

    /// Answers `"<event>:<id>"`; id 0 means "no update", id 13 fails.
    struct Catalog {
        initial: Option<&'static str>,
        fail_initial: bool,
    }

    impl Catalog {
        fn with_initial(initial: &'static str) -> Self {
            Self {
                initial: Some(initial),
                fail_initial: false,
            }
        }
    }

    #[async_trait]
    impl Query<u32> for Catalog {
        type Output = String;

        async fn execute(&self) -> anyhow::Result<Option<String>> {
            if self.fail_initial {
                anyhow::bail!("initial load failed");
            }
            Ok(self.initial.map(str::to_string))
        }

        async fn execute_on(&self, event: &Event<u32>) -> anyhow::Result<Option<String>> {
            match event.id_of("id").copied() {
                None | Some(0) => Ok(None),
                Some(13) => anyhow::bail!("unlucky {}", event.name()),
                Some(id) => Ok(Some(format!("{}:{id}", event.name()))),
            }
        }
    }

    /// Takes a second to answer event queries.
    struct Slow;

    #[async_trait]
    impl Query<u32> for Slow {
        type Output = String;

        async fn execute(&self) -> anyhow::Result<Option<String>> {
            Ok(None)
        }

        async fn execute_on(&self, event: &Event<u32>) -> anyhow::Result<Option<String>> {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(Some(event.name().to_string()))
        }
    }

    fn ev(name: &str, id: u32) -> Event<u32> {
        Event::new(name, [("id", id)])
    }

    async fn next_value(out: &mut Subscription<String>) -> String {
        out.next().await.expect("stream ended").expect("unexpected error notification")
    }

    async fn next_error(out: &mut Subscription<String>) -> StreamError {
        out.next().await.expect("stream ended").expect_err("expected an error notification")
    }

    #[tokio::test]
    async fn initial_load_is_published_without_events() {
        let events = ObservableEventStream::<u32>::new();
        let mut projection = Projection::new(Catalog::with_initial("all"), "A").unwrap();
        let mut out = projection.stream();

        projection.start(events.stream()).await.unwrap();

        assert!(projection.is_started());
        assert_eq!(next_value(&mut out).await, "all");
    }

    #[tokio::test]
    async fn initial_result_then_event_result() {
        let events = ObservableEventStream::<u32>::new();
        let mut projection = Projection::new(Catalog::with_initial("all"), "A").unwrap();
        let mut out = projection.stream();

        projection.start(events.stream()).await.unwrap();
        events.publish(ev("A", 1)).unwrap();

        assert_eq!(next_value(&mut out).await, "all");
        assert_eq!(next_value(&mut out).await, "A:1");
    }

    #[tokio::test]
    async fn only_named_events_trigger_queries() {
        let events = ObservableEventStream::<u32>::new();
        let mut projection = Projection::new(Catalog::with_initial("all"), ["A", "B"]).unwrap();
        let mut out = projection.stream();

        projection.start(events.stream()).await.unwrap();
        for e in [ev("A", 1), ev("X", 2), ev("B", 3)] {
            events.publish(e).unwrap();
        }

        assert_eq!(next_value(&mut out).await, "all");
        assert_eq!(next_value(&mut out).await, "A:1");
        assert_eq!(next_value(&mut out).await, "B:3");
    }

    #[tokio::test]
    async fn absent_results_publish_nothing() {
        let events = ObservableEventStream::<u32>::new();
        let query = Catalog {
            initial: None,
            fail_initial: false,
        };
        let mut projection = Projection::new(query, "A").unwrap();
        let mut out = projection.stream();

        projection.start(events.stream()).await.unwrap();
        events.publish(ev("A", 0)).unwrap();
        events.publish(ev("A", 5)).unwrap();

        // Neither the empty initial load nor the id-0 event produced output.
        assert_eq!(next_value(&mut out).await, "A:5");
    }

    #[tokio::test]
    async fn query_errors_are_forwarded_and_processing_continues() {
        let events = ObservableEventStream::<u32>::new();
        let mut projection = Projection::new(Catalog::with_initial("all"), "A").unwrap();
        let mut out = projection.stream();

        projection.start(events.stream()).await.unwrap();
        events.publish(ev("A", 13)).unwrap();
        events.publish(ev("A", 2)).unwrap();

        assert_eq!(next_value(&mut out).await, "all");
        let err = next_error(&mut out).await;
        assert!(matches!(err, StreamError::Query(_)));
        assert_eq!(err.cause().to_string(), "unlucky A");
        assert_eq!(next_value(&mut out).await, "A:2");
        assert!(projection.is_started());
    }

    #[tokio::test]
    async fn initial_load_errors_are_forwarded() {
        let events = ObservableEventStream::<u32>::new();
        let query = Catalog {
            initial: None,
            fail_initial: true,
        };
        let mut projection = Projection::new(query, "A").unwrap();
        let mut out = projection.stream();

        projection.start(events.stream()).await.unwrap();
        events.publish(ev("A", 4)).unwrap();

        let err = next_error(&mut out).await;
        assert_eq!(err.to_string(), "query failed: initial load failed");
        assert_eq!(next_value(&mut out).await, "A:4");
    }

    #[tokio::test]
    async fn incoming_errors_are_forwarded() {
        let events = ObservableEventStream::<u32>::new();
        let mut projection = Projection::new(Catalog::with_initial("all"), "A").unwrap();
        let mut out = projection.stream();

        projection.start(events.stream()).await.unwrap();
        events.error(anyhow::anyhow!("upstream broke").into()).unwrap();
        events.publish(ev("A", 1)).unwrap();

        assert_eq!(next_value(&mut out).await, "all");
        let err = next_error(&mut out).await;
        assert!(matches!(err, StreamError::Published(_)));
        assert_eq!(next_value(&mut out).await, "A:1");
    }

    #[tokio::test]
    async fn stop_before_start_is_a_no_op() {
        let mut projection = Projection::new(Catalog::with_initial("all"), "A").unwrap();
        projection.stop().await;
        projection.stop().await;
        assert!(!projection.is_started());
    }

    #[tokio::test]
    async fn stop_completes_output_and_detaches_input() {
        let events = ObservableEventStream::<u32>::new();
        let mut projection = Projection::new(Catalog::with_initial("all"), "A").unwrap();
        let mut out = projection.stream();

        projection.start(events.stream()).await.unwrap();
        assert_eq!(next_value(&mut out).await, "all");

        projection.stop().await;
        assert!(!projection.is_started());

        events.publish(ev("A", 1)).unwrap();
        assert!(out.next().await.is_none());

        projection.stop().await;
    }

    #[tokio::test]
    async fn stop_still_delivers_results_published_before_it() {
        let events = ObservableEventStream::<u32>::new();
        let mut projection = Projection::new(Catalog::with_initial("all"), "A").unwrap();
        assert_eq!(projection.delivery_mode(), DeliveryMode::Deferred);
        let mut out = projection.stream();

        projection.start(events.stream()).await.unwrap();
        projection.stop().await;

        assert_eq!(next_value(&mut out).await, "all");
        assert!(out.next().await.is_none());
    }

    #[tokio::test]
    async fn start_after_stop_is_rejected() {
        let events = ObservableEventStream::<u32>::new();
        let mut projection = Projection::new(Catalog::with_initial("all"), "A").unwrap();

        projection.start(events.stream()).await.unwrap();
        projection.stop().await;

        let err = projection.start(events.stream()).await.unwrap_err();
        assert_eq!(err, ProjectionError::Closed);
    }

    #[tokio::test]
    async fn restart_replaces_previous_subscription() {
        let first = ObservableEventStream::<u32>::new();
        let second = ObservableEventStream::<u32>::new();
        let mut projection = Projection::new(Catalog::with_initial("all"), "A").unwrap();
        let mut out = projection.stream();

        projection.start(first.stream()).await.unwrap();
        projection.start(second.stream()).await.unwrap();
        assert!(projection.is_started());

        first.publish(ev("A", 1)).unwrap();
        second.publish(ev("A", 2)).unwrap();

        assert_eq!(next_value(&mut out).await, "all");
        assert_eq!(next_value(&mut out).await, "all");
        assert_eq!(next_value(&mut out).await, "A:2");

        projection.stop().await;
        assert!(out.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_results_are_discarded_after_stop() {
        let events = ObservableEventStream::<u32>::new();
        let mut projection = Projection::new(Slow, "A").unwrap();
        let mut out = projection.stream();

        projection.start(events.stream()).await.unwrap();
        events.publish(ev("A", 1)).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        projection.stop().await;
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(out.next().await.is_none());
    }

    #[tokio::test]
    async fn immediate_mode_queues_initial_result_before_start_returns() {
        let events = ObservableEventStream::<u32>::new();
        let mut projection =
            Projection::with_mode(Catalog::with_initial("all"), "A", DeliveryMode::Immediate).unwrap();
        assert_eq!(projection.delivery_mode(), DeliveryMode::Immediate);
        let mut out = projection.stream();

        projection.start(events.stream()).await.unwrap();

        assert_eq!(out.try_recv().unwrap().unwrap(), "all");
    }

    #[tokio::test]
    async fn config_selects_delivery_mode() {
        let config = ProjectionConfig {
            delivery: DeliveryMode::Immediate,
        };
        let projection = Projection::from_config(Catalog::with_initial("all"), "A", &config).unwrap();
        assert_eq!(projection.delivery_mode(), DeliveryMode::Immediate);

        let projection = Projection::new(Catalog::with_initial("all"), "A").unwrap();
        assert_eq!(projection.delivery_mode(), DeliveryMode::Deferred);
    }

    #[test]
    fn empty_event_names_are_rejected() {
        let err = Projection::new(Catalog::with_initial("all"), Vec::<String>::new()).unwrap_err();
        assert!(matches!(err, ProjectionError::Core(_)));
    }
}
