//! Convenience constructor for projections over one shared event stream.

use eventlens_core::IntoEventNames;

use crate::error::ProjectionError;
use crate::in_memory_bus::DeliveryMode;
use crate::projection::Projection;
use crate::query::Query;
use crate::stream::ObservableEventStream;

/// Builds projections already subscribed to a shared event stream.
///
/// Projections returned by [`create`](ProjectionFactory::create) are started:
/// the subscription is installed before `create` returns, so no event published
/// afterwards is missed. The initial load runs in the background, so its
/// result only reaches output listeners registered before it is published.
/// Build with [`Projection::new`] and call `stream` before `start` when a
/// listener must see it. Must be used within a Tokio runtime.
#[derive(Debug, Clone)]
pub struct ProjectionFactory<T> {
    events: ObservableEventStream<T>,
    mode: DeliveryMode,
}

impl<T> ProjectionFactory<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(events: ObservableEventStream<T>) -> Self {
        Self::with_mode(events, DeliveryMode::default())
    }

    /// Delivery mode used for every projection this factory creates.
    pub fn with_mode(events: ObservableEventStream<T>, mode: DeliveryMode) -> Self {
        Self { events, mode }
    }

    pub fn events(&self) -> &ObservableEventStream<T> {
        &self.events
    }

    pub fn create<Q>(
        &self,
        query: Q,
        event_names: impl IntoEventNames,
    ) -> Result<Projection<T, Q>, ProjectionError>
    where
        Q: Query<T>,
    {
        self.create_with(query, event_names, self.mode)
    }

    pub fn create_with<Q>(
        &self,
        query: Q,
        event_names: impl IntoEventNames,
        mode: DeliveryMode,
    ) -> Result<Projection<T, Q>, ProjectionError>
    where
        Q: Query<T>,
    {
        let mut projection = Projection::with_mode(query, event_names, mode)?;
        // The initial load is not awaited; its handle is tracked by the projection.
        let _initial = projection.launch(self.events.stream())?;
        Ok(projection)
    }
}
