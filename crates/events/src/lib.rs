//! `eventlens-events`: multicast event streams, aggregation strategies and
//! query-driven projections.
//!
//! Domain code publishes [`Event`](eventlens_core::Event)s into an
//! [`EventStream`]. Listeners of the matching [`ObservableEventStream`] can
//! derive aggregated streams with an [`AggregationStrategy`] such as
//! [`Sequential`], and [`Projection`]s turn events into a stream of
//! [`Query`] results.

pub mod aggregation;
pub mod bus;
pub mod clock;
pub mod config;
pub mod error;
pub mod factory;
pub mod in_memory_bus;
pub mod projection;
pub mod query;
pub mod sequential;
pub mod stream;


pub use aggregation::{AggregationStrategy, aggregate};
pub use bus::{BoxStream, EventSink, Notification, Subscription};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ProjectionConfig, SequentialConfig};
pub use error::{BusError, ProjectionError, StreamError};
pub use factory::ProjectionFactory;
pub use in_memory_bus::{Broadcaster, DeliveryMode};
pub use projection::Projection;
pub use query::Query;
pub use sequential::Sequential;
pub use stream::{EventStream, ObservableEventStream};
