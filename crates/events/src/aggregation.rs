//! Aggregation strategies: folding several related events into one.

use std::collections::BTreeMap;

use eventlens_core::{EntityMapping, Event};

/// A stateful rule deciding when a run of events forms one aggregated event.
///
/// The strategy is fed every event of a source in order. It returns the
/// synthetic event when an aggregation completes and `None` otherwise.
/// Implementations are driven from a single consumer, so `&mut self` is all the
/// synchronization they need.
pub trait AggregationStrategy<T>: Send {
    fn try_to_aggregate_on(&mut self, event: &Event<T>) -> Option<Event<T>>;
}

impl<T, F> AggregationStrategy<T> for F
where
    F: FnMut(&Event<T>) -> Option<Event<T>> + Send,
{
    fn try_to_aggregate_on(&mut self, event: &Event<T>) -> Option<Event<T>> {
        self(event)
    }
}

/// Fold `events` into one event named `name`.
///
/// Every `(role, id)` pair is written under `mapping.get(event.name(), role)`.
/// When two pairs land on the same target role, the later event in iteration
/// order wins.
pub fn aggregate<'a, T, I>(events: I, name: impl Into<String>, mapping: &EntityMapping) -> Event<T>
where
    T: Clone + 'a,
    I: IntoIterator<Item = &'a Event<T>>,
{
    let mut folded: BTreeMap<String, T> = BTreeMap::new();
    for event in events {
        for (role, id) in event.entities() {
            let target = mapping.get(event.name(), role);
            folded.insert(target.to_string(), id.clone());
        }
    }
    Event::new(name, folded)
}
