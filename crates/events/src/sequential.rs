//! The sequential aggregation strategy.

use std::time::Duration;

use tracing::debug;

use eventlens_core::{CoreResult, EntityMapping, Event, EventNames, IntoEventNames};

use crate::aggregation::{AggregationStrategy, aggregate};
use crate::clock::{Clock, SystemClock};

/// Completes once every expected event type has occurred since the last
/// completion (or reset), then folds the collected events into one.
///
/// Occurrences are tracked by type membership, not by count: seeing `A` twice
/// before `B` still completes exactly once on `B`. A repeated type replaces the
/// earlier occurrence, so the fold uses the most recent payload of each type.
///
/// With a non-zero timeout, partial progress older than the timeout is
/// discarded before the next event is considered. Only matching events refresh
/// the timeout clock. Interleaved, overlapping aggregations of the same types
/// are not supported.
#[derive(Debug)]
pub struct Sequential<T, C = SystemClock> {
    name: String,
    expected: EventNames,
    collected: Vec<Event<T>>,
    last_match_millis: i64,
    timeout: Duration,
    mapping: EntityMapping,
    clock: C,
}

impl<T> Sequential<T, SystemClock> {
    /// Aggregate `expected` into events named `name`, without timeout.
    pub fn new(name: impl Into<String>, expected: impl IntoEventNames) -> CoreResult<Self> {
        Ok(Self {
            name: name.into(),
            expected: EventNames::new(expected)?,
            collected: Vec::new(),
            last_match_millis: 0,
            timeout: Duration::ZERO,
            mapping: EntityMapping::new(),
            clock: SystemClock,
        })
    }
}

impl<T, C> Sequential<T, C> {
    /// Discard partial progress older than `timeout`. Zero disables expiry.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_mapping(mut self, mapping: EntityMapping) -> Self {
        self.mapping = mapping;
        self
    }

    pub fn with_clock<C2: Clock>(self, clock: C2) -> Sequential<T, C2> {
        Sequential {
            name: self.name,
            expected: self.expected,
            collected: self.collected,
            last_match_millis: self.last_match_millis,
            timeout: self.timeout,
            mapping: self.mapping,
            clock,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn expected(&self) -> &EventNames {
        &self.expected
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Events collected toward the next aggregation, oldest first.
    pub fn pending(&self) -> &[Event<T>] {
        &self.collected
    }

    /// Drop partial progress.
    pub fn reset(&mut self) {
        self.collected.clear();
    }

    fn timeout_millis(&self) -> i64 {
        i64::try_from(self.timeout.as_millis()).unwrap_or(i64::MAX)
    }
}

impl<T, C> Sequential<T, C>
where
    T: Clone,
    C: Clock,
{
    /// Feed one event; returns the aggregated event when this one completes it.
    pub fn on_event(&mut self, event: &Event<T>) -> Option<Event<T>> {
        let now = self.clock.now_millis();

        if !self.timeout.is_zero()
            && !self.collected.is_empty()
            && now > self.last_match_millis.saturating_add(self.timeout_millis())
        {
            debug!(
                aggregation = %self.name,
                discarded = self.collected.len(),
                "aggregation timed out; discarding partial progress"
            );
            self.collected.clear();
        }

        if self.expected.contains(event.name()) {
            self.collected.retain(|e| e.name() != event.name());
            self.collected.push(event.clone());
            self.last_match_millis = now;
        }

        if !self.expected.is_covered_by(self.collected.iter().map(Event::name)) {
            return None;
        }

        let aggregated = aggregate(&self.collected, self.name.clone(), &self.mapping);
        self.collected.clear();
        debug!(aggregation = %self.name, "aggregation completed");
        Some(aggregated)
    }
}

impl<T, C> AggregationStrategy<T> for Sequential<T, C>
where
    T: Clone + Send,
    C: Clock,
{
    fn try_to_aggregate_on(&mut self, event: &Event<T>) -> Option<Event<T>> {
        self.on_event(event)
    }
}
