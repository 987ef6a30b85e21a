//! Serializable configuration for aggregations and projections.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use eventlens_core::{CoreResult, EntityMapping};

use crate::in_memory_bus::DeliveryMode;
use crate::sequential::Sequential;

/// Settings for a [`Sequential`] aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequentialConfig {
    /// Name of the aggregated event.
    pub name: String,
    /// Event types that must all occur before the aggregation completes.
    pub expected: Vec<String>,
    /// Partial progress older than this is discarded. 0 disables expiry.
    #[serde(default)]
    pub timeout_ms: u64,
    /// event type -> (original role -> aggregated role)
    #[serde(default)]
    pub mapping: BTreeMap<String, BTreeMap<String, String>>,
}

impl SequentialConfig {
    pub fn new(name: impl Into<String>, expected: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            expected: expected.into_iter().map(Into::into).collect(),
            timeout_ms: 0,
            mapping: BTreeMap::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_rename(
        mut self,
        event_type: impl Into<String>,
        original: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        self.mapping
            .entry(event_type.into())
            .or_default()
            .insert(original.into(), target.into());
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn entity_mapping(&self) -> EntityMapping {
        let mut mapping = EntityMapping::new();
        for (event_type, renames) in &self.mapping {
            for (original, target) in renames {
                mapping.set(event_type.as_str(), original.as_str(), target.as_str());
            }
        }
        mapping
    }

    /// Build the strategy. Fails when `expected` is empty.
    pub fn build<T>(&self) -> CoreResult<Sequential<T>> {
        Ok(Sequential::new(self.name.clone(), self.expected.clone())?
            .with_timeout(self.timeout())
            .with_mapping(self.entity_mapping()))
    }
}

/// Settings for a [`Projection`](crate::projection::Projection).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionConfig {
    #[serde(default)]
    pub delivery: DeliveryMode,
}
