//! Entity-role rename table used when folding several events into one.

use std::collections::HashMap;

/// Per `(event type, entity role)` rename rules.
///
/// When identifiers from several events are folded into one aggregated event,
/// roles that collide (or that should read differently in the result) are
/// renamed through this table. Lookups without a matching rule return the
/// original role unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityMapping {
    rules: HashMap<String, HashMap<String, String>>,
}

impl EntityMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite one rename rule.
    pub fn set(
        &mut self,
        event_type: impl Into<String>,
        original: impl Into<String>,
        target: impl Into<String>,
    ) {
        self.rules
            .entry(event_type.into())
            .or_default()
            .insert(original.into(), target.into());
    }

    /// Chaining form of [`EntityMapping::set`].
    pub fn with(
        mut self,
        event_type: impl Into<String>,
        original: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        self.set(event_type, original, target);
        self
    }

    /// Target role for `original` in events of `event_type`.
    pub fn get<'a>(&'a self, event_type: &str, original: &'a str) -> &'a str {
        self.rules
            .get(event_type)
            .and_then(|roles| roles.get(original))
            .map(String::as_str)
            .unwrap_or(original)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.values().all(HashMap::is_empty)
    }
}
