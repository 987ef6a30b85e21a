//! The immutable domain event.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A named record of which entities (by role) an occurrence affected.
///
/// Events are facts: once built they never change. The entity table is owned
/// by the event, so mutating the map an event was built from, or a map handed
/// out by [`Event::to_map`], never reaches the event itself.
///
/// Equality and hashing are structural: same name and same set of
/// `(role, id)` pairs, independent of insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Event<T> {
    name: String,
    entities: BTreeMap<String, T>,
}

impl<T> Event<T> {
    pub fn new<I, K>(name: impl Into<String>, entities: I) -> Self
    where
        I: IntoIterator<Item = (K, T)>,
        K: Into<String>,
    {
        Self {
            name: name.into(),
            entities: entities.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// An event that carries no entity identifiers.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entities: BTreeMap::new(),
        }
    }

    /// Canonical event-type key (see [`crate::names::event_key`]).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identifier stored under `role`, if any.
    pub fn id_of(&self, role: &str) -> Option<&T> {
        self.entities.get(role)
    }

    /// Borrowing iterator over `(role, id)` pairs, ordered by role.
    pub fn entities(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entities.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl<T: Clone> Event<T> {
    /// Copy of the entity table. Changes to the returned map stay local.
    pub fn to_map(&self) -> BTreeMap<String, T> {
        self.entities.clone()
    }
}

impl<T: core::fmt::Display> core::fmt::Display for Event<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}{{", self.name)?;
        for (i, (role, id)) in self.entities.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{role}: {id}")?;
        }
        f.write_str("}")
    }
}
