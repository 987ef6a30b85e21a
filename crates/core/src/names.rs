//! Event-name normalization.
//!
//! Every API that filters or groups events by type accepts either one name or
//! a collection of names. Each value is converted once through [`event_key`]
//! and the resulting keys are the only form compared afterwards: two events are
//! of the same type iff their keys are equal.

use std::collections::{BTreeSet, HashSet};
use std::fmt::Display;
use std::marker::PhantomData;

use crate::error::{CoreError, CoreResult};

/// Canonical conversion of a name-like value into a matching key.
pub fn event_key<K: Display + ?Sized>(key: &K) -> String {
    key.to_string()
}

/// Type tag usable wherever an event name is expected.
///
/// The key is the unqualified type name, so `TypeTag::<OrderPlaced>::new()`
/// matches events named `"OrderPlaced"`.
pub struct TypeTag<E: ?Sized>(PhantomData<fn() -> E>);

impl<E: ?Sized> TypeTag<E> {
    pub fn new() -> Self {
        Self(PhantomData)
    }

    pub fn key(&self) -> &'static str {
        let full = std::any::type_name::<E>();
        let base = full.split('<').next().unwrap_or(full);
        base.rsplit("::").next().unwrap_or(base)
    }
}

impl<E: ?Sized> Default for TypeTag<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: ?Sized> Clone for TypeTag<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E: ?Sized> Copy for TypeTag<E> {}

impl<E: ?Sized> core::fmt::Debug for TypeTag<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("TypeTag").field(&self.key()).finish()
    }
}

impl<E: ?Sized> Display for TypeTag<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.key())
    }
}

/// A normalized, non-empty set of event-type keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventNames(BTreeSet<String>);

impl EventNames {
    /// Normalize one name or a collection of names, rejecting an empty result.
    pub fn new(names: impl IntoEventNames) -> CoreResult<Self> {
        let keys = names.into_event_names();
        if keys.is_empty() {
            return Err(CoreError::EmptyEventNames);
        }
        Ok(Self(keys))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when every key of `self` appears in `seen`.
    pub fn is_covered_by<'a>(&self, seen: impl IntoIterator<Item = &'a str>) -> bool {
        let seen: HashSet<&str> = seen.into_iter().collect();
        self.0.iter().all(|k| seen.contains(k.as_str()))
    }
}

impl core::fmt::Display for EventNames {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let joined: Vec<&str> = self.iter().collect();
        write!(f, "[{}]", joined.join(", "))
    }
}

/// Anything that can be resolved into a set of event-type keys.
///
/// Implemented for single values (`&str`, `String`, [`TypeTag`]) and for
/// collections of displayable values.
pub trait IntoEventNames {
    fn into_event_names(self) -> BTreeSet<String>;
}

impl IntoEventNames for &str {
    fn into_event_names(self) -> BTreeSet<String> {
        BTreeSet::from([event_key(self)])
    }
}

impl IntoEventNames for String {
    fn into_event_names(self) -> BTreeSet<String> {
        BTreeSet::from([self])
    }
}

impl IntoEventNames for &String {
    fn into_event_names(self) -> BTreeSet<String> {
        BTreeSet::from([event_key(self)])
    }
}

impl<E: ?Sized> IntoEventNames for TypeTag<E> {
    fn into_event_names(self) -> BTreeSet<String> {
        BTreeSet::from([event_key(&self)])
    }
}

impl IntoEventNames for EventNames {
    fn into_event_names(self) -> BTreeSet<String> {
        self.0
    }
}

impl IntoEventNames for &EventNames {
    fn into_event_names(self) -> BTreeSet<String> {
        self.0.clone()
    }
}

impl<K: Display> IntoEventNames for Vec<K> {
    fn into_event_names(self) -> BTreeSet<String> {
        self.iter().map(event_key).collect()
    }
}

impl<K: Display, const N: usize> IntoEventNames for [K; N] {
    fn into_event_names(self) -> BTreeSet<String> {
        self.iter().map(event_key).collect()
    }
}

impl<K: Display> IntoEventNames for &[K] {
    fn into_event_names(self) -> BTreeSet<String> {
        self.iter().map(event_key).collect()
    }
}

impl<K: Display> IntoEventNames for BTreeSet<K> {
    fn into_event_names(self) -> BTreeSet<String> {
        self.iter().map(event_key).collect()
    }
}

impl<K: Display, S> IntoEventNames for HashSet<K, S> {
    fn into_event_names(self) -> BTreeSet<String> {
        self.iter().map(event_key).collect()
    }
}
