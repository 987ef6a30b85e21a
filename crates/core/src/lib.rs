//! `eventlens-core`: event primitives shared by the stream and projection layers.
//!
//! This crate is synchronous and free of runtime concerns.

pub mod error;
pub mod event;
pub mod id;
pub mod mapping;
pub mod names;

pub use error::{CoreError, CoreResult};
pub use event::Event;
pub use id::EntityId;
pub use mapping::EntityMapping;
pub use names::{EventNames, IntoEventNames, TypeTag, event_key};
