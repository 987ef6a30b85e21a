//! Core error model.

use thiserror::Error;

/// Result type used across the core primitives.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while building core primitives.
///
/// These are programmer-misuse conditions (bad configuration, malformed
/// identifiers). They are reported at construction time and never travel on an
/// event stream.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A set of event names normalized to nothing.
    #[error("at least one event name is required")]
    EmptyEventNames,

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl CoreError {
    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}
