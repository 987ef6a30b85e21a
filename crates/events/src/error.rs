//! Error types carried by streams and raised by projections.

use std::sync::Arc;

use thiserror::Error;

use eventlens_core::CoreError;

/// An error notification travelling on a stream.
///
/// Every listener of a multicast source receives its own copy, so the
/// underlying error is shared behind an `Arc`.
#[derive(Debug, Clone, Error)]
pub enum StreamError {
    /// Pushed explicitly by domain code through a sink's `error` channel.
    #[error("{0}")]
    Published(Arc<anyhow::Error>),

    /// A projection query failed; forwarded instead of ending the projection.
    #[error("query failed: {0}")]
    Query(Arc<anyhow::Error>),
}

impl StreamError {
    pub fn published(err: impl Into<anyhow::Error>) -> Self {
        Self::Published(Arc::new(err.into()))
    }

    pub fn query(err: impl Into<anyhow::Error>) -> Self {
        Self::Query(Arc::new(err.into()))
    }

    /// The wrapped cause.
    pub fn cause(&self) -> &anyhow::Error {
        match self {
            Self::Published(e) | Self::Query(e) => e,
        }
    }
}

impl From<anyhow::Error> for StreamError {
    fn from(value: anyhow::Error) -> Self {
        Self::Published(Arc::new(value))
    }
}

/// Failure to hand a notification to a multicast source.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// Publish failed due to internal lock poisoning.
    #[error("subscriber list lock poisoned")]
    Poisoned,

    /// The source was closed; nothing published afterwards is delivered.
    #[error("stream is closed")]
    Closed,
}

/// Misuse of the projection lifecycle.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProjectionError {
    /// The projection could not be built (e.g. empty event-name set).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// `start` was called after `stop` closed the output stream.
    #[error("projection output stream is closed")]
    Closed,
}
