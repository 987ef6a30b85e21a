//! The query contract a projection calls into.

use std::sync::Arc;

use async_trait::async_trait;

use eventlens_core::Event;

/// Data access behind a projection.
///
/// `execute` produces the initial result; `execute_on` produces an updated
/// result in response to one event. `Ok(None)` means "nothing to publish" and
/// is not an error. `Err` is a query failure; the projection forwards it as an
/// error notification and keeps processing later events.
#[async_trait]
pub trait Query<T>: Send + Sync + 'static
where
    T: Send + Sync + 'static,
{
    type Output: Clone + Send + Sync + 'static;

    async fn execute(&self) -> anyhow::Result<Option<Self::Output>>;

    async fn execute_on(&self, event: &Event<T>) -> anyhow::Result<Option<Self::Output>>;
}

#[async_trait]
impl<T, Q> Query<T> for Arc<Q>
where
    T: Send + Sync + 'static,
    Q: Query<T> + ?Sized,
{
    type Output = Q::Output;

    async fn execute(&self) -> anyhow::Result<Option<Self::Output>> {
        (**self).execute().await
    }

    async fn execute_on(&self, event: &Event<T>) -> anyhow::Result<Option<Self::Output>> {
        (**self).execute_on(event).await
    }
}
