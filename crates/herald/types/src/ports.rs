//! Capability traits implemented by external collaborators.
//!
//! Data sources, subscriber stores and delivery channels live outside the
//! core; a monitor only talks to them through these traits.

use std::future::Future;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio::sync::broadcast;

use crate::error::{DirectoryResult, SinkError, SourceError};
use crate::ids::ResourceId;
use crate::source::SourceData;
use crate::subscriber::{MembershipEvent, Subscriber};

/// A data source polled on a fixed interval.
#[async_trait]
pub trait PollableDataSource<T>: Send + Sync {
    /// Fetch the current measurements for the given subscribers.
    async fn poll(&self, resource_ids: &[ResourceId]) -> Result<Vec<SourceData<T>>, SourceError>;
}

/// A data source that pushes records as they happen.
pub trait PushDataSource<T>: Send + Sync {
    /// Open a new subscription to the source.
    ///
    /// Called once per start and again after the previous stream failed or
    /// ended.
    fn subscribe(&self) -> BoxStream<'static, Result<SourceData<T>, SourceError>>;
}

/// Store of valid notification recipients.
#[async_trait]
pub trait SubscriberRepository: Send + Sync {
    /// All subscribers, optionally restricted to the given ids.
    async fn find_all(&self, resource_ids: Option<&[ResourceId]>) -> DirectoryResult<Vec<Subscriber>>;

    /// A single subscriber.
    async fn find_by_resource_id(&self, resource_id: &ResourceId) -> DirectoryResult<Option<Subscriber>>;

    /// Live membership changes, if the store publishes them.
    fn subscribe(&self) -> Option<broadcast::Receiver<MembershipEvent>> {
        None
    }
}

/// A delivery channel.
///
/// Implementations should report a failure for the recipients they could
/// not reach rather than panicking; the dispatcher aggregates failures.
#[async_trait]
pub trait NotificationSink<N: Send + Sync>: Send + Sync {
    async fn push(&self, notification: &N, recipients: &[ResourceId]) -> Result<(), SinkError>;
}

/// Poll source backed by a closure.
pub struct PollFn<F> {
    f: F,
}

/// Wrap a closure as a [`PollableDataSource`].
pub fn poll_fn<F>(f: F) -> PollFn<F> {
    PollFn { f }
}

#[async_trait]
impl<T, F, Fut> PollableDataSource<T> for PollFn<F>
where
    T: Send + 'static,
    F: Fn(Vec<ResourceId>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<SourceData<T>>, SourceError>> + Send,
{
    async fn poll(&self, resource_ids: &[ResourceId]) -> Result<Vec<SourceData<T>>, SourceError> {
        (self.f)(resource_ids.to_vec()).await
    }
}

/// Push source backed by a closure producing a fresh stream per subscription.
pub struct PushFn<F> {
    f: F,
}

/// Wrap a stream factory as a [`PushDataSource`].
pub fn push_fn<F>(f: F) -> PushFn<F> {
    PushFn { f }
}

impl<T, F> PushDataSource<T> for PushFn<F>
where
    F: Fn() -> BoxStream<'static, Result<SourceData<T>, SourceError>> + Send + Sync,
{
    fn subscribe(&self) -> BoxStream<'static, Result<SourceData<T>, SourceError>> {
        (self.f)()
    }
}

/// Sink backed by a closure.
pub struct SinkFn<F> {
    f: F,
}

/// Wrap a closure as a [`NotificationSink`]. The notification is cloned per call.
pub fn sink_fn<F>(f: F) -> SinkFn<F> {
    SinkFn { f }
}

#[async_trait]
impl<N, F, Fut> NotificationSink<N> for SinkFn<F>
where
    N: Clone + Send + Sync + 'static,
    F: Fn(N, Vec<ResourceId>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), SinkError>> + Send,
{
    async fn push(&self, notification: &N, recipients: &[ResourceId]) -> Result<(), SinkError> {
        (self.f)(notification.clone(), recipients.to_vec()).await
    }
}
