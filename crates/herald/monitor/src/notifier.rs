//! Notifiers bind detected values to a delivery channel.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use herald_pipeline::Data;
use herald_types::{Notification, NotificationSink, ResourceId, SinkError};

use crate::dispatch::Addressing;

type Prepare<R, T> = Arc<dyn Fn(&Data<R, T>) -> Prepared + Send + Sync>;
type TypeOf<R, T> = Arc<dyn Fn(&Data<R, T>) -> Option<String> + Send + Sync>;
type PushFn = Arc<dyn Fn(Vec<ResourceId>) -> BoxFuture<'static, Result<(), SinkError>> + Send + Sync>;

/// A notification built for one detected value, ready to push in chunks.
#[derive(Clone)]
pub(crate) struct Prepared {
    push: PushFn,
}

impl Prepared {
    pub(crate) fn push(&self, recipients: Vec<ResourceId>) -> BoxFuture<'static, Result<(), SinkError>> {
        (self.push)(recipients)
    }
}

/// Builds a sink-specific notification from each detected value and hands it
/// to that sink.
pub struct Notifier<R, T> {
    name: String,
    prepare: Prepare<R, T>,
    addressing: Option<Addressing<R, T>>,
    type_of: Option<TypeOf<R, T>>,
    required_channel: Option<String>,
}

impl<R, T> Notifier<R, T>
where
    R: Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    /// A notifier building an `N` for `sink` with `build`.
    pub fn new<N, B>(name: impl Into<String>, sink: Arc<dyn NotificationSink<N>>, build: B) -> Self
    where
        N: Send + Sync + 'static,
        B: Fn(&Data<R, T>) -> N + Send + Sync + 'static,
    {
        let prepare = move |data: &Data<R, T>| {
            let notification = Arc::new(build(data));
            let sink = Arc::clone(&sink);
            Prepared {
                push: Arc::new(move |recipients: Vec<ResourceId>| {
                    let sink = Arc::clone(&sink);
                    let notification = Arc::clone(&notification);
                    async move { sink.push(&notification, &recipients).await }.boxed()
                }),
            }
        };

        Self {
            name: name.into(),
            prepare: Arc::new(prepare),
            addressing: None,
            type_of: None,
            required_channel: None,
        }
    }

    /// Send recipients to these resources instead of the route strategy.
    pub fn to(mut self, addressing: Addressing<R, T>) -> Self {
        self.addressing = Some(addressing);
        self
    }

    /// Notification type id used for subscription checks.
    pub fn with_type_id(mut self, type_id: impl Into<String>) -> Self {
        let type_id = type_id.into();
        self.type_of = Some(Arc::new(move |_: &Data<R, T>| Some(type_id.clone())));
        self
    }

    /// Only deliver to subscribers with a contact on `channel`.
    pub fn requires_channel(mut self, channel: impl Into<String>) -> Self {
        self.required_channel = Some(channel.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn addressing(&self) -> Option<&Addressing<R, T>> {
        self.addressing.as_ref()
    }

    pub fn required_channel(&self) -> Option<&str> {
        self.required_channel.as_deref()
    }

    pub(crate) fn type_id(&self, data: &Data<R, T>) -> Option<String> {
        self.type_of.as_ref().and_then(|type_of| type_of(data))
    }

    pub(crate) fn prepare(&self, data: &Data<R, T>) -> Prepared {
        (self.prepare)(data)
    }
}

impl<T> Notifier<Notification, T>
where
    T: Send + Sync + 'static,
{
    /// Forward pipeline-built [`Notification`]s to `sink` unchanged.
    ///
    /// The notification's own `type_id` drives subscription checks.
    pub fn forward(name: impl Into<String>, sink: Arc<dyn NotificationSink<Notification>>) -> Self {
        let mut notifier = Self::new(name, sink, |data: &Data<Notification, T>| data.value.clone());
        notifier.type_of = Some(Arc::new(|data: &Data<Notification, T>| data.value.type_id.clone()));
        notifier
    }
}

impl<R, T> fmt::Debug for Notifier<R, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("name", &self.name)
            .field("addressing", &self.addressing)
            .field("required_channel", &self.required_channel)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_types::{sink_fn, NotificationContent, SourceData};
    use parking_lot::Mutex;

    #[tokio::test]
    async fn test_prepare_builds_once_and_pushes_chunks() {
        let seen: Arc<Mutex<Vec<(String, Vec<ResourceId>)>>> = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let sink: Arc<dyn NotificationSink<String>> = Arc::new(sink_fn(move |n: String, to: Vec<ResourceId>| {
            let log = Arc::clone(&log);
            async move {
                log.lock().push((n, to));
                Ok::<(), SinkError>(())
            }
        }));

        let notifier: Notifier<f64, ()> =
            Notifier::new("chat", sink, |data: &Data<f64, ()>| format!("value {}", data.value));
        let data = Data::new(2.5, Arc::new(SourceData::for_resource("a", ())));

        let prepared = notifier.prepare(&data);
        prepared.push(vec!["a".into()]).await.unwrap();
        prepared.push(vec!["b".into()]).await.unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, "value 2.5");
        assert_eq!(seen[1].1, vec![ResourceId::new("b")]);
    }

    #[test]
    fn test_forward_uses_notification_type_id() {
        let sink: Arc<dyn NotificationSink<Notification>> =
            Arc::new(sink_fn(|_: Notification, _: Vec<ResourceId>| async { Ok::<(), SinkError>(()) }));
        let notifier: Notifier<Notification, ()> = Notifier::forward("email", sink);

        let notification = Notification::info(NotificationContent::new("t", "m")).with_type_id("digest");
        let data = Data::new(notification, Arc::new(SourceData::for_resource("a", ())));
        assert_eq!(notifier.type_id(&data).as_deref(), Some("digest"));
    }

    #[test]
    fn test_with_type_id_is_constant() {
        let sink: Arc<dyn NotificationSink<u8>> = Arc::new(sink_fn(|_: u8, _: Vec<ResourceId>| async { Ok::<(), SinkError>(()) }));
        let notifier: Notifier<u8, ()> = Notifier::new("n", sink, |d: &Data<u8, ()>| d.value)
            .with_type_id("alert")
            .requires_channel("sms");

        let data = Data::new(1, Arc::new(SourceData::for_resource("a", ())));
        assert_eq!(notifier.type_id(&data).as_deref(), Some("alert"));
        assert_eq!(notifier.required_channel(), Some("sms"));
    }
}
