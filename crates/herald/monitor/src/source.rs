//! Source tasks feeding the router.

use std::sync::Arc;
use std::time::Duration;

use futures::{future, StreamExt};
use herald_directory::CachingSubscriberRepository;
use herald_types::{
    MembershipEvent, PollableDataSource, PushDataSource, ResourceId, SourceData, SubscriberEvent,
    SubscriberRepository,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::SourceConfig;

/// The producer behind a monitor.
pub(crate) enum DataSource<T> {
    Poll(Arc<dyn PollableDataSource<T>>),
    Push(Arc<dyn PushDataSource<T>>),
    SubscriberEvents(fn(SubscriberEvent) -> T),
}

impl<T> DataSource<T>
where
    T: Send + 'static,
{
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            DataSource::Poll(_) => "poll",
            DataSource::Push(_) => "push",
            DataSource::SubscriberEvents(_) => "subscriber_events",
        }
    }

    /// Spawn the producer task sending into `records`.
    ///
    /// Resources leaving the directory are reported on `departures`. The
    /// subscriber-events source reports them after forwarding the `Removed`
    /// record itself. Membership listeners are registered before this
    /// returns, so events published right after are not missed.
    pub(crate) fn spawn(
        &self,
        directory: &Arc<CachingSubscriberRepository>,
        config: &SourceConfig,
        records: mpsc::UnboundedSender<SourceData<T>>,
        departures: mpsc::UnboundedSender<ResourceId>,
    ) -> JoinHandle<()> {
        match self {
            DataSource::Poll(source) => {
                let poll = poll_loop(
                    Arc::clone(source),
                    Arc::clone(directory),
                    config.poll_interval(),
                    records,
                );
                let watch = forward_departures(directory.subscribe(), departures);
                tokio::spawn(async move {
                    future::join(poll, watch).await;
                })
            }
            DataSource::Push(source) => {
                let push = push_loop(Arc::clone(source), config.retry_delay(), records);
                let watch = forward_departures(directory.subscribe(), departures);
                tokio::spawn(async move {
                    future::join(push, watch).await;
                })
            }
            DataSource::SubscriberEvents(convert) => {
                tokio::spawn(membership_loop(directory.subscribe(), *convert, records, departures))
            }
        }
    }
}

async fn poll_loop<T>(
    source: Arc<dyn PollableDataSource<T>>,
    directory: Arc<CachingSubscriberRepository>,
    period: Duration,
    records: mpsc::UnboundedSender<SourceData<T>>,
) where
    T: Send + 'static,
{
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let resource_ids: Vec<ResourceId> = directory.snapshot().await.keys().cloned().collect();
        match source.poll(&resource_ids).await {
            Ok(batch) => {
                debug!(resources = resource_ids.len(), records = batch.len(), "Poll tick completed");
                for record in batch {
                    if records.send(record).is_err() {
                        return;
                    }
                }
            }
            Err(error) => {
                warn!(error = %error, "Poll tick failed, waiting for the next one");
            }
        }
    }
}

async fn push_loop<T>(
    source: Arc<dyn PushDataSource<T>>,
    retry_delay: Duration,
    records: mpsc::UnboundedSender<SourceData<T>>,
) where
    T: Send + 'static,
{
    let retry_in_ms = u64::try_from(retry_delay.as_millis()).unwrap_or(u64::MAX);
    loop {
        let mut stream = source.subscribe();
        debug!("Subscribed to push source");

        loop {
            match stream.next().await {
                Some(Ok(record)) => {
                    if records.send(record).is_err() {
                        return;
                    }
                }
                Some(Err(error)) => {
                    warn!(error = %error, retry_in_ms, "Push source failed");
                    break;
                }
                None => {
                    warn!(retry_in_ms, "Push source ended");
                    break;
                }
            }
        }

        drop(stream);
        if records.is_closed() {
            return;
        }
        time::sleep(retry_delay).await;
        info!("Resubscribing to push source");
    }
}

async fn membership_loop<T>(
    events: Option<broadcast::Receiver<MembershipEvent>>,
    convert: fn(SubscriberEvent) -> T,
    records: mpsc::UnboundedSender<SourceData<T>>,
    departures: mpsc::UnboundedSender<ResourceId>,
) where
    T: Send + 'static,
{
    let Some(mut events) = events else {
        warn!("Subscriber directory publishes no membership events");
        return;
    };

    loop {
        match events.recv().await {
            Ok(event) => {
                for change in SubscriberEvent::from_membership(&event) {
                    let resource_id = change.resource_id.clone();
                    if records.send(SourceData::for_resource(resource_id, convert(change))).is_err() {
                        return;
                    }
                }
                if let MembershipEvent::Removed(ids) = event {
                    for id in ids {
                        let _ = departures.send(id);
                    }
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Missed subscriber membership events");
            }
            Err(RecvError::Closed) => {
                debug!("Subscriber membership events closed");
                return;
            }
        }
    }
}

/// Report every resource removed from the directory on `departures`.
async fn forward_departures(
    events: Option<broadcast::Receiver<MembershipEvent>>,
    departures: mpsc::UnboundedSender<ResourceId>,
) {
    let Some(mut events) = events else {
        return;
    };

    loop {
        match events.recv().await {
            Ok(MembershipEvent::Removed(ids)) => {
                for id in ids {
                    if departures.send(id).is_err() {
                        return;
                    }
                }
            }
            Ok(MembershipEvent::Added(_)) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Missed subscriber removals, some groups may outlive their resource");
            }
            Err(RecvError::Closed) => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::stream;
    use herald_directory::{DirectoryConfig, InMemorySubscriberRepository};
    use herald_types::{poll_fn, push_fn, MembershipChange, SourceError, Subscriber};

    use super::*;

    fn directory(ids: &[&str]) -> (Arc<InMemorySubscriberRepository>, Arc<CachingSubscriberRepository>) {
        let repository = Arc::new(InMemorySubscriberRepository::with_subscribers(
            ids.iter().map(|id| Subscriber::new(*id)),
        ));
        let cache = Arc::new(CachingSubscriberRepository::new(
            Arc::clone(&repository) as Arc<dyn SubscriberRepository>,
            DirectoryConfig::default(),
        ));
        (repository, cache)
    }

    fn config() -> SourceConfig {
        SourceConfig {
            poll_interval_ms: 1_000,
            retry_delay_ms: 500,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_survives_failing_tick() {
        let (_, cache) = directory(&["a", "b"]);
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let source: Arc<dyn PollableDataSource<u32>> = Arc::new(poll_fn(move |ids: Vec<ResourceId>| {
            let tick = counter.fetch_add(1, Ordering::SeqCst) as u32;
            async move {
                if tick == 1 {
                    return Err(SourceError::PollFailed("timeout".into()));
                }
                let records: Vec<SourceData<u32>> =
                    ids.into_iter().map(|id| SourceData::for_resource(id, tick)).collect();
                Ok(records)
            }
        }));

        let (tx, mut rx) = mpsc::unbounded_channel();
        let (departures, _) = mpsc::unbounded_channel();
        let task = DataSource::Poll(source).spawn(&cache, &config(), tx, departures);

        time::sleep(Duration::from_millis(2_500)).await;
        task.abort();

        let mut seen = Vec::new();
        while let Ok(record) = rx.try_recv() {
            seen.push((record.grouping_key().to_string(), record.data));
        }
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
        assert_eq!(
            seen,
            vec![
                ("a".to_string(), 0),
                ("b".to_string(), 0),
                ("a".to_string(), 2),
                ("b".to_string(), 2),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_resubscribes_after_error() {
        let (_, cache) = directory(&[]);
        let subscriptions = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&subscriptions);
        let source: Arc<dyn PushDataSource<u32>> = Arc::new(push_fn(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) as u32;
            stream::iter(vec![
                Ok::<_, SourceError>(SourceData::grouped("g", n)),
                Err(SourceError::StreamFailed("reset".into())),
                Ok(SourceData::grouped("g", 99)),
            ])
            .boxed()
        }));

        let (tx, mut rx) = mpsc::unbounded_channel();
        let (departures, _) = mpsc::unbounded_channel();
        let task = DataSource::Push(source).spawn(&cache, &config(), tx, departures);

        time::sleep(Duration::from_millis(1_200)).await;
        task.abort();

        let mut values = Vec::new();
        while let Ok(record) = rx.try_recv() {
            values.push(record.data);
        }
        assert_eq!(subscriptions.load(Ordering::SeqCst), 3);
        assert_eq!(values, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_subscriber_events_follow_directory() {
        let (repository, cache) = directory(&["a"]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (departures, mut departed) = mpsc::unbounded_channel();
        let task = DataSource::<SubscriberEvent>::SubscriberEvents(|event: SubscriberEvent| event)
            .spawn(&cache, &config(), tx, departures);

        cache.snapshot().await;
        let first = rx.recv().await.unwrap();
        assert_eq!(first.grouping_key(), "a");
        assert_eq!(first.data.change, MembershipChange::Added);

        repository.remove(&ResourceId::new("a")).await;
        cache.refresh().await;
        let second = rx.recv().await.unwrap();
        assert_eq!(second.data.change, MembershipChange::Removed);
        assert_eq!(second.data.resource_id, ResourceId::new("a"));
        assert_eq!(departed.recv().await, Some(ResourceId::new("a")));

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_poll_ticks_do_not_overlap() {
        let (_, cache) = directory(&["a"]);
        let calls = Arc::new(AtomicUsize::new(0));
        let inflight = Arc::new(AtomicUsize::new(0));
        let max_inflight = Arc::new(AtomicUsize::new(0));

        let (c, i, m) = (Arc::clone(&calls), Arc::clone(&inflight), Arc::clone(&max_inflight));
        let source: Arc<dyn PollableDataSource<u32>> = Arc::new(poll_fn(move |_: Vec<ResourceId>| {
            c.fetch_add(1, Ordering::SeqCst);
            let now = i.fetch_add(1, Ordering::SeqCst) + 1;
            m.fetch_max(now, Ordering::SeqCst);
            let i = Arc::clone(&i);
            async move {
                time::sleep(Duration::from_millis(2_500)).await;
                i.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, SourceError>(Vec::<SourceData<u32>>::new())
            }
        }));

        let (tx, _rx) = mpsc::unbounded_channel();
        let (departures, _) = mpsc::unbounded_channel();
        let task = DataSource::Poll(source).spawn(&cache, &config(), tx, departures);

        time::sleep(Duration::from_millis(10_000)).await;
        task.abort();

        // Ticks due while a poll is running are skipped: polls start at 0s, 3s, 6s and 9s.
        assert_eq!(max_inflight.load(Ordering::SeqCst), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_removed_resources_are_reported_as_departures() {
        let (repository, cache) = directory(&["a", "b"]);
        let source: Arc<dyn PollableDataSource<u32>> =
            Arc::new(poll_fn(|_: Vec<ResourceId>| async { Ok::<_, SourceError>(Vec::<SourceData<u32>>::new()) }));

        let (tx, _rx) = mpsc::unbounded_channel();
        let (departures, mut departed) = mpsc::unbounded_channel();
        let task = DataSource::Poll(source).spawn(&cache, &config(), tx, departures);

        cache.snapshot().await;
        repository.remove(&ResourceId::new("b")).await;
        cache.refresh().await;

        assert_eq!(departed.recv().await, Some(ResourceId::new("b")));
        task.abort();
    }
}
