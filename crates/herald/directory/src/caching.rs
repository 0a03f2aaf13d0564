//! Caching decorator over a subscriber repository.
//!
//! Reads are served from an immutable snapshot. Refreshes are single-flight:
//! concurrent callers that find the snapshot stale queue on one async mutex
//! and re-check freshness once they hold it, so only the first one hits the
//! delegate.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use herald_types::{DirectoryResult, MembershipEvent, ResourceId, Subscriber, SubscriberRepository};
use parking_lot::RwLock;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::DirectoryConfig;

/// Subscribers keyed by resource id.
pub type Snapshot = Arc<BTreeMap<ResourceId, Subscriber>>;

#[derive(Default)]
struct CacheState {
    snapshot: Option<Snapshot>,
    next_refresh_at: Option<Instant>,
}

/// A [`SubscriberRepository`] serving cached snapshots of another one.
///
/// Every refresh compares the new snapshot with the previous one and publishes
/// the difference as [`MembershipEvent`]s. A failed refresh keeps the last
/// good snapshot and is retried after `failure_backoff`.
pub struct CachingSubscriberRepository {
    delegate: Arc<dyn SubscriberRepository>,
    config: DirectoryConfig,
    state: RwLock<CacheState>,
    refresh_lock: Mutex<()>,
    events: broadcast::Sender<MembershipEvent>,
    fetches: AtomicU64,
}

impl std::fmt::Debug for CachingSubscriberRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingSubscriberRepository")
            .field("config", &self.config)
            .field("fetches", &self.fetch_count())
            .finish()
    }
}

impl CachingSubscriberRepository {
    pub fn new(delegate: Arc<dyn SubscriberRepository>, config: DirectoryConfig) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            delegate,
            config,
            state: RwLock::new(CacheState::default()),
            refresh_lock: Mutex::new(()),
            events,
            fetches: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    /// Number of times the delegate has been queried.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    fn fresh_snapshot(&self) -> Option<Snapshot> {
        let state = self.state.read();
        match (&state.snapshot, state.next_refresh_at) {
            (Some(snapshot), Some(at)) if Instant::now() < at => Some(Arc::clone(snapshot)),
            _ => None,
        }
    }

    /// The current snapshot, refreshed first if it has expired.
    pub async fn snapshot(&self) -> Snapshot {
        if let Some(snapshot) = self.fresh_snapshot() {
            return snapshot;
        }
        let _guard = self.refresh_lock.lock().await;
        if let Some(snapshot) = self.fresh_snapshot() {
            return snapshot;
        }
        self.refresh_locked().await
    }

    /// Refresh from the delegate regardless of the snapshot's age.
    pub async fn refresh(&self) -> Snapshot {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    async fn refresh_locked(&self) -> Snapshot {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        match self.delegate.find_all(None).await {
            Ok(subscribers) => {
                let next: Snapshot = Arc::new(
                    subscribers
                        .into_iter()
                        .map(|s| (s.resource_id.clone(), s))
                        .collect(),
                );
                let previous = {
                    let mut state = self.state.write();
                    state.next_refresh_at = Some(Instant::now() + self.config.ttl());
                    state.snapshot.replace(Arc::clone(&next))
                };
                debug!(subscribers = next.len(), "Subscriber snapshot refreshed");
                self.publish_changes(previous.as_deref(), &next);
                next
            }
            Err(err) => {
                let backoff = self.config.failure_backoff();
                warn!(
                    error = %err,
                    backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                    "Subscriber refresh failed, serving last snapshot"
                );
                let mut state = self.state.write();
                state.next_refresh_at = Some(Instant::now() + backoff);
                Arc::clone(state.snapshot.get_or_insert_with(Default::default))
            }
        }
    }

    fn publish_changes(
        &self,
        previous: Option<&BTreeMap<ResourceId, Subscriber>>,
        next: &BTreeMap<ResourceId, Subscriber>,
    ) {
        let added: Vec<ResourceId> = next
            .keys()
            .filter(|id| previous.map_or(true, |p| !p.contains_key(*id)))
            .cloned()
            .collect();
        let removed: Vec<ResourceId> = previous
            .map(|p| p.keys().filter(|id| !next.contains_key(*id)).cloned().collect())
            .unwrap_or_default();

        if !added.is_empty() {
            info!(count = added.len(), "Subscribers added");
            let _ = self.events.send(MembershipEvent::Added(added));
        }
        if !removed.is_empty() {
            info!(count = removed.len(), "Subscribers removed");
            let _ = self.events.send(MembershipEvent::Removed(removed));
        }
    }

    /// Spawn the background task keeping the cache warm.
    ///
    /// The task refreshes on every `ttl` tick and immediately whenever the
    /// delegate publishes a membership event. Abort the handle to stop it.
    pub fn spawn_maintenance(self: &Arc<Self>) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        let mut delegate_events = self.delegate.subscribe();
        let period = self.config.ttl().max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        cache.snapshot().await;
                    }
                    event = next_event(&mut delegate_events) => match event {
                        Ok(event) => {
                            debug!(resource_ids = event.resource_ids().len(), "Delegate membership changed");
                            cache.refresh().await;
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Missed delegate membership events");
                            cache.refresh().await;
                        }
                        Err(RecvError::Closed) => {
                            debug!("Delegate membership events closed");
                            delegate_events = None;
                        }
                    },
                }
            }
        })
    }
}

async fn next_event(
    events: &mut Option<broadcast::Receiver<MembershipEvent>>,
) -> Result<MembershipEvent, RecvError> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn restrict(snapshot: &BTreeMap<ResourceId, Subscriber>, resource_ids: Option<&[ResourceId]>) -> Vec<Subscriber> {
    match resource_ids {
        Some(ids) => ids.iter().filter_map(|id| snapshot.get(id).cloned()).collect(),
        None => snapshot.values().cloned().collect(),
    }
}

#[async_trait]
impl SubscriberRepository for CachingSubscriberRepository {
    async fn find_all(&self, resource_ids: Option<&[ResourceId]>) -> DirectoryResult<Vec<Subscriber>> {
        let snapshot = self.snapshot().await;
        Ok(restrict(&snapshot, resource_ids))
    }

    async fn find_by_resource_id(&self, resource_id: &ResourceId) -> DirectoryResult<Option<Subscriber>> {
        Ok(self.snapshot().await.get(resource_id).cloned())
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<MembershipEvent>> {
        Some(self.events.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    use herald_types::DirectoryError;

    use super::*;
    use crate::memory::InMemorySubscriberRepository;

    /// Delegate counting calls, with optional latency and failure injection.
    struct CountingRepository {
        inner: InMemorySubscriberRepository,
        calls: AtomicUsize,
        latency: Duration,
        failing: AtomicBool,
    }

    impl CountingRepository {
        fn new(ids: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                inner: InMemorySubscriberRepository::with_subscribers(
                    ids.iter().map(|id| Subscriber::new(*id)),
                ),
                calls: AtomicUsize::new(0),
                latency: Duration::from_millis(50),
                failing: AtomicBool::new(false),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SubscriberRepository for CountingRepository {
        async fn find_all(&self, resource_ids: Option<&[ResourceId]>) -> DirectoryResult<Vec<Subscriber>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            time::sleep(self.latency).await;
            if self.failing.load(Ordering::SeqCst) {
                return Err(DirectoryError::Unavailable("backend down".into()));
            }
            self.inner.find_all(resource_ids).await
        }

        async fn find_by_resource_id(&self, resource_id: &ResourceId) -> DirectoryResult<Option<Subscriber>> {
            self.inner.find_by_resource_id(resource_id).await
        }

        fn subscribe(&self) -> Option<broadcast::Receiver<MembershipEvent>> {
            self.inner.subscribe()
        }
    }

    fn config() -> DirectoryConfig {
        DirectoryConfig::default()
            .with_ttl(Duration::from_secs(10))
            .with_failure_backoff(Duration::from_secs(2))
    }

    fn ids(subscribers: &[Subscriber]) -> Vec<&str> {
        subscribers.iter().map(|s| s.resource_id.as_str()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_lazy_population_and_ttl() {
        let delegate = CountingRepository::new(&["a", "b"]);
        let cache = CachingSubscriberRepository::new(delegate.clone(), config());
        assert_eq!(delegate.calls(), 0);

        assert_eq!(ids(&cache.find_all(None).await.unwrap()), vec!["a", "b"]);
        cache.find_all(None).await.unwrap();
        assert_eq!(delegate.calls(), 1);

        time::advance(Duration::from_secs(11)).await;
        cache.find_all(None).await.unwrap();
        assert_eq!(delegate.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_refresh() {
        let delegate = CountingRepository::new(&["a"]);
        let cache = Arc::new(CachingSubscriberRepository::new(delegate.clone(), config()));

        let callers = (0..10).map(|_| {
            let cache = Arc::clone(&cache);
            async move { cache.find_all(None).await }
        });
        let results = futures::future::join_all(callers).await;
        assert!(results.iter().all(|r| r.as_ref().map(|s| s.len()) == Ok(1)));
        assert_eq!(delegate.calls(), 1);

        time::advance(Duration::from_secs(11)).await;
        let callers = (0..10).map(|_| {
            let cache = Arc::clone(&cache);
            async move { cache.find_all(None).await }
        });
        futures::future::join_all(callers).await;
        assert_eq!(delegate.calls(), 2);
        assert_eq!(cache.fetch_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_publishes_symmetric_difference() {
        let delegate = CountingRepository::new(&["a", "b"]);
        let cache = CachingSubscriberRepository::new(delegate.clone(), config());
        cache.snapshot().await;
        let mut rx = cache.subscribe().unwrap();

        delegate.inner.remove(&"a".into()).await;
        delegate.inner.upsert(Subscriber::new("c")).await;
        cache.refresh().await;

        assert_eq!(rx.recv().await.unwrap(), MembershipEvent::Added(vec!["c".into()]));
        assert_eq!(rx.recv().await.unwrap(), MembershipEvent::Removed(vec!["a".into()]));

        cache.refresh().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_population_announces_everyone() {
        let delegate = CountingRepository::new(&["a", "b"]);
        let cache = CachingSubscriberRepository::new(delegate, config());
        let mut rx = cache.subscribe().unwrap();

        cache.snapshot().await;
        assert_eq!(
            rx.recv().await.unwrap(),
            MembershipEvent::Added(vec!["a".into(), "b".into()])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_serves_stale_snapshot() {
        let delegate = CountingRepository::new(&["a"]);
        let cache = CachingSubscriberRepository::new(delegate.clone(), config());
        cache.snapshot().await;

        delegate.failing.store(true, Ordering::SeqCst);
        time::advance(Duration::from_secs(11)).await;

        assert_eq!(ids(&cache.find_all(None).await.unwrap()), vec!["a"]);
        assert_eq!(delegate.calls(), 2);

        // Within the backoff nothing is fetched.
        cache.find_all(None).await.unwrap();
        assert_eq!(delegate.calls(), 2);

        time::advance(Duration::from_secs(3)).await;
        cache.find_all(None).await.unwrap();
        assert_eq!(delegate.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_without_snapshot_is_empty() {
        let delegate = CountingRepository::new(&["a"]);
        delegate.failing.store(true, Ordering::SeqCst);
        let cache = CachingSubscriberRepository::new(delegate.clone(), config());

        assert!(cache.find_all(None).await.unwrap().is_empty());
        assert!(cache.find_by_resource_id(&"a".into()).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_find_all_restricted_to_ids() {
        let delegate = CountingRepository::new(&["a", "b", "c"]);
        let cache = CachingSubscriberRepository::new(delegate, config());

        let wanted: Vec<ResourceId> = vec!["c".into(), "missing".into(), "a".into()];
        let found = cache.find_all(Some(wanted.as_slice())).await.unwrap();
        assert_eq!(ids(&found), vec!["c", "a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_maintenance_follows_delegate_events() {
        let delegate = CountingRepository::new(&["a"]);
        let cache = Arc::new(CachingSubscriberRepository::new(delegate.clone(), config()));
        let mut rx = cache.subscribe().unwrap();
        let handle = cache.spawn_maintenance();

        let first = time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(first, MembershipEvent::Added(vec!["a".into()]));

        delegate.inner.upsert(Subscriber::new("b")).await;
        let second = time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(second, MembershipEvent::Added(vec!["b".into()]));

        handle.abort();
    }
}
