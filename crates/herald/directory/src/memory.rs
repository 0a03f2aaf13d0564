//! In-memory subscriber repository

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use herald_types::{DirectoryResult, MembershipEvent, ResourceId, Subscriber, SubscriberRepository};
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

/// Subscriber repository held in memory, for embedding and tests.
///
/// Mutations publish membership events to subscribers of
/// [`SubscriberRepository::subscribe`].
#[derive(Debug)]
pub struct InMemorySubscriberRepository {
    subscribers: Arc<RwLock<BTreeMap<ResourceId, Subscriber>>>,
    events: broadcast::Sender<MembershipEvent>,
}

impl Default for InMemorySubscriberRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySubscriberRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            subscribers: Arc::new(RwLock::new(BTreeMap::new())),
            events,
        }
    }

    /// Create a repository pre-populated with `subscribers`, without events.
    pub fn with_subscribers(subscribers: impl IntoIterator<Item = Subscriber>) -> Self {
        let repo = Self::new();
        let map: BTreeMap<_, _> = subscribers
            .into_iter()
            .map(|s| (s.resource_id.clone(), s))
            .collect();
        Self {
            subscribers: Arc::new(RwLock::new(map)),
            ..repo
        }
    }

    /// Insert or replace a subscriber. Returns `true` when it was not present.
    pub async fn upsert(&self, subscriber: Subscriber) -> bool {
        let id = subscriber.resource_id.clone();
        let added = {
            let mut subscribers = self.subscribers.write().await;
            subscribers.insert(id.clone(), subscriber).is_none()
        };
        if added {
            debug!(resource_id = %id, "Subscriber added");
            let _ = self.events.send(MembershipEvent::Added(vec![id]));
        }
        added
    }

    /// Remove a subscriber.
    pub async fn remove(&self, resource_id: &ResourceId) -> Option<Subscriber> {
        let removed = self.subscribers.write().await.remove(resource_id);
        if removed.is_some() {
            debug!(resource_id = %resource_id, "Subscriber removed");
            let _ = self
                .events
                .send(MembershipEvent::Removed(vec![resource_id.clone()]));
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.subscribers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.subscribers.read().await.is_empty()
    }
}

#[async_trait]
impl SubscriberRepository for InMemorySubscriberRepository {
    async fn find_all(&self, resource_ids: Option<&[ResourceId]>) -> DirectoryResult<Vec<Subscriber>> {
        let subscribers = self.subscribers.read().await;
        Ok(match resource_ids {
            Some(ids) => ids.iter().filter_map(|id| subscribers.get(id).cloned()).collect(),
            None => subscribers.values().cloned().collect(),
        })
    }

    async fn find_by_resource_id(&self, resource_id: &ResourceId) -> DirectoryResult<Option<Subscriber>> {
        Ok(self.subscribers.read().await.get(resource_id).cloned())
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<MembershipEvent>> {
        Some(self.events.subscribe())
    }
}
