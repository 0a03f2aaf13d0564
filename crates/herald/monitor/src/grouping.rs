//! Keyed routing of source records.
//!
//! The router task owns one channel per grouping key. The first record for a
//! key spawns a group task holding fresh lanes for every route; later records
//! for that key are forwarded to it in arrival order.
//!
//! When a resource leaves the subscriber directory its group is reaped: the
//! router drops the group's channel and forgets the handle, and the group
//! task drains what it already received before exiting. Records routed
//! before the departure are always delivered to the old group first. Keys of
//! `Group` partitions are never reaped.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use futures::channel::mpsc as lane_mpsc;
use futures::future::{self, BoxFuture};
use futures::stream::{BoxStream, StreamExt};
use herald_types::{ResourceId, SourceData};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Records of one group, as seen by a lane.
pub(crate) type RecordStream<T> = BoxStream<'static, Arc<SourceData<T>>>;

/// One transformation lane: consumes the group's records until they end.
pub(crate) type Lane<T> = Box<dyn FnOnce(RecordStream<T>) -> BoxFuture<'static, ()> + Send>;

/// Group task handles, shared with the monitor so `stop()` can abort them.
pub(crate) type GroupHandles = Arc<DashMap<String, JoinHandle<()>>>;

/// Something that turns a group's records into dispatched notifications.
pub(crate) trait Route<T>: Send + Sync {
    /// Build fresh lanes for a newly seen group.
    fn lanes(&self, group: &GroupContext) -> Vec<Lane<T>>;
}

/// Per-group context shared by the group's lanes.
#[derive(Debug, Clone)]
pub struct GroupContext {
    key: Arc<str>,
    resources: Arc<RwLock<Vec<ResourceId>>>,
}

impl GroupContext {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: Arc::from(key.into()),
            resources: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Resources seen in this group so far, in first-seen order.
    pub fn resources(&self) -> Vec<ResourceId> {
        self.resources.read().clone()
    }

    /// Remember the resource of `record`.
    pub fn observe<T>(&self, record: &SourceData<T>) {
        let Some(resource_id) = record.resource_id() else {
            return;
        };
        if self.resources.read().contains(resource_id) {
            return;
        }
        let mut resources = self.resources.write();
        if !resources.contains(resource_id) {
            resources.push(resource_id.clone());
        }
    }
}

/// Channel into a running group task.
struct GroupInput<T> {
    records: mpsc::UnboundedSender<Arc<SourceData<T>>>,
    by_resource: bool,
}

/// Spawn the router consuming the source channel.
///
/// `departures` carries resources removed from the subscriber directory.
/// Records already queued are routed before a departure is applied.
pub(crate) fn spawn_router<T>(
    routes: Arc<Vec<Arc<dyn Route<T>>>>,
    groups: GroupHandles,
    mut records: mpsc::UnboundedReceiver<SourceData<T>>,
    mut departures: mpsc::UnboundedReceiver<ResourceId>,
) -> JoinHandle<()>
where
    T: Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut inputs: HashMap<String, GroupInput<T>> = HashMap::new();

        loop {
            tokio::select! {
                biased;
                record = records.recv() => match record {
                    Some(record) => route_record(record, &routes, &groups, &mut inputs),
                    None => break,
                },
                Some(resource_id) = departures.recv() => {
                    reap(&resource_id, &groups, &mut inputs);
                }
            }
        }

        debug!("Source channel closed, router exiting");
    })
}

fn route_record<T>(
    record: SourceData<T>,
    routes: &[Arc<dyn Route<T>>],
    groups: &GroupHandles,
    inputs: &mut HashMap<String, GroupInput<T>>,
) where
    T: Send + Sync + 'static,
{
    let key = record.grouping_key().to_string();
    if key.is_empty() {
        warn!("Dropping record without a grouping key");
        return;
    }

    let by_resource = record.resource_id().is_some();
    let record = Arc::new(record);
    let forwarded = inputs
        .get(&key)
        .is_some_and(|input| input.records.send(Arc::clone(&record)).is_ok());
    if forwarded {
        return;
    }

    if inputs.remove(&key).is_some() {
        debug!(key = %key, "Group finished, starting a new one");
    }

    let (tx, rx) = mpsc::unbounded_channel();
    // The receiver is alive until the group task is spawned below.
    let _ = tx.send(record);
    let handle = spawn_group(GroupContext::new(key.clone()), routes, rx);
    if let Some(previous) = groups.insert(key.clone(), handle) {
        previous.abort();
    }
    info!(key = %key, groups = groups.len(), "Group started");
    inputs.insert(key, GroupInput { records: tx, by_resource });
}

fn reap<T>(resource_id: &ResourceId, groups: &GroupHandles, inputs: &mut HashMap<String, GroupInput<T>>) {
    let key = resource_id.as_str();
    if !inputs.get(key).is_some_and(|input| input.by_resource) {
        return;
    }
    inputs.remove(key);
    groups.remove(key);
    info!(key, groups = groups.len(), "Group reaped after its resource left the directory");
}

fn spawn_group<T>(
    group: GroupContext,
    routes: &[Arc<dyn Route<T>>],
    mut records: mpsc::UnboundedReceiver<Arc<SourceData<T>>>,
) -> JoinHandle<()>
where
    T: Send + Sync + 'static,
{
    let mut inputs = Vec::new();
    let mut lanes = Vec::new();
    for route in routes {
        for lane in route.lanes(&group) {
            let (tx, rx) = lane_mpsc::unbounded();
            inputs.push(tx);
            lanes.push(lane(rx.boxed()));
        }
    }

    let observer = group.clone();
    let fan_out = async move {
        while let Some(record) = records.recv().await {
            observer.observe(&record);
            for input in &inputs {
                let _ = input.unbounded_send(Arc::clone(&record));
            }
        }
    };

    tokio::spawn(async move {
        debug!(key = group.key(), lanes = lanes.len(), "Group lanes attached");
        future::join(fan_out, future::join_all(lanes)).await;
        debug!(key = group.key(), "Group drained");
    })
}
