//! The monitor runtime and its lifecycle.

use std::sync::Arc;

use dashmap::DashMap;
use herald_directory::CachingSubscriberRepository;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

use crate::config::MonitorConfig;
use crate::dispatch::{DispatchReport, Dispatcher};
use crate::error::{MonitorError, MonitorResult};
use crate::grouping::{self, GroupHandles, Route};
use crate::source::DataSource;

/// Lifecycle state of a [`Monitor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Running,
    Stopped,
}

struct Tasks {
    source: JoinHandle<()>,
    router: JoinHandle<()>,
    maintenance: JoinHandle<()>,
    groups: GroupHandles,
}

impl Tasks {
    /// Abort everything; returns the number of groups torn down.
    fn abort(self) -> usize {
        self.source.abort();
        self.router.abort();
        self.maintenance.abort();
        for entry in self.groups.iter() {
            entry.value().abort();
        }
        let groups = self.groups.len();
        self.groups.clear();
        groups
    }
}

enum Lifecycle {
    Idle,
    Running(Tasks),
    Stopped,
}

/// A runnable detection and notification pipeline.
///
/// Built by [`MonitorBuilder`](crate::MonitorBuilder). `start` spawns the
/// source, the keyed router and the directory maintenance task; `stop`
/// aborts them and discards all per-group state.
pub struct Monitor<T> {
    source: DataSource<T>,
    routes: Arc<Vec<Arc<dyn Route<T>>>>,
    directory: Arc<CachingSubscriberRepository>,
    dispatcher: Arc<Dispatcher>,
    config: MonitorConfig,
    lifecycle: Mutex<Lifecycle>,
}

impl<T> Monitor<T>
where
    T: Send + Sync + 'static,
{
    pub(crate) fn new(
        source: DataSource<T>,
        routes: Vec<Arc<dyn Route<T>>>,
        directory: Arc<CachingSubscriberRepository>,
        dispatcher: Arc<Dispatcher>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            source,
            routes: Arc::new(routes),
            directory,
            dispatcher,
            config,
            lifecycle: Mutex::new(Lifecycle::Idle),
        }
    }

    /// Start consuming the source.
    ///
    /// A start after `stop` begins from scratch: no group keeps state from
    /// the previous run.
    #[instrument(skip(self), fields(source = self.source.kind()))]
    pub async fn start(&self) -> MonitorResult<()> {
        {
            let mut lifecycle = self.lifecycle.lock();
            if matches!(*lifecycle, Lifecycle::Running(_)) {
                return Err(MonitorError::AlreadyRunning);
            }

            let (records_tx, records_rx) = mpsc::unbounded_channel();
            let (departures_tx, departures_rx) = mpsc::unbounded_channel();
            let groups: GroupHandles = Arc::new(DashMap::new());
            let source = self
                .source
                .spawn(&self.directory, &self.config.source, records_tx, departures_tx);
            let router = grouping::spawn_router(
                Arc::clone(&self.routes),
                Arc::clone(&groups),
                records_rx,
                departures_rx,
            );
            let maintenance = self.directory.spawn_maintenance();

            *lifecycle = Lifecycle::Running(Tasks {
                source,
                router,
                maintenance,
                groups,
            });
        }

        info!(routes = self.routes.len(), "Monitor started");

        let subscribers = self.directory.snapshot().await.len();
        debug!(subscribers, "Subscriber directory warmed");
        Ok(())
    }

    /// Stop all tasks. Calling it again, or before `start`, does nothing.
    #[instrument(skip(self))]
    pub fn stop(&self) {
        let tasks = {
            let mut lifecycle = self.lifecycle.lock();
            match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
                Lifecycle::Running(tasks) => tasks,
                other => {
                    *lifecycle = other;
                    debug!("Monitor not running");
                    return;
                }
            }
        };

        let groups = tasks.abort();
        info!(groups, "Monitor stopped");
    }

    pub fn state(&self) -> MonitorState {
        match &*self.lifecycle.lock() {
            Lifecycle::Idle => MonitorState::Idle,
            Lifecycle::Running(_) => MonitorState::Running,
            Lifecycle::Stopped => MonitorState::Stopped,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == MonitorState::Running
    }

    /// Live groups: started since the last `start` and not yet reaped.
    pub fn group_count(&self) -> usize {
        match &*self.lifecycle.lock() {
            Lifecycle::Running(tasks) => tasks.groups.len(),
            _ => 0,
        }
    }

    /// Reports for every dispatched value from now on.
    pub fn subscribe_reports(&self) -> broadcast::Receiver<DispatchReport> {
        self.dispatcher.subscribe_reports()
    }

    pub fn directory(&self) -> &Arc<CachingSubscriberRepository> {
        &self.directory
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }
}

impl<T> Drop for Monitor<T> {
    fn drop(&mut self) {
        if let Lifecycle::Running(tasks) = std::mem::replace(self.lifecycle.get_mut(), Lifecycle::Stopped) {
            tasks.abort();
        }
    }
}

impl<T> std::fmt::Debug for Monitor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("routes", &self.routes.len())
            .field("directory", &self.directory)
            .finish()
    }
}
