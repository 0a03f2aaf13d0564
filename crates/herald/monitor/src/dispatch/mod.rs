//! Dispatch: from a detected value to sink calls.
//!
//! For every detected value and notifier the dispatcher resolves candidate
//! recipients, keeps those known to the subscriber directory and accepted by
//! the eligibility policy, then pushes the notification in chunks. Every chunk
//! settles; failures are aggregated into one warning and a [`DispatchReport`].

pub mod addressing;
pub mod eligibility;

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use herald_directory::{CachingSubscriberRepository, Snapshot};
use herald_pipeline::Data;
use herald_types::ResourceId;
use tokio::sync::broadcast;
use tracing::{debug, warn};

pub use addressing::{Addressing, AddressingStrategy};
pub use eligibility::{AllowAll, EligibilityPolicy, EligibilityRequest, SubscriptionEligibility};

use crate::config::DispatchConfig;
use crate::grouping::GroupContext;
use crate::notifier::Notifier;
use addressing::Candidates;

/// A sink call that failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    pub recipients: Vec<ResourceId>,
    pub reason: String,
}

/// Outcome of dispatching one detected value through one notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub notifier: String,
    pub group: String,
    /// Eligible recipients, in resolution order.
    pub recipients: Vec<ResourceId>,
    /// Recipients whose sink call succeeded.
    pub delivered: usize,
    pub failures: Vec<DeliveryFailure>,
}

impl DispatchReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed(&self) -> usize {
        self.failures.iter().map(|f| f.recipients.len()).sum()
    }
}

/// Resolves recipients and drives sink calls for a monitor.
pub struct Dispatcher {
    directory: Arc<CachingSubscriberRepository>,
    eligibility: Arc<dyn EligibilityPolicy>,
    batch_size: usize,
    max_concurrency: usize,
    reports: broadcast::Sender<DispatchReport>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("batch_size", &self.batch_size)
            .field("max_concurrency", &self.max_concurrency)
            .finish()
    }
}

impl Dispatcher {
    pub fn new(
        directory: Arc<CachingSubscriberRepository>,
        eligibility: Arc<dyn EligibilityPolicy>,
        config: &DispatchConfig,
    ) -> Self {
        let (reports, _) = broadcast::channel(256);
        Self {
            directory,
            eligibility,
            batch_size: config.batch_size.max(1),
            max_concurrency: config.max_concurrency.max(1),
            reports,
        }
    }

    /// Reports of every dispatch from now on.
    pub fn subscribe_reports(&self) -> broadcast::Receiver<DispatchReport> {
        self.reports.subscribe()
    }

    /// Deliver `data` through `notifier`. Never fails; see the report.
    pub async fn dispatch<R, T>(
        &self,
        notifier: &Notifier<R, T>,
        data: &Data<R, T>,
        group: &GroupContext,
        strategy: AddressingStrategy,
    ) -> DispatchReport
    where
        R: Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        let candidates = addressing::resolve(notifier.addressing(), strategy, data, group);
        let snapshot = self.directory.snapshot().await;
        let type_id = notifier.type_id(data);
        let request = EligibilityRequest {
            type_id: type_id.as_deref(),
            required_channel: notifier.required_channel(),
        };
        let recipients = self.eligible(&snapshot, candidates, &request);

        let mut report = DispatchReport {
            notifier: notifier.name().to_string(),
            group: group.key().to_string(),
            recipients,
            delivered: 0,
            failures: Vec::new(),
        };

        if report.recipients.is_empty() {
            debug!(notifier = %report.notifier, key = %report.group, "No eligible recipients");
            let _ = self.reports.send(report.clone());
            return report;
        }

        let prepared = notifier.prepare(data);
        let chunks: Vec<Vec<ResourceId>> = report
            .recipients
            .chunks(self.batch_size)
            .map(<[ResourceId]>::to_vec)
            .collect();

        let outcomes: Vec<_> = stream::iter(chunks)
            .map(|chunk| {
                let push = prepared.push(chunk.clone());
                async move { (chunk, push.await) }
            })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        for (chunk, outcome) in outcomes {
            match outcome {
                Ok(()) => report.delivered += chunk.len(),
                Err(error) => report.failures.push(DeliveryFailure {
                    recipients: chunk,
                    reason: error.to_string(),
                }),
            }
        }

        if report.is_complete() {
            debug!(
                notifier = %report.notifier,
                key = %report.group,
                delivered = report.delivered,
                "Notification delivered"
            );
        } else {
            let reasons: Vec<&str> = report.failures.iter().map(|f| f.reason.as_str()).collect();
            warn!(
                notifier = %report.notifier,
                key = %report.group,
                delivered = report.delivered,
                failed = report.failed(),
                reasons = ?reasons,
                "Notification delivery partially failed"
            );
        }

        let _ = self.reports.send(report.clone());
        report
    }

    fn eligible(&self, snapshot: &Snapshot, candidates: Candidates, request: &EligibilityRequest<'_>) -> Vec<ResourceId> {
        match candidates {
            Candidates::Listed(ids) => {
                let mut seen = HashSet::new();
                ids.into_iter()
                    .filter(|id| seen.insert(id.clone()))
                    .filter(|id| {
                        snapshot
                            .get(id)
                            .is_some_and(|s| self.eligibility.is_eligible(s, request))
                    })
                    .collect()
            }
            Candidates::Everyone => snapshot
                .values()
                .filter(|s| self.eligibility.is_eligible(s, request))
                .map(|s| s.resource_id.clone())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use herald_directory::{DirectoryConfig, InMemorySubscriberRepository};
    use herald_types::{sink_fn, NotificationSink, SinkError, SourceData, Subscriber};
    use parking_lot::Mutex;

    use super::*;
    use crate::config::NotificationTypeConfig;

    type Calls = Arc<Mutex<Vec<Vec<ResourceId>>>>;

    fn directory(subscribers: Vec<Subscriber>) -> Arc<CachingSubscriberRepository> {
        let repository = Arc::new(InMemorySubscriberRepository::with_subscribers(subscribers));
        Arc::new(CachingSubscriberRepository::new(repository, DirectoryConfig::default()))
    }

    /// Notifier whose sink records calls and fails for resource `bad`.
    fn notifier(calls: &Calls) -> Notifier<f64, ()> {
        let calls = Arc::clone(calls);
        let sink: Arc<dyn NotificationSink<String>> = Arc::new(sink_fn(move |_: String, to: Vec<ResourceId>| {
            let calls = Arc::clone(&calls);
            async move {
                calls.lock().push(to.clone());
                if to.iter().any(|id| id.as_str() == "bad") {
                    Err(SinkError::delivery(&to, "mailbox full"))
                } else {
                    Ok(())
                }
            }
        }));
        Notifier::new("test", sink, |d: &Data<f64, ()>| d.value.to_string())
    }

    fn data(resource: &str) -> Data<f64, ()> {
        Data::new(1.0, Arc::new(SourceData::for_resource(resource, ())))
    }

    fn dispatcher(subscribers: Vec<Subscriber>, config: &DispatchConfig) -> Dispatcher {
        let eligibility = Arc::new(SubscriptionEligibility::new(config.notification_types.clone()));
        Dispatcher::new(directory(subscribers), eligibility, config)
    }

    #[tokio::test]
    async fn test_one_failing_recipient_does_not_block_others() {
        let dispatcher = dispatcher(
            vec![Subscriber::new("a"), Subscriber::new("bad"), Subscriber::new("c")],
            &DispatchConfig::default(),
        );
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let mut reports = dispatcher.subscribe_reports();

        let report = dispatcher
            .dispatch(&notifier(&calls), &data("a"), &GroupContext::new("a"), AddressingStrategy::Broadcast)
            .await;

        assert_eq!(calls.lock().len(), 3);
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.failures[0].recipients, vec![ResourceId::new("bad")]);
        assert!(report.failures[0].reason.contains("mailbox full"));
        assert_eq!(reports.recv().await.unwrap(), report);
    }

    #[tokio::test]
    async fn test_batches_recipients() {
        let config = DispatchConfig {
            batch_size: 2,
            ..DispatchConfig::default()
        };
        let subscribers = ["a", "b", "c", "d", "e"].into_iter().map(Subscriber::new).collect();
        let dispatcher = dispatcher(subscribers, &config);
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));

        let report = dispatcher
            .dispatch(&notifier(&calls), &data("a"), &GroupContext::new("a"), AddressingStrategy::Broadcast)
            .await;

        let mut sizes: Vec<usize> = calls.lock().iter().map(Vec::len).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![1, 2, 2]);
        assert_eq!(report.delivered, 5);
        assert!(report.is_complete());
    }

    #[tokio::test]
    async fn test_unknown_and_ineligible_recipients_are_dropped() {
        let mut types = HashMap::new();
        types.insert(
            "alert".to_string(),
            NotificationTypeConfig {
                default_enabled: true,
                required_channel: Some("email".to_string()),
            },
        );
        let config = DispatchConfig {
            notification_types: types,
            ..DispatchConfig::default()
        };
        let dispatcher = dispatcher(
            vec![
                Subscriber::new("a").with_contact("email", "a@example.org"),
                Subscriber::new("b"),
            ],
            &config,
        );
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let notifier = notifier(&calls)
            .with_type_id("alert")
            .to(Addressing::multicast(|_: &Data<f64, ()>| {
                vec!["a".into(), "b".into(), "ghost".into(), "a".into()]
            }));

        let report = dispatcher
            .dispatch(&notifier, &data("a"), &GroupContext::new("a"), AddressingStrategy::Unicast)
            .await;

        assert_eq!(report.recipients, vec![ResourceId::new("a")]);
        assert_eq!(*calls.lock(), vec![vec![ResourceId::new("a")]]);
    }

    #[tokio::test]
    async fn test_unicast_targets_only_record_resource() {
        let dispatcher = dispatcher(
            vec![Subscriber::new("a"), Subscriber::new("b")],
            &DispatchConfig::default(),
        );
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));

        let report = dispatcher
            .dispatch(&notifier(&calls), &data("b"), &GroupContext::new("b"), AddressingStrategy::Unicast)
            .await;

        assert_eq!(report.recipients, vec![ResourceId::new("b")]);
        assert_eq!(report.group, "b");
    }

    #[tokio::test]
    async fn test_empty_explicit_selection_sends_nothing() {
        let dispatcher = dispatcher(vec![Subscriber::new("a")], &DispatchConfig::default());
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let notifier = notifier(&calls).to(Addressing::multicast(|_: &Data<f64, ()>| Vec::new()));

        let report = dispatcher
            .dispatch(&notifier, &data("a"), &GroupContext::new("a"), AddressingStrategy::Broadcast)
            .await;

        assert!(report.recipients.is_empty());
        assert!(calls.lock().is_empty());
    }
}
