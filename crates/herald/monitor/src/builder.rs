//! Typestate builder for [`Monitor`].
//!
//! ```text
//! MonitorBuilder --poll/push/subscriber_events--> SourceStep<T>
//! SourceStep<T>  --transform-->                   NotifyStep<T, R>
//! NotifyStep     --notify (repeatable)-->         NotifyStep<T, R>
//! NotifyStep     --dispatch/dispatch_configured/addressed--> ReadyStep<T>
//! ReadyStep<T>   --transform--> NotifyStep<T, R2>  |  --build--> Monitor<T>
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use herald_directory::CachingSubscriberRepository;
use herald_types::{PollableDataSource, PushDataSource, SubscriberEvent, SubscriberRepository};
use tracing::info;

use crate::config::MonitorConfig;
use crate::dispatch::{AddressingStrategy, Dispatcher, EligibilityPolicy, SubscriptionEligibility};
use crate::error::{BuildError, ConfigError};
use crate::grouping::Route;
use crate::monitor::Monitor;
use crate::notifier::Notifier;
use crate::route::TransformRoute;
use crate::source::DataSource;
use crate::transformation::{Projection, Transformation};

type MakeRoute<T> = Box<dyn FnOnce(usize, Arc<Dispatcher>, AddressingStrategy) -> Arc<dyn Route<T>> + Send>;

/// Entry point: collaborators and configuration shared by every route.
pub struct MonitorBuilder {
    repository: Arc<dyn SubscriberRepository>,
    config: MonitorConfig,
    eligibility: Option<Arc<dyn EligibilityPolicy>>,
}

impl MonitorBuilder {
    pub fn new(repository: Arc<dyn SubscriberRepository>) -> Self {
        Self {
            repository,
            config: MonitorConfig::default(),
            eligibility: None,
        }
    }

    pub fn config(mut self, config: MonitorConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the eligibility policy derived from the dispatch configuration.
    pub fn eligibility(mut self, policy: Arc<dyn EligibilityPolicy>) -> Self {
        self.eligibility = Some(policy);
        self
    }

    /// Poll `source` every `source.poll_interval_ms`.
    pub fn poll<T>(self, source: Arc<dyn PollableDataSource<T>>) -> SourceStep<T>
    where
        T: Send + Sync + 'static,
    {
        SourceStep::new(self, DataSource::Poll(source))
    }

    /// Consume the streams opened by `source`.
    pub fn push<T>(self, source: Arc<dyn PushDataSource<T>>) -> SourceStep<T>
    where
        T: Send + Sync + 'static,
    {
        SourceStep::new(self, DataSource::Push(source))
    }

    /// Use subscriber directory membership changes as the source.
    pub fn subscriber_events(self) -> SourceStep<SubscriberEvent> {
        SourceStep::new(self, DataSource::SubscriberEvents(|event: SubscriberEvent| event))
    }
}

/// What `build()` checks about one route.
struct RouteCheck {
    fields: Vec<String>,
    pipelines: usize,
    notifiers: Vec<(String, bool)>,
    addressed: bool,
}

impl RouteCheck {
    fn validate(&self, route: usize, schema: Option<&[String]>) -> Result<(), BuildError> {
        if self.notifiers.is_empty() {
            return Err(BuildError::NoNotifiers { route });
        }
        if self.fields.is_empty() {
            return Err(BuildError::NoFields { route });
        }
        if self.pipelines == 0 {
            return Err(BuildError::NoPipelines { route });
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.trim().is_empty() {
                return Err(BuildError::EmptyFieldName { route });
            }
            if !seen.insert(field.as_str()) {
                return Err(BuildError::DuplicateField {
                    route,
                    field: field.clone(),
                });
            }
            if let Some(schema) = schema {
                if !schema.iter().any(|known| known == field) {
                    return Err(BuildError::UnknownField {
                        route,
                        field: field.clone(),
                    });
                }
            }
        }

        if self.addressed {
            if let Some((notifier, _)) = self.notifiers.iter().find(|(_, addressed)| !addressed) {
                return Err(BuildError::MissingAddressing {
                    route,
                    notifier: notifier.clone(),
                });
            }
        }
        Ok(())
    }
}

struct PendingRoute<T> {
    check: RouteCheck,
    make: MakeRoute<T>,
}

/// State shared by the source and ready steps.
struct Assembly<T> {
    base: MonitorBuilder,
    source: DataSource<T>,
    schema: Option<Vec<String>>,
    routes: Vec<PendingRoute<T>>,
}

impl<T> Assembly<T>
where
    T: Send + Sync + 'static,
{
    fn transform<V, R>(self, transformation: Transformation<T, V, R>) -> NotifyStep<T, R>
    where
        V: Send + 'static,
        R: Send + Sync + 'static,
    {
        let fields = transformation.field_names();
        let pipelines = transformation.pipeline_count();
        NotifyStep {
            assembly: self,
            fields,
            pipelines,
            projections: transformation.into_projections(),
            notifiers: Vec::new(),
        }
    }
}

/// A source is chosen; add the first transformation.
pub struct SourceStep<T> {
    assembly: Assembly<T>,
}

impl<T> SourceStep<T>
where
    T: Send + Sync + 'static,
{
    fn new(base: MonitorBuilder, source: DataSource<T>) -> Self {
        Self {
            assembly: Assembly {
                base,
                source,
                schema: None,
                routes: Vec::new(),
            },
        }
    }

    /// Declare the record's field names; transformations may only use these.
    pub fn schema<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.assembly.schema = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn transform<V, R>(self, transformation: Transformation<T, V, R>) -> NotifyStep<T, R>
    where
        V: Send + 'static,
        R: Send + Sync + 'static,
    {
        self.assembly.transform(transformation)
    }
}

/// A transformation is set; add notifiers, then choose how to address them.
pub struct NotifyStep<T, R> {
    assembly: Assembly<T>,
    fields: Vec<String>,
    pipelines: usize,
    projections: Vec<Projection<T, R>>,
    notifiers: Vec<Notifier<R, T>>,
}

enum Addressed {
    Strategy(AddressingStrategy),
    Configured,
    Explicit,
}

impl<T, R> NotifyStep<T, R>
where
    T: Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    pub fn notify(mut self, notifier: Notifier<R, T>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    /// Address recipients with `strategy` unless a notifier says otherwise.
    pub fn dispatch(self, strategy: AddressingStrategy) -> ReadyStep<T> {
        self.finish(Addressed::Strategy(strategy))
    }

    /// Address recipients with `dispatch.strategy` from the configuration.
    pub fn dispatch_configured(self) -> ReadyStep<T> {
        self.finish(Addressed::Configured)
    }

    /// Every notifier carries its own addressing; `build()` checks it.
    pub fn addressed(self) -> ReadyStep<T> {
        self.finish(Addressed::Explicit)
    }

    fn finish(self, addressed: Addressed) -> ReadyStep<T> {
        let NotifyStep {
            mut assembly,
            fields,
            pipelines,
            projections,
            notifiers,
        } = self;

        let check = RouteCheck {
            fields,
            pipelines,
            notifiers: notifiers
                .iter()
                .map(|n| (n.name().to_string(), n.addressing().is_some()))
                .collect(),
            addressed: matches!(addressed, Addressed::Explicit),
        };

        let make: MakeRoute<T> = Box::new(move |index, dispatcher, configured| {
            let strategy = match addressed {
                Addressed::Strategy(strategy) => strategy,
                Addressed::Configured | Addressed::Explicit => configured,
            };
            let route: Arc<dyn Route<T>> = Arc::new(TransformRoute {
                index,
                projections,
                notifiers: Arc::new(notifiers),
                strategy,
                dispatcher,
            });
            route
        });

        assembly.routes.push(PendingRoute { check, make });
        ReadyStep { assembly }
    }
}

/// At least one route is complete; add another or build.
pub struct ReadyStep<T> {
    assembly: Assembly<T>,
}

impl<T> ReadyStep<T>
where
    T: Send + Sync + 'static,
{
    pub fn transform<V, R>(self, transformation: Transformation<T, V, R>) -> NotifyStep<T, R>
    where
        V: Send + 'static,
        R: Send + Sync + 'static,
    {
        self.assembly.transform(transformation)
    }

    /// Validate every route and assemble the monitor.
    pub fn build(self) -> Result<Monitor<T>, BuildError> {
        let Assembly {
            base,
            source,
            schema,
            routes,
        } = self.assembly;

        base.config.validate().map_err(|error| match error {
            ConfigError::Invalid(reason) => BuildError::InvalidConfig(reason),
            other => BuildError::InvalidConfig(other.to_string()),
        })?;
        for (index, route) in routes.iter().enumerate() {
            route.check.validate(index, schema.as_deref())?;
        }

        let MonitorBuilder {
            repository,
            config,
            eligibility,
        } = base;

        let directory = Arc::new(CachingSubscriberRepository::new(repository, config.directory.clone()));
        let eligibility = eligibility.unwrap_or_else(|| {
            Arc::new(SubscriptionEligibility::new(config.dispatch.notification_types.clone()))
        });
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&directory), eligibility, &config.dispatch));

        let strategy = config.dispatch.strategy;
        let routes: Vec<Arc<dyn Route<T>>> = routes
            .into_iter()
            .enumerate()
            .map(|(index, route)| (route.make)(index, Arc::clone(&dispatcher), strategy))
            .collect();

        info!(source = source.kind(), routes = routes.len(), "Monitor built");
        Ok(Monitor::new(source, routes, directory, dispatcher, config))
    }
}
