//! Routes: a transformation, its notifiers and an addressing strategy.

use std::sync::Arc;

use futures::{FutureExt, StreamExt};
use tracing::{debug, warn};

use crate::dispatch::{AddressingStrategy, Dispatcher};
use crate::grouping::{GroupContext, Lane, RecordStream, Route};
use crate::notifier::Notifier;
use crate::transformation::Projection;

pub(crate) struct TransformRoute<T, R> {
    pub(crate) index: usize,
    pub(crate) projections: Vec<Projection<T, R>>,
    pub(crate) notifiers: Arc<Vec<Notifier<R, T>>>,
    pub(crate) strategy: AddressingStrategy,
    pub(crate) dispatcher: Arc<Dispatcher>,
}

impl<T, R> Route<T> for TransformRoute<T, R>
where
    T: Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    fn lanes(&self, group: &GroupContext) -> Vec<Lane<T>> {
        self.projections
            .iter()
            .map(|projection| {
                let projection = projection.clone();
                let notifiers = Arc::clone(&self.notifiers);
                let dispatcher = Arc::clone(&self.dispatcher);
                let group = group.clone();
                let strategy = self.strategy;
                let route = self.index;

                let lane: Lane<T> = Box::new(move |records: RecordStream<T>| {
                    async move {
                        debug!(
                            route,
                            field = %projection.field,
                            stages = ?projection.stages,
                            key = group.key(),
                            "Lane attached"
                        );
                        let mut detected = projection.attach(records);
                        while let Some(item) = detected.next().await {
                            match item {
                                Ok(data) => {
                                    for notifier in notifiers.iter() {
                                        dispatcher.dispatch(notifier, &data, &group, strategy).await;
                                    }
                                }
                                Err(error) => warn!(
                                    route,
                                    field = %projection.field,
                                    key = group.key(),
                                    error = %error,
                                    "Pipeline error reached dispatch"
                                ),
                            }
                        }
                        debug!(route, field = %projection.field, key = group.key(), "Lane finished");
                    }
                    .boxed()
                });
                lane
            })
            .collect()
    }
}
