//! Pipeline composition.
//!
//! A [`Pipeline`] is a reusable factory: every [`Pipeline::attach`] builds a
//! new stream with its own operator state. The grouping core relies on this to
//! keep per-key state isolated.

use std::sync::Arc;

use futures::future;
use futures::stream::{BoxStream, StreamExt};

use crate::data::Data;
use crate::error::{PipelineError, PipelineResult};
use crate::retry;

/// Boxed stream of pipeline items.
pub type DataStream<V, O> = BoxStream<'static, PipelineResult<Data<V, O>>>;

pub(crate) type Factory<V, R, O> =
    Arc<dyn Fn(DataStream<V, O>) -> DataStream<R, O> + Send + Sync>;

/// A composable transformation from `V` values to `R` values over records of `O`.
pub struct Pipeline<V, R, O> {
    stages: Vec<String>,
    factory: Factory<V, R, O>,
}

impl<V, R, O> Clone for Pipeline<V, R, O> {
    fn clone(&self) -> Self {
        Self {
            stages: self.stages.clone(),
            factory: Arc::clone(&self.factory),
        }
    }
}

impl<V, R, O> std::fmt::Debug for Pipeline<V, R, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline").field("stages", &self.stages).finish()
    }
}

impl<V, R, O> Pipeline<V, R, O>
where
    V: Send + 'static,
    R: Send + 'static,
    O: Send + Sync + 'static,
{
    /// Wrap a stream transformer as a single named stage.
    pub fn new<F>(stage: impl Into<String>, f: F) -> Self
    where
        F: Fn(DataStream<V, O>) -> DataStream<R, O> + Send + Sync + 'static,
    {
        Self {
            stages: vec![stage.into()],
            factory: Arc::new(f),
        }
    }

    /// Build a fresh stream over `upstream`.
    pub fn attach(&self, upstream: DataStream<V, O>) -> DataStream<R, O> {
        (self.factory)(upstream)
    }

    /// Feed this pipeline's output into `next`.
    pub fn then<S>(self, next: Pipeline<R, S, O>) -> Pipeline<V, S, O>
    where
        S: Send + 'static,
    {
        let first = self.factory;
        let second = next.factory;
        let mut stages = self.stages;
        stages.extend(next.stages);
        Pipeline {
            stages,
            factory: Arc::new(move |upstream: DataStream<V, O>| second(first(upstream))),
        }
    }

    /// Resubscribe these stages with fresh state whenever they surface an error.
    ///
    /// The upstream is consumed once and keeps flowing across restarts; the
    /// failing item is dropped.
    pub fn on_error_retry(self) -> Self {
        let label: Arc<str> = Arc::from(self.stages.join(" > "));
        let inner = self.factory;
        let mut stages = self.stages;
        stages.push("on_error_retry".to_string());
        Self {
            stages,
            factory: Arc::new(move |upstream: DataStream<V, O>| {
                retry::resubscribing(upstream, Arc::clone(&inner), Arc::clone(&label))
            }),
        }
    }

    /// Stage names in application order.
    pub fn stages(&self) -> &[String] {
        &self.stages
    }
}

impl<V, O> Pipeline<V, V, O>
where
    V: Send + 'static,
    O: Send + Sync + 'static,
{
    /// A pipeline passing every item through unchanged.
    pub fn identity() -> Self {
        Self::new("identity", |upstream| upstream)
    }
}

/// Build a stage whose items are folded through per-attachment state.
///
/// `step` sees every successful item and decides whether to emit. Error items
/// pass through untouched.
pub(crate) fn stateful<V, R, O, S, I, F>(stage: impl Into<String>, init: I, step: F) -> Pipeline<V, R, O>
where
    V: Send + 'static,
    R: Send + 'static,
    O: Send + Sync + 'static,
    S: Send + 'static,
    I: Fn() -> S + Send + Sync + 'static,
    F: Fn(&mut S, Data<V, O>) -> Option<PipelineResult<Data<R, O>>> + Send + Sync + 'static,
{
    let step = Arc::new(step);
    Pipeline::new(stage, move |upstream: DataStream<V, O>| {
        let step = Arc::clone(&step);
        upstream
            .scan(init(), move |state, item| {
                let out = match item {
                    Ok(data) => step(state, data),
                    Err(err) => Some(Err(err)),
                };
                future::ready(Some(out))
            })
            .filter_map(future::ready)
            .boxed()
    })
}

/// Build a stateless stage.
pub(crate) fn stateless<V, R, O, F>(stage: impl Into<String>, f: F) -> Pipeline<V, R, O>
where
    V: Send + 'static,
    R: Send + 'static,
    O: Send + Sync + 'static,
    F: Fn(Data<V, O>) -> Option<PipelineResult<Data<R, O>>> + Send + Sync + 'static,
{
    stateful(stage, || (), move |_, data| f(data))
}

/// A stage rejecting every item, used when an operator is misconfigured.
pub(crate) fn invalid<V, R, O>(operator: &str, reason: impl Into<String>) -> Pipeline<V, R, O>
where
    V: Send + 'static,
    R: Send + 'static,
    O: Send + Sync + 'static,
{
    let error = PipelineError::InvalidOperator {
        operator: operator.to_string(),
        reason: reason.into(),
    };
    stateless(operator, move |_| Some(Err(error.clone())))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use herald_types::SourceData;

    /// Build a stream of `Data` items all partitioned under `key`.
    pub fn feed<V>(key: &str, values: Vec<V>) -> DataStream<V, ()>
    where
        V: Send + 'static,
    {
        let origin = Arc::new(SourceData::for_resource(key, ()));
        futures::stream::iter(
            values
                .into_iter()
                .map(move |v| Ok(Data::new(v, Arc::clone(&origin)))),
        )
        .boxed()
    }

    /// Like [`feed`], but each value is released after waiting `delay_ms`.
    pub fn timed<V>(key: &str, values: Vec<(u64, V)>) -> DataStream<V, ()>
    where
        V: Send + 'static,
    {
        let origin = Arc::new(SourceData::for_resource(key, ()));
        futures::stream::iter(values)
            .then(move |(delay_ms, v)| {
                let origin = Arc::clone(&origin);
                async move {
                    tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                    Ok(Data::new(v, origin))
                }
            })
            .boxed()
    }

    /// Run `pipeline` over `values` and collect successful outputs.
    pub async fn run<V, R>(pipeline: &Pipeline<V, R, ()>, values: Vec<V>) -> Vec<R>
    where
        V: Send + 'static,
        R: Send + 'static,
    {
        pipeline
            .attach(feed("r1", values))
            .filter_map(|item| future::ready(item.ok().map(|d| d.value)))
            .collect()
            .await
    }

    /// Collect successful outputs of an already attached stream.
    pub async fn values<R>(stream: DataStream<R, ()>) -> Vec<R>
    where
        R: Send + 'static,
    {
        stream
            .filter_map(|item| future::ready(item.ok().map(|d| d.value)))
            .collect()
            .await
    }
}
