//! General-purpose stages.

use std::fmt::Debug;
use std::sync::Arc;

use tracing::{debug, error, info, trace as trace_event, warn};

use crate::data::Data;
use crate::error::PipelineError;
use crate::logging::{LogLevel, LogSettings};
use crate::pipeline::{stateless, Pipeline};

/// Log every value passing through, unchanged.
pub fn log<V, O>(settings: LogSettings, label: impl Into<String>) -> Pipeline<V, V, O>
where
    V: Debug + Send + 'static,
    O: Send + Sync + 'static,
{
    let label: Arc<str> = Arc::from(label.into());
    stateless("log", move |data: Data<V, O>| {
        emit(&settings, &label, &data);
        Some(Ok(data))
    })
}

fn emit<V: Debug, O>(settings: &LogSettings, label: &str, data: &Data<V, O>) {
    let key = data.grouping_key();
    let value = &data.value;
    let trace = if settings.include_trace {
        format!("{:?}", data.trace)
    } else {
        String::new()
    };
    match settings.level {
        LogLevel::Trace => trace_event!(label, key, ?value, %trace, "pipeline value"),
        LogLevel::Debug => debug!(label, key, ?value, %trace, "pipeline value"),
        LogLevel::Info => info!(label, key, ?value, %trace, "pipeline value"),
        LogLevel::Warn => warn!(label, key, ?value, %trace, "pipeline value"),
        LogLevel::Error => error!(label, key, ?value, %trace, "pipeline value"),
        LogLevel::Off => {}
    }
}

/// Project each value.
pub fn map<V, R, O, F>(f: F) -> Pipeline<V, R, O>
where
    V: Send + 'static,
    R: Send + 'static,
    O: Send + Sync + 'static,
    F: Fn(V) -> R + Send + Sync + 'static,
{
    stateless("map", move |data: Data<V, O>| Some(Ok(data.map(&f))))
}

/// Keep values matching `predicate`.
pub fn filter<V, O, F>(predicate: F) -> Pipeline<V, V, O>
where
    V: Send + 'static,
    O: Send + Sync + 'static,
    F: Fn(&V) -> bool + Send + Sync + 'static,
{
    stateless("filter", move |data: Data<V, O>| {
        predicate(&data.value).then_some(Ok(data))
    })
}

/// Fallible projection; a failure surfaces as a stage error.
pub fn try_map<V, R, O, E, F>(stage: impl Into<String>, f: F) -> Pipeline<V, R, O>
where
    V: Send + 'static,
    R: Send + 'static,
    O: Send + Sync + 'static,
    E: std::fmt::Display,
    F: Fn(V) -> Result<R, E> + Send + Sync + 'static,
{
    let stage: String = stage.into();
    let name = stage.clone();
    stateless(stage, move |data: Data<V, O>| {
        let Data { value, origin, trace } = data;
        Some(
            f(value)
                .map(|value| Data { value, origin, trace })
                .map_err(|err| PipelineError::stage(name.as_str(), err.to_string())),
        )
    })
}

/// Record the current value in the item's trace.
pub fn trace<V, O>(stage: impl Into<String>) -> Pipeline<V, V, O>
where
    V: Debug + Send + 'static,
    O: Send + Sync + 'static,
{
    let stage: String = stage.into();
    let name = stage.clone();
    stateless(stage, move |data: Data<V, O>| {
        let detail = format!("{:?}", data.value);
        Some(Ok(data.traced(name.as_str(), detail)))
    })
}
