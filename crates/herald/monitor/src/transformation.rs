//! Transformations: which fields of a record feed which pipelines.

use std::fmt;
use std::sync::Arc;

use futures::stream::StreamExt;
use herald_pipeline::{Data, DataStream, Pipeline};

use crate::grouping::RecordStream;

type Accessor<T, V> = Arc<dyn Fn(&T) -> V + Send + Sync>;
type Attach<T, R> = Arc<dyn Fn(RecordStream<T>) -> DataStream<R, T> + Send + Sync>;

/// A named accessor projecting a record onto a pipeline input.
pub struct Field<T, V> {
    name: String,
    accessor: Accessor<T, V>,
}

impl<T, V> Field<T, V> {
    pub fn new<F>(name: impl Into<String>, accessor: F) -> Self
    where
        F: Fn(&T) -> V + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            accessor: Arc::new(accessor),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T, V> Clone for Field<T, V> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            accessor: Arc::clone(&self.accessor),
        }
    }
}

impl<T, V> fmt::Debug for Field<T, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field").field("name", &self.name).finish()
    }
}

/// Fields and the pipelines applied to each of them.
///
/// Every field is run through every pipeline; each combination becomes an
/// independent lane per group.
pub struct Transformation<T, V, R> {
    fields: Vec<Field<T, V>>,
    pipelines: Vec<Pipeline<V, R, T>>,
}

impl<T, V, R> Default for Transformation<T, V, R> {
    fn default() -> Self {
        Self {
            fields: Vec::new(),
            pipelines: Vec::new(),
        }
    }
}

impl<T, V, R> Transformation<T, V, R>
where
    T: Send + Sync + 'static,
    V: Send + 'static,
    R: Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// One field through one pipeline.
    pub fn of(field: Field<T, V>, pipeline: Pipeline<V, R, T>) -> Self {
        Self::new().field(field).pipeline(pipeline)
    }

    pub fn field(mut self, field: Field<T, V>) -> Self {
        self.fields.push(field);
        self
    }

    pub fn pipeline(mut self, pipeline: Pipeline<V, R, T>) -> Self {
        self.pipelines.push(pipeline);
        self
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    /// Expand into one projection per field and pipeline, each wrapped so
    /// that a failing pipeline resubscribes instead of terminating.
    pub(crate) fn into_projections(self) -> Vec<Projection<T, R>> {
        let mut projections = Vec::with_capacity(self.fields.len() * self.pipelines.len());
        for field in &self.fields {
            for pipeline in &self.pipelines {
                let pipeline = pipeline.clone().on_error_retry();
                let accessor = Arc::clone(&field.accessor);
                let stages = pipeline.stages().to_vec();
                let attach: Attach<T, R> = Arc::new(move |records: RecordStream<T>| {
                    let accessor = Arc::clone(&accessor);
                    let values = records
                        .map(move |record| Ok(Data::new(accessor(&record.data), record)))
                        .boxed();
                    pipeline.attach(values)
                });
                projections.push(Projection {
                    field: field.name.clone(),
                    stages,
                    attach,
                });
            }
        }
        projections
    }
}

/// A field bound to a pipeline, attachable to any group's records.
pub(crate) struct Projection<T, R> {
    pub(crate) field: String,
    pub(crate) stages: Vec<String>,
    attach: Attach<T, R>,
}

impl<T, R> Projection<T, R> {
    pub(crate) fn attach(&self, records: RecordStream<T>) -> DataStream<R, T> {
        (self.attach)(records)
    }
}

impl<T, R> Clone for Projection<T, R> {
    fn clone(&self) -> Self {
        Self {
            field: self.field.clone(),
            stages: self.stages.clone(),
            attach: Arc::clone(&self.attach),
        }
    }
}
