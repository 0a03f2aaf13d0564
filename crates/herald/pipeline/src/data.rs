//! The value envelope flowing through pipelines.

use std::fmt;
use std::sync::Arc;

use herald_types::{ResourceId, SourceData};

/// A note left by a trigger or the `trace` operator, kept for introspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry {
    pub stage: String,
    pub detail: String,
}

/// A transformed value together with the record it was derived from.
///
/// `origin` is shared between every projection of the same source record, so
/// cloning a `Data` never copies the measurement itself.
pub struct Data<V, O> {
    /// Current value.
    pub value: V,

    /// Source record the value was derived from.
    pub origin: Arc<SourceData<O>>,

    /// Entries left by triggers and `trace` stages. Windows, aggregates,
    /// diffs and notification builders carry it forward without adding to it.
    pub trace: Vec<TraceEntry>,
}

impl<V, O> Data<V, O> {
    pub fn new(value: V, origin: Arc<SourceData<O>>) -> Self {
        Self {
            value,
            origin,
            trace: Vec::new(),
        }
    }

    /// Grouping key of the originating record.
    pub fn grouping_key(&self) -> &str {
        self.origin.grouping_key()
    }

    /// Resource of the originating record, if partitioned by resource.
    pub fn resource_id(&self) -> Option<&ResourceId> {
        self.origin.resource_id()
    }

    /// The originating payload.
    pub fn record(&self) -> &O {
        &self.origin.data
    }

    /// Replace the value, keeping origin and trace.
    pub fn with_value<U>(self, value: U) -> Data<U, O> {
        Data {
            value,
            origin: self.origin,
            trace: self.trace,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(V) -> U) -> Data<U, O> {
        Data {
            value: f(self.value),
            origin: self.origin,
            trace: self.trace,
        }
    }

    /// Append a trace entry.
    pub fn traced(mut self, stage: impl Into<String>, detail: impl Into<String>) -> Self {
        self.trace.push(TraceEntry {
            stage: stage.into(),
            detail: detail.into(),
        });
        self
    }

    /// Collapse a window of items into one item carrying all values.
    ///
    /// The window takes the origin and trace of its newest item.
    pub(crate) fn window(items: Vec<Data<V, O>>) -> Option<Data<Vec<V>, O>> {
        let origin = Arc::clone(&items.last()?.origin);
        let mut values = Vec::with_capacity(items.len());
        let mut trace = Vec::new();
        for item in items {
            values.push(item.value);
            trace = item.trace;
        }
        Some(Data {
            value: values,
            origin,
            trace,
        })
    }
}

impl<V: Clone, O> Clone for Data<V, O> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            origin: Arc::clone(&self.origin),
            trace: self.trace.clone(),
        }
    }
}

impl<V: fmt::Debug, O> fmt::Debug for Data<V, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Data")
            .field("value", &self.value)
            .field("grouping_key", &self.grouping_key())
            .field("trace", &self.trace)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin(key: &str) -> Arc<SourceData<u32>> {
        Arc::new(SourceData::for_resource(key, 7))
    }

    #[test]
    fn test_with_value_keeps_origin_and_trace() {
        let data = Data::new(1.5_f64, origin("a")).traced("stage", "detail");
        let mapped = data.with_value("x");
        assert_eq!(mapped.value, "x");
        assert_eq!(mapped.grouping_key(), "a");
        assert_eq!(*mapped.record(), 7);
        assert_eq!(mapped.trace.len(), 1);
    }

    #[test]
    fn test_window_uses_newest_origin() {
        let items = vec![
            Data::new(1, origin("a")),
            Data::new(2, origin("b")).traced("s", "d"),
        ];
        let window = Data::window(items).unwrap();
        assert_eq!(window.value, vec![1, 2]);
        assert_eq!(window.grouping_key(), "b");
        assert_eq!(window.trace[0].stage, "s");
    }

    #[test]
    fn test_empty_window_is_none() {
        assert!(Data::<u8, u32>::window(Vec::new()).is_none());
    }
}
