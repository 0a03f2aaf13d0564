//! Source records entering a monitor.

use serde::{Deserialize, Serialize};

use crate::ids::ResourceId;

/// How a source record is partitioned before it reaches the pipelines.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Partition {
    /// Partitioned by the resource the record is about.
    Resource(ResourceId),
    /// Partitioned by an arbitrary grouping key.
    Group(String),
}

/// A measurement produced by a data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceData<T> {
    /// The measured payload.
    pub data: T,

    /// Partition this record belongs to.
    pub partition: Partition,
}

impl<T> SourceData<T> {
    /// A record about a single resource; the resource id is the grouping key.
    pub fn for_resource(resource_id: impl Into<ResourceId>, data: T) -> Self {
        Self {
            data,
            partition: Partition::Resource(resource_id.into()),
        }
    }

    /// A record partitioned by an explicit grouping key.
    pub fn grouped(grouping_key: impl Into<String>, data: T) -> Self {
        Self {
            data,
            partition: Partition::Group(grouping_key.into()),
        }
    }

    /// Key used to route this record to its sub-pipeline.
    pub fn grouping_key(&self) -> &str {
        match &self.partition {
            Partition::Resource(id) => id.as_str(),
            Partition::Group(key) => key,
        }
    }

    /// Resource this record is about, when partitioned by resource.
    pub fn resource_id(&self) -> Option<&ResourceId> {
        match &self.partition {
            Partition::Resource(id) => Some(id),
            Partition::Group(_) => None,
        }
    }

    /// Replace the payload, keeping the partition.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> SourceData<U> {
        SourceData {
            data: f(self.data),
            partition: self.partition,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_partition_key() {
        let record = SourceData::for_resource("wallet-1", 0.4_f64);
        assert_eq!(record.grouping_key(), "wallet-1");
        assert_eq!(record.resource_id(), Some(&ResourceId::new("wallet-1")));
    }

    #[test]
    fn test_group_partition_key() {
        let record = SourceData::grouped("pool-7", 3_u32);
        assert_eq!(record.grouping_key(), "pool-7");
        assert!(record.resource_id().is_none());
    }

    #[test]
    fn test_map_keeps_partition() {
        let record = SourceData::grouped("pool-7", 3_u32).map(|v| v * 2);
        assert_eq!(record.data, 6);
        assert_eq!(record.partition, Partition::Group("pool-7".into()));
    }
}
