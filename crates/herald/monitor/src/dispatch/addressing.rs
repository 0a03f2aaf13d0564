//! Recipient addressing.

use std::fmt;
use std::sync::Arc;

use herald_pipeline::Data;
use herald_types::ResourceId;
use serde::{Deserialize, Serialize};

use crate::grouping::GroupContext;

/// How a route picks recipients when its notifier does not say.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressingStrategy {
    /// The resource the current record belongs to.
    #[default]
    Unicast,
    /// Every resource seen so far in the record's group.
    Multicast,
    /// Every subscriber in the directory.
    Broadcast,
}

type UnicastFn<R, T> = Arc<dyn Fn(&Data<R, T>) -> Option<ResourceId> + Send + Sync>;
type MulticastFn<R, T> = Arc<dyn Fn(&Data<R, T>) -> Vec<ResourceId> + Send + Sync>;

/// Explicit addressing attached to a notifier; overrides the route strategy.
pub enum Addressing<R, T> {
    Unicast(UnicastFn<R, T>),
    Multicast(MulticastFn<R, T>),
    Broadcast,
}

impl<R, T> Addressing<R, T> {
    pub fn unicast<F>(select: F) -> Self
    where
        F: Fn(&Data<R, T>) -> Option<ResourceId> + Send + Sync + 'static,
    {
        Self::Unicast(Arc::new(select))
    }

    pub fn multicast<F>(select: F) -> Self
    where
        F: Fn(&Data<R, T>) -> Vec<ResourceId> + Send + Sync + 'static,
    {
        Self::Multicast(Arc::new(select))
    }
}

impl<R, T> Clone for Addressing<R, T> {
    fn clone(&self) -> Self {
        match self {
            Self::Unicast(f) => Self::Unicast(Arc::clone(f)),
            Self::Multicast(f) => Self::Multicast(Arc::clone(f)),
            Self::Broadcast => Self::Broadcast,
        }
    }
}

impl<R, T> fmt::Debug for Addressing<R, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unicast(_) => f.write_str("Unicast(..)"),
            Self::Multicast(_) => f.write_str("Multicast(..)"),
            Self::Broadcast => f.write_str("Broadcast"),
        }
    }
}

/// Recipient candidates before directory and eligibility filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Candidates {
    Listed(Vec<ResourceId>),
    Everyone,
}

/// Resolve candidates for one detected value.
///
/// Explicit addressing wins outright, even when it selects nobody. Otherwise
/// the route strategy applies, and a strategy that yields nobody falls back to
/// broadcast.
pub(crate) fn resolve<R, T>(
    explicit: Option<&Addressing<R, T>>,
    strategy: AddressingStrategy,
    data: &Data<R, T>,
    group: &GroupContext,
) -> Candidates {
    if let Some(addressing) = explicit {
        return match addressing {
            Addressing::Unicast(select) => Candidates::Listed(select(data).into_iter().collect()),
            Addressing::Multicast(select) => Candidates::Listed(select(data)),
            Addressing::Broadcast => Candidates::Everyone,
        };
    }

    let listed: Vec<ResourceId> = match strategy {
        AddressingStrategy::Unicast => data.resource_id().cloned().into_iter().collect(),
        AddressingStrategy::Multicast => group.resources(),
        AddressingStrategy::Broadcast => return Candidates::Everyone,
    };

    if listed.is_empty() {
        Candidates::Everyone
    } else {
        Candidates::Listed(listed)
    }
}
