//! Diff and change detection between consecutive values.
//!
//! The first value only seeds the comparison. The stored value is replaced
//! after every comparison, whether or not anything was emitted.

use serde::{Deserialize, Serialize};

use crate::data::Data;
use crate::pipeline::{stateful, Pipeline};

/// Elements gained and lost between two consecutive collections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diff<E> {
    pub added: Vec<E>,
    pub removed: Vec<E>,
}

impl<E> Diff<E> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// A value that differs from its predecessor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change<E> {
    pub prev: E,
    pub current: E,
}

/// Elements of `left` with no equal in `right`, in `left` order, first
/// occurrence kept.
pub fn difference<E, F>(left: &[E], right: &[E], eq: &F) -> Vec<E>
where
    E: Clone,
    F: Fn(&E, &E) -> bool,
{
    let mut out: Vec<E> = Vec::new();
    for item in left {
        let in_right = right.iter().any(|other| eq(item, other));
        let seen = out.iter().any(|other| eq(item, other));
        if !in_right && !seen {
            out.push(item.clone());
        }
    }
    out
}

/// Emits what was added and removed relative to the previous collection.
pub fn diff<E, O, F>(eq: F) -> Pipeline<Vec<E>, Diff<E>, O>
where
    E: Clone + Send + 'static,
    O: Send + Sync + 'static,
    F: Fn(&E, &E) -> bool + Send + Sync + 'static,
{
    stateful(
        "diff",
        || None::<Vec<E>>,
        move |previous: &mut Option<Vec<E>>, data: Data<Vec<E>, O>| {
            let prior = previous.replace(data.value.clone())?;
            let result = Diff {
                added: difference(&data.value, &prior, &eq),
                removed: difference(&prior, &data.value, &eq),
            };
            if result.is_empty() {
                return None;
            }
            Some(Ok(data.with_value(result)))
        },
    )
}

/// Emits the elements added relative to the previous collection.
pub fn added<E, O, F>(eq: F) -> Pipeline<Vec<E>, Vec<E>, O>
where
    E: Clone + Send + 'static,
    O: Send + Sync + 'static,
    F: Fn(&E, &E) -> bool + Send + Sync + 'static,
{
    stateful(
        "added",
        || None::<Vec<E>>,
        move |previous: &mut Option<Vec<E>>, data: Data<Vec<E>, O>| {
            let prior = previous.replace(data.value.clone())?;
            let added = difference(&data.value, &prior, &eq);
            if added.is_empty() {
                return None;
            }
            Some(Ok(data.with_value(added)))
        },
    )
}

/// Emits `{prev, current}` whenever a value differs from its predecessor.
pub fn change<E, O, F>(eq: F) -> Pipeline<E, Change<E>, O>
where
    E: Clone + Send + 'static,
    O: Send + Sync + 'static,
    F: Fn(&E, &E) -> bool + Send + Sync + 'static,
{
    stateful(
        "change",
        || None::<E>,
        move |previous: &mut Option<E>, data: Data<E, O>| {
            let prior = previous.replace(data.value.clone())?;
            if eq(&prior, &data.value) {
                return None;
            }
            let current = data.value.clone();
            Some(Ok(data.with_value(Change { prev: prior, current })))
        },
    )
}
