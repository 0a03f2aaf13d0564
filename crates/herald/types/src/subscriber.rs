//! Subscribers and membership changes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::ResourceId;

/// A subscriber's preference for one notification type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSubscription {
    pub type_id: String,
    pub enabled: bool,
}

/// A recipient tracked by the subscriber directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub resource_id: ResourceId,

    /// Per-channel contact attributes, e.g. `"email" -> "a@b.c"`.
    #[serde(default)]
    pub contacts: BTreeMap<String, String>,

    /// Notification type preferences; `None` means none were recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_subscriptions: Option<Vec<NotificationSubscription>>,
}

impl Subscriber {
    pub fn new(resource_id: impl Into<ResourceId>) -> Self {
        Self {
            resource_id: resource_id.into(),
            contacts: BTreeMap::new(),
            notification_subscriptions: None,
        }
    }

    pub fn with_contact(mut self, channel: impl Into<String>, address: impl Into<String>) -> Self {
        self.contacts.insert(channel.into(), address.into());
        self
    }

    pub fn with_subscription(mut self, type_id: impl Into<String>, enabled: bool) -> Self {
        self.notification_subscriptions
            .get_or_insert_with(Vec::new)
            .push(NotificationSubscription {
                type_id: type_id.into(),
                enabled,
            });
        self
    }

    pub fn contact(&self, channel: &str) -> Option<&str> {
        self.contacts.get(channel).map(String::as_str)
    }

    /// Recorded preference for a notification type, if any.
    pub fn subscription(&self, type_id: &str) -> Option<&NotificationSubscription> {
        self.notification_subscriptions
            .as_ref()?
            .iter()
            .find(|s| s.type_id == type_id)
    }
}

/// Membership change published by a subscriber repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "resource_ids", rename_all = "snake_case")]
pub enum MembershipEvent {
    Added(Vec<ResourceId>),
    Removed(Vec<ResourceId>),
}

impl MembershipEvent {
    pub fn resource_ids(&self) -> &[ResourceId] {
        match self {
            MembershipEvent::Added(ids) | MembershipEvent::Removed(ids) => ids,
        }
    }
}

/// Direction of a single membership change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipChange {
    Added,
    Removed,
}

/// Record type emitted by the subscriber-events data source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberEvent {
    pub resource_id: ResourceId,
    pub change: MembershipChange,
}

impl SubscriberEvent {
    /// Expand a membership event into one record per resource.
    pub fn from_membership(event: &MembershipEvent) -> Vec<SubscriberEvent> {
        let change = match event {
            MembershipEvent::Added(_) => MembershipChange::Added,
            MembershipEvent::Removed(_) => MembershipChange::Removed,
        };
        event
            .resource_ids()
            .iter()
            .map(|id| SubscriberEvent {
                resource_id: id.clone(),
                change,
            })
            .collect()
    }
}
