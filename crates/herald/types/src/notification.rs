//! Notifications produced by detection pipelines.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity tag of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Info,
    Warning,
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationType::Info => write!(f, "info"),
            NotificationType::Warning => write!(f, "warning"),
        }
    }
}

/// Title and message produced by a caller-supplied message builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationContent {
    pub title: String,
    pub message: String,
}

impl NotificationContent {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
        }
    }
}

/// A detected event ready for delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Unique id of this notification.
    pub id: Uuid,

    /// When the notification was produced.
    pub timestamp: DateTime<Utc>,

    /// Severity tag.
    pub notification_type: NotificationType,

    pub title: String,

    pub message: String,

    /// Subscription type this notification belongs to, used for eligibility.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_id: Option<String>,
}

impl Notification {
    pub fn new(notification_type: NotificationType, content: NotificationContent) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            notification_type,
            title: content.title,
            message: content.message,
            type_id: None,
        }
    }

    pub fn info(content: NotificationContent) -> Self {
        Self::new(NotificationType::Info, content)
    }

    pub fn warning(content: NotificationContent) -> Self {
        Self::new(NotificationType::Warning, content)
    }

    /// Tag the notification with a subscription type id.
    pub fn with_type_id(mut self, type_id: impl Into<String>) -> Self {
        self.type_id = Some(type_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_tag_type() {
        let info = Notification::info(NotificationContent::new("t", "m"));
        assert_eq!(info.notification_type, NotificationType::Info);

        let warning = Notification::warning(NotificationContent::new("t", "m"));
        assert_eq!(warning.notification_type, NotificationType::Warning);
        assert_ne!(info.id, warning.id);
    }

    #[test]
    fn test_type_id_skipped_when_absent() {
        let n = Notification::info(NotificationContent::new("t", "m"));
        let json = serde_json::to_value(&n).unwrap();
        assert!(json.get("type_id").is_none());

        let n = n.with_type_id("liquidation");
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["type_id"], "liquidation");
        assert_eq!(json["notification_type"], "info");
    }
}
