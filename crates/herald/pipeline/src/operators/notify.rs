//! Turn detected values into notifications.

use herald_types::{Notification, NotificationContent, NotificationType};

use crate::data::Data;
use crate::pipeline::{stateless, Pipeline};

fn notification<V, O, B>(
    stage: &'static str,
    notification_type: NotificationType,
    builder: B,
) -> Pipeline<V, Notification, O>
where
    V: Send + 'static,
    O: Send + Sync + 'static,
    B: Fn(&Data<V, O>) -> NotificationContent + Send + Sync + 'static,
{
    stateless(stage, move |data: Data<V, O>| {
        let content = builder(&data);
        Some(Ok(data.with_value(Notification::new(notification_type, content))))
    })
}

/// Wrap each value into an informational notification.
pub fn info<V, O, B>(builder: B) -> Pipeline<V, Notification, O>
where
    V: Send + 'static,
    O: Send + Sync + 'static,
    B: Fn(&Data<V, O>) -> NotificationContent + Send + Sync + 'static,
{
    notification("info", NotificationType::Info, builder)
}

/// Wrap each value into a warning notification.
pub fn warning<V, O, B>(builder: B) -> Pipeline<V, Notification, O>
where
    V: Send + 'static,
    O: Send + Sync + 'static,
    B: Fn(&Data<V, O>) -> NotificationContent + Send + Sync + 'static,
{
    notification("warning", NotificationType::Warning, builder)
}

/// Tag notifications with a notification type id used for subscription checks.
pub fn typed<O>(type_id: impl Into<String>) -> Pipeline<Notification, Notification, O>
where
    O: Send + Sync + 'static,
{
    let type_id = type_id.into();
    stateless("typed", move |data: Data<Notification, O>| {
        let type_id = type_id.clone();
        Some(Ok(data.map(|n| n.with_type_id(type_id))))
    })
}
