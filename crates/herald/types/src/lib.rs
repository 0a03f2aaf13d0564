//! # Herald Types - Data model and capability ports
//!
//! Shared types for the Herald event-detection engine:
//!
//! - [`ResourceId`]: opaque identifier of a subscriber/resource
//! - [`SourceData`]: a measurement tagged with its partition
//! - [`Notification`]: the event value handed to delivery channels
//! - [`Subscriber`]: a recipient as seen by the subscriber directory
//!
//! The [`ports`] module declares the traits external collaborators implement:
//! pollable and push data sources, subscriber repositories and notification
//! sinks.

pub mod error;
pub mod ids;
pub mod notification;
pub mod ports;
pub mod source;
pub mod subscriber;

pub use error::{DirectoryError, DirectoryResult, SinkError, SourceError};
pub use ids::ResourceId;
pub use notification::{Notification, NotificationContent, NotificationType};
pub use ports::{
    poll_fn, push_fn, sink_fn, NotificationSink, PollableDataSource, PushDataSource,
    SubscriberRepository,
};
pub use source::{Partition, SourceData};
pub use subscriber::{
    MembershipChange, MembershipEvent, NotificationSubscription, Subscriber, SubscriberEvent,
};
