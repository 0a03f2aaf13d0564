//! # Herald Monitor - Detection runtime and notification dispatch
//!
//! A [`Monitor`] ingests records from one data source, partitions them by
//! resource or grouping key, runs every group through the configured
//! [`Transformation`]s and hands detected values to [`Notifier`]s.
//!
//! ## Architecture
//!
//! ```text
//! source task ──> router ──> group task (per key) ──> lanes (field × pipeline)
//!                                                        │
//!                               subscriber directory <── dispatcher ──> sinks
//! ```
//!
//! - One source task polls, consumes a push stream or follows directory
//!   membership events
//! - The router spawns a group task the first time it sees a key
//! - Every lane resubscribes its pipeline after an error; sibling lanes and
//!   other groups keep running
//! - The dispatcher resolves recipients, filters them through the directory and
//!   an [`EligibilityPolicy`], and settles every sink call
//!
//! ## Example
//!
//! ```rust,ignore
//! let monitor = MonitorBuilder::new(subscribers)
//!     .config(MonitorConfig::load(Some("herald.toml"))?)
//!     .poll(wallets)
//!     .transform(Transformation::of(
//!         Field::new("balance", |w: &Wallet| w.balance),
//!         trigger::falling_edge(10.0),
//!     ))
//!     .notify(Notifier::new("chat", chat_sink, |d| format!("Low balance: {}", d.value)))
//!     .dispatch(AddressingStrategy::Unicast)
//!     .build()?;
//!
//! monitor.start().await?;
//! ```

pub mod builder;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod grouping;
pub mod monitor;
pub mod notifier;
pub mod telemetry;
pub mod transformation;

mod route;
mod source;

pub use builder::{MonitorBuilder, NotifyStep, ReadyStep, SourceStep};
pub use config::{
    DispatchConfig, LoggingConfig, MonitorConfig, NotificationTypeConfig, SourceConfig,
};
pub use dispatch::{
    Addressing, AddressingStrategy, AllowAll, DeliveryFailure, DispatchReport, Dispatcher,
    EligibilityPolicy, EligibilityRequest, SubscriptionEligibility,
};
pub use error::{BuildError, ConfigError, MonitorError, MonitorResult};
pub use grouping::GroupContext;
pub use monitor::{Monitor, MonitorState};
pub use notifier::Notifier;
pub use telemetry::init_tracing;
pub use transformation::{Field, Transformation};
