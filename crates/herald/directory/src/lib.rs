//! # Herald Directory - Subscriber directory for notification dispatch
//!
//! - [`CachingSubscriberRepository`]: serves snapshots of any
//!   [`SubscriberRepository`](herald_types::SubscriberRepository) with TTL
//!   expiry, single-flight refresh and membership change events
//! - [`InMemorySubscriberRepository`]: a mutable in-memory store
//!
//! ## Example
//!
//! ```rust,ignore
//! let store = Arc::new(InMemorySubscriberRepository::new());
//! let directory = Arc::new(CachingSubscriberRepository::new(store, DirectoryConfig::default()));
//! let maintenance = directory.spawn_maintenance();
//! ```

pub mod caching;
pub mod config;
pub mod memory;

pub use caching::{CachingSubscriberRepository, Snapshot};
pub use config::DirectoryConfig;
pub use memory::InMemorySubscriberRepository;
