//! # Herald Pipeline - Detection pipelines over keyed streams
//!
//! A [`Pipeline`] turns a stream of [`Data`] values into another, carrying the
//! originating record alongside every value. Pipelines are factories: each
//! attachment owns fresh operator state, so one pipeline definition can serve
//! any number of resource partitions.
//!
//! ## Operators
//!
//! - [`operators::window`]: `fixed_size`, `fixed_size_sliding`, `fixed_time`
//! - [`operators::aggregate`]: `avg`, `max`, `min`
//! - [`operators::trigger`]: `rising_edge`, `falling_edge`, `increase`, `decrease`
//! - [`operators::diff`]: `diff`, `added`, `change`
//! - [`operators::notify`]: `info`, `warning`, `typed`
//! - [`operators::flow`]: `rate_limit`, `on_error_retry`
//! - [`operators::utility`]: `log`, `map`, `filter`, `try_map`, `trace`
//!
//! ## Example
//!
//! ```rust,ignore
//! use herald_pipeline::operators::{notify, trigger};
//!
//! let low_balance = trigger::falling_edge(10.0)
//!     .then(notify::warning(|d| NotificationContent::new("Low balance", format!("{}", d.value))));
//! ```

pub mod data;
pub mod error;
pub mod logging;
pub mod operators;
pub mod pipeline;
mod retry;

pub use data::{Data, TraceEntry};
pub use error::{PipelineError, PipelineResult};
pub use logging::{LogLevel, LogSettings};
pub use operators::diff::{Change, Diff};
pub use pipeline::{DataStream, Pipeline};
