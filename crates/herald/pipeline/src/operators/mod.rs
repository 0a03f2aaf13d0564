//! Operator library.
//!
//! Every operator is a factory returning a [`Pipeline`](crate::Pipeline);
//! nothing is shared between attachments.

pub mod aggregate;
pub mod diff;
pub mod flow;
pub mod notify;
pub mod trigger;
pub mod utility;
pub mod window;

/// What woke a timer-driven operator.
pub(crate) enum Wake<T> {
    Item(Option<T>),
    Timer,
}
