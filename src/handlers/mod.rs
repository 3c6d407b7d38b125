//! Handlers: priority-tagged, type-tagged callbacks.
//!
//! ## Contents
//! - [`Priority`], [`Decision`] ordering tiers and continuation decisions
//! - [`Handler`], [`HandlerId`], [`Pending`] handles and in-flight registrations
//! - [`Subscribe`] struct-based handlers
//! - `LogWriter` reference subscriber (feature `logging`)

mod handler;
#[cfg(feature = "logging")]
mod log;
mod priority;
mod subscribe;

pub use handler::{Handler, HandlerId, Pending};
#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use priority::{Decision, Priority};
pub use subscribe::Subscribe;

pub(crate) use handler::{Callback, HandlerCore, Link};
