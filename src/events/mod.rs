//! Events: what can be published and how it relates to handler types.
//!
//! ## Contents
//! - [`Event`], [`TypeTag`] the broadcastable contract and the runtime type descriptor
//! - [`Interception`], [`InterceptStatus`] the optional short-circuit protocol
//! - [`Broadcast`] extension trait giving every event `broadcast()` / `broadcast_to()`
//!
//! See `core/mod.rs` for how events flow through the dispatch loop.

mod broadcast;
mod event;
mod intercept;

pub use broadcast::Broadcast;
pub use event::{AsAny, Event, TypeTag};
pub use intercept::{InterceptStatus, Interception};

pub(crate) use event::view;
