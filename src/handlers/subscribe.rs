//! # Struct-based handlers.
//!
//! [`Subscribe`] is the named alternative to closures: implement it on a type that
//! keeps its own state (counters, sinks) and register it with
//! [`Bus::subscribe`](crate::Bus::subscribe) or
//! [`Bus::subscribe_any`](crate::Bus::subscribe_any).
//!
//! ## Rules
//! - `on_event` runs inside the dispatch loop: keep it short and non-blocking.
//! - A panic inside `on_event` is a handler fault, handled per
//!   [`FaultPolicy`](crate::FaultPolicy).
//!
//! ## Example
//! ```rust
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use priobus::{Decision, Event, Subscribe};
//!
//! struct Tick(u64);
//! impl Event for Tick {}
//!
//! #[derive(Default)]
//! struct Metrics { ticks: AtomicU64 }
//!
//! impl Subscribe<Tick> for Metrics {
//!     fn on_event(&self, ev: &Tick) -> Decision {
//!         self.ticks.fetch_add(ev.0, Ordering::Relaxed);
//!         Decision::Continue
//!     }
//!
//!     fn name(&self) -> &'static str { "metrics" }
//! }
//! ```

use super::priority::Decision;

/// Handler implemented by a type rather than a closure.
///
/// `E` is either a concrete event type or `dyn Event` for the hierarchy root.
pub trait Subscribe<E: ?Sized>: Send + Sync + 'static {
    /// Handles one event and decides whether to stay registered.
    fn on_event(&self, event: &E) -> Decision;

    /// Returns the handler name used in logs.
    ///
    /// The default uses `type_name::<Self>()`; override it with something short.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}
