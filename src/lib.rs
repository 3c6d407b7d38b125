//! # priobus
//!
//! **priobus** is an in-process, typed publish/subscribe event bus for Rust.
//!
//! Producers publish typed event values; consumers register handlers bound to an
//! event type and a priority tier; a single serialized dispatch loop delivers each
//! event to matching handlers in a deterministic order, with optional
//! short-circuit interception.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!  producer #1      producer #2      Handler::unregister()   Bus::register*()
//!       │                │                    │                     │
//!       │ broadcast      │ broadcast          │ Unregister{id}      │ Register{handler}
//!       ▼                ▼                    ▼                     ▼
//! ┌───────────────────────────────────────────────────────────────────────┐
//! │                   Command queue (one per root bus)                    │
//! └───────────────────────────────────┬───────────────────────────────────┘
//!                                     ▼
//!                       ┌───────────────────────────┐
//!                       │  Worker (dispatch loop)   │  one task, one command
//!                       │  owns the Registry        │  at a time, no locks
//!                       └─────────────┬─────────────┘
//!                                     ▼
//!   FirstOne ─► First ─► Secondary ─► Normal ─► Unimportant ─► AllowNotRun ─► LastOne
//!   (slot)      └──────── buckets, insertion order, interceptable ──────┘     (slot)
//! ```
//!
//! ### Per-event pass
//! ```text
//! dispatch(event)
//!   ├─► FirstOne handler (if type matches)            never skipped
//!   ├─► buckets First..=AllowNotRun, insertion order
//!   │     └─ event intercepted? ─► abandon the walk
//!   └─► LastOne handler (if type matches)             never skipped
//!
//! each invocation returns Decision::{Continue, Unregister}
//! ```
//!
//! ## Features
//! | Area              | Description                                                   | Key types / traits                       |
//! |-------------------|---------------------------------------------------------------|------------------------------------------|
//! | **Events**        | Broadcastable values, type hierarchy via `upcast`.            | [`Event`], [`TypeTag`], [`Broadcast`]    |
//! | **Interception**  | One-way short-circuit of the current dispatch pass.           | [`Interception`], [`InterceptStatus`]    |
//! | **Handlers**      | Priority-tagged callbacks and struct-based subscribers.       | [`Handler`], [`Priority`], [`Subscribe`] |
//! | **Bus**           | Root bus, filtered views, rendezvous broadcast.               | [`Bus`], [`Pending`], [`Snapshot`]       |
//! | **Errors**        | Level conflicts, closed or halted loops.                      | [`BusError`]                             |
//! | **Configuration** | Bus name and handler fault policy.                            | [`BusConfig`], [`FaultPolicy`]           |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] subscriber _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use priobus::{Bus, BusConfig, Decision, Event, Interception, Priority};
//!
//! #[derive(Default)]
//! struct Click { x: i32, interception: Interception }
//!
//! impl Event for Click {
//!     fn interception(&self) -> Option<&Interception> {
//!         Some(&self.interception)
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), priobus::BusError> {
//!     let bus = Bus::new(BusConfig::default());
//!
//!     // Swallow clicks on the left half before anyone else sees them.
//!     bus.register(Priority::First, |c: &Click| {
//!         if c.x < 0 {
//!             c.intercept();
//!         }
//!         Decision::Continue
//!     })
//!     .await?;
//!
//!     bus.register_auto_continue(Priority::Normal, |c: &Click| println!("click at {}", c.x))
//!         .await?;
//!
//!     // Audit sees every event, intercepted or not.
//!     bus.register_any(Priority::LastOne, |ev: &dyn Event| {
//!         println!("audit: {}", ev.event_name());
//!         Decision::Continue
//!     })
//!     .await?;
//!
//!     bus.broadcast(Click { x: -5, ..Click::default() }).await?;
//!     bus.broadcast(Click { x: 5, ..Click::default() }).await?;
//!     bus.flush().await?;
//!     Ok(())
//! }
//! ```
mod core;
mod error;
mod events;
mod handlers;

// ---- Public re-exports ----

pub use core::{Bus, BusConfig, FaultPolicy, Snapshot, global, init_global};
pub use error::BusError;
pub use events::{AsAny, Broadcast, Event, InterceptStatus, Interception, TypeTag};
pub use handlers::{Decision, Handler, HandlerId, Pending, Priority, Subscribe};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use handlers::LogWriter;
