//! Dispatch engine: bus facade, command queue, dispatch loop and registry.
//!
//! The public API from this module is [`Bus`], [`BusConfig`], [`FaultPolicy`],
//! [`Snapshot`] and the global accessors.
//!
//! Internal modules:
//! - [`bus`]: public facade and filtered views;
//! - [`worker`]: the serialized loop draining the command queue;
//! - [`registry`]: priority buckets, singleton slots and the dispatch pass;
//! - [`config`]: bus configuration and fault policy;
//! - [`global`]: the process-wide bus.
//!
//! ## Wiring
//! ```text
//! producers ──► Bus::broadcast ─┐
//! Bus::register / Handler ──────┼──► Command queue ──► Worker ──► Registry::dispatch
//! Bus::flush / snapshot ────────┘     (one task, one command at a time)
//! ```

mod bus;
mod config;
mod global;
mod registry;
mod worker;

pub use bus::Bus;
pub use config::{BusConfig, FaultPolicy};
pub use global::{global, init_global};
pub use registry::Snapshot;

pub(crate) use worker::{Command, LoopState};

