//! # `event.broadcast()`
//!
//! [`Broadcast`] is implemented for every [`Event`], so any event value can publish
//! itself, either on the process-wide bus or on a specific one.
//!
//! ## Example
//! ```rust
//! use priobus::{Broadcast, Bus, BusConfig, Event};
//!
//! struct Saved(u32);
//! impl Event for Saved {}
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), priobus::BusError> {
//! let bus = Bus::new(BusConfig::default());
//! Saved(1).broadcast_to(&bus).await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;

use crate::core::{Bus, global};
use crate::error::BusError;

use super::event::Event;

/// Publishing methods available on every event.
#[async_trait]
pub trait Broadcast: Event + Sized {
    /// Publishes on the process-wide bus (see [`global`](crate::global)).
    async fn broadcast(self) -> Result<(), BusError> {
        global().broadcast(self).await
    }

    /// Publishes on `bus`.
    async fn broadcast_to(self, bus: &Bus) -> Result<(), BusError> {
        bus.broadcast(self).await
    }
}

impl<E: Event> Broadcast for E {}
