//! # Process-wide bus.
//!
//! [`global()`] returns a root bus created on first use with
//! [`BusConfig::default`]; [`init_global`] creates it eagerly with a custom
//! configuration. There is no teardown beyond process exit.
//!
//! ## Rules
//! - The first call to either function must happen inside a Tokio runtime that
//!   outlives every use of the global bus (the loop is a task on that runtime).
//! - Closure is permanent. Once that runtime is dropped, or the global bus is
//!   shut down or halted, every operation on it fails and it cannot be created
//!   again: [`init_global`] keeps returning [`BusError::AlreadyInitialized`].
//! - Tests should prefer isolated [`Bus::new`] instances.

use std::sync::OnceLock;

use crate::core::bus::Bus;
use crate::core::config::BusConfig;
use crate::error::BusError;

static GLOBAL: OnceLock<Bus> = OnceLock::new();

/// The process-wide bus, created with the default configuration on first use.
pub fn global() -> &'static Bus {
    GLOBAL.get_or_init(|| Bus::new(BusConfig::default()))
}

/// Creates the process-wide bus with `cfg`.
///
/// Fails with [`BusError::AlreadyInitialized`] if it already exists, whether or
/// not its loop is still running.
pub fn init_global(cfg: BusConfig) -> Result<&'static Bus, BusError> {
    let mut created = false;
    let bus = GLOBAL.get_or_init(|| {
        created = true;
        Bus::new(cfg)
    });
    if created {
        return Ok(bus);
    }
    if bus.is_closed() {
        tracing::warn!(
            name = bus.config().name,
            "global bus is closed and cannot be re-initialized"
        );
    }
    Err(BusError::AlreadyInitialized)
}
