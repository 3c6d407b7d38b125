//! # Bus configuration.
//!
//! Provides [`BusConfig`], the settings a root bus is created with, and
//! [`FaultPolicy`], which decides what a handler panic does to the dispatch loop.
//!
//! ## Example
//! ```rust
//! use priobus::{BusConfig, FaultPolicy};
//!
//! let cfg = BusConfig::default()
//!     .with_name("ui")
//!     .with_fault_policy(FaultPolicy::Halt);
//! assert_eq!(cfg.name, "ui");
//! assert!(cfg.fault_policy.halts());
//! ```

/// What the dispatch loop does when a handler panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaultPolicy {
    /// Log the panic, keep the handler, continue with the next handler.
    #[default]
    Isolate,
    /// Log the panic and stop the loop; every later operation fails with
    /// [`BusError::Halted`](crate::BusError::Halted).
    Halt,
}

impl FaultPolicy {
    #[inline]
    pub fn halts(self) -> bool {
        matches!(self, FaultPolicy::Halt)
    }
}

/// Configuration of a root bus.
///
/// ## Field semantics
/// - `name`: label carried by the loop's tracing span
/// - `fault_policy`: reaction to handler panics (default: isolate)
#[derive(Clone, Debug)]
pub struct BusConfig {
    /// Label used in logs.
    pub name: &'static str,

    /// Reaction to handler panics.
    pub fault_policy: FaultPolicy,
}

impl BusConfig {
    #[must_use]
    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    #[must_use]
    pub fn with_fault_policy(mut self, policy: FaultPolicy) -> Self {
        self.fault_policy = policy;
        self
    }
}

impl Default for BusConfig {
    /// Default configuration:
    ///
    /// - `name = "bus"`
    /// - `fault_policy = FaultPolicy::Isolate`
    fn default() -> Self {
        Self {
            name: "bus",
            fault_policy: FaultPolicy::default(),
        }
    }
}
