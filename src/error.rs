//! Error types used by the bus.
//!
//! [`BusError`] covers configuration errors (level conflicts), loop availability
//! (closed or halted loops) and global-bus initialization. It provides helper
//! methods (`as_label`, `as_message`) for logging.

use thiserror::Error;

use crate::handlers::{HandlerId, Priority};

/// # Errors produced by the bus.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// A second handler tried to occupy a singleton slot (`FirstOne` / `LastOne`).
    #[error("priority slot {level:?} already occupied by {incumbent}")]
    LevelConflict {
        /// The contested slot.
        level: Priority,
        /// The handler that keeps the slot.
        incumbent: HandlerId,
    },

    /// The dispatch loop is gone (shutdown, or every bus handle dropped).
    #[error("event bus closed")]
    Closed,

    /// The dispatch loop stopped after a handler panicked under `FaultPolicy::Halt`.
    #[error("event bus halted: handler {handler} ({name}) panicked: {message}")]
    Halted {
        /// The faulty handler.
        handler: HandlerId,
        /// Its name.
        name: &'static str,
        /// Panic message.
        message: String,
    },

    /// `init_global` was called after the global bus already existed.
    #[error("global bus already initialized")]
    AlreadyInitialized,
}

impl BusError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use priobus::BusError;
    ///
    /// assert_eq!(BusError::Closed.as_label(), "bus_closed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            BusError::LevelConflict { .. } => "bus_level_conflict",
            BusError::Closed => "bus_closed",
            BusError::Halted { .. } => "bus_halted",
            BusError::AlreadyInitialized => "bus_already_initialized",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            BusError::LevelConflict { level, incumbent } => {
                format!("slot {} held by {incumbent}", level.as_label())
            }
            BusError::Closed => "dispatch loop closed".to_string(),
            BusError::Halted {
                handler,
                name,
                message,
            } => format!("halted by {handler} ({name}): {message}"),
            BusError::AlreadyInitialized => "global bus already set".to_string(),
        }
    }

    /// True if the loop is unavailable (closed or halted).
    pub fn is_closed(&self) -> bool {
        matches!(self, BusError::Closed | BusError::Halted { .. })
    }
}
