//! # Interception protocol.
//!
//! An interceptable event carries an [`Interception`] cell. A handler calls
//! [`Event::intercept`](crate::Event::intercept) to hide the event from every
//! handler the current dispatch pass has not visited yet. The `LastOne` slot still
//! runs.
//!
//! ## Rules
//! - The status is monotonic: `NotIntercepted` → `Intercepted`, never back.
//! - Only the first `intercept()` call returns `true`.
//!
//! ## Example
//! ```rust
//! use priobus::{Event, InterceptStatus, Interception};
//!
//! #[derive(Default)]
//! struct Keypress { interception: Interception }
//!
//! impl Event for Keypress {
//!     fn interception(&self) -> Option<&Interception> {
//!         Some(&self.interception)
//!     }
//! }
//!
//! let ev = Keypress::default();
//! assert_eq!(ev.intercept_status(), Some(InterceptStatus::NotIntercepted));
//! assert!(ev.intercept());
//! assert!(!ev.intercept());
//! assert_eq!(ev.intercept_status(), Some(InterceptStatus::Intercepted));
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Interception state of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterceptStatus {
    NotIntercepted,
    Intercepted,
}

/// One-way interception flag embedded in interceptable events.
#[derive(Default)]
pub struct Interception {
    flag: AtomicBool,
}

impl Interception {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            flag: AtomicBool::new(false),
        }
    }

    /// Flips the flag. Returns `true` only for the call that flipped it.
    #[inline]
    pub fn intercept(&self) -> bool {
        !self.flag.swap(true, Ordering::AcqRel)
    }

    #[inline]
    pub fn status(&self) -> InterceptStatus {
        if self.is_intercepted() {
            InterceptStatus::Intercepted
        } else {
            InterceptStatus::NotIntercepted
        }
    }

    #[inline]
    pub fn is_intercepted(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Interception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Interception").field(&self.status()).finish()
    }
}
