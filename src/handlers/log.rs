//! # LogWriter: simple event logger
//!
//! A minimal subscriber that logs every event it sees through `tracing`.
//! Use it for tests or demos; register it at [`Priority::LastOne`](crate::Priority::LastOne)
//! to also see intercepted events.
//!
//! ## Example output
//! ```text
//! INFO bus{name="bus"}: priobus::handlers::log: event event="app::Msg" intercepted=None
//! INFO bus{name="bus"}: priobus::handlers::log: event event="app::Key" intercepted=Some(Intercepted)
//! ```

use crate::events::Event;
use crate::handlers::{Decision, Subscribe};

/// Event logging subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Subscribe<dyn Event> for LogWriter {
    fn on_event(&self, e: &dyn Event) -> Decision {
        tracing::info!(
            event = e.event_name(),
            intercepted = ?e.intercept_status(),
            "event"
        );
        Decision::Continue
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
