//! # Priority registry and the per-event dispatch pass.
//!
//! The registry is owned by the dispatch loop and is never shared: every
//! mutation arrives as a command on the loop's queue, so no lock guards it.
//!
//! ## Layout
//! ```text
//! first_one: Option<handler>              (singleton slot)
//! buckets:   [First]        h1, h4, ...   (insertion order)
//!            [Secondary]    h2
//!            [Normal]       h3, h5
//!            [Unimportant]  -
//!            [AllowNotRun]  -
//! last_one:  Option<handler>              (singleton slot)
//! index:     id → level                   (membership / removal lookup)
//! ```
//!
//! ## Dispatch pass
//! ```text
//! dispatch(event)
//!   ├─► first_one (type match only, no interception check)
//!   ├─► for bucket in First..=AllowNotRun:
//!   │     for handler in bucket (insertion order):
//!   │        ├─ tag mismatch   → skip
//!   │        ├─ intercepted    → abandon walk
//!   │        └─ invoke         → Unregister? remove in place (no skip, no revisit)
//!   └─► last_one (type match only, runs even if intercepted)
//! ```
//!
//! ## Rules
//! - A handler is in at most one bucket or slot.
//! - A second `FirstOne` / `LastOne` registration fails; the incumbent stays.
//! - Inserting a handler that is already present is a no-op.
//! - Removing an absent handler is a no-op.
//! - A panicking handler never leaves the registry half-updated: the pass is
//!   abandoned (`Halt`) or continues with the next handler (`Isolate`).

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::core::config::FaultPolicy;
use crate::error::BusError;
use crate::events::{Event, Interception};
use crate::handlers::{Decision, HandlerCore, HandlerId, Priority};

/// Read-only copy of the registry layout.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Snapshot {
    /// Occupant of the `FirstOne` slot.
    pub first_one: Option<HandlerId>,
    /// Occupant of the `LastOne` slot.
    pub last_one: Option<HandlerId>,
    /// Bucketed levels in walk order, each with its handlers in insertion order.
    pub buckets: Vec<(Priority, Vec<HandlerId>)>,
}

impl Snapshot {
    /// Handlers registered at `level`, in firing order.
    pub fn at(&self, level: Priority) -> &[HandlerId] {
        match level {
            Priority::FirstOne => self.first_one.as_slice(),
            Priority::LastOne => self.last_one.as_slice(),
            _ => self
                .buckets
                .iter()
                .find(|(l, _)| *l == level)
                .map(|(_, ids)| ids.as_slice())
                .unwrap_or_default(),
        }
    }

    /// True if the handler is registered anywhere.
    pub fn contains(&self, id: HandlerId) -> bool {
        self.first_one == Some(id)
            || self.last_one == Some(id)
            || self.buckets.iter().any(|(_, ids)| ids.contains(&id))
    }

    /// Total number of registered handlers.
    pub fn len(&self) -> usize {
        usize::from(self.first_one.is_some())
            + usize::from(self.last_one.is_some())
            + self.buckets.iter().map(|(_, ids)| ids.len()).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handlers bucketed by priority.
#[derive(Default)]
pub(crate) struct Registry {
    first_one: Option<Arc<HandlerCore>>,
    last_one: Option<Arc<HandlerCore>>,
    buckets: [Vec<Arc<HandlerCore>>; 5],
    index: HashMap<HandlerId, Priority>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Number of registered handlers.
    pub(crate) fn len(&self) -> usize {
        self.index.len()
    }

    /// Inserts a handler at its level.
    pub(crate) fn insert(&mut self, handler: Arc<HandlerCore>) -> Result<(), BusError> {
        if self.index.contains_key(&handler.id) {
            return Ok(());
        }
        let level = handler.level;
        let id = handler.id;

        match level.bucket_index() {
            Some(i) => {
                if let Some(bucket) = self.buckets.get_mut(i) {
                    bucket.push(handler);
                }
            }
            None => {
                let slot = self.slot_mut(level);
                if let Some(incumbent) = slot.as_ref() {
                    return Err(BusError::LevelConflict {
                        level,
                        incumbent: incumbent.id,
                    });
                }
                *slot = Some(handler);
            }
        }
        self.index.insert(id, level);
        Ok(())
    }

    /// Removes a handler. Returns `false` if it was not registered.
    pub(crate) fn remove(&mut self, id: HandlerId) -> bool {
        let Some(level) = self.index.remove(&id) else {
            return false;
        };
        match level.bucket_index() {
            Some(i) => {
                if let Some(bucket) = self.buckets.get_mut(i) {
                    bucket.retain(|h| h.id != id);
                }
            }
            None => {
                let slot = self.slot_mut(level);
                if slot.as_ref().is_some_and(|h| h.id == id) {
                    *slot = None;
                }
            }
        }
        true
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        Snapshot {
            first_one: self.first_one.as_ref().map(|h| h.id),
            last_one: self.last_one.as_ref().map(|h| h.id),
            buckets: Priority::BUCKETED
                .iter()
                .zip(self.buckets.iter())
                .map(|(level, bucket)| (*level, bucket.iter().map(|h| h.id).collect()))
                .collect(),
        }
    }

    /// Runs one dispatch pass for `event`.
    ///
    /// Returns `Err(BusError::Halted)` only under [`FaultPolicy::Halt`].
    pub(crate) fn dispatch(
        &mut self,
        event: &dyn Event,
        policy: FaultPolicy,
    ) -> Result<(), BusError> {
        self.run_slot(Priority::FirstOne, event, policy)?;

        let interception = event.interception();
        'walk: for bucket in &mut self.buckets {
            let mut i = 0;
            while let Some(handler) = bucket.get(i).map(Arc::clone) {
                if !handler.tag.matches(event) {
                    i += 1;
                    continue;
                }
                if interception.is_some_and(Interception::is_intercepted) {
                    tracing::trace!(event = event.event_name(), "intercepted; walk abandoned");
                    break 'walk;
                }
                match invoke(&handler, event, policy)? {
                    Decision::Continue => i += 1,
                    Decision::Unregister => {
                        bucket.remove(i);
                        self.index.remove(&handler.id);
                        tracing::debug!(
                            handler = %handler.id,
                            name = handler.name,
                            "handler unregistered itself"
                        );
                    }
                }
            }
        }

        self.run_slot(Priority::LastOne, event, policy)
    }

    fn run_slot(
        &mut self,
        level: Priority,
        event: &dyn Event,
        policy: FaultPolicy,
    ) -> Result<(), BusError> {
        let Some(handler) = self.slot_mut(level).as_ref().map(Arc::clone) else {
            return Ok(());
        };
        if !handler.tag.matches(event) {
            return Ok(());
        }
        if invoke(&handler, event, policy)? == Decision::Unregister {
            *self.slot_mut(level) = None;
            self.index.remove(&handler.id);
            tracing::debug!(handler = %handler.id, name = handler.name, "handler unregistered itself");
        }
        Ok(())
    }

    /// Singleton slot for `FirstOne`; `LastOne` otherwise.
    fn slot_mut(&mut self, level: Priority) -> &mut Option<Arc<HandlerCore>> {
        if level == Priority::FirstOne {
            &mut self.first_one
        } else {
            &mut self.last_one
        }
    }
}

/// Invokes one handler, turning a panic into the policy's outcome.
fn invoke(
    handler: &HandlerCore,
    event: &dyn Event,
    policy: FaultPolicy,
) -> Result<Decision, BusError> {
    match panic::catch_unwind(AssertUnwindSafe(|| handler.invoke(event))) {
        Ok(decision) => Ok(decision),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(
                handler = %handler.id,
                name = handler.name,
                level = handler.level.as_label(),
                event = event.event_name(),
                %message,
                "handler panicked"
            );
            if policy.halts() {
                Err(BusError::Halted {
                    handler: handler.id,
                    name: handler.name,
                    message,
                })
            } else {
                Ok(Decision::Continue)
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
