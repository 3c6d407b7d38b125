//! # Broadcastable values and their type hierarchy.
//!
//! Every value published on a [`Bus`](crate::Bus) implements [`Event`]. The trait has
//! no required methods; the provided ones describe how the value relates to other
//! event types and whether it can be intercepted.
//!
//! ## Type hierarchy
//! Rust has no subtyping, so "a handler bound to `Base` also sees `Derived`" is
//! expressed by composition: `Derived` embeds a `Base` and exposes it through
//! [`Event::upcast`]. The root of every hierarchy is `dyn Event` itself.
//!
//! ```text
//!          dyn Event            (register_any: sees everything)
//!              │
//!            Base               (register::<Base>: sees Base, Derived, Leaf)
//!              │ upcast
//!           Derived             (register::<Derived>: sees Derived, Leaf)
//!              │ upcast
//!            Leaf
//! ```
//!
//! ## Example
//! ```rust
//! use std::any::{Any, TypeId};
//! use priobus::{Event, TypeTag};
//!
//! struct Base { id: u32 }
//! impl Event for Base {}
//!
//! struct Derived { base: Base, label: &'static str }
//! impl Event for Derived {
//!     fn upcast(&self, target: TypeId) -> Option<&dyn Any> {
//!         (target == TypeId::of::<Base>()).then_some(&self.base as &dyn Any)
//!     }
//! }
//!
//! let ev = Derived { base: Base { id: 7 }, label: "x" };
//! assert!(TypeTag::of::<Base>().matches(&ev));
//! assert!(TypeTag::of::<Derived>().matches(&ev));
//! assert!(!TypeTag::of::<Derived>().matches(&Base { id: 1 }));
//! assert!(TypeTag::any().matches(&ev));
//! ```

use std::any::{Any, TypeId};
use std::fmt;

use super::intercept::{InterceptStatus, Interception};

/// Object-safe access to [`Any`] for every sized `'static` type.
///
/// Supertrait of [`Event`]; lets the dispatch loop downcast a `&dyn Event`.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    #[inline]
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A value that can be broadcast on a bus.
///
/// ### Implementation notes
/// - `upcast` must return a value whose concrete type is exactly `target`.
///   Multi-level hierarchies forward to the embedded ancestor's own `upcast`.
/// - An event embedding an interceptable ancestor should return the ancestor's
///   [`Interception`] from [`Event::interception`], so both views share one flag.
pub trait Event: AsAny + Send + Sync + 'static {
    /// Views this event as one of its declared ancestor types.
    fn upcast(&self, target: TypeId) -> Option<&dyn Any> {
        let _ = target;
        None
    }

    /// Interception cell, if this event type supports interception.
    fn interception(&self) -> Option<&Interception> {
        None
    }

    /// Name used in logs.
    fn event_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Intercepts the event for the rest of the current dispatch pass.
    ///
    /// Returns `true` only for the call that flipped the flag. Always `false`
    /// for events that do not support interception.
    fn intercept(&self) -> bool {
        self.interception().is_some_and(Interception::intercept)
    }

    /// Current interception status, or `None` if the event is not interceptable.
    fn intercept_status(&self) -> Option<InterceptStatus> {
        self.interception().map(Interception::status)
    }
}

/// Runtime type descriptor stored on every handler.
///
/// `id = None` stands for the hierarchy root (`dyn Event`).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeTag {
    id: Option<TypeId>,
    name: &'static str,
}

impl TypeTag {
    /// Descriptor of a concrete event type.
    #[must_use]
    pub fn of<E: Event>() -> Self {
        Self {
            id: Some(TypeId::of::<E>()),
            name: std::any::type_name::<E>(),
        }
    }

    /// Descriptor of the hierarchy root: matches every event.
    #[must_use]
    pub const fn any() -> Self {
        Self {
            id: None,
            name: "dyn Event",
        }
    }

    /// Type name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Is-instance-or-subtype test.
    #[must_use]
    pub fn matches(&self, event: &dyn Event) -> bool {
        match self.id {
            None => true,
            Some(id) => event.as_any().type_id() == id || event.upcast(id).is_some(),
        }
    }
}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Views `event` as `E`, either directly or through its declared ancestors.
pub(crate) fn view<E: Event>(event: &dyn Event) -> Option<&E> {
    if let Some(ev) = event.as_any().downcast_ref::<E>() {
        return Some(ev);
    }
    event
        .upcast(TypeId::of::<E>())
        .and_then(|any| any.downcast_ref::<E>())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Base {
        id: u32,
    }
    impl Event for Base {}

    struct Derived {
        base: Base,
    }
    impl Event for Derived {
        fn upcast(&self, target: TypeId) -> Option<&dyn Any> {
            (target == TypeId::of::<Base>()).then_some(&self.base as &dyn Any)
        }
    }

    struct Leaf {
        derived: Derived,
    }
    impl Event for Leaf {
        fn upcast(&self, target: TypeId) -> Option<&dyn Any> {
            if target == TypeId::of::<Derived>() {
                return Some(&self.derived as &dyn Any);
            }
            self.derived.upcast(target)
        }
    }

    struct Unrelated;
    impl Event for Unrelated {}

    #[test]
    fn tag_matches_exact_type() {
        let ev = Base { id: 1 };
        assert!(TypeTag::of::<Base>().matches(&ev));
        assert!(!TypeTag::of::<Unrelated>().matches(&ev));
    }

    #[test]
    fn tag_matches_through_multi_level_upcast() {
        let ev = Leaf {
            derived: Derived {
                base: Base { id: 42 },
            },
        };
        assert!(TypeTag::of::<Leaf>().matches(&ev));
        assert!(TypeTag::of::<Derived>().matches(&ev));
        assert!(TypeTag::of::<Base>().matches(&ev));
        assert!(!TypeTag::of::<Unrelated>().matches(&ev));
    }

    #[test]
    fn root_tag_matches_everything() {
        assert!(TypeTag::any().matches(&Unrelated));
        assert!(TypeTag::any().matches(&Base { id: 0 }));
    }

    #[test]
    fn view_returns_embedded_ancestor() {
        let ev = Leaf {
            derived: Derived {
                base: Base { id: 42 },
            },
        };
        let dyn_ev: &dyn Event = &ev;
        assert_eq!(view::<Base>(dyn_ev).map(|b| b.id), Some(42));
        assert!(view::<Unrelated>(dyn_ev).is_none());
    }

    #[test]
    fn plain_events_are_not_interceptable() {
        let ev = Unrelated;
        assert!(!ev.intercept());
        assert_eq!(ev.intercept_status(), None);
    }

    #[test]
    fn event_name_defaults_to_type_name() {
        let dyn_ev: &dyn Event = &Unrelated;
        assert!(dyn_ev.event_name().ends_with("Unrelated"));
    }
}
