//! # Handler handles and pending registrations.
//!
//! A [`Handler`] is a cheap, cloneable handle to a callback bound to a
//! [`TypeTag`] and a [`Priority`]. The registry inside the dispatch loop holds the
//! same shared core; the handle only talks to the loop through its command queue.
//!
//! ## Rules
//! - Identity is the [`HandlerId`]; two handlers with identical fields are distinct.
//! - `unregister()` and `register()` are requests: they take effect when the loop
//!   reaches them, in submission order.
//! - A handle holds only a weak sender, so it never keeps a dropped bus alive.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::task::{Context, Poll};

use tokio::sync::{mpsc, oneshot};

use crate::core::{Command, LoopState};
use crate::error::BusError;
use crate::events::{Event, TypeTag};

use super::priority::{Decision, Priority};

/// Global sequence counter for handler identities.
static HANDLER_SEQ: AtomicU64 = AtomicU64::new(1);

/// Type-erased handler callback, as stored in the registry.
pub(crate) type Callback = Box<dyn Fn(&dyn Event) -> Decision + Send + Sync>;

/// Unique identity of a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl HandlerId {
    fn next() -> Self {
        Self(HANDLER_SEQ.fetch_add(1, AtomicOrdering::Relaxed))
    }

    /// Raw numeric value.
    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h#{}", self.0)
    }
}

/// Connection from a handler back to the dispatch loop that owns it.
#[derive(Clone)]
pub(crate) struct Link {
    pub(crate) tx: mpsc::WeakUnboundedSender<Command>,
    pub(crate) state: Arc<LoopState>,
}

impl Link {
    /// Sends a command to the loop, or reports why the loop is unreachable.
    pub(crate) fn submit(&self, cmd: Command) -> Result<(), BusError> {
        let Some(tx) = self.tx.upgrade() else {
            return Err(self.state.closed_error());
        };
        tx.send(cmd).map_err(|_| self.state.closed_error())
    }
}

/// Shared state of one handler.
pub(crate) struct HandlerCore {
    pub(crate) id: HandlerId,
    pub(crate) name: &'static str,
    pub(crate) level: Priority,
    pub(crate) tag: TypeTag,
    callback: Callback,
    link: Link,
}

impl HandlerCore {
    /// Runs the callback. Type matching is the caller's job.
    #[inline]
    pub(crate) fn invoke(&self, event: &dyn Event) -> Decision {
        (self.callback)(event)
    }
}

/// Handle to a registered (or once registered) handler.
#[derive(Clone)]
pub struct Handler {
    core: Arc<HandlerCore>,
}

impl Handler {
    pub(crate) fn new(
        name: &'static str,
        level: Priority,
        tag: TypeTag,
        callback: Callback,
        link: Link,
    ) -> Self {
        Self {
            core: Arc::new(HandlerCore {
                id: HandlerId::next(),
                name,
                level,
                tag,
                callback,
                link,
            }),
        }
    }

    pub(crate) fn core(&self) -> &Arc<HandlerCore> {
        &self.core
    }

    #[inline]
    pub fn id(&self) -> HandlerId {
        self.core.id
    }

    #[inline]
    pub fn level(&self) -> Priority {
        self.core.level
    }

    /// Name used in logs (subscriber name, or the callback's type name).
    #[inline]
    pub fn name(&self) -> &'static str {
        self.core.name
    }

    /// Event type this handler is bound to.
    #[inline]
    pub fn tag(&self) -> TypeTag {
        self.core.tag
    }

    /// Requests removal from the registry.
    ///
    /// A no-op if the handler is absent, already removed, or the bus is gone.
    /// A handler that is mid-invocation is removed after it returns.
    pub fn unregister(&self) {
        let _ = self
            .core
            .link
            .submit(Command::Unregister { id: self.core.id });
    }

    /// Requests (re-)insertion into the registry at the handler's level.
    ///
    /// Prefer the `Bus::register*` family; this exists for handlers that were
    /// unregistered and should come back with the same identity.
    pub fn register(&self) -> Pending {
        let (ack, rx) = oneshot::channel();
        let cmd = Command::Register {
            handler: Arc::clone(&self.core),
            ack,
        };
        match self.core.link.submit(cmd) {
            Ok(()) => Pending::waiting(self.clone(), rx, Arc::clone(&self.core.link.state)),
            Err(err) => Pending::failed(self.clone(), err),
        }
    }
}

impl PartialEq for Handler {
    fn eq(&self, other: &Self) -> bool {
        self.core.id == other.core.id
    }
}

impl Eq for Handler {}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("id", &self.core.id)
            .field("name", &self.core.name)
            .field("level", &self.core.level)
            .field("tag", &self.core.tag)
            .finish()
    }
}

enum PendingState {
    Waiting {
        ack: oneshot::Receiver<Result<(), BusError>>,
        state: Arc<LoopState>,
    },
    Failed(Option<BusError>),
}

/// A registration request in flight.
///
/// Resolves to the [`Handler`] once the dispatch loop has inserted it, or to the
/// error that prevented insertion (e.g. [`BusError::LevelConflict`]). The request
/// is already submitted: dropping a `Pending` does not cancel it.
pub struct Pending {
    handler: Handler,
    state: PendingState,
}

impl Pending {
    fn waiting(
        handler: Handler,
        ack: oneshot::Receiver<Result<(), BusError>>,
        state: Arc<LoopState>,
    ) -> Self {
        Self {
            handler,
            state: PendingState::Waiting { ack, state },
        }
    }

    fn failed(handler: Handler, err: BusError) -> Self {
        Self {
            handler,
            state: PendingState::Failed(Some(err)),
        }
    }

    /// The handle, available before the loop has confirmed the registration.
    #[inline]
    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    /// Stops tracking the outcome and returns the handle.
    #[inline]
    pub fn detach(self) -> Handler {
        self.handler
    }
}

impl Future for Pending {
    type Output = Result<Handler, BusError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.state {
            PendingState::Waiting { ack, state } => match Pin::new(ack).poll(cx) {
                Poll::Pending => Poll::Pending,
                Poll::Ready(Ok(Ok(()))) => Poll::Ready(Ok(this.handler.clone())),
                Poll::Ready(Ok(Err(err))) => Poll::Ready(Err(err)),
                Poll::Ready(Err(_)) => Poll::Ready(Err(state.closed_error())),
            },
            PendingState::Failed(err) => {
                Poll::Ready(Err(err.take().unwrap_or(BusError::Closed)))
            }
        }
    }
}

impl fmt::Debug for Pending {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending")
            .field("handler", &self.handler)
            .finish_non_exhaustive()
    }
}
