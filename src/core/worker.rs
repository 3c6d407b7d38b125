//! # The serialized dispatch loop.
//!
//! One [`Worker`] task per root bus drains a single command queue. Events and
//! registry mutations travel through the same queue, so the registry is only
//! ever touched by this task and never while a dispatch pass iterates it.
//!
//! ## Architecture
//! ```text
//! Bus::broadcast ──► Dispatch{event, accepted} ──┐
//! Bus::register  ──► Register{handler, ack}    ──┤
//! Handler::unreg ──► Unregister{id}            ──┼──► [unbounded queue] ──► Worker::run
//! Bus::flush     ──► Flush{done}               ──┤                            │
//! Bus::snapshot  ──► Snapshot{reply}           ──┘                            ▼
//!                                                              Registry (owned, no locks)
//! ```
//!
//! ## Rules
//! - Commands run strictly in receipt order, one at a time.
//! - `Dispatch` acknowledges `accepted` when the loop takes the event off the
//!   queue, which is what releases the broadcaster (rendezvous).
//! - At most one event waits in the queue: a broadcaster needs the single
//!   admission permit before it may enqueue, and the event carries that permit
//!   until the loop dequeues it. An abandoned broadcast cannot stack events.
//! - `Idle` → `Dispatching` → `Idle`; the loop only ends on shutdown, when every
//!   sender is gone, or on a handler fault under `FaultPolicy::Halt`.
//! - On exit the runtime token is cancelled and queued commands are dropped; their
//!   waiters observe `Closed` (or `Halted`).

use std::sync::{Arc, OnceLock};

use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::core::config::BusConfig;
use crate::core::registry::{Registry, Snapshot};
use crate::error::BusError;
use crate::events::Event;
use crate::handlers::{HandlerCore, HandlerId};

/// Requests processed by the dispatch loop.
pub(crate) enum Command {
    Dispatch {
        event: Box<dyn Event>,
        accepted: oneshot::Sender<()>,
        permit: OwnedSemaphorePermit,
    },
    Register {
        handler: Arc<HandlerCore>,
        ack: oneshot::Sender<Result<(), BusError>>,
    },
    Unregister {
        id: HandlerId,
    },
    Flush {
        done: oneshot::Sender<()>,
    },
    Snapshot {
        reply: oneshot::Sender<Snapshot>,
    },
}

/// Liveness of a dispatch loop, shared with every handle that talks to it.
pub(crate) struct LoopState {
    token: CancellationToken,
    fault: OnceLock<BusError>,
    admission: Arc<Semaphore>,
}

impl LoopState {
    pub(crate) fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            fault: OnceLock::new(),
            admission: Arc::new(Semaphore::new(1)),
        }
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Waits for the right to enqueue one event.
    ///
    /// Cancel-safe: dropping the future before it resolves enqueues nothing.
    pub(crate) async fn admit(&self) -> Result<OwnedSemaphorePermit, BusError> {
        Arc::clone(&self.admission)
            .acquire_owned()
            .await
            .map_err(|_| self.closed_error())
    }

    /// The error callers see once the loop is unreachable.
    pub(crate) fn closed_error(&self) -> BusError {
        self.fault.get().cloned().unwrap_or(BusError::Closed)
    }
}

/// Owner of the registry and the receiving end of the command queue.
pub(crate) struct Worker {
    registry: Registry,
    rx: mpsc::UnboundedReceiver<Command>,
    state: Arc<LoopState>,
    cfg: BusConfig,
}

impl Worker {
    /// Spawns the loop on the current Tokio runtime.
    pub(crate) fn spawn(
        cfg: BusConfig,
        rx: mpsc::UnboundedReceiver<Command>,
        state: Arc<LoopState>,
    ) -> JoinHandle<()> {
        let span = tracing::debug_span!("bus", name = cfg.name);
        let worker = Self {
            registry: Registry::new(),
            rx,
            state,
            cfg,
        };
        tokio::spawn(worker.run().instrument(span))
    }

    async fn run(mut self) {
        tracing::debug!(fault_policy = ?self.cfg.fault_policy, "dispatch loop started");
        let token = self.state.token().clone();

        loop {
            let cmd = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                cmd = self.rx.recv() => match cmd {
                    Some(cmd) => cmd,
                    None => break,
                },
            };

            if let Err(err) = self.handle(cmd) {
                tracing::error!(error = %err, "dispatch loop halted");
                let _ = self.state.fault.set(err);
                break;
            }
        }

        self.rx.close();
        self.state.admission.close();
        token.cancel();
        tracing::debug!(handlers = self.registry.len(), "dispatch loop stopped");
    }

    /// Applies one command. `Err` stops the loop.
    fn handle(&mut self, cmd: Command) -> Result<(), BusError> {
        match cmd {
            Command::Dispatch {
                event,
                accepted,
                permit,
            } => {
                drop(permit);
                let _ = accepted.send(());
                self.registry.dispatch(event.as_ref(), self.cfg.fault_policy)
            }
            Command::Register { handler, ack } => {
                let (id, name, level) = (handler.id, handler.name, handler.level);
                let res = self.registry.insert(handler);
                match &res {
                    Ok(()) => tracing::debug!(
                        handler = %id,
                        name,
                        level = level.as_label(),
                        "handler registered"
                    ),
                    Err(err) => tracing::warn!(
                        handler = %id,
                        name,
                        error = %err,
                        "handler registration rejected"
                    ),
                }
                let _ = ack.send(res);
                Ok(())
            }
            Command::Unregister { id } => {
                if self.registry.remove(id) {
                    tracing::debug!(handler = %id, "handler unregistered");
                }
                Ok(())
            }
            Command::Flush { done } => {
                let _ = done.send(());
                Ok(())
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.registry.snapshot());
                Ok(())
            }
        }
    }
}
