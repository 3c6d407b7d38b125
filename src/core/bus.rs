//! # Bus facade and filtered views.
//!
//! A [`Bus`] is either the **root** (fresh from [`Bus::new`]) or a **filtered
//! view** produced by [`Bus::filter`] and friends. Both are the same type: a view
//! is a root handle plus a predicate chain. Views hold no handlers; every
//! registration lands in the root's registry with its callback wrapped to test the
//! predicate first.
//!
//! ## Architecture
//! ```text
//! bus.filter(p).filter_type::<Key>()          (view: p(ev) && ev is Key)
//!        │ register(level, cb)
//!        ▼
//! wrapped = |ev| if p(ev) && is::<Key>(ev) { cb(ev) } else { Continue }
//!        │
//!        ▼
//! root command queue ──► dispatch loop ──► Registry
//! ```
//!
//! ## Rules
//! - Filters compose by logical AND.
//! - A failed predicate yields `Continue`: it never unregisters the handler.
//! - Broadcasting through a view delivers through the root; views only narrow
//!   handlers.
//! - Registrations and broadcasts are applied in submission order, but a
//!   registration is not visible to events queued before it.
//!
//! ## Example
//! ```rust
//! use priobus::{Bus, BusConfig, Decision, Event, Priority};
//!
//! struct Msg { text: &'static str, index: u32 }
//! impl Event for Msg {}
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), priobus::BusError> {
//! let bus = Bus::new(BusConfig::default());
//!
//! bus.register(Priority::Normal, |m: &Msg| {
//!     println!("{}", m.text);
//!     Decision::Continue
//! })
//! .await?;
//!
//! // Only even indexes reach this one.
//! bus.filter_on(|m: &Msg| m.index % 2 == 0)
//!     .register_auto_continue(Priority::Secondary, |m: &Msg| println!("even {}", m.index))
//!     .await?;
//!
//! bus.broadcast(Msg { text: "hello", index: 2 }).await?;
//! bus.flush().await?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::core::config::BusConfig;
use crate::core::registry::Snapshot;
use crate::core::worker::{Command, LoopState, Worker};
use crate::error::BusError;
use crate::events::{Event, TypeTag, view};
use crate::handlers::{Callback, Decision, Handler, Link, Pending, Priority, Subscribe};

/// Predicate chain of a filtered view.
type Predicate = Arc<dyn Fn(&dyn Event) -> bool + Send + Sync>;

/// State shared by a root bus and all of its views.
struct Root {
    tx: mpsc::UnboundedSender<Command>,
    state: Arc<LoopState>,
    cfg: BusConfig,
}

/// Handle to an event bus (root or filtered view).
///
/// Cheap to clone. The dispatch loop stops when [`Bus::shutdown`] is called or
/// every `Bus` handle of the root is dropped. A callback that captures a `Bus`
/// clone lives in the registry and keeps the loop alive; such buses must be
/// stopped with [`Bus::shutdown`].
#[derive(Clone)]
pub struct Bus {
    root: Arc<Root>,
    predicate: Option<Predicate>,
}

impl Bus {
    /// Creates a root bus and spawns its dispatch loop.
    ///
    /// # Panics
    /// Must be called from within a Tokio runtime (the loop is a spawned task).
    #[must_use]
    pub fn new(cfg: BusConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(LoopState::new());
        Worker::spawn(cfg.clone(), rx, Arc::clone(&state));

        Self {
            root: Arc::new(Root { tx, state, cfg }),
            predicate: None,
        }
    }

    /// Configuration of the root bus.
    pub fn config(&self) -> &BusConfig {
        &self.root.cfg
    }

    /// True for views created by the `filter*` family.
    pub fn is_filtered(&self) -> bool {
        self.predicate.is_some()
    }

    /// True once the dispatch loop has stopped (or is stopping).
    pub fn is_closed(&self) -> bool {
        self.root.state.token().is_cancelled()
    }

    /// Stops the dispatch loop. Queued commands are dropped; every later
    /// operation fails with [`BusError::Closed`].
    pub fn shutdown(&self) {
        self.root.state.token().cancel();
    }

    // ---- Registration ----

    /// Registers `callback` for events of type `E` (and its subtypes) at `level`.
    pub fn register<E, F>(&self, level: Priority, callback: F) -> Pending
    where
        E: Event,
        F: Fn(&E) -> Decision + Send + Sync + 'static,
    {
        self.register_typed(std::any::type_name::<F>(), level, callback)
    }

    /// Like [`register`](Self::register), with the decision fixed to `Continue`.
    pub fn register_auto_continue<E, F>(&self, level: Priority, callback: F) -> Pending
    where
        E: Event,
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.register_typed(std::any::type_name::<F>(), level, move |ev: &E| {
            callback(ev);
            Decision::Continue
        })
    }

    /// Like [`register`](Self::register), with the decision fixed to `Unregister`:
    /// the callback runs for at most one event.
    pub fn register_only_run_once<E, F>(&self, level: Priority, callback: F) -> Pending
    where
        E: Event,
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.register_typed(std::any::type_name::<F>(), level, move |ev: &E| {
            callback(ev);
            Decision::Unregister
        })
    }

    /// Registers `callback` at the hierarchy root: it sees every event.
    pub fn register_any<F>(&self, level: Priority, callback: F) -> Pending
    where
        F: Fn(&dyn Event) -> Decision + Send + Sync + 'static,
    {
        self.register_erased(
            std::any::type_name::<F>(),
            level,
            TypeTag::any(),
            Box::new(callback),
        )
    }

    /// Registers a struct-based handler for events of type `E`.
    pub fn subscribe<E, S>(&self, level: Priority, subscriber: Arc<S>) -> Pending
    where
        E: Event,
        S: Subscribe<E>,
    {
        let name = subscriber.name();
        self.register_typed(name, level, move |ev: &E| subscriber.on_event(ev))
    }

    /// Registers a struct-based handler that sees every event.
    pub fn subscribe_any<S>(&self, level: Priority, subscriber: Arc<S>) -> Pending
    where
        S: Subscribe<dyn Event>,
    {
        let name = subscriber.name();
        self.register_erased(
            name,
            level,
            TypeTag::any(),
            Box::new(move |ev: &dyn Event| subscriber.on_event(ev)),
        )
    }

    fn register_typed<E, F>(&self, name: &'static str, level: Priority, callback: F) -> Pending
    where
        E: Event,
        F: Fn(&E) -> Decision + Send + Sync + 'static,
    {
        self.register_erased(
            name,
            level,
            TypeTag::of::<E>(),
            Box::new(move |ev: &dyn Event| match view::<E>(ev) {
                Some(ev) => callback(ev),
                None => Decision::Continue,
            }),
        )
    }

    fn register_erased(
        &self,
        name: &'static str,
        level: Priority,
        tag: TypeTag,
        callback: Callback,
    ) -> Pending {
        let callback: Callback = match &self.predicate {
            Some(predicate) => {
                let predicate = Arc::clone(predicate);
                Box::new(move |ev: &dyn Event| {
                    if predicate(ev) {
                        callback(ev)
                    } else {
                        Decision::Continue
                    }
                })
            }
            None => callback,
        };
        Handler::new(name, level, tag, callback, self.link()).register()
    }

    fn link(&self) -> Link {
        Link {
            tx: self.root.tx.downgrade(),
            state: Arc::clone(&self.root.state),
        }
    }

    // ---- Filtered views ----

    /// View whose handlers only run when `predicate` holds (AND'ed with the
    /// predicates of this view).
    #[must_use]
    pub fn filter<P>(&self, predicate: P) -> Bus
    where
        P: Fn(&dyn Event) -> bool + Send + Sync + 'static,
    {
        let chained: Predicate = match &self.predicate {
            Some(outer) => {
                let outer = Arc::clone(outer);
                Arc::new(move |ev: &dyn Event| outer(ev) && predicate(ev))
            }
            None => Arc::new(predicate),
        };
        Bus {
            root: Arc::clone(&self.root),
            predicate: Some(chained),
        }
    }

    /// Narrowing view: handlers only run for events that are `S` or a subtype of `S`.
    #[must_use]
    pub fn filter_type<S: Event>(&self) -> Bus {
        let tag = TypeTag::of::<S>();
        self.filter(move |ev: &dyn Event| tag.matches(ev))
    }

    /// Typed predicate view: events that are not `S` fail the predicate.
    #[must_use]
    pub fn filter_on<S, P>(&self, predicate: P) -> Bus
    where
        S: Event,
        P: Fn(&S) -> bool + Send + Sync + 'static,
    {
        self.filter(move |ev: &dyn Event| view::<S>(ev).is_some_and(|s| predicate(s)))
    }

    // ---- Delivery ----

    /// Publishes `event`.
    ///
    /// Suspends until the dispatch loop has taken the event off its queue
    /// (rendezvous); handlers run after this returns. At most one event waits in
    /// the queue at a time, even when callers abandon this future early.
    pub async fn broadcast<E: Event>(&self, event: E) -> Result<(), BusError> {
        if self.is_closed() {
            return Err(self.root.state.closed_error());
        }
        let permit = self.root.state.admit().await?;
        let (accepted, rx) = oneshot::channel();
        self.submit(Command::Dispatch {
            event: Box::new(event),
            accepted,
            permit,
        })?;
        rx.await.map_err(|_| self.root.state.closed_error())
    }

    /// Waits until every command submitted before this call has been applied.
    pub async fn flush(&self) -> Result<(), BusError> {
        let (done, rx) = oneshot::channel();
        self.submit(Command::Flush { done })?;
        rx.await.map_err(|_| self.root.state.closed_error())
    }

    /// Registry layout as of this point in the command queue.
    pub async fn snapshot(&self) -> Result<Snapshot, BusError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Command::Snapshot { reply })?;
        rx.await.map_err(|_| self.root.state.closed_error())
    }

    fn submit(&self, cmd: Command) -> Result<(), BusError> {
        if self.is_closed() {
            return Err(self.root.state.closed_error());
        }
        self.root
            .tx
            .send(cmd)
            .map_err(|_| self.root.state.closed_error())
    }
}

impl fmt::Debug for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bus")
            .field("name", &self.root.cfg.name)
            .field("filtered", &self.is_filtered())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::any::{Any, TypeId};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Mutex, OnceLock};

    use super::*;
    use crate::core::config::FaultPolicy;
    use crate::events::{Broadcast, Interception};

    struct Msg {
        text: &'static str,
        index: u32,
    }
    impl Event for Msg {}

    struct IntEvent(i32);
    impl Event for IntEvent {}

    #[derive(Default)]
    struct Key {
        code: u32,
        interception: Interception,
    }
    impl Event for Key {
        fn interception(&self) -> Option<&Interception> {
            Some(&self.interception)
        }
    }

    struct Shape {
        sides: u32,
    }
    impl Event for Shape {}

    struct Square {
        shape: Shape,
    }
    impl Event for Square {
        fn upcast(&self, target: TypeId) -> Option<&dyn Any> {
            (target == TypeId::of::<Shape>()).then_some(&self.shape as &dyn Any)
        }
    }

    type Log = Arc<Mutex<Vec<String>>>;

    fn bus() -> Bus {
        Bus::new(BusConfig::default().with_name("test"))
    }

    fn take(log: &Log) -> Vec<String> {
        std::mem::take(&mut *log.lock().unwrap())
    }

    #[tokio::test]
    async fn secondary_run_once_fires_before_normal() {
        let bus = bus();
        let log = Log::default();

        let l = Arc::clone(&log);
        bus.register(Priority::Normal, move |m: &Msg| {
            l.lock().unwrap().push(m.text.to_string());
            Decision::Continue
        })
        .await
        .unwrap();
        let l = Arc::clone(&log);
        bus.register_only_run_once(Priority::Secondary, move |m: &Msg| {
            l.lock().unwrap().push(m.index.to_string());
        })
        .await
        .unwrap();

        bus.broadcast(Msg { text: "hello", index: 1 }).await.unwrap();
        bus.broadcast(Msg { text: "world", index: 2 }).await.unwrap();
        bus.flush().await.unwrap();

        assert_eq!(take(&log), ["1", "hello", "world"]);
    }

    #[tokio::test]
    async fn root_handler_sees_unrelated_event_types() {
        let bus = bus();
        let hits = Arc::new(AtomicUsize::new(0));

        let h = Arc::clone(&hits);
        bus.register_any(Priority::Normal, move |ev: &dyn Event| {
            assert!(ev.event_name().ends_with("IntEvent"));
            h.fetch_add(1, Ordering::SeqCst);
            Decision::Continue
        })
        .await
        .unwrap();

        IntEvent(1).broadcast_to(&bus).await.unwrap();
        bus.flush().await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn interception_skips_lower_buckets_but_not_last_one() {
        let bus = bus();
        let log = Log::default();

        bus.register(Priority::Secondary, |k: &Key| {
            assert!(k.intercept());
            assert!(!k.intercept());
            Decision::Continue
        })
        .await
        .unwrap();
        let tail = [
            (Priority::Unimportant, "unimportant"),
            (Priority::LastOne, "last"),
        ];
        for (level, label) in tail {
            let l = Arc::clone(&log);
            bus.register_auto_continue(level, move |k: &Key| {
                l.lock().unwrap().push(format!("{label}:{}", k.code));
            })
            .await
            .unwrap();
        }

        bus.broadcast(Key { code: 7, ..Key::default() }).await.unwrap();
        bus.flush().await.unwrap();
        assert_eq!(take(&log), ["last:7"]);
    }

    #[tokio::test]
    async fn singleton_conflicts_leave_incumbent_in_place() {
        let bus = bus();
        let log = Log::default();

        let l = Arc::clone(&log);
        let first = bus
            .register_auto_continue(Priority::FirstOne, move |_: &Msg| {
                l.lock().unwrap().push("first-one".into());
            })
            .await
            .unwrap();
        let l = Arc::clone(&log);
        bus.register_auto_continue(Priority::Normal, move |_: &Msg| {
            l.lock().unwrap().push("normal".into());
        })
        .await
        .unwrap();

        let err = bus
            .register_auto_continue(Priority::FirstOne, |_: &Msg| {})
            .await
            .unwrap_err();
        assert_eq!(
            err,
            BusError::LevelConflict {
                level: Priority::FirstOne,
                incumbent: first.id(),
            }
        );

        let last = bus
            .register_auto_continue(Priority::LastOne, |_: &Msg| {})
            .await
            .unwrap();
        assert!(matches!(
            bus.register_any(Priority::LastOne, |_: &dyn Event| Decision::Continue).await,
            Err(BusError::LevelConflict { incumbent, .. }) if incumbent == last.id()
        ));

        bus.broadcast(Msg { text: "x", index: 0 }).await.unwrap();
        let snap = bus.snapshot().await.unwrap();
        assert_eq!(take(&log), ["first-one", "normal"]);
        assert_eq!(snap.first_one, Some(first.id()));
        assert_eq!(snap.last_one, Some(last.id()));
        assert_eq!(snap.len(), 3);
    }

    #[tokio::test]
    async fn single_producer_order_is_preserved() {
        let bus = bus();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s = Arc::clone(&seen);
        bus.register_auto_continue(Priority::Normal, move |ev: &IntEvent| {
            s.lock().unwrap().push(ev.0);
        })
        .await
        .unwrap();

        for i in 0..200 {
            bus.broadcast(IntEvent(i)).await.unwrap();
        }
        bus.flush().await.unwrap();
        assert_eq!(*seen.lock().unwrap(), (0..200).collect::<Vec<_>>());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_producers_are_all_delivered_in_per_producer_order() {
        let bus = bus();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s = Arc::clone(&seen);
        bus.register_auto_continue(Priority::Normal, move |ev: &IntEvent| {
            s.lock().unwrap().push(ev.0);
        })
        .await
        .unwrap();

        let producers = (0..4).map(|p| {
            let bus = bus.clone();
            async move {
                for i in 0..50 {
                    bus.broadcast(IntEvent(p * 1000 + i)).await.unwrap();
                }
            }
        });
        futures::future::join_all(producers).await;
        bus.flush().await.unwrap();

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 200);
        for p in 0..4 {
            let mine: Vec<i32> = seen.iter().copied().filter(|v| v / 1000 == p).collect();
            assert_eq!(mine, (0..50).map(|i| p * 1000 + i).collect::<Vec<_>>());
        }
    }

    #[tokio::test]
    async fn base_handlers_fire_for_subtypes_only() {
        let bus = bus();
        let log = Log::default();

        let l = Arc::clone(&log);
        bus.register_auto_continue(Priority::Normal, move |s: &Shape| {
            l.lock().unwrap().push(format!("shape:{}", s.sides));
        })
        .await
        .unwrap();
        let l = Arc::clone(&log);
        bus.register_auto_continue(Priority::Normal, move |s: &Square| {
            l.lock().unwrap().push(format!("square:{}", s.shape.sides));
        })
        .await
        .unwrap();

        bus.broadcast(Square {
            shape: Shape { sides: 4 },
        })
        .await
        .unwrap();
        bus.broadcast(Shape { sides: 3 }).await.unwrap();
        bus.broadcast(IntEvent(0)).await.unwrap();
        bus.flush().await.unwrap();

        assert_eq!(take(&log), ["shape:4", "square:4", "shape:3"]);
    }

    #[tokio::test]
    async fn unregister_decision_stops_future_invocations() {
        let bus = bus();
        let hits = Arc::new(AtomicUsize::new(0));

        let h = Arc::clone(&hits);
        let handler = bus
            .register(Priority::First, move |ev: &IntEvent| {
                h.fetch_add(1, Ordering::SeqCst);
                if ev.0 == 2 {
                    Decision::Unregister
                } else {
                    Decision::Continue
                }
            })
            .await
            .unwrap();

        for i in 0..5 {
            bus.broadcast(IntEvent(i)).await.unwrap();
        }
        let snap = bus.snapshot().await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert!(!snap.contains(handler.id()));
    }

    #[tokio::test]
    async fn failed_predicate_keeps_handler_registered() {
        let bus = bus();
        let log = Log::default();

        let l = Arc::clone(&log);
        let handler = bus
            .filter_on(|m: &Msg| m.index > 10)
            .register_only_run_once(Priority::Normal, move |m: &Msg| {
                l.lock().unwrap().push(m.text.to_string());
            })
            .await
            .unwrap();

        bus.broadcast(Msg { text: "small", index: 1 }).await.unwrap();
        assert!(bus.snapshot().await.unwrap().contains(handler.id()));

        bus.broadcast(Msg { text: "big", index: 11 }).await.unwrap();
        bus.broadcast(Msg { text: "bigger", index: 12 }).await.unwrap();
        assert!(!bus.snapshot().await.unwrap().contains(handler.id()));
        assert_eq!(take(&log), ["big"]);
    }

    #[tokio::test]
    async fn filters_compose_with_and() {
        let bus = bus();
        let log = Log::default();

        let view = bus
            .filter_type::<Msg>()
            .filter_on(|m: &Msg| m.index % 2 == 0)
            .filter(|ev: &dyn Event| !ev.event_name().is_empty());
        assert!(view.is_filtered());
        assert!(!bus.is_filtered());

        let l = Arc::clone(&log);
        view.register_any(Priority::Normal, move |ev: &dyn Event| {
            let short = ev.event_name().rsplit("::").next().unwrap_or_default();
            l.lock().unwrap().push(short.to_string());
            Decision::Continue
        })
        .await
        .unwrap();

        bus.broadcast(IntEvent(2)).await.unwrap();
        bus.broadcast(Msg { text: "odd", index: 3 }).await.unwrap();
        view.broadcast(Msg { text: "even", index: 4 }).await.unwrap();
        bus.flush().await.unwrap();

        assert_eq!(take(&log), ["Msg"]);
    }

    #[tokio::test]
    async fn handle_based_unregister_and_register() {
        let bus = bus();
        let hits = Arc::new(AtomicUsize::new(0));

        let h = Arc::clone(&hits);
        let handler = bus
            .register_auto_continue(Priority::Normal, move |_: &IntEvent| {
                h.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();

        handler.unregister();
        handler.unregister();
        bus.broadcast(IntEvent(0)).await.unwrap();
        bus.flush().await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        let again = handler.register().await.unwrap();
        assert_eq!(again, handler);
        // Already present: no duplicate.
        handler.register().await.unwrap();

        bus.broadcast(IntEvent(1)).await.unwrap();
        let snap = bus.snapshot().await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(snap.at(Priority::Normal), [handler.id()]);
    }

    #[tokio::test]
    async fn registration_is_ordered_before_later_broadcasts() {
        let bus = bus();
        let hits = Arc::new(AtomicUsize::new(0));

        let h = Arc::clone(&hits);
        let pending = bus.register_auto_continue(Priority::Normal, move |_: &IntEvent| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        let id = pending.handler().id();
        drop(pending);

        bus.broadcast(IntEvent(0)).await.unwrap();
        let snap = bus.snapshot().await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(snap.contains(id));
    }

    struct Counter {
        seen: AtomicUsize,
    }

    impl Subscribe<IntEvent> for Counter {
        fn on_event(&self, ev: &IntEvent) -> Decision {
            self.seen.fetch_add(1, Ordering::SeqCst);
            if ev.0 < 0 {
                Decision::Unregister
            } else {
                Decision::Continue
            }
        }

        fn name(&self) -> &'static str {
            "counter"
        }
    }

    #[tokio::test]
    async fn subscribers_are_named_and_counted() {
        let bus = bus();
        let counter = Arc::new(Counter {
            seen: AtomicUsize::new(0),
        });

        let handler = bus
            .subscribe::<IntEvent, _>(Priority::Unimportant, Arc::clone(&counter))
            .await
            .unwrap();
        assert_eq!(handler.name(), "counter");
        assert_eq!(handler.level(), Priority::Unimportant);
        assert_eq!(handler.tag(), TypeTag::of::<IntEvent>());

        bus.broadcast(IntEvent(1)).await.unwrap();
        bus.broadcast(IntEvent(-1)).await.unwrap();
        bus.broadcast(IntEvent(2)).await.unwrap();
        bus.flush().await.unwrap();
        assert_eq!(counter.seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn isolated_faults_do_not_stop_delivery() {
        let bus = bus();
        let hits = Arc::new(AtomicUsize::new(0));

        bus.register(Priority::First, |ev: &IntEvent| -> Decision {
            if ev.0 == 0 {
                panic!("bad handler");
            }
            Decision::Continue
        })
        .await
        .unwrap();
        let h = Arc::clone(&hits);
        bus.register_auto_continue(Priority::Normal, move |_: &IntEvent| {
            h.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap();

        bus.broadcast(IntEvent(0)).await.unwrap();
        bus.broadcast(IntEvent(1)).await.unwrap();
        let snap = bus.snapshot().await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(snap.len(), 2);
        assert!(!bus.is_closed());
    }

    #[tokio::test]
    async fn halt_policy_stops_the_loop() {
        let bus = Bus::new(BusConfig::default().with_fault_policy(FaultPolicy::Halt));

        let bad = bus
            .register(Priority::Normal, |_: &IntEvent| -> Decision { panic!("fatal") })
            .await
            .unwrap();

        bus.broadcast(IntEvent(0)).await.unwrap();
        let err = bus.flush().await.unwrap_err();
        assert_eq!(
            err,
            BusError::Halted {
                handler: bad.id(),
                name: bad.name(),
                message: "fatal".to_string(),
            }
        );
        assert!(bus.is_closed());
        assert_eq!(bus.broadcast(IntEvent(1)).await.unwrap_err(), err);
        assert!(bad.register().await.unwrap_err().is_closed());
    }

    #[tokio::test]
    async fn shutdown_closes_the_bus() {
        let bus = bus();
        bus.flush().await.unwrap();
        bus.shutdown();

        assert!(bus.is_closed());
        assert_eq!(bus.broadcast(IntEvent(0)).await, Err(BusError::Closed));
        assert_eq!(bus.snapshot().await.unwrap_err(), BusError::Closed);
        assert!(matches!(
            bus.register_any(Priority::Normal, |_: &dyn Event| Decision::Continue)
                .await,
            Err(BusError::Closed)
        ));
    }

    #[tokio::test]
    async fn abandoned_broadcasts_do_not_pile_up() {
        use futures::FutureExt;

        let bus = bus();
        let hits = Arc::new(AtomicUsize::new(0));

        let h = Arc::clone(&hits);
        bus.register_auto_continue(Priority::Normal, move |_: &IntEvent| {
            h.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap();

        // The first one gets admitted and stays queued; the rest never get in.
        for i in 0..1_000 {
            assert!(bus.broadcast(IntEvent(i)).now_or_never().is_none());
        }
        bus.flush().await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // The queue drained, so the next producer is admitted again.
        bus.broadcast(IntEvent(0)).await.unwrap();
        bus.flush().await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn self_unregister_takes_effect_after_the_invocation_returns() {
        let bus = bus();
        let log = Log::default();
        let me: Arc<OnceLock<Handler>> = Arc::default();

        let (l, m) = (Arc::clone(&log), Arc::clone(&me));
        let handler = bus
            .register(Priority::Normal, move |ev: &IntEvent| {
                if let Some(me) = m.get() {
                    me.unregister();
                }
                l.lock().unwrap().push(format!("after-unregister:{}", ev.0));
                Decision::Continue
            })
            .await
            .unwrap();
        me.set(handler.clone()).unwrap();

        bus.broadcast(IntEvent(1)).await.unwrap();
        bus.broadcast(IntEvent(2)).await.unwrap();
        let snap = bus.snapshot().await.unwrap();

        assert_eq!(take(&log), ["after-unregister:1"]);
        assert!(!snap.contains(handler.id()));
    }

    #[tokio::test]
    async fn unregistering_a_later_handler_is_queued_behind_the_current_pass() {
        let bus = bus();
        let log = Log::default();
        let target: Arc<OnceLock<Handler>> = Arc::default();

        let (l, t) = (Arc::clone(&log), Arc::clone(&target));
        bus.register_auto_continue(Priority::Normal, move |_: &IntEvent| {
            if let Some(later) = t.get() {
                later.unregister();
            }
            l.lock().unwrap().push("a".to_string());
        })
        .await
        .unwrap();
        let l = Arc::clone(&log);
        let later = bus
            .register_auto_continue(Priority::Normal, move |_: &IntEvent| {
                l.lock().unwrap().push("b".to_string());
            })
            .await
            .unwrap();
        target.set(later.clone()).unwrap();

        bus.broadcast(IntEvent(1)).await.unwrap();
        bus.flush().await.unwrap();
        assert_eq!(take(&log), ["a", "b"]);

        bus.broadcast(IntEvent(2)).await.unwrap();
        let snap = bus.snapshot().await.unwrap();
        assert_eq!(take(&log), ["a"]);
        assert!(!snap.contains(later.id()));
    }

    #[tokio::test]
    async fn a_bus_captured_by_a_callback_keeps_the_loop_alive() {
        let bus = bus();
        let held = bus.clone();
        let keeper = bus
            .register_any(Priority::Normal, move |_: &dyn Event| {
                let _ = held.is_closed();
                Decision::Continue
            })
            .await
            .unwrap();
        let watcher = bus
            .register_any(Priority::Unimportant, |_: &dyn Event| Decision::Continue)
            .await
            .unwrap();
        drop(bus);

        // Only the registry holds a `Bus` now, and that is enough.
        watcher.register().await.unwrap();

        // Releasing the capturing callback releases the loop.
        keeper.unregister();
        drop(keeper);
        watcher.register().await.unwrap();
        assert_eq!(watcher.register().await.unwrap_err(), BusError::Closed);
    }

    #[tokio::test]
    async fn handlers_do_not_keep_a_dropped_bus_alive() {
        let bus = bus();
        let handler = bus
            .register_any(Priority::Normal, |_: &dyn Event| Decision::Continue)
            .await
            .unwrap();
        drop(bus);

        handler.unregister();
        assert_eq!(handler.register().await.unwrap_err(), BusError::Closed);
    }
}
