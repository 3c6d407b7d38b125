//! # Example: Priority Scenario
//!
//! Walks through the core behaviors of the bus:
//! - a run-once `Secondary` handler firing before a `Normal` one;
//! - a root-level handler that sees unrelated event types;
//! - interception skipping the lower buckets while `LastOne` still runs;
//! - a filtered view.
//!
//! Run with: `cargo run --example scenario` (add `--features logging` to attach
//! the built-in `LogWriter`).

use priobus::{Broadcast, Bus, BusConfig, Decision, Event, Interception, Priority};

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

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let bus = Bus::new(BusConfig::default().with_name("scenario"));

    #[cfg(feature = "logging")]
    bus.subscribe_any(Priority::AllowNotRun, std::sync::Arc::new(priobus::LogWriter))
        .await?;

    // 1. Run-once at Secondary, then the Normal handler for every Msg.
    bus.register(Priority::Normal, |m: &Msg| {
        println!("[normal] {}", m.text);
        Decision::Continue
    })
    .await?;
    bus.register_only_run_once(Priority::Secondary, |m: &Msg| {
        println!("[secondary, once] index={}", m.index);
    })
    .await?;

    Msg { text: "hello", index: 1 }.broadcast_to(&bus).await?;
    Msg { text: "world", index: 2 }.broadcast_to(&bus).await?;

    // 2. The hierarchy root sees everything, including unrelated types.
    let audit = bus
        .register_any(Priority::LastOne, |ev: &dyn Event| {
            println!("[last-one] {}", ev.event_name());
            Decision::Continue
        })
        .await?;
    IntEvent(42).broadcast_to(&bus).await?;

    // 3. Interception: Unimportant never sees codes >= 100, LastOne always does.
    bus.register(Priority::First, |k: &Key| {
        if k.code >= 100 && k.intercept() {
            println!("[first] intercepted key {}", k.code);
        }
        Decision::Continue
    })
    .await?;
    bus.register_auto_continue(Priority::Unimportant, |k: &Key| {
        println!("[unimportant] key {}", k.code);
    })
    .await?;

    bus.broadcast(Key { code: 7, ..Key::default() }).await?;
    bus.broadcast(Key { code: 120, ..Key::default() }).await?;

    // 4. Filtered view: only even IntEvents.
    let even = bus.filter_on(|ev: &IntEvent| ev.0 % 2 == 0);
    even.register_auto_continue(Priority::Normal, |ev: &IntEvent| {
        println!("[even] {}", ev.0);
    })
    .await?;
    for n in 1..=4 {
        IntEvent(n).broadcast_to(&bus).await?;
    }

    bus.flush().await?;
    let snapshot = bus.snapshot().await?;
    println!(
        "registered: {} (last-one = {:?})",
        snapshot.len(),
        snapshot.last_one
    );

    audit.unregister();
    bus.shutdown();
    Ok(())
}
