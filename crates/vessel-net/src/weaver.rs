//! Tick Dispatcher: holds the game module's registered processors and, on
//! each tick, runs pending work and broadcasts the resulting tick datagram
//! to every authenticated Session (§4.8).

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use futures::FutureExt;
use tracing::{debug, error, warn};

use crate::game_module::{Batch, FlushPending, HasPending, ProcessBatch, ProcessorEntry};
use crate::tick::{TickDatagram, TickKind};
use crate::watcher::Watcher;

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Holds the tick-kind -> processor mapping registered by the game module
/// and broadcasts a fixed-layout datagram to every eligible Session on
/// each tick.
pub struct Weaver {
    processors: DashMap<TickKind, ProcessorEntry>,
    counters: DashMap<TickKind, AtomicU64>,
    watcher: Arc<Watcher>,
}

impl Weaver {
    pub fn new(watcher: Arc<Watcher>) -> Arc<Self> {
        Arc::new(Self {
            processors: DashMap::new(),
            counters: DashMap::new(),
            watcher,
        })
    }

    /// Registers (or overwrites) the processor for `kind`. Re-registering a
    /// kind replaces the prior entry; it does not create a second loop.
    pub fn register(
        &self,
        kind: TickKind,
        interval_ms: u64,
        has_pending: Option<HasPending>,
        flush_pending: Option<FlushPending>,
        process_batch: Option<ProcessBatch>,
    ) {
        self.processors.insert(
            kind,
            ProcessorEntry::new(interval_ms, has_pending, flush_pending, process_batch),
        );
        self.counters.entry(kind).or_insert_with(|| AtomicU64::new(0));
    }

    pub fn registered_kinds(&self) -> Vec<TickKind> {
        self.processors.iter().map(|entry| *entry.key()).collect()
    }

    pub fn interval_ms(&self, kind: TickKind) -> Option<u64> {
        self.processors.get(&kind).map(|entry| entry.interval_ms)
    }

    pub fn tick_counter(&self, kind: TickKind) -> u64 {
        self.counters
            .get(&kind)
            .map(|counter| counter.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Runs one tick for `kind`: executes pending game work, then
    /// broadcasts the resulting tick datagram. Returns the new counter
    /// value (the first call for a kind returns 1).
    pub async fn process_tick(&self, kind: TickKind) -> u64 {
        let counter = self
            .counters
            .entry(kind)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed)
            + 1;

        self.run_processor(kind).await;
        self.broadcast(kind, counter).await;
        counter
    }

    async fn run_processor(&self, kind: TickKind) {
        let Some(entry) = self.processors.get(&kind) else {
            return;
        };

        let has_pending = std::panic::catch_unwind(AssertUnwindSafe(|| (entry.has_pending)()));
        let has_pending = match has_pending {
            Ok(value) => value,
            Err(_) => {
                error!(kind = kind.name(), "has_pending callback panicked");
                return;
            }
        };

        if !has_pending {
            return;
        }

        let batch_result = std::panic::catch_unwind(AssertUnwindSafe(|| (entry.flush_pending)()));
        let batch: Batch = match batch_result {
            Ok(batch) => batch,
            Err(_) => {
                error!(kind = kind.name(), "flush_pending callback panicked");
                return;
            }
        };

        let future = (entry.process_batch)(batch);
        drop(entry);

        if let Err(panic) = AssertUnwindSafe(future).catch_unwind().await {
            let _ = panic;
            error!(kind = kind.name(), "process_batch callback panicked");
        }
    }

    async fn broadcast(&self, kind: TickKind, counter: u64) {
        let datagram = TickDatagram::new(kind, counter, now_millis());
        let encoded = datagram.encode();

        for session in self.watcher.snapshot_sessions() {
            if !session.is_authenticated() || session.is_disconnecting() {
                continue;
            }

            if let Err(err) = session.datagram().send(&encoded).await {
                warn!(session_id = session.id(), %err, "tick broadcast send failed");
            }
        }

        debug!(kind = kind.name(), counter, "tick broadcast complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[tokio::test]
    async fn first_tick_returns_counter_one_and_runs_pending_work() {
        let watcher = Watcher::new();
        let weaver = Weaver::new(watcher);
        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = Arc::clone(&ran);

        weaver.register(
            TickKind::Movement,
            50,
            None,
            None,
            Some(Box::new(move |_batch| {
                let ran = Arc::clone(&ran_clone);
                Box::pin(async move {
                    ran.store(true, Ordering::Relaxed);
                })
            })),
        );

        let counter = weaver.process_tick(TickKind::Movement).await;
        assert_eq!(counter, 1);
        assert!(ran.load(Ordering::Relaxed));

        let counter = weaver.process_tick(TickKind::Movement).await;
        assert_eq!(counter, 2);
    }

    #[tokio::test]
    async fn unregistered_kind_returns_counter_without_panicking() {
        let watcher = Watcher::new();
        let weaver = Weaver::new(watcher);
        let counter = weaver.process_tick(TickKind::Combat).await;
        assert_eq!(counter, 1);
    }

    #[tokio::test]
    async fn has_pending_false_skips_the_processor() {
        let watcher = Watcher::new();
        let weaver = Weaver::new(watcher);
        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = Arc::clone(&ran);

        weaver.register(
            TickKind::Combat,
            50,
            Some(Box::new(|| false)),
            None,
            Some(Box::new(move |_batch| {
                let ran = Arc::clone(&ran_clone);
                Box::pin(async move {
                    ran.store(true, Ordering::Relaxed);
                })
            })),
        );

        weaver.process_tick(TickKind::Combat).await;
        assert!(!ran.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn re_registering_a_kind_overwrites_without_duplicating_the_loop() {
        let watcher = Watcher::new();
        let weaver = Weaver::new(watcher);

        weaver.register(TickKind::ObjectSpawning, 50, None, None, None);
        weaver.register(TickKind::ObjectSpawning, 100, None, None, None);

        assert_eq!(weaver.registered_kinds().len(), 1);
        assert_eq!(weaver.interval_ms(TickKind::ObjectSpawning), Some(100));
    }

    #[tokio::test]
    async fn panicking_processor_is_caught_and_logged() {
        let watcher = Watcher::new();
        let weaver = Weaver::new(watcher);

        weaver.register(
            TickKind::WorldSimulation,
            50,
            None,
            None,
            Some(Box::new(|_batch| Box::pin(async { panic!("boom") }))),
        );

        let counter = weaver.process_tick(TickKind::WorldSimulation).await;
        assert_eq!(counter, 1);
    }
}
