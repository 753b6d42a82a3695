//! Tick Scheduler: one independent loop per registered tick kind, with
//! interval compensation and exponentially-smoothed timing stats (§4.7).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::tick::TickKind;
use crate::weaver::Weaver;

/// Smoothing factor for the exponential moving average of per-tick
/// execution time: `new = 0.9 * old + 0.1 * sample`.
const SMOOTHING_ALPHA: f64 = 0.10;

/// Drives one periodic loop per tick kind registered on the Dispatcher.
pub struct Loom {
    weaver: Arc<Weaver>,
    smoothed_micros: DashMap<TickKind, AtomicU64>,
}

impl Loom {
    pub fn new(weaver: Arc<Weaver>) -> Arc<Self> {
        Arc::new(Self {
            weaver,
            smoothed_micros: DashMap::new(),
        })
    }

    /// The current smoothed execution time for `kind`, in microseconds.
    /// `None` until the kind's loop has run at least once.
    pub fn smoothed_micros(&self, kind: TickKind) -> Option<f64> {
        self.smoothed_micros
            .get(&kind)
            .map(|bits| f64::from_bits(bits.load(Ordering::Relaxed)))
    }

    /// Runs one loop per registered tick kind until `shutdown` is tripped.
    /// If no kind is registered, logs a warning and idles until shutdown
    /// rather than starting any loops.
    pub async fn run(self: &Arc<Self>, shutdown: CancellationToken) {
        let kinds = self.weaver.registered_kinds();
        if kinds.is_empty() {
            warn!("tick scheduler idle: no tick kinds registered");
            shutdown.cancelled().await;
            return;
        }

        let mut handles = Vec::with_capacity(kinds.len());
        for kind in kinds {
            let loom = Arc::clone(self);
            let shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move {
                loom.run_kind_loop(kind, shutdown).await;
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }
    }

    async fn run_kind_loop(&self, kind: TickKind, shutdown: CancellationToken) {
        let Some(interval_ms) = self.weaver.interval_ms(kind) else {
            return;
        };
        let interval = Duration::from_millis(interval_ms);
        debug!(kind = kind.name(), interval_ms, "tick loop starting");

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let start = Instant::now();
            self.weaver.process_tick(kind).await;
            let elapsed = start.elapsed();
            self.update_smoothed(kind, elapsed);

            let remaining = interval.saturating_sub(elapsed);
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(remaining) => {}
            }
        }

        debug!(kind = kind.name(), "tick loop stopping");
    }

    fn update_smoothed(&self, kind: TickKind, elapsed: Duration) {
        let sample = elapsed.as_micros() as f64;
        let slot = self
            .smoothed_micros
            .entry(kind)
            .or_insert_with(|| AtomicU64::new(0f64.to_bits()));
        let old = f64::from_bits(slot.load(Ordering::Relaxed));
        let new = (1.0 - SMOOTHING_ALPHA) * old + SMOOTHING_ALPHA * sample;
        slot.store(new.to_bits(), Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::Watcher;

    #[tokio::test]
    async fn idle_scheduler_exits_cleanly_on_shutdown() {
        let watcher = Watcher::new();
        let weaver = Weaver::new(watcher);
        let loom = Loom::new(weaver);
        let shutdown = CancellationToken::new();

        shutdown.cancel();
        loom.run(shutdown).await;
    }

    #[tokio::test]
    async fn registered_kind_accumulates_smoothed_timing() {
        let watcher = Watcher::new();
        let weaver = Weaver::new(watcher);
        weaver.register(TickKind::Movement, 5, None, None, None);
        let loom = Loom::new(Arc::clone(&weaver));

        assert!(loom.smoothed_micros(TickKind::Movement).is_none());
        loom.run_kind_loop_for_test(TickKind::Movement).await;
        assert!(loom.smoothed_micros(TickKind::Movement).is_some());
    }

    impl Loom {
        async fn run_kind_loop_for_test(&self, kind: TickKind) {
            let start = Instant::now();
            self.weaver.process_tick(kind).await;
            let elapsed = start.elapsed();
            self.update_smoothed(kind, elapsed);
        }
    }
}
