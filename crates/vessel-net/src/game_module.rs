//! The registration surface a game module uses to tell the Dispatcher
//! which tick kinds exist and what work each performs (§3 "Tick Processor
//! Entry", §6 "Game-module registration interface").
//!
//! A module is untrusted for liveness: every callback it supplies is
//! invoked inside a panic-catching scope by the dispatcher, never directly.

use std::any::Any;
use std::future::Future;
use std::pin::Pin;

use crate::weaver::Weaver;

pub type Batch = Box<dyn Any + Send>;
pub type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

pub type HasPending = Box<dyn Fn() -> bool + Send + Sync>;
pub type FlushPending = Box<dyn Fn() -> Batch + Send + Sync>;
pub type ProcessBatch = Box<dyn Fn(Batch) -> BoxFuture + Send + Sync>;

/// One tick kind's registered work, with defaults substituted for any
/// callback the module left unset (§4.8).
pub struct ProcessorEntry {
    pub interval_ms: u64,
    pub has_pending: HasPending,
    pub flush_pending: FlushPending,
    pub process_batch: ProcessBatch,
}

impl ProcessorEntry {
    pub fn new(
        interval_ms: u64,
        has_pending: Option<HasPending>,
        flush_pending: Option<FlushPending>,
        process_batch: Option<ProcessBatch>,
    ) -> Self {
        Self {
            interval_ms,
            has_pending: has_pending.unwrap_or_else(|| Box::new(|| true)),
            flush_pending: flush_pending.unwrap_or_else(|| Box::new(|| Box::new(()) as Batch)),
            process_batch: process_batch
                .unwrap_or_else(|| Box::new(|_batch| Box::pin(async {}) as BoxFuture)),
        }
    }
}

/// External surface by which a game module registers its tick processors
/// at startup. Loaded once, at Dispatcher construction time; if loading
/// fails the caller logs it and proceeds with an empty Dispatcher (§7).
pub trait GameModule: Send + Sync {
    fn game_name(&self) -> &str;

    /// Called once with the freshly constructed Dispatcher. Implementations
    /// call `dispatcher.register(..)` zero or more times.
    fn initialize(&self, dispatcher: &Weaver);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_substitute_an_always_true_predicate_and_empty_batch() {
        let entry = ProcessorEntry::new(50, None, None, None);
        assert!((entry.has_pending)());
        let batch = (entry.flush_pending)();
        assert!(batch.downcast_ref::<()>().is_some());
    }
}
