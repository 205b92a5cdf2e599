//! Structured dispatch observability.
//!
//! Failure outcomes in the consumer loops are counted here so tests and
//! operators can assert on them instead of scraping log text. The timer sink
//! is optional; its absence never affects dispatch correctness.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Receives per-opcode handler timings.
pub trait TimerSink: Send + Sync {
    fn record(&self, label: &str, elapsed: Duration);
}

#[derive(Default)]
pub struct DispatchMetrics {
    processed: AtomicU64,
    handler_errors: AtomicU64,
    guard_blocked: AtomicU64,
    unresolved_actors: AtomicU64,
    unknown_opcodes: AtomicU64,
    discarded_on_close: AtomicU64,
    timer: Option<Arc<dyn TimerSink>>,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timer(sink: Arc<dyn TimerSink>) -> Self {
        Self {
            timer: Some(sink),
            ..Self::default()
        }
    }

    pub fn note_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_handler_error(&self) {
        self.handler_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_guard_blocked(&self) {
        self.guard_blocked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_unresolved_actor(&self) {
        self.unresolved_actors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_unknown_opcode(&self) {
        self.unknown_opcodes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_discarded_on_close(&self) {
        self.discarded_on_close.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_time(&self, label: &str, elapsed: Duration) {
        if let Some(sink) = &self.timer {
            sink.record(label, elapsed);
        }
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn handler_errors(&self) -> u64 {
        self.handler_errors.load(Ordering::Relaxed)
    }

    pub fn guard_blocked(&self) -> u64 {
        self.guard_blocked.load(Ordering::Relaxed)
    }

    pub fn unresolved_actors(&self) -> u64 {
        self.unresolved_actors.load(Ordering::Relaxed)
    }

    pub fn unknown_opcodes(&self) -> u64 {
        self.unknown_opcodes.load(Ordering::Relaxed)
    }

    pub fn discarded_on_close(&self) -> u64 {
        self.discarded_on_close.load(Ordering::Relaxed)
    }
}
