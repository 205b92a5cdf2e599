//! Core server lifecycle: the shared shutdown token and loop cadence
//! defaults checked by every long-running thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Default spawn scheduler scan interval.
pub const SPAWN_SCAN_INTERVAL: Duration = Duration::from_secs(5);

/// Default AI scheduler scan interval.
pub const AI_SCAN_INTERVAL: Duration = Duration::from_secs(1);

/// Number of AI passes between working-set refreshes (tolerates maps being
/// added or removed by a configuration reload).
pub const AI_MAP_REFRESH_PASSES: u32 = 30;

/// Cooperative shutdown flag shared by the consumer loops, both scheduler
/// threads, and the network edge.
///
/// Setting it guarantees every loop exits within one scan interval or one
/// in-flight command, whichever is greater.
#[derive(Clone, Default)]
pub struct ShutdownToken {
    flag: Arc<AtomicBool>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown. Idempotent.
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
