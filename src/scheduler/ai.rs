//! AI scheduler: a fast scan that emits evaluation intents for creatures
//! whose action cooldown has elapsed, plus regeneration status ticks for
//! damaged creatures on a slower sub-cadence.
//!
//! The scan only reads. Cooldown stamping happens on the control consumer
//! when the intent actually runs, so an intent that arrives late or for a
//! creature that died in between is simply dropped there.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use crate::data::MapId;
use crate::world::command::ControlCommand;
use crate::world::WorldRuntime;

/// Passes between regeneration status ticks (10 seconds at the default
/// cadence).
const REGEN_TICK_PASSES: u32 = 10;

pub struct AiScheduler {
    runtime: Arc<WorldRuntime>,
    interval: Duration,
    maps: Vec<MapId>,
    passes: u32,
    refresh_passes: u32,
}

impl AiScheduler {
    pub fn new(runtime: Arc<WorldRuntime>) -> Self {
        let interval = runtime.config.ai_scan_interval();
        let refresh_passes = runtime.config.ai_map_refresh_passes.max(1);
        let maps = runtime.store.map_ids();
        Self {
            runtime,
            interval,
            maps,
            passes: 0,
            refresh_passes,
        }
    }

    pub fn map_count(&self) -> usize {
        self.maps.len()
    }

    /// Scan loop. A panicking pass is logged and the next pass still runs;
    /// exits within one interval of shutdown.
    pub fn run(mut self) {
        tracing::info!(
            "[ai] scheduler started, interval {:?}, {} maps",
            self.interval,
            self.maps.len()
        );
        loop {
            if self.runtime.is_shutting_down() {
                break;
            }
            if panic::catch_unwind(AssertUnwindSafe(|| self.scan_once())).is_err() {
                tracing::error!("[ai] scan pass panicked, continuing");
            }
            std::thread::sleep(self.interval);
        }
        tracing::info!("[ai] scheduler stopped");
    }

    /// One pass over the map working set. Maps with no connected observers
    /// are skipped wholesale.
    pub fn scan_once(&mut self) {
        self.passes = self.passes.wrapping_add(1);
        if self.passes % self.refresh_passes == 0 {
            self.maps = self.runtime.store.map_ids();
            tracing::debug!("[ai] refreshed working set, {} maps", self.maps.len());
        }

        let regen_pass = self.passes % REGEN_TICK_PASSES == 0;
        let now = self.runtime.clock.now();
        for &map_id in &self.maps {
            if self.runtime.sessions.observers_on(map_id) == 0 {
                continue;
            }
            for obj in self.runtime.objects.creatures_on(map_id) {
                let creature = &obj.creature;
                if creature.ai_disabled() || !creature.is_alive() {
                    continue;
                }
                if creature.action_ready(now) {
                    self.runtime.enqueue_control(ControlCommand::AiEvaluate {
                        creature_id: obj.id,
                        map_id,
                    });
                }
                if regen_pass && creature.hp() < creature.max_hp {
                    self.runtime.enqueue_control(ControlCommand::StatusTick {
                        creature_id: obj.id,
                    });
                }
            }
        }
    }
}
