//! Spawn scheduler: periodic per-map scans that enqueue creature spawn
//! intents for the control consumer to materialize.
//!
//! Faults are contained per entry: a data error in one map's spawn
//! configuration disables that entry and is logged, while every other entry
//! keeps spawning.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use chrono::{DateTime, Utc};
use rand::{Rng, RngExt};

use crate::data::{MapDefinition, MapId, SpawnDefinition, SpawnGroup, SpawnMapConfig};
use crate::world::command::ControlCommand;
use crate::world::object::Creature;
use crate::world::WorldRuntime;

/// Tiles per live creature when a map entry does not set an explicit cap.
const TILES_PER_CREATURE: u32 = 10;

/// Attempts at random placement before giving up for the round.
const PLACEMENT_ATTEMPTS: u32 = 64;

struct SpawnMapEntry {
    config: SpawnMapConfig,
    map_id: MapId,
    last_spawn: DateTime<Utc>,
    disabled: bool,
}

struct GroupRuntime {
    group: Arc<SpawnGroup>,
    entries: Vec<SpawnMapEntry>,
    warned_empty: bool,
}

pub struct SpawnScheduler {
    runtime: Arc<WorldRuntime>,
    groups: Vec<GroupRuntime>,
    interval: Duration,
}

impl SpawnScheduler {
    /// Build the working set from the definition store. Map names that do
    /// not resolve are logged and dropped; they can never spawn anything.
    pub fn new(runtime: Arc<WorldRuntime>) -> Self {
        let interval = runtime.config.spawn_scan_interval();
        let mut groups = Vec::new();
        for group in runtime.store.spawn_groups() {
            let mut entries = Vec::new();
            for config in &group.maps {
                match runtime.store.map_by_name(&config.map) {
                    Some(map) => entries.push(SpawnMapEntry {
                        config: config.clone(),
                        map_id: map.id,
                        // Epoch start, so the first scan is eligible.
                        last_spawn: DateTime::<Utc>::MIN_UTC,
                        disabled: false,
                    }),
                    None => {
                        tracing::error!(
                            "[spawn] group {}: unknown map '{}', entry dropped",
                            group.name,
                            config.map
                        );
                    }
                }
            }
            groups.push(GroupRuntime {
                group: Arc::clone(group),
                entries,
                warned_empty: false,
            });
        }
        Self {
            runtime,
            groups,
            interval,
        }
    }

    /// Entries still eligible to spawn.
    pub fn active_entries(&self) -> usize {
        self.groups
            .iter()
            .flat_map(|g| &g.entries)
            .filter(|e| !e.disabled)
            .count()
    }

    /// Scan loop. A panicking pass is logged and the next pass still runs;
    /// exits within one interval of shutdown.
    pub fn run(mut self) {
        tracing::info!(
            "[spawn] scheduler started, interval {:?}, {} entries",
            self.interval,
            self.active_entries()
        );
        loop {
            if self.runtime.is_shutting_down() {
                break;
            }
            self.scan_pass();
            std::thread::sleep(self.interval);
        }
        tracing::info!("[spawn] scheduler stopped");
    }

    /// One pass with the panic boundary the loop runs behind. A panic from
    /// a collaborator (loot, hooks) aborts only the current pass.
    fn scan_pass(&mut self) {
        if panic::catch_unwind(AssertUnwindSafe(|| self.scan_once())).is_err() {
            tracing::error!("[spawn] scan pass panicked, continuing");
        }
    }

    /// One full pass over every active entry.
    pub fn scan_once(&mut self) {
        let now = self.runtime.clock.now();
        for group in &mut self.groups {
            let spawns = &group.group.spawns;
            for entry in &mut group.entries {
                if entry.disabled {
                    continue;
                }
                if let Err(err) =
                    scan_entry(&self.runtime, entry, spawns, &mut group.warned_empty, now)
                {
                    tracing::error!(
                        "[spawn] group {} map '{}' disabled: {:#}",
                        group.group.name,
                        entry.config.map,
                        err
                    );
                    entry.disabled = true;
                }
            }
        }
    }
}

/// One entry's scan. An error here means a data fault and disables the
/// entry; transient conditions (cap reached, interval not elapsed, no free
/// tile) return Ok and retry next scan.
fn scan_entry(
    runtime: &WorldRuntime,
    entry: &mut SpawnMapEntry,
    spawns: &[SpawnDefinition],
    warned_empty: &mut bool,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let Some(map) = runtime.store.map(entry.map_id) else {
        bail!("map {} vanished from the store", entry.map_id);
    };

    let cap = if entry.config.limit > 0 {
        entry.config.limit
    } else {
        map.tile_area() / TILES_PER_CREATURE
    };
    if runtime.objects.count_on(entry.map_id) as u32 >= cap {
        return Ok(());
    }

    let elapsed = now.signed_duration_since(entry.last_spawn);
    if elapsed.num_seconds() < entry.config.interval_secs as i64 {
        return Ok(());
    }
    entry.last_spawn = now;

    let total_weight: u32 = spawns.iter().map(|s| s.weight).sum();
    if total_weight == 0 {
        if !*warned_empty {
            tracing::warn!("[spawn] map '{}': no weighted spawns defined", entry.config.map);
            *warned_empty = true;
        }
        return Ok(());
    }

    let mut rng = rand::rng();
    let min = entry.config.min_count;
    let max = entry.config.max_count.max(min);
    let count = rng.random_range(min..=max);

    for _ in 0..count {
        let spawn = pick_weighted(spawns, total_weight, &mut rng);
        let Some(def) = runtime.store.creature(&spawn.base) else {
            bail!("spawn references unknown creature '{}'", spawn.base);
        };
        let Some((x, y)) = place(runtime, entry, &map, &mut rng)? else {
            // Crowded this round; try again next scan.
            tracing::debug!("[spawn] map '{}': no free tile", entry.config.map);
            continue;
        };
        let loot = runtime.loot.calculate(spawn);
        let creature = Creature::from_definition(&def, entry.map_id, x, y, loot, now);
        runtime.enqueue_control(ControlCommand::SpawnCreature {
            creature,
            map_id: entry.map_id,
        });
    }
    Ok(())
}

fn pick_weighted<'a, R: Rng>(
    spawns: &'a [SpawnDefinition],
    total_weight: u32,
    rng: &mut R,
) -> &'a SpawnDefinition {
    let mut roll = rng.random_range(0..total_weight);
    for spawn in spawns {
        if roll < spawn.weight {
            return spawn;
        }
        roll -= spawn.weight;
    }
    // Unreachable while total_weight is the sum of the weights.
    &spawns[spawns.len() - 1]
}

/// Choose a tile. Explicit coordinates are tried in order; random placement
/// is bounded rejection sampling. Returns Ok(None) when every candidate is
/// occupied this round. Explicit coordinates pointing only at walls are a
/// data fault.
fn place<R: Rng>(
    runtime: &WorldRuntime,
    entry: &SpawnMapEntry,
    map: &MapDefinition,
    rng: &mut R,
) -> anyhow::Result<Option<(u16, u16)>> {
    if !entry.config.coordinates.is_empty() {
        let mut any_passable = false;
        for &(x, y) in &entry.config.coordinates {
            if map.is_wall(x, y) {
                continue;
            }
            any_passable = true;
            if !runtime.objects.occupied(entry.map_id, x, y) {
                return Ok(Some((x, y)));
            }
        }
        if !any_passable {
            bail!(
                "map '{}': every configured spawn point is impassable",
                entry.config.map
            );
        }
        return Ok(None);
    }

    for _ in 0..PLACEMENT_ATTEMPTS {
        let x = rng.random_range(0..map.width);
        let y = rng.random_range(0..map.height);
        if !map.is_wall(x, y) && !runtime.objects.occupied(entry.map_id, x, y) {
            return Ok(Some((x, y)));
        }
    }
    Ok(None)
}
