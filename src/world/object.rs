//! The world object table: the single authoritative registry of live
//! simulation objects.
//!
//! Insert and remove run under one mutual-exclusion scope covering the id
//! counter and both index maps. Only the control-queue consumer mutates the
//! table; the scheduler threads take read-only snapshots for their scans and
//! every decision they derive is re-validated here before any mutation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU16, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::data::loot::LootOutcome;
use crate::data::{CreatureDefinition, MapId};
use crate::data::script::HookRunner;

pub type ObjectId = u32;

/// Live creature state. Constructed fully-formed by the spawn scheduler,
/// materialized only by the control consumer.
#[derive(Debug)]
pub struct Creature {
    pub name: String,
    pub map_id: MapId,
    x: AtomicU16,
    y: AtomicU16,
    hp: AtomicU32,
    pub max_hp: u32,
    /// Minimum milliseconds between AI actions.
    pub action_delay_ms: u32,
    /// Epoch milliseconds of the last AI action.
    last_action_ms: AtomicI64,
    ai_disabled: AtomicBool,
    pub loot: LootOutcome,
}

impl Creature {
    pub fn from_definition(
        def: &CreatureDefinition,
        map_id: MapId,
        x: u16,
        y: u16,
        loot: LootOutcome,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            name: def.name.clone(),
            map_id,
            x: AtomicU16::new(x),
            y: AtomicU16::new(y),
            hp: AtomicU32::new(def.hp),
            max_hp: def.hp,
            action_delay_ms: def.action_delay_ms,
            last_action_ms: AtomicI64::new(now.timestamp_millis()),
            ai_disabled: AtomicBool::new(false),
            loot,
        }
    }

    pub fn position(&self) -> (u16, u16) {
        (self.x.load(Ordering::Relaxed), self.y.load(Ordering::Relaxed))
    }

    pub fn set_position(&self, x: u16, y: u16) {
        self.x.store(x, Ordering::Relaxed);
        self.y.store(y, Ordering::Relaxed);
    }

    pub fn hp(&self) -> u32 {
        self.hp.load(Ordering::Relaxed)
    }

    pub fn is_alive(&self) -> bool {
        self.hp() > 0
    }

    /// Saturating damage; returns remaining hp.
    pub fn apply_damage(&self, amount: u32) -> u32 {
        let mut current = self.hp.load(Ordering::Relaxed);
        loop {
            let next = current.saturating_sub(amount);
            match self.hp.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(observed) => current = observed,
            }
        }
    }

    /// Healing clamped to max hp; returns the new value. Dead creatures
    /// stay dead, revival is not a heal.
    pub fn apply_heal(&self, amount: u32) -> u32 {
        let mut current = self.hp.load(Ordering::Relaxed);
        loop {
            if current == 0 {
                return 0;
            }
            let next = current.saturating_add(amount).min(self.max_hp);
            match self.hp.compare_exchange_weak(
                current,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return next,
                Err(observed) => current = observed,
            }
        }
    }

    pub fn ai_disabled(&self) -> bool {
        self.ai_disabled.load(Ordering::Relaxed)
    }

    pub fn set_ai_disabled(&self, disabled: bool) {
        self.ai_disabled.store(disabled, Ordering::Relaxed);
    }

    /// True when the action cooldown has elapsed at `now`.
    pub fn action_ready(&self, now: DateTime<Utc>) -> bool {
        let last = self.last_action_ms.load(Ordering::Relaxed);
        now.timestamp_millis() - last >= self.action_delay_ms as i64
    }

    pub fn touch_action(&self, now: DateTime<Utc>) {
        self.last_action_ms
            .store(now.timestamp_millis(), Ordering::Relaxed);
    }

    #[cfg(test)]
    pub fn set_last_action(&self, at: DateTime<Utc>) {
        self.last_action_ms
            .store(at.timestamp_millis(), Ordering::Relaxed);
    }
}

/// A creature registered in the table, addressable by both identities.
#[derive(Debug)]
pub struct WorldObject {
    /// Monotonic numeric identity, assigned at insert.
    pub id: ObjectId,
    /// Stable globally-unique identity.
    pub guid: Uuid,
    pub creature: Creature,
}

struct TableInner {
    next_id: ObjectId,
    by_id: HashMap<ObjectId, Arc<WorldObject>>,
    by_guid: HashMap<Uuid, ObjectId>,
}

pub struct WorldObjectTable {
    inner: Mutex<TableInner>,
    hooks: Arc<dyn HookRunner>,
}

impl WorldObjectTable {
    pub fn new(hooks: Arc<dyn HookRunner>) -> Self {
        Self {
            inner: Mutex::new(TableInner {
                next_id: 1,
                by_id: HashMap::new(),
                by_guid: HashMap::new(),
            }),
            hooks,
        }
    }

    /// Assign identities and register the creature. The id counter and both
    /// maps move together under the table lock.
    pub fn insert(&self, creature: Creature) -> Arc<WorldObject> {
        let guid = Uuid::new_v4();
        let obj = {
            let mut inner = self.inner.lock().expect("object table lock poisoned");
            let id = inner.next_id;
            inner.next_id += 1;
            let obj = Arc::new(WorldObject {
                id,
                guid,
                creature,
            });
            inner.by_id.insert(id, Arc::clone(&obj));
            inner.by_guid.insert(guid, id);
            obj
        };
        tracing::debug!(
            "[world] inserted {} id={} map={}",
            obj.creature.name,
            obj.id,
            obj.creature.map_id
        );
        self.hooks.run_hook(&obj.creature.name, "on_insert");
        obj
    }

    pub fn remove(&self, id: ObjectId) -> Option<Arc<WorldObject>> {
        let removed = {
            let mut inner = self.inner.lock().expect("object table lock poisoned");
            let obj = inner.by_id.remove(&id)?;
            inner.by_guid.remove(&obj.guid);
            Some(obj)
        };
        if let Some(obj) = &removed {
            tracing::info!("[world] object {} id={} removed", obj.creature.name, obj.id);
            self.hooks.run_hook(&obj.creature.name, "on_remove");
        }
        removed
    }

    pub fn get(&self, id: ObjectId) -> Option<Arc<WorldObject>> {
        self.inner
            .lock()
            .expect("object table lock poisoned")
            .by_id
            .get(&id)
            .cloned()
    }

    pub fn get_by_guid(&self, guid: Uuid) -> Option<Arc<WorldObject>> {
        let inner = self.inner.lock().expect("object table lock poisoned");
        inner
            .by_guid
            .get(&guid)
            .and_then(|id| inner.by_id.get(id))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("object table lock poisoned").by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the creatures on one map. Used by the scheduler scans;
    /// staleness is a liveness concern only, since the control consumer
    /// re-validates before mutating.
    pub fn creatures_on(&self, map_id: MapId) -> Vec<Arc<WorldObject>> {
        self.inner
            .lock()
            .expect("object table lock poisoned")
            .by_id
            .values()
            .filter(|obj| obj.creature.map_id == map_id)
            .cloned()
            .collect()
    }

    pub fn count_on(&self, map_id: MapId) -> usize {
        self.inner
            .lock()
            .expect("object table lock poisoned")
            .by_id
            .values()
            .filter(|obj| obj.creature.map_id == map_id)
            .count()
    }

    /// Is any creature standing on this tile?
    pub fn occupied(&self, map_id: MapId, x: u16, y: u16) -> bool {
        self.inner
            .lock()
            .expect("object table lock poisoned")
            .by_id
            .values()
            .any(|obj| obj.creature.map_id == map_id && obj.creature.position() == (x, y))
    }
}
