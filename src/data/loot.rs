//! Loot calculation boundary.
//!
//! Invoked once per spawned unit by the spawn scheduler. The trait keeps
//! loot rules replaceable without touching scheduling code.

use rand::RngExt;
use serde::{Deserialize, Serialize};

use crate::data::SpawnDefinition;

/// Concrete loot rolled for a single spawned creature.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LootOutcome {
    pub xp: u32,
    pub gold: u32,
    pub items: Vec<String>,
}

/// One item entry in a spawn definition's loot table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LootItem {
    pub name: String,
    /// Drop probability in [0, 1].
    #[serde(default = "default_chance")]
    pub chance: f64,
}

fn default_chance() -> f64 {
    1.0
}

/// Loot inputs attached to a spawn definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LootTable {
    #[serde(default)]
    pub xp: u32,
    #[serde(default)]
    pub min_gold: u32,
    #[serde(default)]
    pub max_gold: u32,
    #[serde(default)]
    pub items: Vec<LootItem>,
}

pub trait LootCalculator: Send + Sync {
    fn calculate(&self, spawn: &SpawnDefinition) -> LootOutcome;
}

/// Default calculator: fixed xp, uniform gold in [min, max], independent
/// per-item chance rolls.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardLootCalculator;

impl LootCalculator for StandardLootCalculator {
    fn calculate(&self, spawn: &SpawnDefinition) -> LootOutcome {
        let table = &spawn.loot;
        let mut rng = rand::rng();

        let gold = if table.max_gold > table.min_gold {
            rng.random_range(table.min_gold..=table.max_gold)
        } else {
            table.min_gold
        };

        let items = table
            .items
            .iter()
            .filter(|item| item.chance >= 1.0 || rng.random_range(0.0..1.0) < item.chance)
            .map(|item| item.name.clone())
            .collect();

        LootOutcome {
            xp: table.xp,
            gold,
            items,
        }
    }
}
