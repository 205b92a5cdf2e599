//! World data definitions: maps, creatures, and spawn groups.
//!
//! Everything in this module is read-only after load. The schedulers consume
//! it at scan time and never mutate it; runtime state lives in the world
//! object table, not here.

pub mod loot;
pub mod script;

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::loot::LootTable;
use crate::data::script::{HookOutcome, HookRunner};

pub type MapId = u16;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("duplicate map id {0}")]
    DuplicateMap(MapId),

    #[error("duplicate creature {0}")]
    DuplicateCreature(String),

    #[error("map {name}: terrain grid is {rows}x{cols}, expected {height}x{width}")]
    TerrainMismatch {
        name: String,
        rows: usize,
        cols: usize,
        width: u16,
        height: u16,
    },

    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Static geometry for one map.
#[derive(Debug, Clone)]
pub struct MapDefinition {
    pub id: MapId,
    pub name: String,
    pub width: u16,
    pub height: u16,
    /// Row-major impassability grid; empty means fully passable.
    walls: Vec<bool>,
}

impl MapDefinition {
    pub fn new(id: MapId, name: impl Into<String>, width: u16, height: u16) -> Self {
        Self {
            id,
            name: name.into(),
            width,
            height,
            walls: Vec::new(),
        }
    }

    /// Mark a single tile impassable. Test and loader convenience.
    pub fn set_wall(&mut self, x: u16, y: u16) {
        if self.walls.is_empty() {
            self.walls = vec![false; self.width as usize * self.height as usize];
        }
        if x < self.width && y < self.height {
            self.walls[y as usize * self.width as usize + x as usize] = true;
        }
    }

    /// Out-of-bounds coordinates are treated as walls.
    pub fn is_wall(&self, x: u16, y: u16) -> bool {
        if x >= self.width || y >= self.height {
            return true;
        }
        if self.walls.is_empty() {
            return false;
        }
        self.walls[y as usize * self.width as usize + x as usize]
    }

    pub fn tile_area(&self) -> u32 {
        self.width as u32 * self.height as u32
    }
}

/// Base stats for a creature kind, referenced by name from spawn groups.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreatureDefinition {
    pub name: String,
    pub hp: u32,
    /// Minimum milliseconds between AI actions for creatures of this kind.
    #[serde(default = "default_action_delay")]
    pub action_delay_ms: u32,
    /// Optional named script run when this definition is loaded.
    #[serde(default)]
    pub on_load: Option<String>,
}

fn default_action_delay() -> u32 {
    1000
}

/// Weighted pick entry: which base creature to spawn and its loot inputs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpawnDefinition {
    pub base: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
    #[serde(default)]
    pub loot: LootTable,
}

fn default_weight() -> u32 {
    1
}

/// Per-map spawn configuration inside a group. The scheduler copies this
/// into its own mutable runtime entry; the stored config never changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpawnMapConfig {
    /// Map name, resolved to an id when the scheduler starts.
    pub map: String,
    /// Live-creature cap; 0 means "derive from map area".
    #[serde(default)]
    pub limit: u32,
    #[serde(default = "default_spawn_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_min_count")]
    pub min_count: u32,
    #[serde(default = "default_min_count")]
    pub max_count: u32,
    /// Explicit spawn points; empty means random placement.
    #[serde(default)]
    pub coordinates: Vec<(u16, u16)>,
}

fn default_spawn_interval() -> u64 {
    60
}

fn default_min_count() -> u32 {
    1
}

/// A named set of spawnable creatures and the maps they spawn on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpawnGroup {
    pub name: String,
    #[serde(default)]
    pub maps: Vec<SpawnMapConfig>,
    #[serde(default)]
    pub spawns: Vec<SpawnDefinition>,
}

/// YAML shape for a map entry in `maps.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MapConfig {
    id: MapId,
    name: String,
    width: u16,
    height: u16,
    /// One string per row; `#` marks an impassable tile.
    #[serde(default)]
    terrain: Vec<String>,
}

/// The read-only definition store consumed by the schedulers.
#[derive(Default)]
pub struct DefinitionStore {
    maps: HashMap<MapId, Arc<MapDefinition>>,
    maps_by_name: HashMap<String, MapId>,
    creatures: HashMap<String, Arc<CreatureDefinition>>,
    spawn_groups: Vec<Arc<SpawnGroup>>,
}

impl DefinitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `maps.yaml`, `creatures.yaml` and `spawngroups.yaml` from a data
    /// directory. Missing files are treated as empty sets so partial worlds
    /// can boot. Each loaded creature's optional on-load hook is run through
    /// `hooks`; a failing hook is logged and does not abort the load.
    pub fn load_dir<P: AsRef<Path>>(dir: P, hooks: &dyn HookRunner) -> Result<Self, DataError> {
        let dir = dir.as_ref();
        let mut store = Self::new();

        for map in read_yaml::<Vec<MapConfig>>(&dir.join("maps.yaml"))?.unwrap_or_default() {
            store.add_map(map_from_config(map)?)?;
        }

        let creatures =
            read_yaml::<Vec<CreatureDefinition>>(&dir.join("creatures.yaml"))?.unwrap_or_default();
        for creature in creatures {
            if let Some(script) = &creature.on_load {
                match hooks.run_hook(script, "on_load") {
                    HookOutcome::Error => {
                        tracing::warn!("[data] on_load hook failed for {}", creature.name);
                    }
                    HookOutcome::Success | HookOutcome::NotDefined => {}
                }
            }
            store.add_creature(creature)?;
        }

        let groups =
            read_yaml::<Vec<SpawnGroup>>(&dir.join("spawngroups.yaml"))?.unwrap_or_default();
        for group in groups {
            store.add_spawn_group(group);
        }

        tracing::info!(
            "[data] loaded {} maps, {} creatures, {} spawn groups",
            store.maps.len(),
            store.creatures.len(),
            store.spawn_groups.len()
        );
        Ok(store)
    }

    pub fn add_map(&mut self, map: MapDefinition) -> Result<(), DataError> {
        if self.maps.contains_key(&map.id) {
            return Err(DataError::DuplicateMap(map.id));
        }
        self.maps_by_name.insert(map.name.clone(), map.id);
        self.maps.insert(map.id, Arc::new(map));
        Ok(())
    }

    pub fn add_creature(&mut self, creature: CreatureDefinition) -> Result<(), DataError> {
        if self.creatures.contains_key(&creature.name) {
            return Err(DataError::DuplicateCreature(creature.name));
        }
        self.creatures
            .insert(creature.name.clone(), Arc::new(creature));
        Ok(())
    }

    pub fn add_spawn_group(&mut self, group: SpawnGroup) {
        self.spawn_groups.push(Arc::new(group));
    }

    pub fn map(&self, id: MapId) -> Option<Arc<MapDefinition>> {
        self.maps.get(&id).cloned()
    }

    pub fn map_by_name(&self, name: &str) -> Option<Arc<MapDefinition>> {
        self.maps_by_name.get(name).and_then(|id| self.map(*id))
    }

    pub fn map_ids(&self) -> Vec<MapId> {
        self.maps.keys().copied().collect()
    }

    pub fn creature(&self, name: &str) -> Option<Arc<CreatureDefinition>> {
        self.creatures.get(name).cloned()
    }

    pub fn spawn_groups(&self) -> &[Arc<SpawnGroup>] {
        &self.spawn_groups
    }
}

fn map_from_config(config: MapConfig) -> Result<MapDefinition, DataError> {
    let mut map = MapDefinition::new(config.id, config.name.clone(), config.width, config.height);
    if config.terrain.is_empty() {
        return Ok(map);
    }
    let cols = config.terrain.iter().map(|r| r.chars().count()).max().unwrap_or(0);
    if config.terrain.len() != config.height as usize || cols != config.width as usize {
        return Err(DataError::TerrainMismatch {
            name: config.name,
            rows: config.terrain.len(),
            cols,
            width: config.width,
            height: config.height,
        });
    }
    for (y, row) in config.terrain.iter().enumerate() {
        for (x, tile) in row.chars().enumerate() {
            if tile == '#' {
                map.set_wall(x as u16, y as u16);
            }
        }
    }
    Ok(map)
}

fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, DataError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path).map_err(|source| DataError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_yaml::from_str(&content)
        .map(Some)
        .map_err(|source| DataError::Parse {
            path: path.display().to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::script::NoopHookRunner;

    #[test]
    fn test_map_wall_lookup() {
        let mut map = MapDefinition::new(1, "mileth", 4, 3);
        assert!(!map.is_wall(0, 0));
        map.set_wall(2, 1);
        assert!(map.is_wall(2, 1));
        assert!(!map.is_wall(1, 1));
        // Out of bounds reads as wall
        assert!(map.is_wall(4, 0));
        assert!(map.is_wall(0, 3));
        assert_eq!(map.tile_area(), 12);
    }

    #[test]
    fn test_store_lookups() {
        let mut store = DefinitionStore::new();
        store.add_map(MapDefinition::new(7, "abel", 10, 10)).unwrap();
        store
            .add_creature(CreatureDefinition {
                name: "goblin".to_string(),
                hp: 50,
                action_delay_ms: 1500,
                on_load: None,
            })
            .unwrap();

        assert_eq!(store.map(7).unwrap().name, "abel");
        assert_eq!(store.map_by_name("abel").unwrap().id, 7);
        assert!(store.map_by_name("nowhere").is_none());
        assert_eq!(store.creature("goblin").unwrap().hp, 50);
        assert!(store.creature("dragon").is_none());
    }

    #[test]
    fn test_duplicate_map_rejected() {
        let mut store = DefinitionStore::new();
        store.add_map(MapDefinition::new(1, "a", 5, 5)).unwrap();
        assert!(matches!(
            store.add_map(MapDefinition::new(1, "b", 5, 5)),
            Err(DataError::DuplicateMap(1))
        ));
    }

    #[test]
    fn test_terrain_parsing() {
        let config = MapConfig {
            id: 2,
            name: "vale".to_string(),
            width: 3,
            height: 2,
            terrain: vec!["#..".to_string(), ".#.".to_string()],
        };
        let map = map_from_config(config).unwrap();
        assert!(map.is_wall(0, 0));
        assert!(map.is_wall(1, 1));
        assert!(!map.is_wall(2, 1));
    }

    #[test]
    fn test_terrain_mismatch_rejected() {
        let config = MapConfig {
            id: 2,
            name: "vale".to_string(),
            width: 3,
            height: 2,
            terrain: vec!["#..".to_string()],
        };
        assert!(matches!(
            map_from_config(config),
            Err(DataError::TerrainMismatch { .. })
        ));
    }

    #[test]
    fn test_load_dir_missing_files_is_empty_world() {
        let dir = std::env::temp_dir().join("ashfall_data_empty_test");
        std::fs::create_dir_all(&dir).unwrap();
        let store = DefinitionStore::load_dir(&dir, &NoopHookRunner).unwrap();
        assert!(store.map_ids().is_empty());
        assert!(store.spawn_groups().is_empty());
    }

    #[test]
    fn test_spawn_group_yaml_shape() {
        let yaml = r#"
- name: mileth_fields
  maps:
    - map: mileth
      limit: 10
      interval_secs: 30
      min_count: 1
      max_count: 3
  spawns:
    - base: goblin
      weight: 3
      loot:
        xp: 25
        min_gold: 1
        max_gold: 10
    - base: wolf
"#;
        let groups: Vec<SpawnGroup> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(groups.len(), 1);
        let group = &groups[0];
        assert_eq!(group.maps[0].limit, 10);
        assert_eq!(group.maps[0].coordinates.len(), 0);
        assert_eq!(group.spawns[0].weight, 3);
        // Defaults
        assert_eq!(group.spawns[1].weight, 1);
        assert_eq!(group.spawns[1].loot, LootTable::default());
    }
}
