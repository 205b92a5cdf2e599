//! Server configuration module
//!
//! Parses and manages server configuration from YAML files. Scheduler
//! cadences are configuration, not hardcoded constants, so tests and
//! deployments can tune them without rebuilding.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Main server configuration
///
/// This struct is automatically parsed from YAML by serde.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// World server listen port
    #[serde(default = "default_world_port")]
    pub world_port: u16,

    /// Bind address for the listener
    #[serde(default = "default_bind_ip")]
    pub bind_ip: String,

    /// Directory holding world data definitions (maps, creatures, spawn groups)
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Spawn scheduler scan interval, in seconds
    #[serde(default = "default_spawn_interval")]
    pub spawn_scan_secs: u64,

    /// AI scheduler scan interval, in milliseconds
    #[serde(default = "default_ai_interval")]
    pub ai_scan_ms: u64,

    /// AI passes between map working-set refreshes
    #[serde(default = "default_ai_refresh")]
    pub ai_map_refresh_passes: u32,
}

fn default_world_port() -> u16 {
    2610
}

fn default_bind_ip() -> String {
    "0.0.0.0".to_string()
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_spawn_interval() -> u64 {
    crate::core::SPAWN_SCAN_INTERVAL.as_secs()
}

fn default_ai_interval() -> u64 {
    crate::core::AI_SCAN_INTERVAL.as_millis() as u64
}

fn default_ai_refresh() -> u32 {
    crate::core::AI_MAP_REFRESH_PASSES
}

impl Default for ServerConfig {
    fn default() -> Self {
        // An empty mapping deserializes to all defaults
        serde_yaml::from_str("{}").expect("default config must parse")
    }
}

impl ServerConfig {
    /// Parse configuration from a YAML string
    pub fn from_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse server configuration")
    }

    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Cannot read config: {}", path.as_ref().display()))?;
        Self::from_str(&content)
    }

    pub fn spawn_scan_interval(&self) -> Duration {
        Duration::from_secs(self.spawn_scan_secs)
    }

    pub fn ai_scan_interval(&self) -> Duration {
        Duration::from_millis(self.ai_scan_ms)
    }
}
