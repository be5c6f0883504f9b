//! Configuration loading and typed config structures for the Keystone server.
//!
//! The canonical configuration lives in `keystone-config.yaml` at the project
//! root. This module defines strongly-typed structs that mirror the YAML
//! structure, and provides a loader that reads and validates the file. Every
//! field has a default, so an empty file is a valid configuration.

use std::path::Path;

use keystone_types::{HEIGHT_LEVELS, Position};
use serde::Deserialize;

use crate::registry::MAX_CAPACITY;

/// Environment variable overriding `world.tick_interval_ms`.
pub const TICK_INTERVAL_ENV: &str = "KEYSTONE_TICK_INTERVAL_MS";

/// Largest accepted viewing distance: one map region, in tiles.
pub const MAX_VIEWING_DISTANCE: u32 = 104;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is out of range.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level server configuration.
///
/// Mirrors the structure of `keystone-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    /// World-level settings (name, timing, per-tick thresholds).
    #[serde(default)]
    pub world: WorldConfig,

    /// Registry capacities.
    #[serde(default)]
    pub capacity: CapacityConfig,

    /// Parallel update settings.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Run bounds.
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// Save handoff settings.
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl ServerConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// `KEYSTONE_TICK_INTERVAL_MS` overrides `world.tick_interval_ms` when
    /// set to a valid integer.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = serde_yml::from_str(&contents)?;
        config.world.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string. No environment overrides
    /// are applied.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check ranges serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.world.tick_interval_ms == 0 {
            return Err(invalid("world.tick_interval_ms", "must be at least 1"));
        }
        if self.world.login_threshold == 0 {
            return Err(invalid("world.login_threshold", "must be at least 1"));
        }
        if self.world.logout_threshold == 0 {
            return Err(invalid("world.logout_threshold", "must be at least 1"));
        }
        if self.world.viewing_distance > MAX_VIEWING_DISTANCE {
            return Err(invalid(
                "world.viewing_distance",
                format!("must be at most {MAX_VIEWING_DISTANCE}"),
            ));
        }
        if self.world.starting_position.plane >= HEIGHT_LEVELS {
            return Err(invalid(
                "world.starting_position.plane",
                format!("must be below {HEIGHT_LEVELS}"),
            ));
        }
        if self.capacity.max_players > MAX_CAPACITY {
            return Err(invalid(
                "capacity.max_players",
                format!("must be at most {MAX_CAPACITY}"),
            ));
        }
        if self.capacity.max_npcs > MAX_CAPACITY {
            return Err(invalid(
                "capacity.max_npcs",
                format!("must be at most {MAX_CAPACITY}"),
            ));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// World-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorldConfig {
    /// Human-readable world name.
    #[serde(default = "default_world_name")]
    pub name: String,

    /// Real-time milliseconds per tick.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Most admissions per actor kind per tick.
    #[serde(default = "default_threshold")]
    pub login_threshold: usize,

    /// Most evictions per actor kind per tick.
    #[serde(default = "default_threshold")]
    pub logout_threshold: usize,

    /// View radius for update encoding, in tiles.
    #[serde(default = "default_viewing_distance")]
    pub viewing_distance: u32,

    /// Where new players appear.
    #[serde(default = "default_starting_position")]
    pub starting_position: Position,
}

impl WorldConfig {
    fn apply_env_overrides(&mut self) {
        if let Some(ms) = std::env::var(TICK_INTERVAL_ENV)
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            self.tick_interval_ms = ms;
        }
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            name: default_world_name(),
            tick_interval_ms: default_tick_interval_ms(),
            login_threshold: default_threshold(),
            logout_threshold: default_threshold(),
            viewing_distance: default_viewing_distance(),
            starting_position: default_starting_position(),
        }
    }
}

/// Registry capacities.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CapacityConfig {
    /// Player registry size.
    #[serde(default = "default_max_players")]
    pub max_players: usize,

    /// NPC registry size.
    #[serde(default = "default_max_npcs")]
    pub max_npcs: usize,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            max_players: default_max_players(),
            max_npcs: default_max_npcs(),
        }
    }
}

/// Parallel update configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SyncConfig {
    /// Worker threads for the update barrier; 0 uses available parallelism.
    #[serde(default)]
    pub worker_threads: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Run bounds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SimulationConfig {
    /// Stop after this many ticks; 0 runs until shutdown.
    #[serde(default)]
    pub max_ticks: u64,
}

/// Save handoff configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PersistenceConfig {
    /// Bound of the save channel.
    #[serde(default = "default_save_queue_capacity")]
    pub save_queue_capacity: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            save_queue_capacity: default_save_queue_capacity(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions for serde
// ---------------------------------------------------------------------------

fn default_world_name() -> String {
    String::from("Keystone")
}

const fn default_tick_interval_ms() -> u64 {
    600
}

const fn default_threshold() -> usize {
    50
}

const fn default_viewing_distance() -> u32 {
    keystone_world::VIEWING_DISTANCE
}

const fn default_starting_position() -> Position {
    Position::new(3222, 3218, 0)
}

const fn default_max_players() -> usize {
    2048
}

const fn default_max_npcs() -> usize {
    16384
}

fn default_log_level() -> String {
    String::from("info")
}

const fn default_save_queue_capacity() -> usize {
    1024
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.world.tick_interval_ms, 600);
        assert_eq!(config.world.login_threshold, 50);
        assert_eq!(config.world.logout_threshold, 50);
        assert_eq!(config.world.viewing_distance, 15);
        assert_eq!(config.capacity.max_players, 2048);
        assert_eq!(config.capacity.max_npcs, 16384);
        assert_eq!(config.sync.worker_threads, 0);
        assert_eq!(config.simulation.max_ticks, 0);
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
world:
  name: "Test World"
  tick_interval_ms: 100
  login_threshold: 10
  logout_threshold: 20
  viewing_distance: 8
  starting_position:
    x: 100
    y: 200
    plane: 1

capacity:
  max_players: 16
  max_npcs: 32

sync:
  worker_threads: 2

logging:
  level: "debug"
  json: true

simulation:
  max_ticks: 500

persistence:
  save_queue_capacity: 8
"#;

        let config = ServerConfig::parse(yaml).unwrap();
        assert_eq!(config.world.name, "Test World");
        assert_eq!(config.world.tick_interval_ms, 100);
        assert_eq!(config.world.login_threshold, 10);
        assert_eq!(config.world.logout_threshold, 20);
        assert_eq!(config.world.starting_position, Position::new(100, 200, 1));
        assert_eq!(config.capacity.max_npcs, 32);
        assert_eq!(config.sync.worker_threads, 2);
        assert!(config.logging.json);
        assert_eq!(config.simulation.max_ticks, 500);
        assert_eq!(config.persistence.save_queue_capacity, 8);
    }

    #[test]
    fn parse_minimal_yaml() {
        let config = ServerConfig::parse("world:\n  tick_interval_ms: 50\n").unwrap();
        assert_eq!(config.world.tick_interval_ms, 50);
        // Everything else uses defaults
        assert_eq!(config.world.login_threshold, 50);
        assert_eq!(config.capacity.max_players, 2048);
    }

    #[test]
    fn parse_empty_yaml() {
        assert!(ServerConfig::parse("").is_ok());
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let err = ServerConfig::parse("world:\n  tick_interval_ms: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "world.tick_interval_ms", .. }));

        let err = ServerConfig::parse("capacity:\n  max_players: 70000\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "capacity.max_players", .. }));

        let yaml = "world:\n  starting_position: { x: 0, y: 0, plane: 4 }\n";
        assert!(ServerConfig::parse(yaml).is_err());
    }

    #[test]
    fn zero_thresholds_are_rejected() {
        let err = ServerConfig::parse("world:\n  login_threshold: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "world.login_threshold", .. }));

        let err = ServerConfig::parse("world:\n  logout_threshold: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "world.logout_threshold", .. }));
    }

    #[test]
    fn viewing_distance_is_capped_at_one_region() {
        let err = ServerConfig::parse("world:\n  viewing_distance: 4000000000\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "world.viewing_distance", .. }));

        let config = ServerConfig::parse("world:\n  viewing_distance: 104\n").unwrap();
        assert_eq!(config.world.viewing_distance, MAX_VIEWING_DISTANCE);
        assert!(ServerConfig::parse("world:\n  viewing_distance: 105\n").is_err());
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        let err = ServerConfig::parse("world: [").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml { .. }));
    }

    #[test]
    fn load_project_config_file() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("keystone-config.yaml");
        if path.exists() {
            let config = ServerConfig::from_file(&path);
            assert!(config.is_ok(), "Failed to load project config: {config:?}");
        }
    }
}
