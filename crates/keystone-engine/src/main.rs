//! Server binary for the Keystone tick engine.
//!
//! This is the main entry point that wires together configuration, logging,
//! the default collaborators, demo content, and the fixed-cadence tick
//! loop. It runs until the configured tick bound is reached or Ctrl-C is
//! pressed.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `keystone-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Start the save-queue consumer
//! 4. Build the world with the default collaborators
//! 5. Queue demo NPCs and bots
//! 6. Install the Ctrl-C handler
//! 7. Run the server loop
//! 8. Drain saves and log the result

mod encoder;
mod error;
mod saves;
mod spawner;

use std::path::Path;
use std::sync::Arc;

use keystone_core::collab::{AcceptAllPersistence, LogEventSink, NullConnection, SaveQueue, WorldContext};
use keystone_core::config::{LoggingConfig, ServerConfig};
use keystone_core::runner::{self, NoOpCallback, ShutdownSignal};
use keystone_core::world::World;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::encoder::JsonViewEncoder;
use crate::error::EngineError;
use crate::spawner::SpawnerConfig;

/// Path of the configuration file, relative to the working directory.
const CONFIG_PATH: &str = "keystone-config.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if any initialization step or the server loop fails.
#[tokio::main]
async fn main() -> Result<(), EngineError> {
    // 1. Load configuration. Logging is not up yet, so the outcome is
    //    reported right after it is.
    let (config, from_file) = load_config()?;

    // 2. Initialize structured logging.
    init_logging(&config.logging);
    info!("keystone-engine starting");
    if !from_file {
        info!("Config file not found, using defaults");
    }
    info!(
        world_name = %config.world.name,
        tick_interval_ms = config.world.tick_interval_ms,
        login_threshold = config.world.login_threshold,
        logout_threshold = config.world.logout_threshold,
        max_players = config.capacity.max_players,
        max_npcs = config.capacity.max_npcs,
        "Configuration loaded"
    );

    // 3. Start the save consumer.
    let (saves, save_receiver) = SaveQueue::channel(config.persistence.save_queue_capacity);
    let save_consumer = saves::spawn_save_consumer(save_receiver);

    // 4. Build the world.
    let context = WorldContext {
        connection: Arc::new(NullConnection),
        persistence: Arc::new(AcceptAllPersistence),
        events: Arc::new(LogEventSink),
        encoder: Arc::new(JsonViewEncoder),
        saves,
    };
    let mut world = World::new(&config, context)?;
    info!(sync_workers = world.sync_workers(), "World created");

    // 5. Demo content.
    let spawner_config = load_spawner_config()?;
    spawner::spawn_demo_content(&mut world, &spawner_config)?;

    // 6. Ctrl-C requests a clean stop between ticks.
    let signal = ShutdownSignal::new(config.world.tick_interval_ms, config.simulation.max_ticks);
    {
        let signal = Arc::clone(&signal);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Ctrl-C received, stopping after the current tick");
                    signal.request_stop();
                }
                Err(e) => warn!(error = %e, "failed to listen for Ctrl-C"),
            }
        });
    }

    // 7. Run the server.
    let result = runner::run_server(&mut world, &signal, &mut NoOpCallback).await?;

    // 8. Close the save channel and wait for pending saves.
    runner::log_run_end(&result);
    drop(world);
    match save_consumer.await {
        Ok(saved) => info!(saved, "Save queue drained"),
        Err(e) => warn!(error = %e, "save consumer did not finish cleanly"),
    }

    info!(
        stop_reason = ?result.stop_reason,
        total_ticks = result.total_ticks,
        "keystone-engine shutdown complete"
    );
    Ok(())
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

/// Load the server configuration from `keystone-config.yaml`.
///
/// Returns the config and whether it came from the file.
fn load_config() -> Result<(ServerConfig, bool), EngineError> {
    let config_path = Path::new(CONFIG_PATH);
    if config_path.exists() {
        Ok((ServerConfig::from_file(config_path)?, true))
    } else {
        Ok((ServerConfig::default(), false))
    }
}

/// Load demo content settings from the `demo` section of
/// `keystone-config.yaml`. A missing file or section yields defaults.
fn load_spawner_config() -> Result<SpawnerConfig, EngineError> {
    let config_path = Path::new(CONFIG_PATH);
    if !config_path.exists() {
        return Ok(SpawnerConfig::default());
    }
    let contents = std::fs::read_to_string(config_path).map_err(|e| EngineError::Spawner {
        message: format!("failed to read config file: {e}"),
    })?;

    // Parse the full YAML and extract just the "demo" section.
    let raw: serde_yml::Value = serde_yml::from_str(&contents).map_err(|e| EngineError::Spawner {
        message: format!("failed to parse config YAML: {e}"),
    })?;

    match raw.get("demo") {
        Some(demo) => serde_yml::from_value(demo.clone()).map_err(|e| EngineError::Spawner {
            message: format!("failed to parse demo config: {e}"),
        }),
        None => Ok(SpawnerConfig::default()),
    }
}
