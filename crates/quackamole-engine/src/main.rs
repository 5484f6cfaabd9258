//! Quack-a-Mole server binary.
//!
//! # Startup Sequence
//!
//! 1. Initialize structured logging (tracing)
//! 2. Load configuration from `quackamole-config.yaml`
//! 3. Start the simulation supervisor (pond physics and mole activity)
//! 4. Bind and spawn the HTTP API
//! 5. Wait for Ctrl-C, then stop the API and the simulation

mod error;

use std::path::PathBuf;
use std::sync::Arc;

use quackamole_core::{QuackConfig, SimulationSupervisor};
use quackamole_observer::server::ServerConfig;
use quackamole_observer::startup::spawn_observer;
use quackamole_observer::state::AppState;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;

/// Default configuration file, relative to the working directory.
const CONFIG_FILE: &str = "quackamole-config.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration, simulation startup, or binding the
/// HTTP listener fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("quackamole-engine starting");

    run().await?;
    Ok(())
}

async fn run() -> Result<(), EngineError> {
    // 2. Load configuration.
    let config = load_config()?;
    info!(
        physics_mode = %config.pond.water_physics,
        mole_holes = config.pond.mole_holes,
        physics_interval_ms = config.pond.physics_interval_ms,
        activity_interval_ms = config.pond.activity_interval_ms,
        max_inflight_resonances = config.quacker.max_inflight_resonances,
        "Configuration loaded"
    );
    let server_config = ServerConfig::from(&config.server);

    // 3. Start the simulation.
    let supervisor = Arc::new(SimulationSupervisor::start(config).await?);

    // 4. Start the HTTP API.
    let app_state = Arc::new(AppState::new(Arc::clone(&supervisor)));
    let observer = spawn_observer(&server_config, app_state).await?;
    info!(
        host = %server_config.host,
        port = server_config.port,
        "Quack-a-Mole is open for business"
    );

    // 5. Run until interrupted.
    tokio::signal::ctrl_c()
        .await
        .map_err(|source| EngineError::Signal { source })?;
    info!("Shutdown requested");

    observer.abort();
    supervisor.shutdown().await;
    info!("quackamole-engine stopped");
    Ok(())
}

/// Load configuration from `QUACKAMOLE_CONFIG` or `quackamole-config.yaml`.
///
/// A missing file means defaults; environment overrides apply either way.
fn load_config() -> Result<QuackConfig, EngineError> {
    let config_path = std::env::var("QUACKAMOLE_CONFIG")
        .map_or_else(|_| PathBuf::from(CONFIG_FILE), PathBuf::from);
    if config_path.exists() {
        let config = QuackConfig::from_file(&config_path)?;
        info!(path = %config_path.display(), "Configuration file loaded");
        Ok(config)
    } else {
        info!(path = %config_path.display(), "Config file not found, using defaults");
        let mut config = QuackConfig::default();
        config.server.apply_env_overrides();
        Ok(config)
    }
}
