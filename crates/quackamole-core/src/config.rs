//! Configuration loading and typed config structures for Quack-a-Mole.
//!
//! The canonical configuration lives in `quackamole-config.yaml` next to
//! the engine binary's working directory. This module defines
//! strongly-typed structs that mirror the YAML structure, and provides a
//! loader that reads and validates the file. Every section and key is
//! optional; anything left out falls back to the defaults below.

use std::path::Path;

use serde::Deserialize;
use tokio::sync::Semaphore;

use crate::error::CoreError;

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
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level Quack-a-Mole configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct QuackConfig {
    /// Pond field settings (physics, capacity, mole holes, tick periods).
    #[serde(default)]
    pub pond: PondConfig,

    /// Whack resolver settings.
    #[serde(default)]
    pub whacker: WhackerConfig,

    /// Quantum quacker settings.
    #[serde(default)]
    pub quacker: QuackerConfig,

    /// Event log settings.
    #[serde(default)]
    pub events: EventsConfig,

    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerSettings,
}

impl QuackConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values for the listener:
    /// - `QUACKAMOLE_HOST` overrides `server.host`
    /// - `QUACKAMOLE_PORT` overrides `server.port` (ignored if unparseable)
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.server.apply_env_overrides();
        Ok(config)
    }

    /// Check the values a running supervisor cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] for zero tick periods, a
    /// zero-capacity event log, or more in-flight resonances than a
    /// semaphore can hold.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.pond.physics_interval_ms == 0 {
            return Err(CoreError::InvalidConfig {
                reason: "pond.physics_interval_ms must be at least 1".to_owned(),
            });
        }
        if self.pond.activity_interval_ms == 0 {
            return Err(CoreError::InvalidConfig {
                reason: "pond.activity_interval_ms must be at least 1".to_owned(),
            });
        }
        if self.events.capacity == 0 {
            return Err(CoreError::InvalidConfig {
                reason: "events.capacity must be at least 1".to_owned(),
            });
        }
        if self.quacker.max_inflight_resonances > Semaphore::MAX_PERMITS {
            return Err(CoreError::InvalidConfig {
                reason: format!(
                    "quacker.max_inflight_resonances must be at most {}",
                    Semaphore::MAX_PERMITS
                ),
            });
        }
        Ok(())
    }
}

/// Pond field configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PondConfig {
    /// Label reported as the physics mode in pond status.
    #[serde(default = "default_water_physics")]
    pub water_physics: String,

    /// Maximum number of ducks the pond accepts.
    #[serde(default = "default_duck_capacity")]
    pub duck_capacity: u32,

    /// Number of mole holes created at startup.
    #[serde(default = "default_mole_holes")]
    pub mole_holes: u32,

    /// Period of the water physics tick in milliseconds.
    #[serde(default = "default_physics_interval_ms")]
    pub physics_interval_ms: u64,

    /// Period of the mole activity tick in milliseconds.
    #[serde(default = "default_activity_interval_ms")]
    pub activity_interval_ms: u64,

    /// Fixed RNG seed; `None` seeds from the OS.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for PondConfig {
    fn default() -> Self {
        Self {
            water_physics: default_water_physics(),
            duck_capacity: default_duck_capacity(),
            mole_holes: default_mole_holes(),
            physics_interval_ms: default_physics_interval_ms(),
            activity_interval_ms: default_activity_interval_ms(),
            seed: None,
        }
    }
}

/// Whack resolver configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WhackerConfig {
    /// Speed label; `"ludicrous"` raises the hammer velocity.
    #[serde(default = "default_whack_speed")]
    pub whack_speed: String,

    /// Mole detection label (informational).
    #[serde(default = "default_mole_detection")]
    pub mole_detection: String,

    /// Hammer label; `"foam"` lowers the base success chance.
    #[serde(default = "default_hammer_type")]
    pub hammer_type: String,

    /// Fixed RNG seed; `None` seeds from the OS.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for WhackerConfig {
    fn default() -> Self {
        Self {
            whack_speed: default_whack_speed(),
            mole_detection: default_mole_detection(),
            hammer_type: default_hammer_type(),
            seed: None,
        }
    }
}

/// Quantum quacker configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QuackerConfig {
    /// Amplitude given to newly registered quackers.
    #[serde(default = "default_quack_amplitude")]
    pub quack_amplitude: f64,

    /// Quantum state label (informational).
    #[serde(default = "default_quantum_state")]
    pub quantum_state: String,

    /// Whether quackers report nearby moles (informational).
    #[serde(default = "default_true")]
    pub mole_detection: bool,

    /// Cap on resonance tasks in flight across all quackers.
    #[serde(default = "default_max_inflight_resonances")]
    pub max_inflight_resonances: usize,

    /// Fixed RNG seed; `None` seeds from the OS.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for QuackerConfig {
    fn default() -> Self {
        Self {
            quack_amplitude: default_quack_amplitude(),
            quantum_state: default_quantum_state(),
            mole_detection: true,
            max_inflight_resonances: default_max_inflight_resonances(),
            seed: None,
        }
    }
}

/// Event log configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EventsConfig {
    /// Maximum events retained before the oldest are evicted.
    #[serde(default = "default_event_capacity")]
    pub capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: default_event_capacity(),
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerSettings {
    /// Bind host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerSettings {
    /// Override listener settings with environment variables when set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("QUACKAMOLE_HOST") {
            self.host = val;
        }
        if let Ok(val) = std::env::var("QUACKAMOLE_PORT") {
            match val.parse::<u16>() {
                Ok(port) => self.port = port,
                Err(e) => tracing::warn!(value = %val, error = %e, "ignoring invalid QUACKAMOLE_PORT"),
            }
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_water_physics() -> String {
    "navier-stokes".to_owned()
}

const fn default_duck_capacity() -> u32 {
    1_000_000
}

const fn default_mole_holes() -> u32 {
    42
}

const fn default_physics_interval_ms() -> u64 {
    100
}

const fn default_activity_interval_ms() -> u64 {
    2000
}

fn default_whack_speed() -> String {
    "ludicrous".to_owned()
}

fn default_mole_detection() -> String {
    "quantum-radar".to_owned()
}

fn default_hammer_type() -> String {
    "foam".to_owned()
}

const fn default_quack_amplitude() -> f64 {
    11.0
}

fn default_quantum_state() -> String {
    "superposition".to_owned()
}

const fn default_max_inflight_resonances() -> usize {
    1024
}

const fn default_event_capacity() -> usize {
    10_000
}

fn default_host() -> String {
    "0.0.0.0".to_owned()
}

const fn default_port() -> u16 {
    8080
}

const fn default_true() -> bool {
    true
}
