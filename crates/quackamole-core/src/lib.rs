//! Concurrent simulation core for Quack-a-Mole.
//!
//! A shared pond is advanced by two periodic tasks while request handlers
//! resolve whacks, add ducks and fire quantum quacks against it
//! concurrently. Everything is owned by a [`SimulationSupervisor`]; there
//! are no process-wide globals.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `quackamole-config.yaml`.
//! - [`entanglement`] -- Quantum quackers, their entanglements and the
//!   bounded fire-and-forget resonance fan-out.
//! - [`error`] -- [`CoreError`].
//! - [`events`] -- Bounded append-only quack and whack log.
//! - [`field`] -- The pond: water, temperature, ripples, ducks, mole holes.
//! - [`resolver`] -- Whack resolution, style points and messages.
//! - [`stats`] -- Lock-free whack counters.
//! - [`supervisor`] -- Lifecycle of the periodic tasks and the facade the
//!   HTTP layer talks to.

pub mod config;
pub mod entanglement;
pub mod error;
pub mod events;
pub mod field;
pub mod resolver;
pub mod stats;
pub mod supervisor;

pub use config::{ConfigError, QuackConfig};
pub use entanglement::{EmissionReport, EmitterId, EmitterInfo, EntanglementGraph};
pub use error::CoreError;
pub use events::{EventLog, SimEvent};
pub use field::SimulatedField;
pub use resolver::{Force, InteractionResolver, WhackOutcome, WhackRequest, WhackStats};
pub use supervisor::{MoleDetection, PondStatus, SimulationSupervisor};
