//! HTTP API for the Quack-a-Mole simulation.
//!
//! This crate exposes a running
//! [`SimulationSupervisor`](quackamole_core::SimulationSupervisor) over
//! Axum:
//!
//! - **Pond** endpoints for status, ducks and the wave function
//! - **Mole** endpoints for whacking, detection and statistics
//! - **Quack** endpoints for the primary quacker and the quacker registry
//! - **Events** for the recent quack and whack log
//!
//! Handlers never hold simulation locks themselves; every call goes
//! through the supervisor, so a slow client cannot stall the pond's
//! periodic tasks.

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod startup;
pub mod state;

pub use router::build_router;
pub use server::{ServerConfig, ServerError};
pub use startup::spawn_observer;
pub use state::AppState;
