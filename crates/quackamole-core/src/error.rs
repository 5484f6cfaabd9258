//! Error types for the `quackamole-core` crate.
//!
//! Stochastic misses and escapes are ordinary outcome values, never
//! errors. [`CoreError`] only covers contract violations by the caller
//! and configuration a supervisor cannot run with.

use crate::entanglement::EmitterId;

/// Errors that can occur in the simulation core.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The emitter id is not registered in the entanglement graph.
    #[error("unknown emitter: {0}")]
    UnknownEmitter(EmitterId),

    /// The primary quacker backs the quack endpoint and cannot be removed.
    #[error("emitter {0} is the primary quacker")]
    PrimaryEmitter(EmitterId),

    /// The configuration cannot drive a running simulation.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}
