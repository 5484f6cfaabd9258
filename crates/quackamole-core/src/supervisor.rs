//! Lifecycle owner for the running simulation.
//!
//! [`SimulationSupervisor::start`] builds every subsystem from a
//! [`QuackConfig`] and spawns the two periodic tasks that drive the pond:
//!
//! - **Physics**: ripple decay, evaporation and temperature drift, every
//!   `pond.physics_interval_ms` (100 ms by default).
//! - **Activity**: mole emergence and retreat, every
//!   `pond.activity_interval_ms` (2 s by default).
//!
//! Request handlers talk to the supervisor only; they never touch the
//! subsystems' locks directly. [`shutdown`](SimulationSupervisor::shutdown)
//! stops both tasks through a watch channel and waits for them. Dropping
//! the supervisor without shutting down aborts the tasks instead.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use crate::config::QuackConfig;
use crate::entanglement::{EmissionReport, EmitterId, EmitterInfo, EntanglementGraph};
use crate::error::CoreError;
use crate::events::{EventLog, SimEvent};
use crate::field::{FieldSnapshot, MolePosition, SimulatedField};
use crate::resolver::{InteractionResolver, WhackOutcome, WhackRequest, WhackStats};

/// Water below this raises a critical warning.
pub const LOW_WATER_THRESHOLD: f64 = 20.0;

/// Temperature above this raises an overheating warning.
pub const OVERHEAT_THRESHOLD: f64 = 30.0;

/// More active moles than this raises an invasion alert.
pub const MOLE_INVASION_THRESHOLD: usize = 10;

/// Pond status as reported to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PondStatus {
    /// Field readings, taken under a single read guard.
    #[serde(flatten)]
    pub field: FieldSnapshot,
    /// Configured water physics model.
    pub physics_mode: String,
    /// Warnings derived from the readings.
    pub warnings: Vec<String>,
}

impl PondStatus {
    /// Derive the warnings for a snapshot.
    pub fn warnings_for(snapshot: &FieldSnapshot) -> Vec<String> {
        let mut warnings = Vec::new();
        if snapshot.water_level < LOW_WATER_THRESHOLD {
            warnings.push("CRITICAL: Water level dangerously low!".to_owned());
        }
        if snapshot.temperature > OVERHEAT_THRESHOLD {
            warnings.push("WARNING: Ducks are overheating!".to_owned());
        }
        if snapshot.active_moles > MOLE_INVASION_THRESHOLD {
            warnings.push("ALERT: Mole invasion detected!".to_owned());
        }
        warnings
    }
}

/// Result of a mole detection sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoleDetection {
    /// Holes with a mole up.
    pub detected_moles: Vec<MolePosition>,
    /// Number of detected moles.
    pub count: usize,
    /// Configured detection method.
    pub detection_method: String,
}

/// Owns the subsystems and the periodic tasks of one simulation.
#[derive(Debug)]
pub struct SimulationSupervisor {
    field: Arc<SimulatedField>,
    resolver: InteractionResolver,
    graph: EntanglementGraph,
    events: Arc<EventLog>,
    primary: EmitterId,
    physics_mode: String,
    mole_detection: String,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SimulationSupervisor {
    /// Build the simulation and start its periodic tasks.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] if the configuration fails
    /// [`QuackConfig::validate`].
    pub async fn start(config: QuackConfig) -> Result<Self, CoreError> {
        config.validate()?;

        let events = Arc::new(EventLog::new(config.events.capacity));
        let field = Arc::new(SimulatedField::new(&config.pond));
        let resolver = InteractionResolver::new(&config.whacker, Arc::clone(&events));
        let graph = EntanglementGraph::new(&config.quacker, Arc::clone(&events));
        let primary = graph.register().await;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let physics = tokio::spawn(run_physics(
            Arc::clone(&field),
            Duration::from_millis(config.pond.physics_interval_ms),
            shutdown_rx.clone(),
        ));
        let activity = tokio::spawn(run_activity(
            Arc::clone(&field),
            Duration::from_millis(config.pond.activity_interval_ms),
            shutdown_rx,
        ));

        info!(
            physics_mode = %config.pond.water_physics,
            mole_holes = config.pond.mole_holes,
            duck_capacity = config.pond.duck_capacity,
            hammer_type = %config.whacker.hammer_type,
            whack_speed = %config.whacker.whack_speed,
            primary_quacker = %primary,
            "Simulation started"
        );

        Ok(Self {
            field,
            resolver,
            graph,
            events,
            primary,
            physics_mode: config.pond.water_physics,
            mole_detection: config.whacker.mole_detection,
            shutdown_tx,
            tasks: Mutex::new(vec![physics, activity]),
        })
    }

    /// Current pond status with derived warnings.
    pub async fn status(&self) -> PondStatus {
        let field = self.field.snapshot().await;
        PondStatus {
            warnings: PondStatus::warnings_for(&field),
            field,
            physics_mode: self.physics_mode.clone(),
        }
    }

    /// Whack statistics.
    pub fn stats(&self) -> WhackStats {
        self.resolver.stats()
    }

    /// Resolve a whack.
    pub async fn interact(&self, request: &WhackRequest) -> WhackOutcome {
        self.resolver.resolve(request).await
    }

    /// Put a duck on the pond. Returns `false` at capacity.
    pub async fn add_duck(&self) -> bool {
        self.field.add_duck().await
    }

    /// Quack from the primary quacker.
    ///
    /// # Errors
    ///
    /// Never fails while the supervisor is alive; the primary quacker
    /// cannot be removed.
    pub async fn emit(&self, intensity: f64) -> Result<EmissionReport, CoreError> {
        self.graph.emit(self.primary, intensity).await
    }

    /// Quack from a specific quacker.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownEmitter`] if `id` is not registered.
    pub async fn emit_from(
        &self,
        id: EmitterId,
        intensity: f64,
    ) -> Result<EmissionReport, CoreError> {
        self.graph.emit(id, intensity).await
    }

    /// Report the holes that currently have a mole up.
    pub async fn detect_moles(&self) -> MoleDetection {
        let detected_moles = self.field.active_holes().await;
        MoleDetection {
            count: detected_moles.len(),
            detected_moles,
            detection_method: self.mole_detection.clone(),
        }
    }

    /// Sample the wave function at `(x, y)`.
    pub async fn wave_at(&self, x: f64, y: f64) -> f64 {
        self.field.wave_at(x, y).await
    }

    /// Up to `limit` events, most recent first.
    pub async fn recent_events(&self, limit: usize) -> Vec<SimEvent> {
        self.events.recent(limit).await
    }

    /// Id of the quacker behind [`emit`](Self::emit).
    pub const fn primary_emitter(&self) -> EmitterId {
        self.primary
    }

    /// Register a new quacker.
    pub async fn register_emitter(&self) -> EmitterId {
        self.graph.register().await
    }

    /// Entangle two quackers. Returns `true` if a new edge was created.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownEmitter`] if either id is not registered.
    pub async fn entangle(&self, a: EmitterId, b: EmitterId) -> Result<bool, CoreError> {
        self.graph.entangle(a, b).await
    }

    /// Remove a quacker and its entanglements.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::PrimaryEmitter`] for the primary quacker and
    /// [`CoreError::UnknownEmitter`] if `id` is not registered.
    pub async fn remove_emitter(&self, id: EmitterId) -> Result<(), CoreError> {
        if id == self.primary {
            return Err(CoreError::PrimaryEmitter(id));
        }
        if self.graph.remove(id).await {
            Ok(())
        } else {
            Err(CoreError::UnknownEmitter(id))
        }
    }

    /// Describe every registered quacker.
    pub async fn emitters(&self) -> Vec<EmitterInfo> {
        self.graph.emitters().await
    }

    /// Resonances completed and dropped so far.
    pub fn resonance_counts(&self) -> (u64, u64) {
        (
            self.graph.resonances_completed(),
            self.graph.resonances_dropped(),
        )
    }

    /// Number of periodic tasks still running.
    pub async fn running_tasks(&self) -> usize {
        self.tasks
            .lock()
            .await
            .iter()
            .filter(|task| !task.is_finished())
            .count()
    }

    /// Stop the periodic tasks and wait for them to exit.
    ///
    /// Calling this more than once is harmless.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        let stopped = tasks.len();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "periodic task ended abnormally");
            }
        }
        let (completed, dropped) = self.resonance_counts();
        info!(
            tasks = stopped,
            events = self.events.total_appended(),
            resonances_completed = completed,
            resonances_dropped = dropped,
            "Simulation stopped"
        );
    }
}

impl Drop for SimulationSupervisor {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

/// An interval whose first tick lands one full period from now.
async fn ticker(period: Duration) -> tokio::time::Interval {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;
    ticker
}

async fn run_physics(
    field: Arc<SimulatedField>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = ticker(period).await;
    loop {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                field.tick_physics().await;
                trace!("physics tick");
            }
        }
    }
    debug!("physics task stopped");
}

async fn run_activity(
    field: Arc<SimulatedField>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = ticker(period).await;
    loop {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let report = field.tick_activity().await;
                if report.emerged > 0 || report.retreated > 0 {
                    debug!(
                        emerged = report.emerged,
                        retreated = report.retreated,
                        "mole activity"
                    );
                }
            }
        }
    }
    debug!("activity task stopped");
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::config::{PondConfig, QuackerConfig, WhackerConfig};
    use crate::field::INITIAL_WATER_LEVEL;
    use crate::resolver::Force;

    fn seeded_config() -> QuackConfig {
        QuackConfig {
            pond: PondConfig {
                seed: Some(11),
                ..PondConfig::default()
            },
            whacker: WhackerConfig {
                seed: Some(12),
                ..WhackerConfig::default()
            },
            quacker: QuackerConfig {
                seed: Some(13),
                ..QuackerConfig::default()
            },
            ..QuackConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn start_spawns_both_periodic_tasks() {
        let supervisor = SimulationSupervisor::start(seeded_config()).await.unwrap();
        assert_eq!(supervisor.running_tasks().await, 2);

        let status = supervisor.status().await;
        assert_eq!(status.field.water_level, INITIAL_WATER_LEVEL);
        assert_eq!(status.field.total_holes, 42);
        assert_eq!(status.physics_mode, "navier-stokes");
        assert!(status.warnings.is_empty());

        supervisor.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn physics_task_evaporates_water() {
        let supervisor = SimulationSupervisor::start(seeded_config()).await.unwrap();

        // Ten physics periods of 100ms.
        tokio::time::sleep(Duration::from_millis(1050)).await;
        let water = supervisor.status().await.field.water_level;
        assert!((water - (INITIAL_WATER_LEVEL - 0.01)).abs() < 1e-9, "water {water}");

        supervisor.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_the_ticks() {
        let supervisor = SimulationSupervisor::start(seeded_config()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        supervisor.shutdown().await;
        assert_eq!(supervisor.running_tasks().await, 0);

        let before = supervisor.status().await.field.water_level;
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(supervisor.status().await.field.water_level, before);

        // A second shutdown is a no-op.
        supervisor.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_survives_an_aborted_task() {
        let supervisor = SimulationSupervisor::start(seeded_config()).await.unwrap();
        let stuck = tokio::spawn(std::future::pending::<()>());
        stuck.abort();
        supervisor.tasks.lock().await.insert(0, stuck);

        supervisor.shutdown().await;
        assert_eq!(supervisor.running_tasks().await, 0);
        assert!(supervisor.tasks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let mut config = seeded_config();
        config.pond.physics_interval_ms = 0;
        assert!(matches!(
            SimulationSupervisor::start(config).await,
            Err(CoreError::InvalidConfig { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn interactions_feed_stats_and_events() {
        let supervisor = SimulationSupervisor::start(seeded_config()).await.unwrap();
        for _ in 0..5 {
            let _ = supervisor
                .interact(&WhackRequest {
                    x: 10,
                    y: 20,
                    force: Force::Gentle,
                })
                .await;
        }
        supervisor.emit(9000.01).await.unwrap();

        let stats = supervisor.stats();
        assert_eq!(stats.total_whacks, 5);
        assert_eq!(stats.hammer_type, "foam");
        assert_eq!(supervisor.recent_events(100).await.len(), 6);
        assert!(matches!(
            supervisor.recent_events(1).await.first(),
            Some(SimEvent::Quack(_))
        ));

        supervisor.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn primary_quacker_cannot_be_removed() {
        let supervisor = SimulationSupervisor::start(seeded_config()).await.unwrap();
        let primary = supervisor.primary_emitter();
        let other = supervisor.register_emitter().await;
        assert!(supervisor.entangle(primary, other).await.unwrap());

        let report = supervisor.emit(1.0).await.unwrap();
        assert_eq!(report.peers_signalled, 1);

        assert!(matches!(
            supervisor.remove_emitter(primary).await,
            Err(CoreError::PrimaryEmitter(id)) if id == primary
        ));
        supervisor.remove_emitter(other).await.unwrap();
        assert!(matches!(
            supervisor.remove_emitter(other).await,
            Err(CoreError::UnknownEmitter(_))
        ));
        assert_eq!(supervisor.emitters().await.len(), 1);

        supervisor.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn detection_matches_status() {
        let supervisor = SimulationSupervisor::start(seeded_config()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(7)).await;

        let detection = supervisor.detect_moles().await;
        let status = supervisor.status().await;
        assert_eq!(detection.count, detection.detected_moles.len());
        assert_eq!(detection.count, status.field.active_moles);
        assert_eq!(detection.detection_method, "quantum-radar");

        supervisor.shutdown().await;
    }

    #[test]
    fn warnings_follow_thresholds() {
        let calm = FieldSnapshot {
            water_level: 20.0,
            temperature: 30.0,
            duck_count: 0,
            active_moles: 10,
            total_holes: 42,
            ripple_count: 0,
        };
        assert!(PondStatus::warnings_for(&calm).is_empty());

        let dire = FieldSnapshot {
            water_level: 19.9,
            temperature: 30.1,
            active_moles: 11,
            ..calm
        };
        assert_eq!(
            PondStatus::warnings_for(&dire),
            vec![
                "CRITICAL: Water level dangerously low!",
                "WARNING: Ducks are overheating!",
                "ALERT: Mole invasion detected!",
            ]
        );
    }
}
