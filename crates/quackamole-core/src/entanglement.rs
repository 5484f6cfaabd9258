//! Quantum quackers and the entanglement registry.
//!
//! Quackers (emitters) live in a registry keyed by [`EmitterId`]. An
//! entanglement is a symmetric edge stored as the peer id in both nodes'
//! peer sets; peers are only ever referenced by id, so removing a quacker
//! scrubs it from its peers and can never leave a dangling owner.
//!
//! [`emit`](EntanglementGraph::emit) snapshots the emitter's peers under
//! the read guard, releases it, then fires one detached resonance task
//! per live peer. Resonances sleep for a short random delay and finish
//! with no result; the caller never waits for them. In-flight resonances
//! are capped by a semaphore. When it is exhausted the resonance is
//! skipped and counted as dropped rather than spawned.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock, Semaphore};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::config::QuackerConfig;
use crate::error::CoreError;
use crate::events::{Dimension, EventLog, QuackEvent, SimEvent};

/// Lower bound of the interference multiplier.
pub const INTERFERENCE_BASE: f64 = 0.73529;

/// Width of the interference multiplier range.
pub const INTERFERENCE_SPREAD: f64 = 0.26471;

/// Quack radar reports a mole when its roll exceeds this.
pub const MOLE_RADAR_THRESHOLD: f64 = 0.7;

/// A quack fails when its roll is at or below this.
pub const QUACK_FAILURE_THRESHOLD: f64 = 0.1;

/// Upper bound (exclusive) of a resonance delay in milliseconds.
pub const MAX_RESONANCE_DELAY_MS: u64 = 100;

/// Frequency of every quacker; a standard A.
pub const QUACK_FREQUENCY_HZ: f64 = 440.0;

/// Stable identity of a quacker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmitterId(Uuid);

impl EmitterId {
    /// A fresh, time-ordered id.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// The underlying UUID.
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for EmitterId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for EmitterId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for EmitterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Quantum state of a quacker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantumState {
    /// Entangled with at least one peer.
    Entangled,
    /// Unobserved; the state every quacker starts in.
    Superposition,
}

#[derive(Debug)]
struct Emitter {
    amplitude: f64,
    state: QuantumState,
    peers: BTreeSet<EmitterId>,
}

/// Public view of a registered quacker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmitterInfo {
    /// Quacker id.
    pub id: EmitterId,
    /// Base amplitude.
    pub amplitude: f64,
    /// Quack frequency in hertz.
    pub frequency: f64,
    /// Current quantum state.
    pub state: QuantumState,
    /// Entangled peers.
    pub peers: Vec<EmitterId>,
}

/// What an emission did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmissionReport {
    /// The quack appended to the event log.
    pub event: QuackEvent,
    /// Interference multiplier applied to the resonances.
    pub interference: f64,
    /// Resonances started, one per live peer.
    pub peers_signalled: usize,
    /// Resonances skipped because the in-flight cap was reached.
    pub resonances_dropped: usize,
}

/// Registry of quackers and their entanglements.
#[derive(Debug)]
pub struct EntanglementGraph {
    nodes: RwLock<BTreeMap<EmitterId, Emitter>>,
    rng: Mutex<SmallRng>,
    default_amplitude: f64,
    events: Arc<EventLog>,
    resonance_slots: Arc<Semaphore>,
    resonances_completed: Arc<AtomicU64>,
    resonances_dropped: AtomicU64,
}

impl EntanglementGraph {
    /// Create an empty registry appending quacks to `events`.
    pub fn new(config: &QuackerConfig, events: Arc<EventLog>) -> Self {
        let rng = config
            .seed
            .map_or_else(SmallRng::from_os_rng, SmallRng::seed_from_u64);
        Self {
            nodes: RwLock::new(BTreeMap::new()),
            rng: Mutex::new(rng),
            default_amplitude: config.quack_amplitude,
            events,
            resonance_slots: Arc::new(Semaphore::new(
                config
                    .max_inflight_resonances
                    .clamp(1, Semaphore::MAX_PERMITS),
            )),
            resonances_completed: Arc::new(AtomicU64::new(0)),
            resonances_dropped: AtomicU64::new(0),
        }
    }

    /// Register a new quacker with the configured amplitude.
    pub async fn register(&self) -> EmitterId {
        let id = EmitterId::new();
        self.nodes.write().await.insert(
            id,
            Emitter {
                amplitude: self.default_amplitude,
                state: QuantumState::Superposition,
                peers: BTreeSet::new(),
            },
        );
        debug!(emitter = %id, "quacker registered");
        id
    }

    /// Remove a quacker and every edge pointing at it.
    ///
    /// Returns `false` if the id was not registered.
    pub async fn remove(&self, id: EmitterId) -> bool {
        let mut nodes = self.nodes.write().await;
        let Some(removed) = nodes.remove(&id) else {
            return false;
        };
        for peer in &removed.peers {
            if let Some(node) = nodes.get_mut(peer) {
                node.peers.remove(&id);
                if node.peers.is_empty() {
                    node.state = QuantumState::Superposition;
                }
            }
        }
        debug!(emitter = %id, peers = removed.peers.len(), "quacker removed");
        true
    }

    /// Entangle two quackers.
    ///
    /// Symmetric and idempotent: returns `Ok(true)` if a new edge was
    /// created, `Ok(false)` if it already existed or `a == b`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownEmitter`] if either id is not registered.
    pub async fn entangle(&self, a: EmitterId, b: EmitterId) -> Result<bool, CoreError> {
        let mut nodes = self.nodes.write().await;
        for id in [a, b] {
            if !nodes.contains_key(&id) {
                return Err(CoreError::UnknownEmitter(id));
            }
        }
        if a == b {
            return Ok(false);
        }

        let mut created = false;
        for (from, to) in [(a, b), (b, a)] {
            if let Some(node) = nodes.get_mut(&from) {
                created |= node.peers.insert(to);
                node.state = QuantumState::Entangled;
            }
        }
        if created {
            debug!(a = %a, b = %b, "quackers entangled");
        }
        Ok(created)
    }

    /// Current peers of a quacker.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownEmitter`] if the id is not registered.
    pub async fn peers(&self, id: EmitterId) -> Result<Vec<EmitterId>, CoreError> {
        let nodes = self.nodes.read().await;
        nodes
            .get(&id)
            .map(|node| node.peers.iter().copied().collect())
            .ok_or(CoreError::UnknownEmitter(id))
    }

    /// Describe every registered quacker.
    pub async fn emitters(&self) -> Vec<EmitterInfo> {
        let nodes = self.nodes.read().await;
        nodes
            .iter()
            .map(|(id, node)| EmitterInfo {
                id: *id,
                amplitude: node.amplitude,
                frequency: QUACK_FREQUENCY_HZ,
                state: node.state,
                peers: node.peers.iter().copied().collect(),
            })
            .collect()
    }

    /// Emit a quack from `id` at `intensity`.
    ///
    /// Fires one resonance per live peer carrying
    /// `intensity * interference`, appends a [`QuackEvent`], and returns
    /// without waiting for the resonances.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownEmitter`] if the id is not registered.
    pub async fn emit(&self, id: EmitterId, intensity: f64) -> Result<EmissionReport, CoreError> {
        let peers: Vec<EmitterId> = {
            let nodes = self.nodes.read().await;
            let node = nodes.get(&id).ok_or(CoreError::UnknownEmitter(id))?;
            node.peers
                .iter()
                .copied()
                .filter(|peer| nodes.contains_key(peer))
                .collect()
        };

        let (interference, delays, event) = {
            let mut rng = self.rng.lock().await;
            let interference = INTERFERENCE_BASE + rng.random::<f64>() * INTERFERENCE_SPREAD;
            let delays: Vec<u64> = peers
                .iter()
                .map(|_| rng.random_range(0..MAX_RESONANCE_DELAY_MS))
                .collect();
            let event = QuackEvent {
                timestamp: Utc::now(),
                amplitude: intensity,
                dimension: Dimension::random(&mut *rng),
                mole_nearby: rng.random::<f64>() > MOLE_RADAR_THRESHOLD,
                success: rng.random::<f64>() > QUACK_FAILURE_THRESHOLD,
            };
            (interference, delays, event)
        };

        let amplitude = intensity * interference;
        let mut dropped = 0_usize;
        for (peer, delay_ms) in peers.iter().copied().zip(delays) {
            let Ok(permit) = Arc::clone(&self.resonance_slots).try_acquire_owned() else {
                dropped = dropped.saturating_add(1);
                continue;
            };
            let completed = Arc::clone(&self.resonances_completed);
            tokio::spawn(async move {
                let _permit = permit;
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                trace!(peer = %peer, amplitude, "quack resonated");
                completed.fetch_add(1, Ordering::Relaxed);
            });
        }

        if dropped > 0 {
            self.resonances_dropped
                .fetch_add(u64::try_from(dropped).unwrap_or(u64::MAX), Ordering::Relaxed);
            warn!(emitter = %id, dropped, "resonance cap reached, resonances skipped");
        }

        self.events.append(SimEvent::Quack(event.clone())).await;

        let peers_signalled = peers.len().saturating_sub(dropped);
        debug!(
            emitter = %id,
            intensity,
            interference,
            peers = peers_signalled,
            dimension = ?event.dimension,
            "quack emitted"
        );

        Ok(EmissionReport {
            event,
            interference,
            peers_signalled,
            resonances_dropped: dropped,
        })
    }

    /// Resonances that have run to completion.
    pub fn resonances_completed(&self) -> u64 {
        self.resonances_completed.load(Ordering::Relaxed)
    }

    /// Resonances skipped because the in-flight cap was reached.
    pub fn resonances_dropped(&self) -> u64 {
        self.resonances_dropped.load(Ordering::Relaxed)
    }

    /// Resonance slots currently free.
    pub fn available_resonance_slots(&self) -> usize {
        self.resonance_slots.available_permits()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::cast_precision_loss)]
mod tests {
    use super::*;

    fn graph_with(max_inflight: usize, seed: u64) -> (EntanglementGraph, Arc<EventLog>) {
        let events = Arc::new(EventLog::new(10_000));
        let graph = EntanglementGraph::new(
            &QuackerConfig {
                max_inflight_resonances: max_inflight,
                seed: Some(seed),
                ..QuackerConfig::default()
            },
            Arc::clone(&events),
        );
        (graph, events)
    }

    #[tokio::test]
    async fn entangle_is_symmetric_and_idempotent() {
        let (graph, _) = graph_with(16, 1);
        let a = graph.register().await;
        let b = graph.register().await;

        assert!(graph.entangle(a, b).await.unwrap());
        assert!(!graph.entangle(a, b).await.unwrap());
        assert!(!graph.entangle(b, a).await.unwrap());

        assert_eq!(graph.peers(a).await.unwrap(), vec![b]);
        assert_eq!(graph.peers(b).await.unwrap(), vec![a]);
    }

    #[tokio::test]
    async fn self_entanglement_is_a_no_op() {
        let (graph, _) = graph_with(16, 2);
        let a = graph.register().await;
        assert!(!graph.entangle(a, a).await.unwrap());
        assert!(graph.peers(a).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_emitters_are_rejected() {
        let (graph, _) = graph_with(16, 3);
        let a = graph.register().await;
        let ghost = EmitterId::new();
        assert!(matches!(
            graph.entangle(a, ghost).await,
            Err(CoreError::UnknownEmitter(id)) if id == ghost
        ));
        assert!(graph.emit(ghost, 1.0).await.is_err());
        assert!(graph.peers(ghost).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn emit_signals_each_distinct_peer_once() {
        let (graph, events) = graph_with(16, 4);
        let a = graph.register().await;
        let peers = [graph.register().await, graph.register().await, graph.register().await];
        for peer in peers {
            graph.entangle(a, peer).await.unwrap();
            graph.entangle(peer, a).await.unwrap();
        }

        let report = graph.emit(a, 10.0).await.unwrap();
        assert_eq!(report.peers_signalled, 3);
        assert_eq!(report.resonances_dropped, 0);
        assert!((INTERFERENCE_BASE..=INTERFERENCE_BASE + INTERFERENCE_SPREAD)
            .contains(&report.interference));
        assert!((report.event.amplitude - 10.0).abs() < f64::EPSILON);
        assert_eq!(events.len().await, 1);

        // Resonances run detached and finish within the delay bound.
        tokio::time::sleep(Duration::from_millis(MAX_RESONANCE_DELAY_MS + 1)).await;
        assert_eq!(graph.resonances_completed(), 3);
        assert_eq!(graph.available_resonance_slots(), 16);
    }

    #[tokio::test(start_paused = true)]
    async fn emit_without_peers_still_records_quack() {
        let (graph, events) = graph_with(16, 5);
        let a = graph.register().await;
        let report = graph.emit(a, 9000.01).await.unwrap();
        assert_eq!(report.peers_signalled, 0);
        let recent = events.recent(1).await;
        assert!(matches!(&recent[..], [SimEvent::Quack(q)] if q == &report.event));
    }

    #[tokio::test]
    async fn removing_a_quacker_scrubs_its_edges() {
        let (graph, _) = graph_with(16, 6);
        let a = graph.register().await;
        let b = graph.register().await;
        let c = graph.register().await;
        graph.entangle(a, b).await.unwrap();
        graph.entangle(a, c).await.unwrap();
        assert!(
            graph
                .emitters()
                .await
                .iter()
                .all(|e| e.state == QuantumState::Entangled)
        );

        assert!(graph.remove(b).await);
        assert!(!graph.remove(b).await);
        assert_eq!(graph.peers(a).await.unwrap(), vec![c]);

        let report = graph.emit(a, 1.0).await.unwrap();
        assert_eq!(report.peers_signalled, 1);

        assert!(graph.remove(c).await);
        let info = graph.emitters().await;
        assert_eq!(info.len(), 1);
        assert_eq!(info[0].state, QuantumState::Superposition);
        assert!((info[0].frequency - QUACK_FREQUENCY_HZ).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn saturated_cap_drops_resonances() {
        let (graph, _) = graph_with(2, 7);
        let a = graph.register().await;
        for _ in 0..5 {
            let peer = graph.register().await;
            graph.entangle(a, peer).await.unwrap();
        }

        let report = graph.emit(a, 1.0).await.unwrap();
        assert_eq!(report.peers_signalled, 2);
        assert_eq!(report.resonances_dropped, 3);
        assert_eq!(graph.resonances_dropped(), 3);

        tokio::time::sleep(Duration::from_millis(MAX_RESONANCE_DELAY_MS + 1)).await;
        assert_eq!(graph.resonances_completed(), 2);
        assert_eq!(graph.available_resonance_slots(), 2);
    }

    #[tokio::test]
    async fn quack_flags_follow_configured_odds() {
        let (graph, events) = graph_with(16, 8);
        let a = graph.register().await;
        let n = 4000;
        for _ in 0..n {
            graph.emit(a, 1.0).await.unwrap();
        }
        let quacks: Vec<QuackEvent> = events
            .recent(n)
            .await
            .into_iter()
            .filter_map(|e| match e {
                SimEvent::Quack(q) => Some(q),
                SimEvent::Whack(_) => None,
            })
            .collect();
        assert_eq!(quacks.len(), n);

        let nearby = quacks.iter().filter(|q| q.mole_nearby).count() as f64 / n as f64;
        let landed = quacks.iter().filter(|q| q.success).count() as f64 / n as f64;
        assert!((nearby - 0.3).abs() < 0.03, "mole radar rate {nearby}");
        assert!((landed - 0.9).abs() < 0.03, "quack success rate {landed}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_entangle_and_emit_do_not_race() {
        let (graph, _) = graph_with(4096, 9);
        let graph = Arc::new(graph);
        let hub = graph.register().await;

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let graph = Arc::clone(&graph);
            tasks.push(tokio::spawn(async move {
                for _ in 0..10 {
                    let peer = graph.register().await;
                    graph.entangle(hub, peer).await.unwrap();
                    graph.emit(hub, 1.0).await.unwrap();
                }
            }));
        }
        for result in futures::future::join_all(tasks).await {
            result.unwrap();
        }
        assert_eq!(graph.peers(hub).await.unwrap().len(), 160);
    }
}
