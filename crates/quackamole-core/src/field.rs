//! The pond: water, temperature, ripples, mole holes and ducks.
//!
//! [`SimulatedField`] owns all pond state behind a single read-write lock.
//! Two periodic processes advance it:
//!
//! - [`tick_physics`](SimulatedField::tick_physics) (every 100 ms by
//!   default) damps and ages ripples, evaporates water and nudges the
//!   temperature.
//! - [`tick_activity`](SimulatedField::tick_activity) (every 2 s by
//!   default) lets moles emerge from inactive holes and retreat from
//!   holes that have been active for more than three seconds.
//!
//! Ticks, [`add_ripple`](SimulatedField::add_ripple) and
//! [`add_duck`](SimulatedField::add_duck) take the write guard. Reads
//! ([`snapshot`](SimulatedField::snapshot), [`active_holes`](SimulatedField::active_holes),
//! [`wave_at`](SimulatedField::wave_at)) take the read guard, so a
//! snapshot never sees a tick half-applied.
//!
//! # Invariants
//!
//! - Water level stays within `[0, INITIAL_WATER_LEVEL]`.
//! - Every surviving ripple ages by exactly one per physics tick.
//! - The number of holes is fixed at construction; only their active
//!   flag and emergence instant change.
//! - Temperature is an unbounded random walk.

use std::time::Duration;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::config::PondConfig;

/// Water level of a freshly filled pond; also the maximum.
pub const INITIAL_WATER_LEVEL: f64 = 100.0;

/// Starting temperature in degrees.
pub const INITIAL_TEMPERATURE: f64 = 20.0;

/// Fraction of amplitude a ripple keeps per physics tick.
pub const RIPPLE_DAMPING: f64 = 0.95;

/// Ripples at or below this amplitude are removed.
pub const RIPPLE_AMPLITUDE_FLOOR: f64 = 0.01;

/// Ripples at or above this age are removed.
pub const RIPPLE_MAX_AGE: u32 = 100;

/// Water lost per physics tick.
pub const EVAPORATION_PER_TICK: f64 = 0.001;

/// Width of the symmetric temperature step per physics tick.
pub const TEMPERATURE_JITTER: f64 = 0.1;

/// A dormant mole emerges when its roll exceeds this value.
pub const MOLE_EMERGE_THRESHOLD: f64 = 0.9;

/// How long an emerged mole stays up before retreating.
pub const MOLE_ACTIVE_DURATION: Duration = Duration::from_secs(3);

/// Amplitude of the ripple left by an emerging mole.
pub const MOLE_RIPPLE_AMPLITUDE: f64 = 1.0;

/// Amplitude of the ripple left by a landing duck.
pub const DUCK_RIPPLE_AMPLITUDE: f64 = 0.5;

/// Side length of the square pond; coordinates lie in `[0, POND_EXTENT)`.
pub const POND_EXTENT: i32 = 100;

/// A decaying disturbance on the water surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ripple {
    /// Origin x coordinate.
    pub x: f64,
    /// Origin y coordinate.
    pub y: f64,
    /// Current amplitude.
    pub amplitude: f64,
    /// Physics ticks survived.
    pub age: u32,
}

impl Ripple {
    /// A fresh ripple of age zero.
    pub const fn new(x: f64, y: f64, amplitude: f64) -> Self {
        Self {
            x,
            y,
            amplitude,
            age: 0,
        }
    }

    /// Whether the ripple is still strong and young enough to keep.
    fn survives(&self) -> bool {
        self.amplitude > RIPPLE_AMPLITUDE_FLOOR && self.age < RIPPLE_MAX_AGE
    }
}

/// A fixed hole a mole can emerge from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoleHole {
    /// Hole x coordinate.
    pub x: i32,
    /// Hole y coordinate.
    pub y: i32,
    /// Whether a mole is currently up.
    pub active: bool,
    /// When the mole last emerged.
    pub last_emerged: Option<Instant>,
}

/// Coordinates of an active mole, as reported by mole detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MolePosition {
    /// Hole x coordinate.
    pub x: i32,
    /// Hole y coordinate.
    pub y: i32,
}

/// Consistent read of the pond taken under one read guard.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldSnapshot {
    /// Current water level.
    pub water_level: f64,
    /// Current temperature.
    pub temperature: f64,
    /// Ducks on the pond.
    pub duck_count: u32,
    /// Holes with a mole up.
    pub active_moles: usize,
    /// Total holes.
    pub total_holes: usize,
    /// Ripples on the surface.
    pub ripple_count: usize,
}

/// What one activity tick changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivityReport {
    /// Moles that emerged.
    pub emerged: usize,
    /// Moles that retreated.
    pub retreated: usize,
}

#[derive(Debug)]
struct FieldState {
    water_level: f64,
    temperature: f64,
    duck_count: u32,
    holes: Vec<MoleHole>,
    ripples: Vec<Ripple>,
    rng: SmallRng,
}

/// The shared pond simulation.
#[derive(Debug)]
pub struct SimulatedField {
    state: RwLock<FieldState>,
    duck_capacity: u32,
}

impl SimulatedField {
    /// Fill the pond and dig `config.mole_holes` holes at random spots.
    pub fn new(config: &PondConfig) -> Self {
        let mut rng = config
            .seed
            .map_or_else(SmallRng::from_os_rng, SmallRng::seed_from_u64);

        let holes = (0..config.mole_holes)
            .map(|_| MoleHole {
                x: rng.random_range(0..POND_EXTENT),
                y: rng.random_range(0..POND_EXTENT),
                active: false,
                last_emerged: None,
            })
            .collect::<Vec<_>>();

        debug!(
            holes = holes.len(),
            duck_capacity = config.duck_capacity,
            "Pond field initialised"
        );

        Self {
            state: RwLock::new(FieldState {
                water_level: INITIAL_WATER_LEVEL,
                temperature: INITIAL_TEMPERATURE,
                duck_count: 0,
                holes,
                ripples: Vec::new(),
                rng,
            }),
            duck_capacity: config.duck_capacity,
        }
    }

    /// Advance water physics by one step.
    pub async fn tick_physics(&self) {
        let mut state = self.state.write().await;

        state.ripples.retain_mut(|ripple| {
            ripple.age = ripple.age.saturating_add(1);
            ripple.amplitude *= RIPPLE_DAMPING;
            ripple.survives()
        });

        state.water_level = (state.water_level - EVAPORATION_PER_TICK).max(0.0);

        let roll: f64 = state.rng.random();
        state.temperature += (roll - 0.5) * TEMPERATURE_JITTER;

        trace!(
            water_level = state.water_level,
            ripples = state.ripples.len(),
            "physics tick"
        );
    }

    /// Advance mole activity by one step, using the current instant.
    pub async fn tick_activity(&self) -> ActivityReport {
        self.tick_activity_at(Instant::now()).await
    }

    /// Advance mole activity by one step as of `now`.
    ///
    /// Dormant holes roll for emergence; emerging moles leave a ripple.
    /// Active holes whose mole has been up longer than
    /// [`MOLE_ACTIVE_DURATION`] go dormant without rolling this tick.
    pub async fn tick_activity_at(&self, now: Instant) -> ActivityReport {
        let mut guard = self.state.write().await;
        let FieldState {
            holes,
            ripples,
            rng,
            ..
        } = &mut *guard;

        let mut report = ActivityReport::default();
        for hole in holes.iter_mut() {
            if hole.active {
                let up_for = hole
                    .last_emerged
                    .map_or(Duration::MAX, |at| now.saturating_duration_since(at));
                if up_for > MOLE_ACTIVE_DURATION {
                    hole.active = false;
                    report.retreated = report.retreated.saturating_add(1);
                }
            } else if rng.random::<f64>() > MOLE_EMERGE_THRESHOLD {
                hole.active = true;
                hole.last_emerged = Some(now);
                ripples.push(Ripple::new(
                    f64::from(hole.x),
                    f64::from(hole.y),
                    MOLE_RIPPLE_AMPLITUDE,
                ));
                report.emerged = report.emerged.saturating_add(1);
            }
        }

        if report.emerged > 0 || report.retreated > 0 {
            debug!(
                emerged = report.emerged,
                retreated = report.retreated,
                "mole activity"
            );
        }
        report
    }

    /// Put a ripple on the surface.
    pub async fn add_ripple(&self, x: f64, y: f64, amplitude: f64) {
        self.state
            .write()
            .await
            .ripples
            .push(Ripple::new(x, y, amplitude));
    }

    /// Land a duck at a random spot if the pond has room.
    ///
    /// Returns `false` (and changes nothing) when the pond is at capacity.
    pub async fn add_duck(&self) -> bool {
        let mut state = self.state.write().await;
        if state.duck_count >= self.duck_capacity {
            return false;
        }
        state.duck_count = state.duck_count.saturating_add(1);
        let x = state.rng.random::<f64>() * f64::from(POND_EXTENT);
        let y = state.rng.random::<f64>() * f64::from(POND_EXTENT);
        state.ripples.push(Ripple::new(x, y, DUCK_RIPPLE_AMPLITUDE));
        true
    }

    /// Read the pond consistently.
    pub async fn snapshot(&self) -> FieldSnapshot {
        let state = self.state.read().await;
        FieldSnapshot {
            water_level: state.water_level,
            temperature: state.temperature,
            duck_count: state.duck_count,
            active_moles: state.holes.iter().filter(|h| h.active).count(),
            total_holes: state.holes.len(),
            ripple_count: state.ripples.len(),
        }
    }

    /// Positions of all holes with a mole up.
    pub async fn active_holes(&self) -> Vec<MolePosition> {
        let state = self.state.read().await;
        state
            .holes
            .iter()
            .filter(|h| h.active)
            .map(|h| MolePosition { x: h.x, y: h.y })
            .collect()
    }

    /// Copy of the current ripples.
    pub async fn ripples(&self) -> Vec<Ripple> {
        self.state.read().await.ripples.clone()
    }

    /// Sample the pond's wave function at `(x, y)`.
    ///
    /// A standing sine pattern scaled by how full the pond is.
    pub async fn wave_at(&self, x: f64, y: f64) -> f64 {
        let water_level = self.state.read().await.water_level;
        (x * 0.1).sin() * (y * 0.1).cos() * water_level / INITIAL_WATER_LEVEL
    }

    /// Maximum number of ducks.
    pub const fn duck_capacity(&self) -> u32 {
        self.duck_capacity
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::float_cmp,
    clippy::cast_precision_loss,
    clippy::arithmetic_side_effects
)]
mod tests {
    use super::*;

    fn pond(holes: u32, seed: u64) -> SimulatedField {
        SimulatedField::new(&PondConfig {
            mole_holes: holes,
            duck_capacity: 2,
            seed: Some(seed),
            ..PondConfig::default()
        })
    }

    #[tokio::test]
    async fn fresh_pond_is_full_and_calm() {
        let field = pond(5, 1);
        let snap = field.snapshot().await;
        assert_eq!(snap.water_level, INITIAL_WATER_LEVEL);
        assert_eq!(snap.temperature, INITIAL_TEMPERATURE);
        assert_eq!(snap.total_holes, 5);
        assert_eq!(snap.active_moles, 0);
        assert_eq!(snap.ripple_count, 0);
        assert!(field.active_holes().await.is_empty());
    }

    #[tokio::test]
    async fn water_level_stays_in_bounds_and_clamps_at_zero() {
        let field = pond(0, 2);
        // 100.0 / 0.001 = 100_000 ticks to drain; run well past that.
        for _ in 0..100_500 {
            field.tick_physics().await;
            let level = field.snapshot().await.water_level;
            assert!((0.0..=INITIAL_WATER_LEVEL).contains(&level));
        }
        assert_eq!(field.snapshot().await.water_level, 0.0);
        for _ in 0..10 {
            field.tick_physics().await;
            assert_eq!(field.snapshot().await.water_level, 0.0);
        }
    }

    #[tokio::test]
    async fn ripple_decays_geometrically_then_disappears() {
        let field = pond(0, 3);
        field.add_ripple(10.0, 20.0, 1.0).await;

        let mut expected = 1.0_f64;
        let mut k = 0_u32;
        loop {
            field.tick_physics().await;
            k += 1;
            expected *= RIPPLE_DAMPING;
            let ripples = field.ripples().await;
            if expected > RIPPLE_AMPLITUDE_FLOOR {
                assert_eq!(ripples.len(), 1, "ripple vanished early at tick {k}");
                assert_eq!(ripples[0].age, k);
                assert!((ripples[0].amplitude - 0.95_f64.powi(i32::try_from(k).unwrap())).abs() < 1e-9);
            } else {
                assert!(ripples.is_empty(), "ripple survived below floor at tick {k}");
                break;
            }
        }
        // 0.95^k <= 0.01 first holds at k = 90.
        assert_eq!(k, 90);
    }

    #[tokio::test]
    async fn strong_ripple_dies_of_old_age() {
        let field = pond(0, 4);
        field.add_ripple(0.0, 0.0, 1.0e9).await;
        for _ in 0..(RIPPLE_MAX_AGE - 1) {
            field.tick_physics().await;
        }
        assert_eq!(field.ripples().await.len(), 1);
        field.tick_physics().await;
        assert!(field.ripples().await.is_empty());
    }

    #[tokio::test]
    async fn temperature_walk_is_small_per_tick() {
        let field = pond(0, 5);
        let mut previous = field.snapshot().await.temperature;
        for _ in 0..1000 {
            field.tick_physics().await;
            let now = field.snapshot().await.temperature;
            assert!((now - previous).abs() <= TEMPERATURE_JITTER / 2.0 + 1e-9);
            previous = now;
        }
    }

    #[tokio::test]
    async fn ducks_respect_capacity() {
        let field = pond(0, 6);
        assert_eq!(field.duck_capacity(), 2);
        assert!(field.add_duck().await);
        assert!(field.add_duck().await);
        assert!(!field.add_duck().await);

        let snap = field.snapshot().await;
        assert_eq!(snap.duck_count, 2);
        // The rejected duck leaves no ripple.
        assert_eq!(snap.ripple_count, 2);
        for ripple in field.ripples().await {
            assert_eq!(ripple.amplitude, DUCK_RIPPLE_AMPLITUDE);
            assert!((0.0..100.0).contains(&ripple.x));
            assert!((0.0..100.0).contains(&ripple.y));
        }
    }

    #[tokio::test]
    async fn emerging_moles_leave_ripples_and_retreat_after_three_seconds() {
        let field = pond(42, 7);
        let start = Instant::now();

        let mut now = start;
        let mut report = ActivityReport::default();
        while report.emerged == 0 {
            now += Duration::from_secs(2);
            report = field.tick_activity_at(now).await;
        }
        let emerged_at = now;
        let snap = field.snapshot().await;
        assert_eq!(snap.active_moles, report.emerged);
        assert_eq!(snap.ripple_count, report.emerged);
        for ripple in field.ripples().await {
            assert_eq!(ripple.amplitude, MOLE_RIPPLE_AMPLITUDE);
        }

        // Exactly three seconds later the mole is still up.
        let still_up = field
            .tick_activity_at(emerged_at + MOLE_ACTIVE_DURATION)
            .await;
        assert_eq!(still_up.retreated, 0);

        let later = field
            .tick_activity_at(emerged_at + MOLE_ACTIVE_DURATION + Duration::from_millis(1))
            .await;
        assert!(later.retreated >= report.emerged);
    }

    #[tokio::test]
    async fn activity_never_changes_hole_count() {
        let field = pond(13, 8);
        let mut now = Instant::now();
        for _ in 0..200 {
            now += Duration::from_secs(2);
            field.tick_activity_at(now).await;
            let snap = field.snapshot().await;
            assert_eq!(snap.total_holes, 13);
            assert!(snap.active_moles <= snap.total_holes);
        }
    }

    #[tokio::test]
    async fn emergence_rate_matches_configured_probability() {
        let field = pond(42, 9);
        let mut now = Instant::now();
        let mut opportunities = 0_usize;
        let mut emerged = 0_usize;
        let mut active_samples = 0_usize;
        let ticks = 2000_usize;

        for _ in 0..ticks {
            let before = field.snapshot().await;
            opportunities += before.total_holes - before.active_moles;
            now += Duration::from_secs(2);
            emerged += field.tick_activity_at(now).await.emerged;
            active_samples += field.snapshot().await.active_moles;
        }

        let emergence_rate = emerged as f64 / opportunities as f64;
        assert!(
            (emergence_rate - (1.0 - MOLE_EMERGE_THRESHOLD)).abs() < 0.01,
            "emergence rate {emergence_rate}"
        );

        // A mole stays up for two 2-second ticks, then waits ~10 ticks.
        let active_fraction = active_samples as f64 / (ticks * 42) as f64;
        assert!(
            (0.13..0.21).contains(&active_fraction),
            "active fraction {active_fraction}"
        );
    }

    #[tokio::test]
    async fn wave_function_scales_with_water_level() {
        let field = pond(0, 10);
        let full = field.wave_at(15.0, 0.0).await;
        assert!((full - 1.5_f64.sin()).abs() < 1e-12);
        assert!(field.wave_at(0.0, 0.0).await.abs() < 1e-12);
    }

    #[tokio::test]
    async fn concurrent_writers_and_readers_see_consistent_state() {
        let field = std::sync::Arc::new(pond(42, 11));
        let mut tasks = Vec::new();
        for i in 0..8 {
            let field = std::sync::Arc::clone(&field);
            tasks.push(tokio::spawn(async move {
                for j in 0..200 {
                    match (i + j) % 3 {
                        0 => field.tick_physics().await,
                        1 => {
                            field.tick_activity().await;
                        }
                        _ => field.add_ripple(1.0, 1.0, 0.5).await,
                    }
                    let snap = field.snapshot().await;
                    assert!(snap.active_moles <= snap.total_holes);
                    assert!((0.0..=INITIAL_WATER_LEVEL).contains(&snap.water_level));
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
    }
}
