//! Whack resolution: turns a swing at the pond into hit, miss or escape.
//!
//! Each whack draws its rolls in a fixed order:
//!
//! 1. **Presence**: at or below [`PRESENCE_THRESHOLD`] there is no mole.
//!    Miss, [`MISS_PENALTY`] points, no escape.
//! 2. **Escape**: above [`ESCAPE_THRESHOLD`] the mole quantum tunnels
//!    away. Miss, zero points, escaped.
//! 3. **Hit**: below [`success_chance`] for the hammer and force. On a
//!    hit, [`style_points`] are added to any force bonus.
//!
//! The instant of the previous whack drives the combo bonus. It is read
//! and replaced under the same mutex that guards the RNG, so two
//! simultaneous whacks cannot both claim a combo against the same stale
//! instant.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::rngs::SmallRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::config::WhackerConfig;
use crate::events::{EventLog, SimEvent, WhackEvent};
use crate::stats::{Counters, StatsCounter};

/// A mole is present when the presence roll exceeds this.
pub const PRESENCE_THRESHOLD: f64 = 0.3;

/// The mole escapes when the escape roll exceeds this.
pub const ESCAPE_THRESHOLD: f64 = 0.95;

/// Hit chance with a regular hammer.
pub const BASE_SUCCESS_CHANCE: f64 = 0.7;

/// Hit chance with a foam hammer.
pub const FOAM_SUCCESS_CHANCE: f64 = 0.6;

/// Multiplier applied to the hit chance for gentle swings.
pub const GENTLE_FACTOR: f64 = 0.8;

/// Hit chance for maximum-force swings, whatever the hammer.
pub const MAXIMUM_SUCCESS_CHANCE: f64 = 0.95;

/// Points for swinging at maximum force, hit or not.
pub const MAXIMUM_FORCE_BONUS: i32 = 20;

/// Points for whacking an empty hole.
pub const MISS_PENALTY: i32 = -10;

/// Base style points for a hit.
pub const BASE_STYLE_POINTS: i32 = 10;

/// Whacks closer together than this earn the combo bonus.
pub const COMBO_WINDOW: Duration = Duration::from_millis(500);

/// Combo bonus.
pub const COMBO_BONUS: i32 = 30;

/// The exact centre of the pond, on both axes.
pub const CENTER: i32 = 50;

/// Bonus for a hit dead centre.
pub const CENTER_BONUS: i32 = 15;

/// Coordinates below this are on the edge.
pub const EDGE_LOW: i32 = 10;

/// Coordinates above this are on the edge.
pub const EDGE_HIGH: i32 = 90;

/// Bonus for an edge hit.
pub const EDGE_BONUS: i32 = 25;

/// Style points double when the critical roll exceeds this.
pub const CRITICAL_THRESHOLD: f64 = 0.9;

/// Either coordinate equal to this scores [`PERFECT_SCORE`].
pub const ANSWER: i32 = 42;

/// Score awarded for hitting on [`ANSWER`]; overrides every other bonus.
pub const PERFECT_SCORE: i32 = 100;

/// Hammer velocity for ordinary swing speeds.
pub const BASE_HAMMER_VELOCITY: f64 = 100.0;

/// Hammer velocity for `"ludicrous"` swing speed.
pub const LUDICROUS_HAMMER_VELOCITY: f64 = 9999.0;

const ESCAPE_LINES: [&str; 4] = [
    "The mole quantum tunneled away!",
    "Mole used ESCAPE! It's super effective!",
    "The mole vanished into another dimension!",
    "ERROR: Mole.exe has stopped responding",
];

const MISS_LINES: [&str; 4] = [
    "Swing and a miss!",
    "The mole laughs at your attempt",
    "Better luck next time!",
    "404: Mole not found at these coordinates",
];

/// How hard the hammer comes down.
///
/// Unrecognised strings deserialize as [`Force::Normal`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Force {
    /// A tap; lowers the hit chance.
    Gentle,
    /// An ordinary swing.
    #[default]
    Normal,
    /// Everything you've got; fixed high hit chance and bonus points.
    Maximum,
}

impl Force {
    /// Parse a force label, falling back to [`Force::Normal`].
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "gentle" => Self::Gentle,
            "maximum" => Self::Maximum,
            _ => Self::Normal,
        }
    }
}

impl From<String> for Force {
    fn from(label: String) -> Self {
        Self::parse(&label)
    }
}

/// A single swing at the pond.
///
/// Missing fields take the values of [`WhackRequest::default`], a normal
/// swing at the centre.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WhackRequest {
    /// Target x coordinate.
    pub x: i32,
    /// Target y coordinate.
    pub y: i32,
    /// Swing force.
    pub force: Force,
}

impl Default for WhackRequest {
    fn default() -> Self {
        Self {
            x: CENTER,
            y: CENTER,
            force: Force::Normal,
        }
    }
}

/// Tag describing how a whack went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WhackMessage {
    /// The mole tunneled away.
    Escaped,
    /// Nothing was hit.
    Missed,
    /// A hit worth exactly [`PERFECT_SCORE`].
    Perfect,
    /// A hit worth more than 50 points.
    Spectacular,
    /// A hit worth more than 30 points.
    Stylish,
    /// Any other hit.
    Neutralized,
}

impl WhackMessage {
    /// Classify an outcome.
    pub const fn classify(success: bool, escaped: bool, style_points: i32) -> Self {
        if escaped {
            Self::Escaped
        } else if !success {
            Self::Missed
        } else if style_points == PERFECT_SCORE {
            Self::Perfect
        } else if style_points > 50 {
            Self::Spectacular
        } else if style_points > 30 {
            Self::Stylish
        } else {
            Self::Neutralized
        }
    }

    /// Human-readable line; escapes and misses pick from a small pool.
    pub fn render(self, rng: &mut impl Rng) -> &'static str {
        match self {
            Self::Escaped => ESCAPE_LINES.choose(rng).copied().unwrap_or("Escaped!"),
            Self::Missed => MISS_LINES.choose(rng).copied().unwrap_or("Missed!"),
            Self::Perfect => "PERFECT! You've achieved mole-whacking enlightenment!",
            Self::Spectacular => "SPECTACULAR WHACK! The crowd goes wild!",
            Self::Stylish => "Nice whack! Very stylish!",
            Self::Neutralized => "Whack successful! Mole neutralized.",
        }
    }
}

/// The result of one whack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhackOutcome {
    /// Whether a mole was hit.
    pub success: bool,
    /// Style points (negative for an empty hole).
    pub style_points: i32,
    /// Whether the mole escaped.
    pub mole_escaped: bool,
    /// Outcome tag.
    pub tag: WhackMessage,
    /// Human-readable message.
    pub message: String,
}

/// Aggregate whack statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhackStats {
    /// Whacks attempted.
    pub total_whacks: u64,
    /// Whacks that hit.
    pub successful_whacks: u64,
    /// Moles that escaped.
    pub mole_escapes: u64,
    /// `successful / (total + 1) * 100`.
    pub success_rate: f64,
    /// Configured hammer label.
    pub hammer_type: String,
    /// Configured speed label.
    pub whack_speed: String,
    /// Hammer velocity derived from the speed label.
    pub hammer_velocity: f64,
}

/// Hit probability for a hammer and force.
///
/// Maximum force overrides the hammer entirely.
pub fn success_chance(foam_hammer: bool, force: Force) -> f64 {
    let base = if foam_hammer {
        FOAM_SUCCESS_CHANCE
    } else {
        BASE_SUCCESS_CHANCE
    };
    match force {
        Force::Gentle => base * GENTLE_FACTOR,
        Force::Normal => base,
        Force::Maximum => MAXIMUM_SUCCESS_CHANCE,
    }
}

/// Style points for a hit, excluding the maximum-force bonus.
///
/// The [`ANSWER`] override is applied last and wins over doubling.
pub fn style_points(request: &WhackRequest, since_last: Duration, critical: bool) -> i32 {
    let mut points = BASE_STYLE_POINTS;

    if since_last < COMBO_WINDOW {
        points = points.saturating_add(COMBO_BONUS);
    }

    if request.x == CENTER && request.y == CENTER {
        points = points.saturating_add(CENTER_BONUS);
    }

    let on_edge = |c: i32| !(EDGE_LOW..=EDGE_HIGH).contains(&c);
    if on_edge(request.x) || on_edge(request.y) {
        points = points.saturating_add(EDGE_BONUS);
    }

    if critical {
        points = points.saturating_mul(2);
    }

    if hits_answer(request) {
        points = PERFECT_SCORE;
    }

    points
}

/// Whether either coordinate is [`ANSWER`].
///
/// A hit there scores exactly [`PERFECT_SCORE`], force bonus included.
pub const fn hits_answer(request: &WhackRequest) -> bool {
    request.x == ANSWER || request.y == ANSWER
}

#[derive(Debug)]
struct ResolverState {
    rng: SmallRng,
    last_whack: Instant,
}

/// Resolves whacks and keeps the running statistics.
#[derive(Debug)]
pub struct InteractionResolver {
    hammer_type: String,
    whack_speed: String,
    foam_hammer: bool,
    hammer_velocity: f64,
    state: Mutex<ResolverState>,
    stats: StatsCounter,
    events: Arc<EventLog>,
}

impl InteractionResolver {
    /// Build a resolver from configuration, appending to `events`.
    pub fn new(config: &WhackerConfig, events: Arc<EventLog>) -> Self {
        let rng = config
            .seed
            .map_or_else(SmallRng::from_os_rng, SmallRng::seed_from_u64);
        let hammer_velocity = if config.whack_speed == "ludicrous" {
            LUDICROUS_HAMMER_VELOCITY
        } else {
            BASE_HAMMER_VELOCITY
        };

        Self {
            hammer_type: config.hammer_type.clone(),
            whack_speed: config.whack_speed.clone(),
            foam_hammer: config.hammer_type == "foam",
            hammer_velocity,
            state: Mutex::new(ResolverState {
                rng,
                last_whack: Instant::now(),
            }),
            stats: StatsCounter::new(),
            events,
        }
    }

    /// Resolve a whack now.
    ///
    /// The clock is read once the resolver lock is held, so whacks are
    /// stamped in the order they are rolled.
    pub async fn resolve(&self, request: &WhackRequest) -> WhackOutcome {
        self.settle(request, None).await
    }

    /// Resolve a whack as of `now`.
    ///
    /// Records the outcome in the statistics and appends a
    /// [`WhackEvent`] to the event log. A `now` older than the previous
    /// whack counts as simultaneous with it.
    pub async fn resolve_at(&self, request: &WhackRequest, now: Instant) -> WhackOutcome {
        self.settle(request, Some(now)).await
    }

    async fn settle(&self, request: &WhackRequest, now: Option<Instant>) -> WhackOutcome {
        let outcome = {
            let mut state = self.state.lock().await;
            let ResolverState { rng, last_whack } = &mut *state;

            let now = now.unwrap_or_else(Instant::now);
            let since_last = now.saturating_duration_since(*last_whack);
            *last_whack = (*last_whack).max(now);

            let (success, style_points, mole_escaped) =
                self.roll(request, since_last, rng);
            let tag = WhackMessage::classify(success, mole_escaped, style_points);
            WhackOutcome {
                success,
                style_points,
                mole_escaped,
                tag,
                message: tag.render(rng).to_owned(),
            }
        };

        self.stats.record(outcome.success, outcome.mole_escaped);
        self.events
            .append(SimEvent::Whack(WhackEvent {
                timestamp: Utc::now(),
                x: request.x,
                y: request.y,
                force: request.force,
                success: outcome.success,
                mole_escaped: outcome.mole_escaped,
                style_points: outcome.style_points,
            }))
            .await;

        debug!(
            x = request.x,
            y = request.y,
            force = ?request.force,
            success = outcome.success,
            escaped = outcome.mole_escaped,
            points = outcome.style_points,
            "whack resolved"
        );
        outcome
    }

    /// The roll sequence: `(success, style_points, escaped)`.
    fn roll(
        &self,
        request: &WhackRequest,
        since_last: Duration,
        rng: &mut SmallRng,
    ) -> (bool, i32, bool) {
        if rng.random::<f64>() <= PRESENCE_THRESHOLD {
            return (false, MISS_PENALTY, false);
        }

        if rng.random::<f64>() > ESCAPE_THRESHOLD {
            return (false, 0, true);
        }

        let chance = success_chance(self.foam_hammer, request.force);
        let mut points = if request.force == Force::Maximum {
            MAXIMUM_FORCE_BONUS
        } else {
            0
        };

        let success = rng.random::<f64>() < chance;
        if success {
            let critical = rng.random::<f64>() > CRITICAL_THRESHOLD;
            points = if hits_answer(request) {
                PERFECT_SCORE
            } else {
                points.saturating_add(style_points(request, since_last, critical))
            };
        }

        (success, points, false)
    }

    /// Current statistics.
    pub fn stats(&self) -> WhackStats {
        let counters = self.stats.read();
        WhackStats {
            total_whacks: counters.total,
            successful_whacks: counters.successful,
            mole_escapes: counters.escapes,
            success_rate: counters.success_rate(),
            hammer_type: self.hammer_type.clone(),
            whack_speed: self.whack_speed.clone(),
            hammer_velocity: self.hammer_velocity,
        }
    }

    /// Raw counters.
    pub fn counters(&self) -> Counters {
        self.stats.read()
    }

    /// Hammer velocity derived from the configured speed.
    pub const fn hammer_velocity(&self) -> f64 {
        self.hammer_velocity
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::float_cmp,
    clippy::cast_precision_loss,
    clippy::arithmetic_side_effects
)]
mod tests {
    use super::*;

    fn resolver(hammer: &str, speed: &str, seed: u64) -> InteractionResolver {
        InteractionResolver::new(
            &WhackerConfig {
                hammer_type: hammer.to_owned(),
                whack_speed: speed.to_owned(),
                seed: Some(seed),
                ..WhackerConfig::default()
            },
            Arc::new(EventLog::new(100_000)),
        )
    }

    fn at(x: i32, y: i32, force: Force) -> WhackRequest {
        WhackRequest { x, y, force }
    }

    const SLOW: Duration = Duration::from_secs(5);

    #[test]
    fn maximum_force_overrides_hammer() {
        assert_eq!(success_chance(true, Force::Maximum), MAXIMUM_SUCCESS_CHANCE);
        assert_eq!(success_chance(false, Force::Maximum), MAXIMUM_SUCCESS_CHANCE);
    }

    #[test]
    fn hammer_and_gentle_lower_chance() {
        assert_eq!(success_chance(false, Force::Normal), 0.7);
        assert_eq!(success_chance(true, Force::Normal), 0.6);
        assert!((success_chance(true, Force::Gentle) - 0.48).abs() < 1e-12);
        assert!((success_chance(false, Force::Gentle) - 0.56).abs() < 1e-12);
    }

    #[test]
    fn base_hit_scores_ten() {
        assert_eq!(style_points(&at(30, 30, Force::Normal), SLOW, false), 10);
    }

    #[test]
    fn bonuses_accumulate() {
        // combo
        assert_eq!(
            style_points(&at(30, 30, Force::Normal), Duration::from_millis(100), false),
            40
        );
        // centre
        assert_eq!(style_points(&at(50, 50, Force::Normal), SLOW, false), 25);
        // edge
        assert_eq!(style_points(&at(5, 50, Force::Normal), SLOW, false), 35);
        assert_eq!(style_points(&at(50, 91, Force::Normal), SLOW, false), 35);
        assert_eq!(style_points(&at(10, 90, Force::Normal), SLOW, false), 10);
        // everything with a critical
        assert_eq!(
            style_points(&at(95, 3, Force::Normal), Duration::ZERO, true),
            (10 + 30 + 25) * 2
        );
    }

    #[test]
    fn combo_window_is_exclusive() {
        assert_eq!(style_points(&at(30, 30, Force::Normal), COMBO_WINDOW, false), 10);
    }

    #[test]
    fn answer_overrides_critical_and_bonuses() {
        for y in [-5, 0, 3, 42, 50, 99, 1000] {
            for critical in [false, true] {
                assert_eq!(
                    style_points(&at(42, y, Force::Normal), Duration::ZERO, critical),
                    PERFECT_SCORE
                );
                assert_eq!(
                    style_points(&at(y, 42, Force::Normal), SLOW, critical),
                    PERFECT_SCORE
                );
            }
        }
    }

    #[test]
    fn unknown_force_is_normal() {
        assert_eq!(Force::parse("MAXIMUM"), Force::Maximum);
        assert_eq!(Force::parse("gentle"), Force::Gentle);
        assert_eq!(Force::parse("nuclear"), Force::Normal);
        let req: WhackRequest =
            serde_json::from_str(r#"{"x": 1, "y": 2, "force": "nuclear"}"#).unwrap();
        assert_eq!(req, at(1, 2, Force::Normal));
    }

    #[test]
    fn missing_fields_default_to_centre() {
        let req: WhackRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req, WhackRequest::default());
        assert_eq!(req, at(50, 50, Force::Normal));
    }

    #[test]
    fn message_classification() {
        assert_eq!(WhackMessage::classify(false, true, 0), WhackMessage::Escaped);
        assert_eq!(WhackMessage::classify(false, false, -10), WhackMessage::Missed);
        assert_eq!(WhackMessage::classify(true, false, 100), WhackMessage::Perfect);
        assert_eq!(WhackMessage::classify(true, false, 51), WhackMessage::Spectacular);
        assert_eq!(WhackMessage::classify(true, false, 31), WhackMessage::Stylish);
        assert_eq!(WhackMessage::classify(true, false, 30), WhackMessage::Neutralized);
    }

    #[test]
    fn ludicrous_speed_raises_velocity() {
        assert_eq!(
            resolver("foam", "ludicrous", 1).hammer_velocity(),
            LUDICROUS_HAMMER_VELOCITY
        );
        assert_eq!(resolver("foam", "brisk", 1).hammer_velocity(), BASE_HAMMER_VELOCITY);
    }

    #[tokio::test]
    async fn outcomes_follow_branch_structure() {
        let resolver = resolver("foam", "ludicrous", 11);
        for i in 0..2000 {
            let outcome = resolver.resolve(&at(i % 100, 7, Force::Normal)).await;
            assert!(!(outcome.success && outcome.mole_escaped));
            match (outcome.success, outcome.mole_escaped) {
                (false, false) => {
                    assert!(outcome.style_points == MISS_PENALTY || outcome.style_points == 0);
                }
                (false, true) => assert_eq!(outcome.style_points, 0),
                (true, _) => assert!(outcome.style_points >= BASE_STYLE_POINTS),
            }
        }
        let stats = resolver.stats();
        assert_eq!(stats.total_whacks, 2000);
        assert_eq!(stats.hammer_type, "foam");
    }

    #[tokio::test]
    async fn outcome_distribution_matches_thresholds() {
        let resolver = resolver("steel", "brisk", 12);
        let n = 20_000_u64;
        let mut empty = 0_u64;
        let start = Instant::now();
        for i in 0..n {
            let outcome = resolver
                .resolve_at(&at(30, 30, Force::Normal), start + SLOW * u32::try_from(i).unwrap())
                .await;
            if !outcome.success && !outcome.mole_escaped && outcome.style_points == MISS_PENALTY {
                empty += 1;
            }
        }
        let counters = resolver.counters();
        let nf = n as f64;

        // P(no mole) = 0.3
        assert!((empty as f64 / nf - 0.3).abs() < 0.02);
        // P(escape) = 0.7 * 0.05
        assert!((counters.escapes as f64 / nf - 0.035).abs() < 0.01);
        // P(hit) = 0.7 * 0.95 * 0.7
        assert!((counters.successful as f64 / nf - 0.4655).abs() < 0.02);
    }

    #[tokio::test]
    async fn maximum_force_miss_keeps_bonus() {
        let resolver = resolver("foam", "ludicrous", 13);
        let mut saw_hit = false;
        for _ in 0..500 {
            let outcome = resolver.resolve(&at(30, 30, Force::Maximum)).await;
            if outcome.success {
                saw_hit = true;
                assert!(outcome.style_points >= MAXIMUM_FORCE_BONUS + BASE_STYLE_POINTS);
            } else if !outcome.mole_escaped && outcome.style_points != MISS_PENALTY {
                assert_eq!(outcome.style_points, MAXIMUM_FORCE_BONUS);
            }
        }
        assert!(saw_hit);
    }

    #[tokio::test]
    async fn hits_on_the_answer_score_perfect() {
        let resolver = resolver("foam", "ludicrous", 14);
        let mut hits = 0;
        for y in 0..300 {
            let outcome = resolver.resolve(&at(42, y, Force::Normal)).await;
            if outcome.success {
                hits += 1;
                assert_eq!(outcome.style_points, PERFECT_SCORE);
                assert_eq!(outcome.tag, WhackMessage::Perfect);
            }
        }
        assert!(hits > 0);
    }

    #[tokio::test]
    async fn maximum_force_hits_on_the_answer_stay_perfect() {
        let resolver = resolver("foam", "ludicrous", 1);
        let mut hits = 0;
        for y in 0..200 {
            let outcome = resolver.resolve(&at(42, y, Force::Maximum)).await;
            if outcome.success {
                hits += 1;
                assert_eq!(outcome.style_points, PERFECT_SCORE);
                assert_eq!(outcome.tag, WhackMessage::Perfect);
            }
        }
        assert!(hits > 0);
    }

    #[tokio::test]
    async fn last_whack_never_moves_backwards() {
        let resolver = resolver("steel", "brisk", 18);
        let start = Instant::now();
        let newer = start + Duration::from_millis(10);

        resolver.resolve_at(&at(30, 30, Force::Normal), newer).await;
        resolver.resolve_at(&at(30, 30, Force::Normal), start).await;
        assert_eq!(resolver.state.lock().await.last_whack, newer);

        // 495 ms after the newest whack still earns the combo.
        let mut combo_hits = 0;
        for _ in 0..200 {
            let mut state = resolver.state.lock().await;
            state.last_whack = newer;
            drop(state);
            let outcome = resolver
                .resolve_at(&at(30, 30, Force::Normal), start + Duration::from_millis(505))
                .await;
            if outcome.success {
                combo_hits += 1;
                assert!(outcome.style_points == 40 || outcome.style_points == 80);
            }
        }
        assert!(combo_hits > 0);
    }

    #[tokio::test]
    async fn quick_succession_earns_combo() {
        let resolver = resolver("steel", "brisk", 15);
        let start = Instant::now();
        let mut combo_hits = 0;
        for i in 0..400_u32 {
            let now = start + Duration::from_millis(100) * i;
            let outcome = resolver.resolve_at(&at(30, 30, Force::Normal), now).await;
            if outcome.success && i > 0 {
                combo_hits += 1;
                assert!(outcome.style_points == 40 || outcome.style_points == 80);
            }
        }
        assert!(combo_hits > 0);
    }

    #[tokio::test]
    async fn every_whack_is_logged() {
        let events = Arc::new(EventLog::new(1000));
        let resolver = InteractionResolver::new(
            &WhackerConfig {
                seed: Some(16),
                ..WhackerConfig::default()
            },
            Arc::clone(&events),
        );
        for _ in 0..25 {
            resolver.resolve(&WhackRequest::default()).await;
        }
        assert_eq!(events.len().await, 25);
        assert!(
            events
                .recent(25)
                .await
                .iter()
                .all(|e| matches!(e, SimEvent::Whack(w) if w.x == 50 && w.y == 50))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_whacks_never_lose_counts() {
        let resolver = Arc::new(resolver("foam", "ludicrous", 17));
        let mut tasks = Vec::new();
        for t in 0..64 {
            let resolver = Arc::clone(&resolver);
            tasks.push(tokio::spawn(async move {
                for i in 0..50 {
                    resolver.resolve(&at(t, i, Force::Gentle)).await;
                }
            }));
        }
        for result in futures::future::join_all(tasks).await {
            result.unwrap();
        }
        let counters = resolver.counters();
        assert_eq!(counters.total, 64 * 50);
        assert!(counters.successful + counters.escapes <= counters.total);
    }
}
