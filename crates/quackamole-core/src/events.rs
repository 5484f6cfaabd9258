//! Bounded, append-only log of quack and whack events.
//!
//! Every emission and every whack appends exactly one [`SimEvent`]. The
//! log keeps at most `capacity` events; once full, the oldest entries are
//! evicted so memory stays bounded under sustained traffic. Appended
//! events are never modified.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::resolver::Force;

/// The dimension a quack was emitted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    /// Our own dimension.
    Prime,
    /// The mirror dimension.
    Mirror,
    /// The quantum foam.
    Quantum,
    /// The rubber duck plane.
    Rubber,
    /// The astral plane.
    Astral,
    /// Where quacks go while debugging.
    Debug,
}

impl Dimension {
    /// Every dimension, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Prime,
        Self::Mirror,
        Self::Quantum,
        Self::Rubber,
        Self::Astral,
        Self::Debug,
    ];

    /// Draw a dimension uniformly at random.
    pub fn random(rng: &mut impl Rng) -> Self {
        Self::ALL.choose(rng).copied().unwrap_or(Self::Prime)
    }
}

/// A recorded quantum quack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuackEvent {
    /// When the quack was emitted.
    pub timestamp: DateTime<Utc>,
    /// Intensity the quack was emitted with.
    pub amplitude: f64,
    /// Dimension the quack was emitted in.
    pub dimension: Dimension,
    /// Whether the quack's radar picked up a mole.
    pub mole_nearby: bool,
    /// Whether the quack landed.
    pub success: bool,
}

/// A recorded whack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhackEvent {
    /// When the whack was resolved.
    pub timestamp: DateTime<Utc>,
    /// Target x coordinate.
    pub x: i32,
    /// Target y coordinate.
    pub y: i32,
    /// Force category of the swing.
    pub force: Force,
    /// Whether the mole was hit.
    pub success: bool,
    /// Whether the mole escaped.
    pub mole_escaped: bool,
    /// Style points awarded (may be negative).
    pub style_points: i32,
}

/// One entry in the [`EventLog`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SimEvent {
    /// A quantum quack emission.
    Quack(QuackEvent),
    /// A whack resolution.
    Whack(WhackEvent),
}

/// Append-only event log with bounded growth.
#[derive(Debug)]
pub struct EventLog {
    capacity: usize,
    events: Mutex<VecDeque<SimEvent>>,
    appended: AtomicU64,
}

impl EventLog {
    /// Create an empty log retaining at most `capacity` events.
    ///
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            events: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            appended: AtomicU64::new(0),
        }
    }

    /// Append an event, evicting the oldest entries past capacity.
    pub async fn append(&self, event: SimEvent) {
        let mut events = self.events.lock().await;
        events.push_back(event);
        while events.len() > self.capacity {
            events.pop_front();
        }
        self.appended.fetch_add(1, Ordering::Relaxed);
    }

    /// Return up to `limit` events, most recent first.
    pub async fn recent(&self, limit: usize) -> Vec<SimEvent> {
        let events = self.events.lock().await;
        events.iter().rev().take(limit).cloned().collect()
    }

    /// Number of events currently retained.
    pub async fn len(&self) -> usize {
        self.events.lock().await.len()
    }

    /// Whether no events are retained.
    pub async fn is_empty(&self) -> bool {
        self.events.lock().await.is_empty()
    }

    /// Total events ever appended, including evicted ones.
    pub fn total_appended(&self) -> u64 {
        self.appended.load(Ordering::Relaxed)
    }

    /// Maximum number of retained events.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;

    fn whack(points: i32) -> SimEvent {
        SimEvent::Whack(WhackEvent {
            timestamp: Utc::now(),
            x: 1,
            y: 2,
            force: Force::Normal,
            success: true,
            mole_escaped: false,
            style_points: points,
        })
    }

    fn points(event: &SimEvent) -> i32 {
        match event {
            SimEvent::Whack(w) => w.style_points,
            SimEvent::Quack(_) => i32::MIN,
        }
    }

    #[tokio::test]
    async fn recent_returns_newest_first() {
        let log = EventLog::new(10);
        for p in 0..3 {
            log.append(whack(p)).await;
        }
        let recent = log.recent(10).await;
        assert_eq!(recent.len(), 3);
        assert_eq!(points(&recent[0]), 2);
        assert_eq!(points(&recent[2]), 0);
    }

    #[tokio::test]
    async fn growth_is_bounded() {
        let log = EventLog::new(4);
        for p in 0..10 {
            log.append(whack(p)).await;
        }
        assert_eq!(log.len().await, 4);
        assert_eq!(log.total_appended(), 10);
        let recent = log.recent(100).await;
        assert_eq!(points(&recent[0]), 9);
        assert_eq!(points(&recent[3]), 6);
    }

    #[tokio::test]
    async fn recent_respects_limit() {
        let log = EventLog::new(10);
        assert!(log.is_empty().await);
        for p in 0..5 {
            log.append(whack(p)).await;
        }
        assert_eq!(log.recent(2).await.len(), 2);
        assert!(log.recent(0).await.is_empty());
    }

    #[test]
    fn zero_capacity_keeps_one_event() {
        let log = EventLog::new(0);
        assert_eq!(log.capacity(), 1);
    }

    #[test]
    fn every_dimension_is_drawn() {
        let mut rng = SmallRng::seed_from_u64(7);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..500 {
            seen.insert(Dimension::random(&mut rng));
        }
        assert_eq!(seen.len(), Dimension::ALL.len());
    }

    #[test]
    fn events_serialize_with_kind_tag() {
        let json = serde_json::to_value(whack(5)).unwrap();
        assert_eq!(json["kind"], "whack");
        assert_eq!(json["force"], "normal");
        assert_eq!(json["style_points"], 5);
    }
}
