//! REST API endpoint handlers.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/health` | Liveness |
//! | `GET` | `/api/pond/status` | Pond readings and warnings |
//! | `POST` | `/api/pond/duck` | Add a duck |
//! | `GET` | `/api/pond/wave` | Sample the wave function |
//! | `POST` | `/api/mole/whack` | Whack at a spot |
//! | `GET` | `/api/mole/detect` | Active moles |
//! | `GET` | `/api/mole/stats` | Whack statistics |
//! | `GET`/`POST` | `/api/quack` | Quack from the primary quacker |
//! | `GET` | `/api/events` | Recent quacks and whacks |
//! | `POST` | `/api/emergency/release-the-quacken` | You don't want to know |
//! | `GET` | `/api/quackers` | List quackers |
//! | `POST` | `/api/quackers` | Register a quacker |
//! | `POST` | `/api/quackers/{id}/entangle/{peer}` | Entangle two quackers |
//! | `POST` | `/api/quackers/{id}/quack` | Quack from a specific quacker |
//! | `DELETE` | `/api/quackers/{id}` | Remove a quacker |

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Utc;
use quackamole_core::{EmitterId, WhackOutcome, WhackRequest};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ObserverError;
use crate::state::AppState;

/// Intensity a `maximum` quack is emitted with.
pub const MAXIMUM_QUACK_INTENSITY: f64 = 9000.01;

/// Reply body of every quack endpoint.
pub const QUACK_REPLY: &str = "QUACK! 🦆";

const DEFAULT_EVENT_LIMIT: usize = 100;
const MAX_EVENT_LIMIT: usize = 1000;

// ---------------------------------------------------------------------------
// Query parameter structs
// ---------------------------------------------------------------------------

/// Query parameters for the quack endpoints.
#[derive(Debug, serde::Deserialize)]
pub struct QuackQuery {
    /// `maximum` or a number; anything else quacks without emitting.
    pub intensity: Option<String>,
}

/// Query parameters for `GET /api/pond/wave`.
#[derive(Debug, serde::Deserialize)]
pub struct WaveQuery {
    /// X coordinate (default 0).
    pub x: Option<String>,
    /// Y coordinate (default 0).
    pub y: Option<String>,
}

/// Body of a whack reply.
#[derive(Debug, serde::Serialize)]
pub struct WhackResponse {
    /// How the whack went.
    #[serde(flatten)]
    pub outcome: WhackOutcome,
    /// Time spent resolving the whack, in milliseconds.
    pub latency_ms: f64,
}

/// Query parameters for `GET /api/events`.
#[derive(Debug, serde::Deserialize)]
pub struct EventsQuery {
    /// Maximum number of events to return (default 100, capped at 1000).
    pub limit: Option<usize>,
}

// ---------------------------------------------------------------------------
// GET /health
// ---------------------------------------------------------------------------

/// Liveness probe.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let uptime_seconds = Utc::now()
        .signed_duration_since(state.started_at)
        .num_seconds();
    Json(serde_json::json!({
        "status": "healthy",
        "service": "quack-a-mole",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": uptime_seconds,
    }))
}

// ---------------------------------------------------------------------------
// Pond
// ---------------------------------------------------------------------------

/// Current pond readings with warnings.
pub async fn pond_status(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    let status = state.supervisor.status().await;
    Ok(Json(status))
}

/// Put a duck on the pond.
pub async fn add_duck(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    let added = state.supervisor.add_duck().await;
    let duck_count = state.supervisor.status().await.field.duck_count;
    let message = if added {
        "Duck added to the pond"
    } else {
        "The pond is at duck capacity"
    };
    Ok(Json(serde_json::json!({
        "added": added,
        "duck_count": duck_count,
        "message": message,
    })))
}

/// Sample the wave function at `?x=&y=`.
pub async fn wave(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WaveQuery>,
) -> Result<impl IntoResponse, ObserverError> {
    let x = parse_coordinate("x", params.x.as_deref())?;
    let y = parse_coordinate("y", params.y.as_deref())?;
    let height = state.supervisor.wave_at(x, y).await;
    Ok(Json(serde_json::json!({
        "x": x,
        "y": y,
        "height": height,
    })))
}

// ---------------------------------------------------------------------------
// Moles
// ---------------------------------------------------------------------------

/// Whack at a spot.
///
/// The body is a JSON [`WhackRequest`]. A missing or malformed body is not
/// an error; it whacks the centre with normal force.
pub async fn whack(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<impl IntoResponse, ObserverError> {
    let started = std::time::Instant::now();
    let request = if body.is_empty() {
        WhackRequest::default()
    } else {
        serde_json::from_slice::<WhackRequest>(&body).unwrap_or_else(|e| {
            debug!(error = %e, "Malformed whack body, using default request");
            WhackRequest::default()
        })
    };
    let outcome = state.supervisor.interact(&request).await;
    Ok(Json(WhackResponse {
        outcome,
        latency_ms: started.elapsed().as_secs_f64() * 1000.0,
    }))
}

/// Holes with a mole up.
pub async fn detect_moles(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    Ok(Json(state.supervisor.detect_moles().await))
}

/// Whack statistics.
pub async fn mole_stats(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    Ok(Json(state.supervisor.stats()))
}

// ---------------------------------------------------------------------------
// Quacks
// ---------------------------------------------------------------------------

/// Quack from the primary quacker.
pub async fn quack(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QuackQuery>,
) -> Result<impl IntoResponse, ObserverError> {
    let emission = match quack_intensity(params.intensity.as_deref()) {
        Some(intensity) => Some(state.supervisor.emit(intensity).await?),
        None => None,
    };
    Ok(Json(serde_json::json!({
        "message": QUACK_REPLY,
        "emission": emission,
    })))
}

/// Recent quacks and whacks, newest first.
pub async fn list_events(
    State(state): State<Arc<AppState>>,
    Query(params): Query<EventsQuery>,
) -> Result<impl IntoResponse, ObserverError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_EVENT_LIMIT)
        .min(MAX_EVENT_LIMIT);
    let events = state.supervisor.recent_events(limit).await;
    Ok(Json(serde_json::json!({
        "count": events.len(),
        "events": events,
    })))
}

/// Release the Quacken.
pub async fn release_the_quacken() -> impl IntoResponse {
    warn!("THE QUACKEN HAS BEEN RELEASED");
    Json(serde_json::json!({
        "message": "🦆🐙 *cosmic horror quacking intensifies*",
    }))
}

// ---------------------------------------------------------------------------
// Quacker registry
// ---------------------------------------------------------------------------

/// List every quacker and the resonance counters.
pub async fn list_quackers(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    let quackers = state.supervisor.emitters().await;
    let (completed, dropped) = state.supervisor.resonance_counts();
    Ok(Json(serde_json::json!({
        "count": quackers.len(),
        "primary": state.supervisor.primary_emitter(),
        "quackers": quackers,
        "resonances_completed": completed,
        "resonances_dropped": dropped,
    })))
}

/// Register a new quacker.
pub async fn register_quacker(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    let id = state.supervisor.register_emitter().await;
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": id }))))
}

/// Entangle two quackers.
pub async fn entangle_quackers(
    State(state): State<Arc<AppState>>,
    Path((id_str, peer_str)): Path<(String, String)>,
) -> Result<impl IntoResponse, ObserverError> {
    let id = parse_emitter_id(&id_str)?;
    let peer = parse_emitter_id(&peer_str)?;
    let created = state.supervisor.entangle(id, peer).await?;
    Ok(Json(serde_json::json!({
        "id": id,
        "peer": peer,
        "created": created,
    })))
}

/// Quack from a specific quacker.
pub async fn quack_from(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
    Query(params): Query<QuackQuery>,
) -> Result<impl IntoResponse, ObserverError> {
    let id = parse_emitter_id(&id_str)?;
    // Without an intensity the quacker uses its own amplitude.
    let intensity = match params.intensity.as_deref() {
        Some(raw) => quack_intensity(Some(raw))
            .ok_or_else(|| ObserverError::InvalidQuery(format!("intensity: {raw}")))?,
        None => state
            .supervisor
            .emitters()
            .await
            .into_iter()
            .find(|q| q.id == id)
            .map(|q| q.amplitude)
            .ok_or_else(|| ObserverError::NotFound(format!("quacker {id}")))?,
    };
    let emission = state.supervisor.emit_from(id, intensity).await?;
    Ok(Json(emission))
}

/// Remove a quacker.
pub async fn remove_quacker(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, ObserverError> {
    let id = parse_emitter_id(&id_str)?;
    state.supervisor.remove_emitter(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map an `intensity` query value to an emission intensity.
///
/// `maximum` is [`MAXIMUM_QUACK_INTENSITY`]; finite numbers are used as
/// given. Anything else, including no value, means no emission.
fn quack_intensity(raw: Option<&str>) -> Option<f64> {
    match raw? {
        "maximum" => Some(MAXIMUM_QUACK_INTENSITY),
        other => other.parse::<f64>().ok().filter(|v| v.is_finite()),
    }
}

fn parse_coordinate(name: &str, raw: Option<&str>) -> Result<f64, ObserverError> {
    raw.map_or(Ok(0.0), |s| {
        s.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| ObserverError::InvalidQuery(format!("{name}: {s}")))
    })
}

fn parse_emitter_id(s: &str) -> Result<EmitterId, ObserverError> {
    s.parse::<Uuid>()
        .map(EmitterId::from)
        .map_err(|e| ObserverError::InvalidUuid(format!("{s}: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn intensity_parsing() {
        assert_eq!(quack_intensity(Some("maximum")), Some(9000.01));
        assert_eq!(quack_intensity(Some("3.5")), Some(3.5));
        assert_eq!(quack_intensity(Some("loud")), None);
        assert_eq!(quack_intensity(Some("NaN")), None);
        assert_eq!(quack_intensity(None), None);
    }

    #[test]
    fn coordinates_default_to_origin() {
        assert_eq!(parse_coordinate("x", None).unwrap(), 0.0);
        assert_eq!(parse_coordinate("x", Some("15.7")).unwrap(), 15.7);
        assert!(matches!(
            parse_coordinate("y", Some("north")),
            Err(ObserverError::InvalidQuery(_))
        ));
    }
}
