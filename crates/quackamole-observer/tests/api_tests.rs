//! Integration tests for the HTTP API endpoints.
//!
//! Tests use Axum's `Router` directly via `tower::ServiceExt` without
//! starting a TCP server. Each test runs its own seeded simulation.

#![allow(clippy::unwrap_used, clippy::float_cmp)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use quackamole_core::config::{PondConfig, QuackConfig, QuackerConfig, WhackerConfig};
use axum::response::IntoResponse;
use quackamole_core::{CoreError, EmitterId, SimulationSupervisor};
use quackamole_observer::error::ObserverError;
use quackamole_observer::router::build_router;
use quackamole_observer::server::ServerConfig;
use quackamole_observer::startup::spawn_observer;
use quackamole_observer::state::AppState;
use serde_json::Value;
use tower::ServiceExt;

async fn make_test_state_with(duck_capacity: u32) -> Arc<AppState> {
    let config = QuackConfig {
        pond: PondConfig {
            duck_capacity,
            // Keep the periodic tasks out of the way of exact assertions.
            physics_interval_ms: 3_600_000,
            activity_interval_ms: 3_600_000,
            seed: Some(101),
            ..PondConfig::default()
        },
        whacker: WhackerConfig {
            seed: Some(102),
            ..WhackerConfig::default()
        },
        quacker: QuackerConfig {
            seed: Some(103),
            ..QuackerConfig::default()
        },
        ..QuackConfig::default()
    };
    let supervisor = SimulationSupervisor::start(config).await.unwrap();
    Arc::new(AppState::new(Arc::new(supervisor)))
}

async fn make_test_state() -> Arc<AppState> {
    make_test_state_with(1_000_000).await
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn send(state: &Arc<AppState>, request: Request<Body>) -> (StatusCode, Value) {
    let response = build_router(Arc::clone(state))
        .oneshot(request)
        .await
        .unwrap();
    let status = response.status();
    (status, body_to_json(response.into_body()).await)
}

async fn get(state: &Arc<AppState>, uri: &str) -> (StatusCode, Value) {
    send(state, Request::get(uri).body(Body::empty()).unwrap()).await
}

async fn post(state: &Arc<AppState>, uri: &str, body: &str) -> (StatusCode, Value) {
    let request = Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_owned()))
        .unwrap();
    send(state, request).await
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_health() {
    let state = make_test_state().await;
    let (status, json) = get(&state, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["service"], "quack-a-mole");
}

#[tokio::test]
async fn test_pond_status_starts_full_and_calm() {
    let state = make_test_state().await;
    let (status, json) = get(&state, "/api/pond/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["water_level"], 100.0);
    assert_eq!(json["duck_count"], 0);
    assert_eq!(json["total_holes"], 42);
    assert_eq!(json["physics_mode"], "navier-stokes");
    assert_eq!(json["warnings"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_add_duck_respects_capacity() {
    let state = make_test_state_with(1).await;

    let (status, json) = post(&state, "/api/pond/duck", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["added"], true);
    assert_eq!(json["duck_count"], 1);

    let (_, json) = post(&state, "/api/pond/duck", "").await;
    assert_eq!(json["added"], false);
    assert_eq!(json["duck_count"], 1);

    let (_, json) = get(&state, "/api/pond/status").await;
    assert_eq!(json["ripple_count"], 1);
}

#[tokio::test]
async fn test_wave_function() {
    let state = make_test_state().await;

    let (status, json) = get(&state, "/api/pond/wave?x=0&y=0").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["height"], 0.0);

    let (status, json) = get(&state, "/api/pond/wave?x=north&y=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["status"], 400);
}

#[tokio::test]
async fn test_malformed_whack_uses_default_request() {
    let state = make_test_state().await;

    let (status, json) = post(&state, "/api/mole/whack", "{not json").await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["success"].is_boolean());
    assert!(json["message"].is_string());
    assert!(json["latency_ms"].as_f64().unwrap() >= 0.0);

    let (_, json) = get(&state, "/api/events?limit=1").await;
    let event = &json["events"][0];
    assert_eq!(event["kind"], "whack");
    assert_eq!(event["x"], 50);
    assert_eq!(event["y"], 50);
    assert_eq!(event["force"], "normal");
}

#[tokio::test]
async fn test_unknown_force_whacks_normally() {
    let state = make_test_state().await;

    let (status, _) = post(
        &state,
        "/api/mole/whack",
        r#"{"x": 7, "y": 8, "force": "sledgehammer"}"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, json) = get(&state, "/api/events?limit=1").await;
    assert_eq!(json["events"][0]["x"], 7);
    assert_eq!(json["events"][0]["force"], "normal");
}

#[tokio::test]
async fn test_mole_stats_use_biased_rate() {
    let state = make_test_state().await;
    for _ in 0..3 {
        let _ = post(&state, "/api/mole/whack", r#"{"x": 1, "y": 1}"#).await;
    }

    let (status, json) = get(&state, "/api/mole/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_whacks"], 3);
    assert_eq!(json["hammer_type"], "foam");
    assert_eq!(json["whack_speed"], "ludicrous");
    assert_eq!(json["hammer_velocity"], 9999.0);

    let successful = json["successful_whacks"].as_f64().unwrap();
    let rate = json["success_rate"].as_f64().unwrap();
    assert!((rate - successful / 4.0 * 100.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_detect_moles_on_fresh_pond() {
    let state = make_test_state().await;
    let (status, json) = get(&state, "/api/mole/detect").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 0);
    assert_eq!(json["detection_method"], "quantum-radar");
}

#[tokio::test]
async fn test_quack_intensities() {
    let state = make_test_state().await;

    let (status, json) = get(&state, "/api/quack?intensity=maximum").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "QUACK! 🦆");
    assert_eq!(json["emission"]["event"]["amplitude"], 9000.01);

    let (_, json) = post(&state, "/api/quack?intensity=2.5", "").await;
    assert_eq!(json["emission"]["event"]["amplitude"], 2.5);

    let (_, json) = get(&state, "/api/quack").await;
    assert!(json["emission"].is_null());

    let (_, json) = get(&state, "/api/quack?intensity=loud").await;
    assert!(json["emission"].is_null());

    let (_, json) = get(&state, "/api/events").await;
    assert_eq!(json["count"], 2);
    assert_eq!(json["events"][0]["kind"], "quack");
}

#[tokio::test]
async fn test_release_the_quacken() {
    let state = make_test_state().await;
    let (status, json) = post(&state, "/api/emergency/release-the-quacken", "").await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["message"].as_str().unwrap().contains("quacking"));
}

#[tokio::test]
async fn test_quacker_registry_lifecycle() {
    let state = make_test_state().await;

    let (_, json) = get(&state, "/api/quackers").await;
    assert_eq!(json["count"], 1);
    let primary = json["primary"].as_str().unwrap().to_owned();

    let (status, json) = post(&state, "/api/quackers", "").await;
    assert_eq!(status, StatusCode::CREATED);
    let other = json["id"].as_str().unwrap().to_owned();

    let uri = format!("/api/quackers/{primary}/entangle/{other}");
    let (status, json) = post(&state, &uri, "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["created"], true);
    let (_, json) = post(&state, &uri, "").await;
    assert_eq!(json["created"], false);

    let (_, json) = get(&state, "/api/quack?intensity=1").await;
    assert_eq!(json["emission"]["peers_signalled"], 1);

    let (status, json) = post(&state, &format!("/api/quackers/{other}/quack"), "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["event"]["amplitude"], 11.0);

    let (status, json) = send(
        &state,
        Request::delete(format!("/api/quackers/{primary}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["status"], 409);

    let response = build_router(Arc::clone(&state))
        .oneshot(
            Request::delete(format!("/api/quackers/{other}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let (_, json) = get(&state, "/api/quackers").await;
    assert_eq!(json["count"], 1);
    assert_eq!(json["quackers"][0]["peers"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_quacker_errors() {
    let state = make_test_state().await;

    let (status, json) = post(&state, "/api/quackers/not-a-uuid/entangle/also-not", "").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["status"], 400);

    let ghost = uuid::Uuid::new_v4();
    let (status, json) = post(&state, &format!("/api/quackers/{ghost}/quack?intensity=1"), "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["status"], 404);
}

#[tokio::test]
async fn test_events_limit_is_respected() {
    let state = make_test_state().await;
    for _ in 0..5 {
        let _ = post(&state, "/api/mole/whack", "").await;
    }

    let (_, json) = get(&state, "/api/events?limit=2").await;
    assert_eq!(json["count"], 2);

    let (_, json) = get(&state, "/api/events").await;
    assert_eq!(json["count"], 5);
}

#[tokio::test]
async fn test_core_errors_map_to_status_codes() {
    let id = EmitterId::default();
    let cases = [
        (CoreError::UnknownEmitter(id), StatusCode::NOT_FOUND),
        (CoreError::PrimaryEmitter(id), StatusCode::CONFLICT),
        (
            CoreError::InvalidConfig {
                reason: "events.capacity must be at least 1".to_owned(),
            },
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
    ];
    for (err, expected) in cases {
        let response = ObserverError::from(err).into_response();
        assert_eq!(response.status(), expected);
        let json = body_to_json(response.into_body()).await;
        assert_eq!(json["status"], expected.as_u16());
        assert!(json["error"].is_string());
    }
}

#[tokio::test]
async fn test_spawn_observer_binds_port_zero() {
    let state = make_test_state().await;
    let config = ServerConfig {
        host: "127.0.0.1".to_owned(),
        port: 0,
    };
    let handle = spawn_observer(&config, state).await.unwrap();
    assert!(!handle.is_finished());
    handle.abort();
}

#[tokio::test]
async fn test_spawn_observer_rejects_bad_address() {
    let state = make_test_state().await;
    let config = ServerConfig {
        host: "not an address".to_owned(),
        port: 8080,
    };
    assert!(spawn_observer(&config, state).await.is_err());
}
