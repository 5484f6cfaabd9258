//! Axum router construction for the HTTP API.
//!
//! Assembles all routes into a single [`Router`] with CORS middleware
//! enabled for cross-origin dashboard access and request tracing.

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Build the complete Axum router.
///
/// See [`handlers`] for the endpoint table. CORS allows any origin; the
/// game frontend is served from a different port.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        // Pond
        .route("/api/pond/status", get(handlers::pond_status))
        .route("/api/pond/duck", post(handlers::add_duck))
        .route("/api/pond/wave", get(handlers::wave))
        // Moles
        .route("/api/mole/whack", post(handlers::whack))
        .route("/api/mole/detect", get(handlers::detect_moles))
        .route("/api/mole/stats", get(handlers::mole_stats))
        // Quacks
        .route("/api/quack", get(handlers::quack).post(handlers::quack))
        .route("/api/events", get(handlers::list_events))
        .route(
            "/api/emergency/release-the-quacken",
            post(handlers::release_the_quacken),
        )
        // Quacker registry
        .route(
            "/api/quackers",
            get(handlers::list_quackers).post(handlers::register_quacker),
        )
        .route("/api/quackers/{id}", delete(handlers::remove_quacker))
        .route(
            "/api/quackers/{id}/entangle/{peer}",
            post(handlers::entangle_quackers),
        )
        .route("/api/quackers/{id}/quack", post(handlers::quack_from))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
