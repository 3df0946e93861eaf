use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

use crate::integrations::evse::{EvseCoordinator, TelemetrySnapshot};
use crate::state::{EntityState, StateMachine};

/// Shared application state
pub struct AppState {
    pub state_machine: StateMachine,
    pub evse: EvseCoordinator,
}

/// GET /api/ response
#[derive(Serialize)]
struct ApiStatus {
    message: String,
}

/// GET /api/health response
#[derive(Serialize)]
struct Health {
    status: String,
    version: String,
    entity_count: usize,
}

/// GET /api/evse response
#[derive(Serialize)]
struct EvseStatus {
    /// False when the latest poll failed and `snapshot` is stale.
    fresh: bool,
    snapshot: TelemetrySnapshot,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/", get(api_status))
        .route("/api/states", get(get_states))
        .route("/api/states/:entity_id", get(get_state))
        .route("/api/evse", get(get_evse))
        .route("/api/health", get(health))
        .with_state(state)
}

/// GET /api/ — API running check
async fn api_status() -> Json<ApiStatus> {
    Json(ApiStatus {
        message: "API running.".to_string(),
    })
}

/// GET /api/states — all entity states
async fn get_states(State(app): State<Arc<AppState>>) -> Json<Vec<EntityState>> {
    Json(app.state_machine.get_all())
}

/// GET /api/states/{entity_id} — single entity state
async fn get_state(
    State(app): State<Arc<AppState>>,
    Path(entity_id): Path<String>,
) -> Result<Json<EntityState>, StatusCode> {
    app.state_machine
        .get(&entity_id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// GET /api/evse — last EVSE snapshot plus freshness; 404 until the first
/// successful poll
async fn get_evse(State(app): State<Arc<AppState>>) -> Result<Json<EvseStatus>, StatusCode> {
    app.evse
        .data()
        .map(|snapshot| {
            Json(EvseStatus {
                fresh: app.evse.last_update_success(),
                snapshot,
            })
        })
        .ok_or(StatusCode::NOT_FOUND)
}

/// GET /api/health — liveness plus a registry size hint
async fn health(State(app): State<Arc<AppState>>) -> Json<Health> {
    Json(Health {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        entity_count: app.state_machine.len(),
    })
}
