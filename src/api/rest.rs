use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{Stream, StreamExt};
use serde::Serialize;
use tracing::warn;

use crate::domain::error::ErrorKind;
use crate::domain::fleet_service::FleetService;
use crate::domain::scheduler::SchedulerState;
use crate::domain::types::{FleetSnapshot, Generation, NodeView};

/// Shared application state for all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub fleet: Arc<FleetService>,
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
    pub generation: Generation,
    pub scheduler: SchedulerState,
}

#[derive(Debug, Serialize)]
pub struct RefreshAccepted {
    pub scheduler: SchedulerState,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/fleet", get(fleet))
        .route("/api/v1/fleet/refresh", post(refresh))
        .route("/api/v1/fleet/dismiss", post(dismiss))
        .route("/api/v1/fleet/events", get(events))
        .route(
            "/api/v1/fleet/nodes/{node_id}",
            get(node).delete(delete_node),
        )
        .with_state(state)
}

/// HTTP status a failed registry mutation maps to.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Unreachable | ErrorKind::Protocol => StatusCode::BAD_GATEWAY,
    }
}

async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        generation: state.fleet.read().generation,
        scheduler: state.fleet.scheduler_state(),
    })
}

async fn fleet(State(state): State<AppState>) -> Json<FleetSnapshot> {
    Json(FleetSnapshot::clone(&state.fleet.read()))
}

async fn node(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
) -> Result<Json<NodeView>, (StatusCode, String)> {
    state
        .fleet
        .read()
        .get(&node_id)
        .cloned()
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("node {node_id} is not in the fleet")))
}

async fn refresh(State(state): State<AppState>) -> (StatusCode, Json<RefreshAccepted>) {
    let scheduler = state.fleet.trigger_refresh();
    (StatusCode::ACCEPTED, Json(RefreshAccepted { scheduler }))
}

async fn dismiss(State(state): State<AppState>) -> StatusCode {
    state.fleet.dismiss_failure();
    StatusCode::NO_CONTENT
}

async fn delete_node(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .fleet
        .request_delete(&node_id)
        .await
        .map(|()| StatusCode::NO_CONTENT)
        .map_err(|e| (status_for(e.kind), e.to_string()))
}

async fn events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = state.fleet.subscribe().filter_map(|snapshot| async move {
        match Event::default().event("snapshot").json_data(&*snapshot) {
            Ok(event) => Some(Ok(event)),
            Err(e) => {
                warn!(generation = snapshot.generation, error = %e, "failed to encode snapshot event");
                None
            }
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
