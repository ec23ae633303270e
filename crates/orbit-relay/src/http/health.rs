//! `GET /health` (§6): unauthenticated liveness probe.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::state::RelayState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_secs: i64,
    clients: usize,
    anchors: usize,
    anchor_running: bool,
}

/// `GET /health`.
pub async fn handler(State(state): State<RelayState>) -> impl IntoResponse {
    let (clients, anchors) = state.subscriptions().connection_counts();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: (chrono::Utc::now() - state.started_at()).num_seconds(),
        clients,
        anchors,
        anchor_running: anchors > 0,
    })
}
