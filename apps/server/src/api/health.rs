use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use rosterhub_core::cache::CacheStats;
use rosterhub_upstream::GatewayStatus;
use serde::Serialize;

use crate::main_lib::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub started_at: DateTime<Utc>,
    pub subscribers: usize,
    pub connections: usize,
    pub events_delivered: u64,
    pub events_dropped: u64,
    pub cache: CacheStats,
    pub upstream: GatewayStatus,
}

/// Liveness plus a snapshot of cache, fan-out and upstream state.
async fn get_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        started_at: state.started_at,
        subscribers: state.event_bus.subscriber_count(),
        connections: state.dispatcher.connection_count(),
        events_delivered: state.event_bus.delivered_total(),
        events_dropped: state.event_bus.dropped_total(),
        cache: state.store.stats(),
        upstream: state.gateway.status(),
    })
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(get_health))
}
