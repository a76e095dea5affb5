use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    routing::{get, post},
    Json, Router,
};
use rosterhub_core::cache::{CacheEntry, CacheKey, Resolved};
use rosterhub_upstream::UpstreamRequest;
use serde::{Deserialize, Serialize};

use crate::{
    error::{ApiError, ApiResult, RequestContext},
    main_lib::AppState,
};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRequest {
    pub operation: String,
    pub endpoint: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    pub max_age_secs: Option<u64>,
    pub max_access_count: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyRequest {
    pub operation: String,
    pub endpoint: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeactivateResponse {
    pub key: String,
    pub deactivated: bool,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

fn require(field: &str, value: &str) -> ApiResult<()> {
    if value.trim().is_empty() {
        return Err(ApiError::bad_request(format!("'{}' must not be empty", field)));
    }
    Ok(())
}

/// Resolve a request through the cache, the live provider or the mock source.
async fn resolve(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    body: Result<Json<ResolveRequest>, JsonRejection>,
) -> ApiResult<Json<Resolved>> {
    let req = ctx.json(body)?;
    require("operation", &req.operation).map_err(|e| ctx.fail(e))?;
    require("endpoint", &req.endpoint).map_err(|e| ctx.fail(e))?;

    let policy = state
        .freshness
        .policy(req.max_age_secs, req.max_access_count);
    let resolved = state
        .arbiter
        .resolve(
            &req.operation,
            &req.endpoint,
            req.params,
            &policy,
            &state.gateway,
        )
        .await
        .map_err(|e| ctx.fail(e))?;
    Ok(Json(resolved))
}

async fn list_entries(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<CacheEntry>> {
    Json(state.store.list(query.include_inactive))
}

/// Soft-evict one entry. Unknown keys are a no-op.
async fn deactivate_entry(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    body: Result<Json<KeyRequest>, JsonRejection>,
) -> ApiResult<Json<DeactivateResponse>> {
    let req = ctx.json(body)?;
    let key = CacheKey::from_request(&UpstreamRequest {
        operation: req.operation,
        endpoint: req.endpoint,
        params: req.params,
    });
    let deactivated = state.store.deactivate(&key).map_err(|e| ctx.fail(e))?;
    Ok(Json(DeactivateResponse {
        key: key.to_string(),
        deactivated,
    }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/cache/resolve", post(resolve))
        .route("/cache/entries", get(list_entries))
        .route("/cache/entries/deactivate", post(deactivate_entry))
}
