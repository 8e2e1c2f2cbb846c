//! HTTP request handlers.

use super::AppState;
use crate::db::DbError;
use crate::probe::parse_target_url;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

const DEFAULT_LOG_LIMIT: i64 = 100;
const MAX_LOG_LIMIT: i64 = 1000;

fn error(status: StatusCode, msg: impl Into<String>) -> Response {
    (status, Json(json!({ "error": msg.into() }))).into_response()
}

fn db_error(e: DbError, what: &str) -> Response {
    match e {
        DbError::NotFound => error(StatusCode::NOT_FOUND, format!("{} not found", what)),
        DbError::Conflict(_) => error(StatusCode::CONFLICT, "URL already exists"),
        e => {
            tracing::error!("Database error while handling {}: {}", what, e);
            error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

fn check_id(id: i64) -> Result<i64, Response> {
    if id <= 0 {
        return Err(error(StatusCode::BAD_REQUEST, "Invalid ID format"));
    }
    Ok(id)
}

// ============================================================================
// Health
// ============================================================================

pub async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    let timestamp = Utc::now().timestamp();
    match state.store.ping() {
        Ok(()) => Json(json!({
            "status": "healthy",
            "database": "connected",
            "timestamp": timestamp,
        }))
        .into_response(),
        Err(e) => {
            tracing::warn!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "database": "unreachable",
                    "timestamp": timestamp,
                })),
            )
                .into_response()
        }
    }
}

// ============================================================================
// API: Nodes
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct NodeRequest {
    #[serde(default)]
    pub url: String,
}

pub async fn handle_get_nodes(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.get_nodes() {
        Ok(nodes) => Json(nodes).into_response(),
        Err(e) => db_error(e, "nodes"),
    }
}

pub async fn handle_create_node(
    State(state): State<AppState>,
    Json(req): Json<NodeRequest>,
) -> impl IntoResponse {
    if let Err(e) = parse_target_url(&req.url) {
        return error(StatusCode::BAD_REQUEST, e.to_string());
    }

    match state.store.add_node(req.url.trim()) {
        Ok(node) => (StatusCode::CREATED, Json(node)).into_response(),
        Err(e) => db_error(e, "Node"),
    }
}

pub async fn handle_get_node(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let id = match check_id(id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match state.store.get_node(id) {
        Ok(node) => Json(node).into_response(),
        Err(e) => db_error(e, "Node"),
    }
}

pub async fn handle_update_node(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<NodeRequest>,
) -> impl IntoResponse {
    let id = match check_id(id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    if let Err(e) = parse_target_url(&req.url) {
        return error(StatusCode::BAD_REQUEST, e.to_string());
    }

    match state.store.update_node(id, req.url.trim()) {
        Ok(node) => Json(node).into_response(),
        Err(e) => db_error(e, "Node"),
    }
}

pub async fn handle_delete_node(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let id = match check_id(id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match state.store.delete_node(id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => db_error(e, "Node"),
    }
}

// ============================================================================
// API: Probe logs
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub limit: Option<i64>,
}

impl LogsQuery {
    fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_LOG_LIMIT)
            .clamp(1, MAX_LOG_LIMIT)
    }
}

pub async fn handle_get_node_logs(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<LogsQuery>,
) -> impl IntoResponse {
    let id = match check_id(id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    if let Err(e) = state.store.get_node(id) {
        return db_error(e, "Node");
    }

    match state.store.get_node_probe_logs(id, query.limit()) {
        Ok(logs) => Json(logs).into_response(),
        Err(e) => db_error(e, "Node logs"),
    }
}

pub async fn handle_get_nodes_with_logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> impl IntoResponse {
    match state.store.get_nodes_with_logs(query.limit()) {
        Ok(nodes) => Json(nodes).into_response(),
        Err(e) => db_error(e, "Nodes with logs"),
    }
}

pub async fn handle_get_probe_logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> impl IntoResponse {
    match state.store.get_probe_logs(query.limit()) {
        Ok(logs) => Json(logs).into_response(),
        Err(e) => db_error(e, "Node logs"),
    }
}

pub async fn handle_get_probe_log(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let id = match check_id(id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match state.store.get_probe_log(id) {
        Ok(log) => Json(log).into_response(),
        Err(e) => db_error(e, "Node log"),
    }
}

// ============================================================================
// API: Latest statuses
// ============================================================================

pub async fn handle_get_histories(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.get_latest_statuses() {
        Ok(statuses) => Json(statuses).into_response(),
        Err(e) => db_error(e, "Histories"),
    }
}

pub async fn handle_get_history(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    let id = match check_id(id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match state.store.get_latest_status(id) {
        Ok(status) => Json(status).into_response(),
        Err(e) => db_error(e, "History"),
    }
}

// ============================================================================
// API: Manual check
// ============================================================================

pub async fn handle_check_uptime(State(state): State<AppState>) -> impl IntoResponse {
    match state.checker.run_once().await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => {
            tracing::error!("Manual uptime check failed: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
