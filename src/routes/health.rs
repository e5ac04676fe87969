use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/info", get(info))
        .route("/live", get(live))
        .route("/ready", get(ready))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    database: &'static str,
    timestamp: String,
}

#[derive(Serialize)]
struct HealthInfoResponse {
    service: &'static str,
    version: String,
    uptime: u64,
    timestamp: String,
}

#[derive(Serialize)]
struct LivenessResponse {
    status: &'static str,
    uptime: u64,
    timestamp: String,
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

async fn database_connected(state: &AppState) -> bool {
    match state.db_proxy() {
        Some(proxy) => proxy.ping().await.is_ok(),
        None => false,
    }
}

async fn root(State(state): State<AppState>) -> Response {
    let ok = database_connected(&state).await;

    let response = HealthResponse {
        status: if ok { "ok" } else { "degraded" },
        database: if ok { "connected" } else { "disconnected" },
        timestamp: now_iso(),
    };

    let status_code = if ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(response)).into_response()
}

async fn info(State(state): State<AppState>) -> Response {
    let response = HealthInfoResponse {
        service: "intime-backend",
        version: std::env::var("APP_VERSION")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "unknown".to_string()),
        uptime: state.uptime_seconds(),
        timestamp: now_iso(),
    };
    Json(response).into_response()
}

async fn live(State(state): State<AppState>) -> Response {
    let response = LivenessResponse {
        status: "healthy",
        uptime: state.uptime_seconds(),
        timestamp: now_iso(),
    };
    Json(response).into_response()
}

async fn ready(State(state): State<AppState>) -> Response {
    let ok = database_connected(&state).await;
    let response = HealthResponse {
        status: if ok { "ready" } else { "not_ready" },
        database: if ok { "connected" } else { "disconnected" },
        timestamp: now_iso(),
    };
    let status_code = if ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(response)).into_response()
}
