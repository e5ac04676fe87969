use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::db::DatabaseProxy;
use crate::response::AppError;
use crate::services::learning;
use crate::state::AppState;

#[derive(Serialize)]
struct SuccessResponse<T> {
    success: bool,
    data: T,
}

#[derive(Serialize)]
struct AckResponse {
    success: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserQuery {
    user_id: String,
    #[serde(default)]
    product_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserPayload {
    user_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TopicCompletionPayload {
    user_id: String,
    time_spent_seconds: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockCompletionPayload {
    user_id: String,
    time_spent_seconds: i64,
    #[serde(default)]
    score: Option<i64>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/topics", get(list_topics))
        .route("/topics/:id", get(get_topic))
        .route("/topics/:id/start", post(start_topic))
        .route("/topics/:id/complete", post(complete_topic))
        .route("/blocks/:id/start", post(start_block))
        .route("/blocks/:id/complete", post(complete_block))
}

fn require_user_id(user_id: &str) -> Result<(), AppError> {
    if user_id.trim().is_empty() {
        return Err(AppError::validation("userId is required"));
    }
    Ok(())
}

fn require_db(state: &AppState) -> Result<Arc<DatabaseProxy>, AppError> {
    state
        .db_proxy()
        .ok_or_else(|| AppError::service_unavailable("database unavailable"))
}

async fn list_topics(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<impl IntoResponse, AppError> {
    require_user_id(&query.user_id)?;
    let proxy = require_db(&state)?;

    let topics = learning::list_topics(proxy.as_ref(), &query.user_id, query.product_id.as_deref())
        .await
        .map_err(AppError::internal)?;

    Ok(Json(SuccessResponse {
        success: true,
        data: topics,
    }))
}

async fn get_topic(
    State(state): State<AppState>,
    Path(topic_id): Path<String>,
    Query(query): Query<UserQuery>,
) -> Result<impl IntoResponse, AppError> {
    require_user_id(&query.user_id)?;
    let proxy = require_db(&state)?;

    let topic = learning::get_topic_with_progress(proxy.as_ref(), &query.user_id, &topic_id)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| AppError::not_found("Topic not found"))?;

    Ok(Json(SuccessResponse {
        success: true,
        data: topic,
    }))
}

async fn start_topic(
    State(state): State<AppState>,
    Path(topic_id): Path<String>,
    Json(payload): Json<UserPayload>,
) -> Result<impl IntoResponse, AppError> {
    require_user_id(&payload.user_id)?;
    let proxy = require_db(&state)?;

    learning::start_topic(proxy.as_ref(), &payload.user_id, &topic_id)
        .await
        .map_err(AppError::infer)?;

    Ok(Json(AckResponse { success: true }))
}

async fn complete_topic(
    State(state): State<AppState>,
    Path(topic_id): Path<String>,
    Json(payload): Json<TopicCompletionPayload>,
) -> Result<impl IntoResponse, AppError> {
    require_user_id(&payload.user_id)?;
    if payload.time_spent_seconds < 0 {
        return Err(AppError::validation("timeSpentSeconds must be non-negative"));
    }
    let proxy = require_db(&state)?;

    learning::complete_topic(&proxy, &payload.user_id, &topic_id, payload.time_spent_seconds)
        .await
        .map_err(AppError::infer)?;

    Ok(Json(AckResponse { success: true }))
}

async fn start_block(
    State(state): State<AppState>,
    Path(block_id): Path<String>,
    Json(payload): Json<UserPayload>,
) -> Result<impl IntoResponse, AppError> {
    require_user_id(&payload.user_id)?;
    let proxy = require_db(&state)?;

    learning::start_learning_block(proxy.as_ref(), &payload.user_id, &block_id)
        .await
        .map_err(AppError::infer)?;

    Ok(Json(AckResponse { success: true }))
}

async fn complete_block(
    State(state): State<AppState>,
    Path(block_id): Path<String>,
    Json(payload): Json<BlockCompletionPayload>,
) -> Result<impl IntoResponse, AppError> {
    require_user_id(&payload.user_id)?;
    if payload.time_spent_seconds < 0 {
        return Err(AppError::validation("timeSpentSeconds must be non-negative"));
    }
    if payload.score.is_some_and(|s| !(0..=100).contains(&s)) {
        return Err(AppError::validation("score must be between 0 and 100"));
    }
    let proxy = require_db(&state)?;

    learning::complete_learning_block(
        proxy.as_ref(),
        &payload.user_id,
        &block_id,
        payload.time_spent_seconds,
        payload.score,
    )
    .await
    .map_err(AppError::infer)?;

    Ok(Json(AckResponse { success: true }))
}
