use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::response::AppError;
use crate::services::productivity;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/batch-process", post(batch_process))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchRequest {
    user_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchResponse {
    success: bool,
    processed: usize,
    batch_id: String,
    context_windows: Vec<String>,
    processing_time: u64,
    cost_savings: String,
}

async fn batch_process(
    State(state): State<AppState>,
    Json(request): Json<BatchRequest>,
) -> Result<impl IntoResponse, AppError> {
    if request.user_id.trim().is_empty() {
        return Err(AppError::validation("userId is required"));
    }
    let proxy = state
        .db_proxy()
        .ok_or_else(|| AppError::service_unavailable("database unavailable"))?;

    let runtime = state.runtime();
    let use_mock = runtime.is_llm_mock() || !runtime.is_llm_enabled();

    let outcome =
        productivity::process_batch(&proxy, state.llm().as_ref(), use_mock, &request.user_id)
            .await
            .map_err(AppError::internal)?;

    Ok(Json(BatchResponse {
        success: true,
        processed: outcome.processed,
        batch_id: outcome.batch_id,
        context_windows: outcome.context_windows,
        processing_time: outcome.processing_time_ms,
        cost_savings: outcome.cost_savings,
    }))
}
