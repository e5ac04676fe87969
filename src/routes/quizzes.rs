use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::db::DatabaseProxy;
use crate::response::AppError;
use crate::services::quiz::{self, QuizAttemptPayload};
use crate::state::AppState;

#[derive(Serialize)]
struct SuccessResponse<T> {
    success: bool,
    data: T,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/attempts", post(submit_attempt))
        .route("/attempts/recent", get(recent_attempts))
        .route("/:id", get(get_quiz_for_taking))
}

fn require_db(state: &AppState) -> Result<Arc<DatabaseProxy>, AppError> {
    state
        .db_proxy()
        .ok_or_else(|| AppError::service_unavailable("database unavailable"))
}

/// Question payload handed to takers: options only, no correct answer or
/// explanation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TakingQuestion {
    id: String,
    question_type: quiz::QuestionType,
    question: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<serde_json::Value>,
    points: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QuizForTaking {
    id: String,
    title: String,
    passing_percentage: f64,
    questions: Vec<TakingQuestion>,
}

async fn get_quiz_for_taking(
    State(state): State<AppState>,
    Path(quiz_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let proxy = require_db(&state)?;

    // Inactive quizzes are not offered for taking at all.
    let quiz = quiz::get_quiz(proxy.as_ref(), &quiz_id)
        .await
        .map_err(AppError::internal)?
        .filter(|q| q.is_active)
        .ok_or_else(|| AppError::not_found("Quiz not found"))?;

    let mut questions = quiz::get_quiz_questions(proxy.as_ref(), &quiz_id)
        .await
        .map_err(AppError::internal)?;
    quiz::shuffle_questions(&mut questions);

    Ok(Json(SuccessResponse {
        success: true,
        data: QuizForTaking {
            id: quiz.id,
            title: quiz.title,
            passing_percentage: quiz.passing_percentage,
            questions: questions
                .into_iter()
                .map(|q| TakingQuestion {
                    id: q.id,
                    question_type: q.question_type,
                    question: q.question,
                    options: q.options,
                    points: q.points,
                })
                .collect(),
        },
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttemptRequest {
    user_id: String,
    #[serde(flatten)]
    payload: QuizAttemptPayload,
}

async fn submit_attempt(
    State(state): State<AppState>,
    Json(request): Json<AttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    if request.user_id.trim().is_empty() {
        return Err(AppError::validation("userId is required"));
    }
    if request.payload.quiz_id.trim().is_empty() || request.payload.topic_id.trim().is_empty() {
        return Err(AppError::validation("quizId and topicId are required"));
    }
    if request.payload.answers.is_empty() {
        return Err(AppError::validation("answers must not be empty"));
    }
    if request
        .payload
        .time_taken_seconds
        .is_some_and(|t| t < 0)
    {
        return Err(AppError::validation("timeTakenSeconds must be non-negative"));
    }

    let proxy = require_db(&state)?;

    let result = quiz::submit_quiz_attempt(proxy.as_ref(), &request.user_id, &request.payload)
        .await
        .map_err(AppError::infer)?;

    Ok(Json(SuccessResponse {
        success: true,
        data: result,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecentQuery {
    user_id: String,
    #[serde(default)]
    limit: Option<i64>,
}

async fn recent_attempts(
    State(state): State<AppState>,
    Query(query): Query<RecentQuery>,
) -> Result<impl IntoResponse, AppError> {
    if query.user_id.trim().is_empty() {
        return Err(AppError::validation("userId is required"));
    }
    let proxy = require_db(&state)?;

    let limit = query.limit.unwrap_or(5).clamp(1, 50);
    let attempts = quiz::get_recent_quiz_attempts(proxy.as_ref(), &query.user_id, limit)
        .await
        .map_err(AppError::internal)?;

    Ok(Json(SuccessResponse {
        success: true,
        data: attempts,
    }))
}
