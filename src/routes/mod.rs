pub mod health;
pub mod learning;
pub mod productivity;
pub mod quizzes;

use axum::Router;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest("/api/learning", learning::router())
        .nest("/api/quizzes", quizzes::router())
        .nest("/api/productivity", productivity::router())
        .with_state(state)
}
