use axum::Router;

pub async fn create_test_app() -> Router {
    std::env::set_var("DATABASE_URL", "");
    std::env::set_var("LLM_API_KEY", "");

    intime_backend_rust::create_app().await
}
