use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use tower::ServiceExt;

mod common;

fn json_request(method: Method, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_root() {
    let app = common::create_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(
        response.status() == StatusCode::OK || response.status() == StatusCode::SERVICE_UNAVAILABLE
    );
}

#[tokio::test]
async fn test_health_live() {
    let app = common::create_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health/live")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_health_info() {
    let app = common::create_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health/info")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_quiz_attempt_rejects_empty_answers_before_datastore() {
    let app = common::create_test_app().await;

    let response = app
        .oneshot(json_request(
            Method::POST,
            "/api/quizzes/attempts",
            serde_json::json!({
                "userId": "user-1",
                "quizId": "quiz-1",
                "topicId": "topic-1",
                "answers": []
            }),
        ))
        .await
        .unwrap();

    // Validation runs before any database access, so this must be a 400
    // even with no database configured.
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_quiz_attempt_rejects_missing_user() {
    let app = common::create_test_app().await;

    let response = app
        .oneshot(json_request(
            Method::POST,
            "/api/quizzes/attempts",
            serde_json::json!({
                "userId": "",
                "quizId": "quiz-1",
                "topicId": "topic-1",
                "answers": [{"questionId": "q1", "answer": "A"}]
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_batch_process_requires_user_id() {
    let app = common::create_test_app().await;

    let response = app
        .oneshot(json_request(
            Method::POST,
            "/api/productivity/batch-process",
            serde_json::json!({ "userId": "" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_batch_process_without_database_is_unavailable() {
    let app = common::create_test_app().await;

    let response = app
        .oneshot(json_request(
            Method::POST,
            "/api/productivity/batch-process",
            serde_json::json!({ "userId": "user-1" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_complete_topic_rejects_negative_time() {
    let app = common::create_test_app().await;

    let response = app
        .oneshot(json_request(
            Method::POST,
            "/api/learning/topics/topic-1/complete",
            serde_json::json!({ "userId": "user-1", "timeSpentSeconds": -5 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_complete_topic_payload_carries_only_user_and_time() {
    let app = common::create_test_app().await;

    // Topic completion takes no score; a well-formed payload passes
    // validation and only then fails on the missing datastore.
    let response = app
        .oneshot(json_request(
            Method::POST,
            "/api/learning/topics/topic-1/complete",
            serde_json::json!({ "userId": "user-1", "timeSpentSeconds": 120 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_complete_block_rejects_out_of_range_score() {
    let app = common::create_test_app().await;

    let response = app
        .oneshot(json_request(
            Method::POST,
            "/api/learning/blocks/block-1/complete",
            serde_json::json!({
                "userId": "user-1",
                "timeSpentSeconds": 60,
                "score": 150
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_topics_requires_user_id() {
    let app = common::create_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/learning/topics?userId=")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let app = common::create_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/unknown")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
