use axum::Router;
use std::sync::Arc;
use uuid::Uuid;

use quizlive_api::{config::Config, create_router, services::AppState};

pub async fn create_test_app() -> Router {
    // Initialize tracing for tests
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let config = Config::load().expect("Failed to load test configuration");

    let app_state = Arc::new(
        AppState::new(config)
            .await
            .expect("Failed to initialize test app state"),
    );

    create_router(app_state)
}

pub fn quiz_body(questions: usize, time_limit_seconds: u32) -> serde_json::Value {
    let questions: Vec<serde_json::Value> = (0..questions)
        .map(|i| {
            serde_json::json!({
                "text": format!("Question {}", i + 1),
                "options": ["Alpha", "Beta", "Gamma"],
                "correctOption": "B",
                "timeLimitSeconds": time_limit_seconds,
            })
        })
        .collect();

    serde_json::json!({
        "title": "Clinical pharmacology sprint",
        "questions": questions,
    })
}

pub fn unique_user() -> String {
    format!("user-{}", Uuid::new_v4())
}
