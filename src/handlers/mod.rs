use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose, Engine as _};
use serde_json::json;
use std::sync::Arc;

use crate::metrics;
use crate::services::live_session::SessionError;
use crate::services::AppState;

pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let sessions = state.registry.session_count().await;

    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "quizlive-api",
            "version": env!("CARGO_PKG_VERSION"),
            "sessions": {
                "registered": sessions,
            }
        })),
    )
}

pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::render_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to render metrics: {}", e),
        ),
    }
}

/// Metrics authentication middleware - protects /metrics endpoint with HTTP Basic Auth
pub async fn metrics_auth_middleware(
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if !auth_header.starts_with("Basic ") {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let encoded = &auth_header[6..];
    let decoded = general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;
    let credentials = String::from_utf8(decoded).map_err(|_| StatusCode::UNAUTHORIZED)?;

    // Expected credentials from environment variable, format: username:password
    let expected = std::env::var("METRICS_AUTH").unwrap_or_else(|_| "admin:changeme".to_string());

    if credentials != expected {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(request).await)
}

/// Maps a session error onto the HTTP status the REST surface reports.
pub(crate) fn error_response(err: SessionError) -> (StatusCode, String) {
    let status = match &err {
        SessionError::NotFound => StatusCode::NOT_FOUND,
        SessionError::UnknownParticipant(_) => StatusCode::NOT_FOUND,
        SessionError::InvalidHostKey => StatusCode::FORBIDDEN,
        SessionError::InvalidQuiz(_) => StatusCode::UNPROCESSABLE_ENTITY,
        SessionError::Completed
        | SessionError::AlreadyRunning
        | SessionError::NotRunning
        | SessionError::SessionFull
        | SessionError::QuestionNotActive(_)
        | SessionError::WindowClosed(_)
        | SessionError::AlreadyAnswered(_)
        | SessionError::UnknownOption(_) => StatusCode::CONFLICT,
    };
    (status, err.to_string())
}

pub mod live;
pub mod quizzes;
