use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    models::{CreateQuizRequest, HostCommandRequest},
    services::AppState,
};

use super::error_response;

pub async fn create_quiz(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateQuizRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if let Err(errors) = req.validate() {
        return Err((StatusCode::UNPROCESSABLE_ENTITY, errors.to_string()));
    }
    tracing::info!(
        "Creating live quiz session: title={:?}, questions={}",
        req.title,
        req.questions.len()
    );

    match state.registry.create_session(req).await {
        Ok(response) => Ok((StatusCode::CREATED, Json(response))),
        Err(e) => {
            tracing::error!("Failed to create session: {}", e);
            Err(error_response(e))
        }
    }
}

pub async fn get_quiz_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let handle = state
        .registry
        .get(&session_id)
        .await
        .map_err(error_response)?;
    let snapshot = handle.snapshot().await.map_err(error_response)?;
    Ok((StatusCode::OK, Json(snapshot)))
}

pub async fn start_quiz(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<HostCommandRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    tracing::info!("Host start requested: session={}", session_id);
    let handle = state
        .registry
        .get(&session_id)
        .await
        .map_err(error_response)?;
    handle.start(req.host_key).await.map_err(error_response)?;
    Ok((StatusCode::OK, Json(json!({ "status": "running" }))))
}

pub async fn end_quiz(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<HostCommandRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    tracing::info!("Host end requested: session={}", session_id);
    let handle = state
        .registry
        .get(&session_id)
        .await
        .map_err(error_response)?;
    handle.end(req.host_key).await.map_err(error_response)?;
    Ok((StatusCode::OK, Json(json!({ "status": "completed" }))))
}

pub async fn get_leaderboard(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let handle = state
        .registry
        .get(&session_id)
        .await
        .map_err(error_response)?;
    let leaderboard = handle.leaderboard().await.map_err(error_response)?;
    Ok((StatusCode::OK, Json(json!({ "leaderboard": leaderboard }))))
}

#[derive(Debug, Deserialize)]
pub struct ResponsesQuery {
    pub user_id: String,
}

pub async fn get_responses(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    Query(query): Query<ResponsesQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let handle = state
        .registry
        .get(&session_id)
        .await
        .map_err(error_response)?;
    let responses = handle
        .responses(query.user_id)
        .await
        .map_err(error_response)?;
    Ok((StatusCode::OK, Json(json!({ "responses": responses }))))
}
