use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{HttpAppError, ValidatedJson};
use crate::state::AppState;
use crate::validation::validate_scan_request;
use lumen_core::models::{CreateTaskRequest, Task, TaskResponse, TaskStats};
use lumen_core::AppError;

/// Submit a URL for scanning. Waits for queue space, then answers 202 with
/// the pending task.
#[tracing::instrument(skip_all)]
pub async fn create_analysis(
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<CreateTaskRequest>,
) -> Result<(StatusCode, Json<TaskResponse>), HttpAppError> {
    let submission = validate_scan_request(&request)?;

    let task = state
        .registry
        .create(&submission.url, &submission.runner)
        .await?;

    Ok((StatusCode::ACCEPTED, Json(TaskResponse::from(task))))
}

/// List every known task, newest first
#[tracing::instrument(skip(state))]
pub async fn list_analyses(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    task_list(state.registry.get_all().await)
}

#[tracing::instrument(skip(state))]
pub async fn list_completed_analyses(
    State(state): State<Arc<AppState>>,
) -> Json<serde_json::Value> {
    task_list(state.registry.get_completed().await)
}

#[tracing::instrument(skip(state))]
pub async fn analysis_stats(State(state): State<Arc<AppState>>) -> Json<TaskStats> {
    Json(state.registry.stats().await)
}

/// Get a task by ID
#[tracing::instrument(skip(state))]
pub async fn get_analysis(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<TaskResponse>, HttpAppError> {
    match state.registry.get_by_id(task_id).await {
        Some(task) => Ok(Json(TaskResponse::from(task))),
        None => {
            tracing::debug!(task_id = %task_id, "Task not found");
            Err(AppError::NotFound("Task not found".to_string()).into())
        }
    }
}

fn task_list(tasks: Vec<Task>) -> Json<serde_json::Value> {
    let task_responses: Vec<TaskResponse> = tasks.into_iter().map(TaskResponse::from).collect();

    Json(serde_json::json!({
        "tasks": task_responses,
        "count": task_responses.len()
    }))
}
