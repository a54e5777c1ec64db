use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use validator::Validate;

use crate::error::AppResult;
use crate::extractors::{CurrentUser, ValidatedJson};
use crate::program::domain::{DayView, TaskUpdate};
use crate::program::Completion;
use crate::routes::programs::active_program;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct SetTaskRequest {
    #[validate(length(min = 1, message = "is required"))]
    pub subtask_id: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct TaskReflectionRequest {
    #[validate(length(max = 5000, message = "must be at most 5000 characters"))]
    pub reflection: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tasks/today", get(today))
        .route("/tasks/{id}", get(show))
        .route("/tasks/{id}/complete", post(complete))
        .route("/tasks/{id}/uncomplete", post(uncomplete))
        .route("/tasks/{id}/reflection", put(reflection))
}

/// Today's tasks are the current day of the current program.
async fn today(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<DayView>> {
    let program = active_program(&state, &user).await?;
    let day = state
        .programs
        .current_day_tasks(&user.id, &program.id)
        .await?;
    Ok(Json(day))
}

async fn show(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<DayView>> {
    Ok(Json(state.programs.daily_task(&user.id, &id).await?))
}

async fn complete(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<SetTaskRequest>,
) -> AppResult<Json<TaskUpdate>> {
    let update = state
        .programs
        .set_subtask(&user.id, &id, &req.subtask_id, Completion::Complete, Utc::now())
        .await?;
    Ok(Json(update))
}

async fn uncomplete(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<SetTaskRequest>,
) -> AppResult<Json<TaskUpdate>> {
    let update = state
        .programs
        .set_subtask(&user.id, &id, &req.subtask_id, Completion::Uncomplete, Utc::now())
        .await?;
    Ok(Json(update))
}

async fn reflection(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<TaskReflectionRequest>,
) -> AppResult<Json<DayView>> {
    let day = state
        .programs
        .save_reflection(&user.id, &id, &req.reflection)
        .await?;
    Ok(Json(day))
}
