use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, ValidatedJson};
use crate::program::domain::{DayView, ProgramProgress, ProgramSnapshot, TaskUpdate};
use crate::program::Completion;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProgramRequest {
    #[validate(length(min = 1, message = "is required"))]
    pub development_area_id: String,
    #[validate(length(min = 1, message = "is required"))]
    pub test_result_id: String,
}

/// Sub-task addressed within the current program. `day` defaults to the program's current day.
#[derive(Debug, Deserialize, Validate)]
pub struct SubTaskRequest {
    #[validate(length(min = 1, message = "is required"))]
    pub subtask_id: String,
    #[validate(range(min = 1, max = 21, message = "must be between 1 and 21"))]
    pub day: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReflectionRequest {
    #[validate(length(max = 5000, message = "must be at most 5000 characters"))]
    pub reflection: String,
    #[validate(range(min = 1, max = 21, message = "must be between 1 and 21"))]
    pub day: Option<i64>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/programs", get(list).post(create))
        .route("/programs/current", get(current))
        .route("/programs/day", get(current_day))
        .route("/programs/complete-task", post(complete_task))
        .route("/programs/uncomplete-task", post(uncomplete_task))
        .route("/programs/reflection", post(reflection))
        .route("/programs/{id}", get(show))
        .route("/programs/{id}/progress", get(progress))
        .route("/programs/{id}/tasks/{day}", get(day_tasks))
}

/// The caller's current program, resolved once per request.
pub(crate) async fn active_program(state: &AppState, user: &CurrentUser) -> AppResult<ProgramSnapshot> {
    state
        .programs
        .current_program(&user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("No active program".into()))
}

async fn create(
    State(state): State<AppState>,
    user: CurrentUser,
    ValidatedJson(req): ValidatedJson<CreateProgramRequest>,
) -> AppResult<Response> {
    let program = state
        .programs
        .create_program(
            &user.id,
            &req.development_area_id,
            &req.test_result_id,
            Utc::now(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(program)).into_response())
}

async fn list(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<ProgramSnapshot>>> {
    Ok(Json(state.programs.list_programs(&user.id).await?))
}

async fn current(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<ProgramSnapshot>> {
    Ok(Json(active_program(&state, &user).await?))
}

async fn current_day(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<DayView>> {
    let program = active_program(&state, &user).await?;
    Ok(Json(
        state
            .programs
            .current_day_tasks(&user.id, &program.id)
            .await?,
    ))
}

async fn set_in_current_program(
    state: &AppState,
    user: &CurrentUser,
    req: &SubTaskRequest,
    completion: Completion,
) -> AppResult<TaskUpdate> {
    let program = active_program(state, user).await?;
    let repo = &state.programs;
    let update = match (req.day, completion) {
        (None, Completion::Complete) => {
            repo.complete_current(&user.id, &program.id, &req.subtask_id, Utc::now())
                .await?
        }
        (None, Completion::Uncomplete) => {
            repo.uncomplete_current(&user.id, &program.id, &req.subtask_id, Utc::now())
                .await?
        }
        (Some(day), _) => {
            let day = repo.day(&user.id, &program.id, day).await?;
            repo.set_subtask(&user.id, &day.id, &req.subtask_id, completion, Utc::now())
                .await?
        }
    };
    Ok(update)
}

async fn complete_task(
    State(state): State<AppState>,
    user: CurrentUser,
    ValidatedJson(req): ValidatedJson<SubTaskRequest>,
) -> AppResult<Json<TaskUpdate>> {
    let update = set_in_current_program(&state, &user, &req, Completion::Complete).await?;
    Ok(Json(update))
}

async fn uncomplete_task(
    State(state): State<AppState>,
    user: CurrentUser,
    ValidatedJson(req): ValidatedJson<SubTaskRequest>,
) -> AppResult<Json<TaskUpdate>> {
    let update = set_in_current_program(&state, &user, &req, Completion::Uncomplete).await?;
    Ok(Json(update))
}

async fn reflection(
    State(state): State<AppState>,
    user: CurrentUser,
    ValidatedJson(req): ValidatedJson<ReflectionRequest>,
) -> AppResult<Json<DayView>> {
    let program = active_program(&state, &user).await?;
    let day = state
        .programs
        .day(&user.id, &program.id, req.day.unwrap_or(program.current_day))
        .await?;
    let day = state
        .programs
        .save_reflection(&user.id, &day.id, &req.reflection)
        .await?;
    Ok(Json(day))
}

async fn show(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<ProgramSnapshot>> {
    Ok(Json(state.programs.get_program(&user.id, &id).await?))
}

async fn progress(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<ProgramProgress>> {
    Ok(Json(state.programs.program_progress(&user.id, &id).await?))
}

async fn day_tasks(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((id, day)): Path<(String, i64)>,
) -> AppResult<Json<DayView>> {
    Ok(Json(state.programs.day(&user.id, &id, day).await?))
}
