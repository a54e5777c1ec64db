use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use rusqlite::params;
use serde::Deserialize;
use validator::Validate;

use crate::areas::{self, Answer, PublicArea};
use crate::db::models::{TestResult, TEST_RESULT_COLUMNS};
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, ValidatedJson};
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitTestRequest {
    #[validate(length(min = 1, message = "must contain at least one answer"))]
    pub answers: Vec<Answer>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/areas", get(list))
        .route("/areas/results", get(my_results))
        .route("/areas/{slug}", get(show))
        .route("/areas/{slug}/test", post(submit_test))
}

async fn list(State(state): State<AppState>) -> AppResult<Json<Vec<PublicArea>>> {
    let conn = state.db.get()?;
    let areas = areas::list_areas(&conn)?
        .iter()
        .map(|a| a.to_public(false))
        .collect();
    Ok(Json(areas))
}

async fn show(State(state): State<AppState>, Path(slug): Path<String>) -> AppResult<Json<PublicArea>> {
    let conn = state.db.get()?;
    let area = areas::find_area(&conn, &slug)?.ok_or_else(|| AppError::not_found("Development area"))?;
    Ok(Json(area.to_public(true)))
}

/// POST /api/areas/{slug}/test: Score a placement quiz and store the result.
async fn submit_test(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(slug): Path<String>,
    ValidatedJson(req): ValidatedJson<SubmitTestRequest>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let area = areas::find_area(&conn, &slug)?.ok_or_else(|| AppError::not_found("Development area"))?;

    let score = areas::score_answers(&area.questions, &req.answers)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let result = TestResult {
        id: uuid::Uuid::now_v7().to_string(),
        user_id: user.id.clone(),
        area_id: area.id.clone(),
        answers: serde_json::to_value(&req.answers)?,
        score: score.score,
        max_score: score.max_score,
        difficulty_level: score.difficulty_level,
        created_at: Utc::now().to_rfc3339(),
    };

    conn.execute(
        "INSERT INTO test_results (id, user_id, area_id, answers, score, max_score, difficulty_level, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            result.id,
            result.user_id,
            result.area_id,
            result.answers.to_string(),
            result.score,
            result.max_score,
            result.difficulty_level,
            result.created_at
        ],
    )?;

    tracing::info!(
        "User {} scored {}/{} in {} ({})",
        user.id,
        result.score,
        result.max_score,
        area.slug,
        result.difficulty_level
    );
    Ok((StatusCode::CREATED, Json(result)).into_response())
}

async fn my_results(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<TestResult>>> {
    let conn = state.db.get()?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM test_results WHERE user_id = ?1 ORDER BY created_at DESC",
        TEST_RESULT_COLUMNS
    ))?;
    let results = stmt
        .query_map(params![user.id], TestResult::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(results))
}
