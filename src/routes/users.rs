use std::path::Path;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::db::models::{Gender, User};
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, ValidatedJson};
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 100, message = "must be 1 to 100 characters"))]
    pub name: Option<String>,
    #[validate(range(min = 13, max = 120, message = "must be between 13 and 120"))]
    pub age: Option<i64>,
    pub gender: Option<Gender>,
    #[validate(range(min = 15, max = 180, message = "must be between 15 and 180 minutes"))]
    pub daily_time_commitment: Option<i64>,
    pub interests: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct UserStats {
    pub streak: i64,
    pub longest_streak: i64,
    pub total_days: i64,
    pub completed_programs: i64,
    pub total_programs: i64,
    pub tests_taken: i64,
    pub has_active_program: bool,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users/profile", get(get_profile).put(update_profile))
        .route("/users/stats", get(stats))
        .route("/users/account", axum::routing::delete(delete_account))
}

async fn get_profile(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<User>> {
    let conn = state.db.get()?;
    let user = User::find(&conn, &user.id)?.ok_or_else(|| AppError::not_found("User"))?;
    Ok(Json(user))
}

/// Only fields present in the body are changed.
async fn update_profile(
    State(state): State<AppState>,
    user: CurrentUser,
    ValidatedJson(req): ValidatedJson<UpdateProfileRequest>,
) -> AppResult<Json<User>> {
    let interests = req
        .interests
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    let conn = state.db.get()?;
    conn.execute(
        "UPDATE users SET
            name = COALESCE(?1, name),
            age = COALESCE(?2, age),
            gender = COALESCE(?3, gender),
            daily_time_commitment = COALESCE(?4, daily_time_commitment),
            interests = COALESCE(?5, interests),
            updated_at = ?6
         WHERE id = ?7",
        params![
            req.name.as_deref().map(str::trim),
            req.age,
            req.gender.map(Gender::as_str),
            req.daily_time_commitment,
            interests,
            Utc::now().to_rfc3339(),
            user.id
        ],
    )?;

    let user = User::find(&conn, &user.id)?.ok_or_else(|| AppError::not_found("User"))?;
    Ok(Json(user))
}

async fn stats(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<UserStats>> {
    let conn = state.db.get()?;
    let profile = User::find(&conn, &user.id)?.ok_or_else(|| AppError::not_found("User"))?;

    let count = |sql: &str| -> Result<i64, rusqlite::Error> {
        conn.query_row(sql, params![user.id], |row| row.get(0))
    };

    Ok(Json(UserStats {
        streak: profile.streak,
        longest_streak: profile.longest_streak,
        total_days: profile.total_days,
        completed_programs: count("SELECT COUNT(*) FROM user_completed_programs WHERE user_id = ?1")?,
        total_programs: count("SELECT COUNT(*) FROM programs WHERE user_id = ?1")?,
        tests_taken: count("SELECT COUNT(*) FROM test_results WHERE user_id = ?1")?,
        has_active_program: profile.current_program_id.is_some(),
    }))
}

/// Removes the user and everything that cascades from it.
async fn delete_account(State(state): State<AppState>, user: CurrentUser) -> AppResult<StatusCode> {
    let conn = state.db.get()?;
    delete_user(&conn, &user.id, &state.config.uploads_path())?;
    tracing::info!("Deleted account {}", user.id);
    Ok(StatusCode::NO_CONTENT)
}

/// Delete a user row (the schema cascades to programs, results, sessions and
/// uploads) and remove the user's uploaded files from disk.
pub(crate) fn delete_user(
    conn: &rusqlite::Connection,
    user_id: &str,
    uploads_dir: &Path,
) -> AppResult<()> {
    let stored: Vec<String> = {
        let mut stmt = conn.prepare("SELECT stored_name FROM uploads WHERE user_id = ?1")?;
        let rows = stmt.query_map(params![user_id], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>()?
    };

    let deleted = conn.execute("DELETE FROM users WHERE id = ?1", params![user_id])?;
    if deleted == 0 {
        return Err(AppError::not_found("User"));
    }

    for name in stored {
        if let Err(e) = std::fs::remove_file(uploads_dir.join(&name)) {
            tracing::warn!("Could not remove upload {}: {}", name, e);
        }
    }
    Ok(())
}
