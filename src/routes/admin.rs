use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, put};
use axum::{Json, Router};
use chrono::Utc;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::areas::{self, DevelopmentArea, Question};
use crate::db::models::{User, USER_COLUMNS};
use crate::error::{AppError, AppResult};
use crate::extractors::{AdminUser, ValidatedJson};
use crate::program::domain::ProgramSnapshot;
use crate::program::ProgramStatus;
use crate::routes::users::delete_user;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct AdminStats {
    pub users: i64,
    pub active_programs: i64,
    pub completed_programs: i64,
    pub posts: i64,
    pub test_results: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct ProgramFilter {
    pub status: Option<ProgramStatus>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAreaRequest {
    #[validate(length(min = 1, max = 100, message = "must be 1 to 100 characters"))]
    pub name: String,
    #[validate(length(min = 1, max = 100, message = "must be 1 to 100 characters"))]
    pub slug: String,
    #[serde(default)]
    pub description: String,
    pub icon: Option<String>,
    #[validate(length(min = 1, message = "must contain at least one question"))]
    pub questions: Vec<Question>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/stats", get(stats))
        .route("/admin/users", get(users))
        .route("/admin/users/{id}", delete(remove_user))
        .route("/admin/users/{id}/role", put(set_role))
        .route("/admin/programs", get(programs))
        .route("/admin/areas", get(list_areas).post(create_area))
}

async fn stats(State(state): State<AppState>, _admin: AdminUser) -> AppResult<Json<AdminStats>> {
    let conn = state.db.get()?;
    let count = |sql: &str| -> Result<i64, rusqlite::Error> { conn.query_row(sql, [], |row| row.get(0)) };

    Ok(Json(AdminStats {
        users: count("SELECT COUNT(*) FROM users")?,
        active_programs: count("SELECT COUNT(*) FROM programs WHERE status = 'active'")?,
        completed_programs: count("SELECT COUNT(*) FROM programs WHERE status = 'completed'")?,
        posts: count("SELECT COUNT(*) FROM blog_posts")?,
        test_results: count("SELECT COUNT(*) FROM test_results")?,
    }))
}

async fn users(State(state): State<AppState>, _admin: AdminUser) -> AppResult<Json<Vec<User>>> {
    let conn = state.db.get()?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM users ORDER BY created_at DESC",
        USER_COLUMNS
    ))?;
    let users = stmt
        .query_map([], User::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(users))
}

async fn remove_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    if id == admin.id {
        return Err(AppError::BadRequest(
            "Use the account endpoint to delete yourself".into(),
        ));
    }
    let conn = state.db.get()?;
    delete_user(&conn, &id, &state.config.uploads_path())?;
    tracing::info!("Admin {} deleted user {}", admin.id, id);
    Ok(StatusCode::NO_CONTENT)
}

async fn set_role(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    Json(req): Json<RoleRequest>,
) -> AppResult<Json<User>> {
    if id == admin.id && req.role != Role::Admin {
        return Err(AppError::BadRequest("Admins cannot demote themselves".into()));
    }

    let conn = state.db.get()?;
    let changed = conn.execute(
        "UPDATE users SET role = ?1, updated_at = ?2 WHERE id = ?3",
        params![req.role.as_str(), Utc::now().to_rfc3339(), id],
    )?;
    if changed == 0 {
        return Err(AppError::not_found("User"));
    }

    tracing::info!("Admin {} set role of {} to {}", admin.id, id, req.role.as_str());
    let user = User::find(&conn, &id)?.ok_or_else(|| AppError::not_found("User"))?;
    Ok(Json(user))
}

async fn programs(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(filter): Query<ProgramFilter>,
) -> AppResult<Json<Vec<ProgramSnapshot>>> {
    Ok(Json(state.programs.list_all(filter.status).await?))
}

/// Full area records, answer scores included.
async fn list_areas(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> AppResult<Json<Vec<DevelopmentArea>>> {
    let conn = state.db.get()?;
    Ok(Json(areas::list_areas(&conn)?))
}

async fn create_area(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ValidatedJson(req): ValidatedJson<CreateAreaRequest>,
) -> AppResult<Response> {
    if let Some(q) = req.questions.iter().find(|q| q.options.is_empty()) {
        return Err(AppError::BadRequest(format!("Question {} has no options", q.id)));
    }

    let conn = state.db.get()?;
    let slug = req.slug.trim().to_lowercase();
    if areas::find_area(&conn, &slug)?.is_some() {
        return Err(AppError::Conflict(format!("Area {} already exists", slug)));
    }

    let area = areas::insert_area(
        &conn,
        req.name.trim(),
        &slug,
        &req.description,
        req.icon.as_deref(),
        &req.questions,
    )?;
    tracing::info!("Admin {} created area {}", admin.id, area.slug);
    Ok((StatusCode::CREATED, Json(area)).into_response())
}
