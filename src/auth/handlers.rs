use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use rusqlite::{params, TransactionBehavior};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::auth::password::{hash_password, verify_password};
use crate::auth::session::{self, TokenPair};
use crate::db::models::{Gender, User};
use crate::error::{is_unique_violation, AppError, AppResult};
use crate::extractors::{CurrentUser, ValidatedJson};
use crate::state::AppState;

// -- Request types --

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 8, message = "must be at least 8 characters"))]
    pub password: String,
    #[validate(length(min = 1, max = 100, message = "must be 1 to 100 characters"))]
    pub name: Option<String>,
    #[validate(range(min = 13, max = 120, message = "must be between 13 and 120"))]
    pub age: Option<i64>,
    pub gender: Option<Gender>,
    #[validate(range(min = 15, max = 180, message = "must be between 15 and 180 minutes"))]
    pub daily_time_commitment: Option<i64>,
    #[serde(default)]
    pub interests: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "is required"))]
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

// -- Handlers --

/// POST /api/auth/register: Create an account and sign in.
/// The very first account becomes an admin.
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> AppResult<Response> {
    let email = req.email.trim().to_lowercase();
    let password_hash = hash_password(&req.password, state.config.auth.bcrypt_cost)?;

    let mut conn = state.db.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    if User::find_by_email(&tx, &email)?.is_some() {
        return Err(AppError::Conflict("Email is already registered".into()));
    }

    let user_count: i64 = tx.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
    let role = if user_count == 0 { "admin" } else { "user" };

    let user_id = uuid::Uuid::now_v7().to_string();
    let now = Utc::now().to_rfc3339();
    let inserted = tx.execute(
        "INSERT INTO users (id, email, password_hash, name, age, gender, daily_time_commitment,
            interests, role, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
        params![
            user_id,
            email,
            password_hash,
            req.name.as_deref().map(str::trim),
            req.age,
            req.gender.map(Gender::as_str),
            req.daily_time_commitment,
            serde_json::to_string(&req.interests)?,
            role,
            now
        ],
    );
    match inserted {
        Err(e) if is_unique_violation(&e) => {
            return Err(AppError::Conflict("Email is already registered".into()));
        }
        other => other?,
    };

    let tokens = session::issue_tokens(&tx, &user_id, &state.config.auth)?;
    let user = User::find(&tx, &user_id)?.ok_or_else(|| AppError::not_found("User"))?;
    tx.commit()?;

    tracing::info!("Registered user {} ({})", user_id, role);
    Ok((StatusCode::CREATED, Json(AuthResponse { user, tokens })).into_response())
}

/// POST /api/auth/login: Exchange email + password for tokens.
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let conn = state.db.get()?;
    let user = User::find_by_email(&conn, &req.email)?.ok_or(AppError::Unauthorized)?;

    if !verify_password(&req.password, &user.password_hash) {
        tracing::warn!("Failed login for {}", user.email);
        return Err(AppError::Unauthorized);
    }

    let tokens = session::issue_tokens(&conn, &user.id, &state.config.auth)?;
    Ok(Json(AuthResponse { user, tokens }))
}

/// POST /api/auth/refresh: Rotate a refresh token.
pub async fn refresh(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RefreshRequest>,
) -> AppResult<Json<AuthResponse>> {
    let mut conn = state.db.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let (user_id, tokens) =
        session::rotate_refresh_token(&tx, &req.refresh_token, &state.config.auth)?
            .ok_or(AppError::Unauthorized)?;
    let user = User::find(&tx, &user_id)?.ok_or(AppError::Unauthorized)?;
    tx.commit()?;

    Ok(Json(AuthResponse { user, tokens }))
}

/// GET /api/auth/me
pub async fn me(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<User>> {
    let conn = state.db.get()?;
    let user = User::find(&conn, &user.id)?.ok_or_else(|| AppError::not_found("User"))?;
    Ok(Json(user))
}

/// POST /api/auth/logout: Revoke the access token used for this request.
pub async fn logout(State(state): State<AppState>, user: CurrentUser) -> AppResult<StatusCode> {
    let conn = state.db.get()?;
    session::delete_token(&conn, &user.token)?;
    let purged = session::purge_expired(&conn)?;
    if purged > 0 {
        tracing::debug!("Purged {} expired tokens", purged);
    }
    Ok(StatusCode::NO_CONTENT)
}
