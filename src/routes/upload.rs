use std::path::Path;

use axum::extract::multipart::{Field, MultipartError};
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use rusqlite::params;
use tokio::io::AsyncWriteExt;

use crate::db::models::Upload;
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::state::AppState;

/// Public prefix the uploads directory is served under.
pub const UPLOADS_ROUTE: &str = "/uploads";

pub fn router() -> Router<AppState> {
    Router::new().route("/upload", post(upload))
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(err.body_text())
    } else {
        AppError::BadRequest(err.body_text())
    }
}

/// Lowercased extension of a client-supplied file name, if it has one.
pub fn file_extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(str::to_ascii_lowercase)
}

async fn upload(
    State(state): State<AppState>,
    user: CurrentUser,
    mut multipart: Multipart,
) -> AppResult<Response> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }

        let original_name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| AppError::BadRequest("File name is required".into()))?;
        let ext = file_extension(&original_name)
            .filter(|e| state.config.is_allowed_extension(e))
            .ok_or_else(|| {
                AppError::BadRequest(format!(
                    "File type not allowed (allowed: {})",
                    state.config.storage.allowed_extensions.join(", ")
                ))
            })?;

        let id = uuid::Uuid::now_v7().to_string();
        let stored_name = format!("{}.{}", id, ext);
        let dir = state.config.uploads_path();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create uploads dir: {}", e)))?;
        let path = dir.join(&stored_name);

        let size = match write_field(field, &path, state.config.storage.max_upload_bytes).await {
            Ok(size) => size,
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&path).await {
                    tracing::warn!("Could not remove partial upload {}: {}", path.display(), rm);
                }
                return Err(e);
            }
        };

        let record = Upload {
            id,
            user_id: user.id.clone(),
            original_name,
            content_type: mime_guess::from_path(&path)
                .first_or_octet_stream()
                .to_string(),
            url: format!("{}/{}", UPLOADS_ROUTE, stored_name),
            stored_name,
            size_bytes: size as i64,
            created_at: Utc::now().to_rfc3339(),
        };

        let conn = state.db.get()?;
        let inserted = conn.execute(
            "INSERT INTO uploads (id, user_id, original_name, stored_name, content_type, size_bytes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.id,
                record.user_id,
                record.original_name,
                record.stored_name,
                record.content_type,
                record.size_bytes,
                record.created_at
            ],
        );
        drop(conn);
        if let Err(e) = inserted {
            if let Err(rm) = tokio::fs::remove_file(&path).await {
                tracing::warn!("Could not remove orphaned upload {}: {}", path.display(), rm);
            }
            return Err(e.into());
        }

        tracing::info!(
            "User {} uploaded {} ({} bytes)",
            user.id,
            record.stored_name,
            record.size_bytes
        );
        return Ok((StatusCode::CREATED, Json(record)).into_response());
    }

    Err(AppError::BadRequest("Missing multipart field 'file'".into()))
}

/// Stream a field to `path`, failing once more than `limit` bytes arrive.
async fn write_field(mut field: Field<'_>, path: &Path, limit: usize) -> AppResult<usize> {
    let io_err = |e: std::io::Error| AppError::Internal(format!("Failed to write upload: {}", e));

    let mut file = tokio::fs::File::create(path).await.map_err(io_err)?;
    let mut written = 0usize;
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        written += chunk.len();
        if written > limit {
            return Err(AppError::PayloadTooLarge(format!(
                "File exceeds the {} byte limit",
                limit
            )));
        }
        file.write_all(&chunk).await.map_err(io_err)?;
    }
    file.flush().await.map_err(io_err)?;
    Ok(written)
}
