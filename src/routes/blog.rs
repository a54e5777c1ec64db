use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::db::models::{BlogPost, BLOG_COLUMNS};
use crate::error::{AppError, AppResult};
use crate::extractors::{AdminUser, MaybeUser, ValidatedJson};
use crate::state::AppState;

const EXCERPT_CHARS: usize = 200;
const DEFAULT_PAGE_SIZE: i64 = 10;
const MAX_PAGE_SIZE: i64 = 50;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub category: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct BlogPage {
    pub posts: Vec<BlogPost>,
    pub total: i64,
    pub page: i64,
    pub pages: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePostRequest {
    #[validate(length(min = 1, max = 200, message = "must be 1 to 200 characters"))]
    pub title: String,
    #[validate(length(min = 1, message = "is required"))]
    pub content: String,
    pub excerpt: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub published: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePostRequest {
    #[validate(length(min = 1, max = 200, message = "must be 1 to 200 characters"))]
    pub title: Option<String>,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub content: Option<String>,
    pub excerpt: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub published: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct LikeResponse {
    pub likes: i64,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/blog", get(list).post(create))
        .route("/blog/{key}", get(show).put(update).delete(remove))
        .route("/blog/{key}/like", post(like))
}

/// Lowercase ASCII alphanumerics, every other run collapsed to a single `-`.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("post");
    }
    slug
}

pub fn post_slug(title: &str, now: DateTime<Utc>) -> String {
    format!("{}-{}", slugify(title), now.timestamp_millis())
}

pub fn default_excerpt(content: &str) -> String {
    content.chars().take(EXCERPT_CHARS).collect()
}

fn find_post(conn: &rusqlite::Connection, column: &str, value: &str) -> AppResult<Option<BlogPost>> {
    let post = conn
        .query_row(
            &format!("SELECT {} FROM blog_posts WHERE {} = ?1", BLOG_COLUMNS, column),
            params![value],
            BlogPost::from_row,
        )
        .optional()?;
    Ok(post)
}

async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<BlogPage>> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let page = query.page.unwrap_or(1).max(1);
    let offset = (page - 1) * limit;
    let category = query.category.filter(|c| !c.is_empty());

    let conn = state.db.get()?;
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM blog_posts WHERE published = 1 AND (?1 IS NULL OR category = ?1)",
        params![category],
        |row| row.get(0),
    )?;

    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM blog_posts
         WHERE published = 1 AND (?1 IS NULL OR category = ?1)
         ORDER BY published_at DESC, created_at DESC
         LIMIT ?2 OFFSET ?3",
        BLOG_COLUMNS
    ))?;
    let posts = stmt
        .query_map(params![category, limit, offset], BlogPost::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(BlogPage {
        posts,
        total,
        page,
        pages: (total + limit - 1) / limit,
    }))
}

/// Drafts are only visible to admins. Every public read counts as a view.
async fn show(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(slug): Path<String>,
) -> AppResult<Json<BlogPost>> {
    let conn = state.db.get()?;
    let mut post = find_post(&conn, "slug", &slug)?.ok_or_else(|| AppError::not_found("Post"))?;

    let is_admin = viewer.as_ref().is_some_and(|u| u.is_admin());
    if !post.published && !is_admin {
        return Err(AppError::not_found("Post"));
    }

    conn.execute(
        "UPDATE blog_posts SET views = views + 1 WHERE id = ?1",
        params![post.id],
    )?;
    post.views += 1;
    Ok(Json(post))
}

async fn create(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ValidatedJson(req): ValidatedJson<CreatePostRequest>,
) -> AppResult<Response> {
    let now = Utc::now();
    let stamp = now.to_rfc3339();
    let post = BlogPost {
        id: uuid::Uuid::now_v7().to_string(),
        slug: post_slug(&req.title, now),
        title: req.title.trim().to_string(),
        excerpt: req
            .excerpt
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| default_excerpt(&req.content)),
        content: req.content,
        category: req
            .category
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| "general".to_string()),
        tags: req.tags,
        author_id: Some(admin.id.clone()),
        published: req.published,
        published_at: req.published.then(|| stamp.clone()),
        views: 0,
        likes: 0,
        created_at: stamp.clone(),
        updated_at: stamp,
    };

    let conn = state.db.get()?;
    conn.execute(
        "INSERT INTO blog_posts (id, title, slug, content, excerpt, category, tags, author_id,
                                 published, published_at, views, likes, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0, 0, ?11, ?12)",
        params![
            post.id,
            post.title,
            post.slug,
            post.content,
            post.excerpt,
            post.category,
            serde_json::to_string(&post.tags)?,
            post.author_id,
            post.published,
            post.published_at,
            post.created_at,
            post.updated_at
        ],
    )?;

    tracing::info!("Admin {} created post {}", admin.id, post.slug);
    Ok((StatusCode::CREATED, Json(post)).into_response())
}

/// Partial update. The slug stays fixed so links keep working; the first
/// publish stamps `published_at`.
async fn update(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdatePostRequest>,
) -> AppResult<Json<BlogPost>> {
    let tags = req.tags.as_ref().map(serde_json::to_string).transpose()?;
    let now = Utc::now().to_rfc3339();

    let conn = state.db.get()?;
    let changed = conn.execute(
        "UPDATE blog_posts SET
            title = COALESCE(?1, title),
            content = COALESCE(?2, content),
            excerpt = COALESCE(?3, excerpt),
            category = COALESCE(?4, category),
            tags = COALESCE(?5, tags),
            published = COALESCE(?6, published),
            published_at = CASE
                WHEN COALESCE(?6, published) = 1 AND published_at IS NULL THEN ?7
                ELSE published_at END,
            updated_at = ?7
         WHERE id = ?8",
        params![
            req.title.as_deref().map(str::trim),
            req.content,
            req.excerpt,
            req.category,
            tags,
            req.published,
            now,
            id
        ],
    )?;
    if changed == 0 {
        return Err(AppError::not_found("Post"));
    }

    let post = find_post(&conn, "id", &id)?.ok_or_else(|| AppError::not_found("Post"))?;
    Ok(Json(post))
}

async fn remove(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    let conn = state.db.get()?;
    let deleted = conn.execute("DELETE FROM blog_posts WHERE id = ?1", params![id])?;
    if deleted == 0 {
        return Err(AppError::not_found("Post"));
    }
    tracing::info!("Admin {} deleted post {}", admin.id, id);
    Ok(StatusCode::NO_CONTENT)
}

async fn like(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<LikeResponse>> {
    let conn = state.db.get()?;
    let changed = conn.execute(
        "UPDATE blog_posts SET likes = likes + 1 WHERE id = ?1 AND published = 1",
        params![id],
    )?;
    if changed == 0 {
        return Err(AppError::not_found("Post"));
    }
    let likes = conn.query_row(
        "SELECT likes FROM blog_posts WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )?;
    Ok(Json(LikeResponse { likes }))
}
