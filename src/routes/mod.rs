pub mod admin;
pub mod areas;
pub mod auth;
pub mod blog;
pub mod programs;
pub mod progress;
pub mod tasks;
pub mod upload;
pub mod users;

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::CorsConfig;
use crate::error::AppError;
use crate::state::AppState;

/// Multipart framing on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Every JSON endpoint, relative to `/api`.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .merge(auth::router())
        .merge(users::router())
        .merge(areas::router())
        .merge(programs::router())
        .merge(tasks::router())
        .merge(progress::router())
        .merge(blog::router())
        .merge(admin::router())
        .merge(upload::router())
        .fallback(|| async { AppError::NotFound("Route not found".into()) })
}

/// The full application: API under `/api`, uploaded files under `/uploads`.
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.storage.max_upload_bytes + MULTIPART_OVERHEAD;
    let uploads = ServeDir::new(state.config.uploads_path());
    let cors = cors_layer(&state.config.cors);

    Router::new()
        .nest("/api", api_router())
        .nest_service(upload::UPLOADS_ROUTE, uploads)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    if config.allowed_origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}
