use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;

use crate::error::AppResult;
use crate::extractors::CurrentUser;
use crate::program::report::ProgressReport;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/progress", get(report))
}

async fn report(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<ProgressReport>> {
    let report = state.programs.progress_report(&user.id, Utc::now()).await?;
    Ok(Json(report))
}
